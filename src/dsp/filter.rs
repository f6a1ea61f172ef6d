//! Time-varying pole filter: coefficient synthesis for sound-effect voices.
//!
//! A filter record describes up to 15 resonant poles on each of two
//! channels. Every pole carries a corner (resonant frequency) and a damping
//! code at a start and an end keyframe; the mixer asks for coefficients at
//! an envelope position `t` in `[0, 1]` every tick and runs the filter
//! itself. Each pole contributes a quadratic factor `1 + a·z⁻¹ + b·z⁻²` with
//! `a = -2r·cos θ` and `b = r²`; the factors are multiplied into one
//! polynomial and quantized to 16.16 fixed point.
//!
//! All arithmetic is single precision to stay bit-exact with the packed
//! sound data the coefficients were authored against.

use log::debug;
use serde::{Deserialize, Serialize};

use super::fixed;
use super::schedule::FilterSchedule;
use crate::error::{DecodeError, EnvelopeError, SfxError};
use crate::stream::{ParamReader, ParamWriter};

/// Poles a channel can hold (one nibble).
pub const MAX_POLES: usize = 15;

/// Gain code → dB.
const GAIN_DB_PER_UNIT: f32 = 0.0030517578;
/// Damping code → dB of attenuation.
const DAMPING_DB_PER_UNIT: f32 = 0.0015258789;
/// Corner code → octaves above the reference (1/8192).
const OCTAVES_PER_UNIT: f32 = 1.2207031e-4;
/// C1, the frequency of corner code 0.
const REFERENCE_HZ: f32 = 32.703197;
/// Half the 22050 Hz mixing rate; maps Hz to radians per sample with π.
const HALF_MIX_RATE: f32 = 11025.0;
const PI_F32: f32 = 3.1415927;

/// Filter channel. Only the first carries the gain envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    First,
    Second,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::First, Channel::Second];

    pub fn index(self) -> usize {
        match self {
            Channel::First => 0,
            Channel::Second => 1,
        }
    }

    pub fn from_index(index: u8) -> Result<Self, SfxError> {
        match index {
            0 => Ok(Channel::First),
            1 => Ok(Channel::Second),
            other => Err(SfxError::InvalidChannel(other)),
        }
    }
}

/// A code at the start and end of the envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyframes {
    pub start: u16,
    pub end: u16,
}

impl Keyframes {
    pub fn fixed(value: u16) -> Self {
        Keyframes { start: value, end: value }
    }

    pub fn is_constant(&self) -> bool {
        self.start == self.end
    }

    /// Linear interpolation, still in raw code units.
    pub fn at(&self, t: f32) -> f32 {
        self.start as f32 + t * (self.end as i32 - self.start as i32) as f32
    }
}

/// One resonant pole.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pole {
    pub corner: Keyframes,
    pub damping: Keyframes,
}

impl Pole {
    /// Pole angle in radians per sample.
    pub fn theta(&self, t: f32) -> f32 {
        let octaves = self.corner.at(t) * OCTAVES_PER_UNIT;
        let hz = REFERENCE_HZ * 2f64.powf(octaves as f64) as f32;
        hz * PI_F32 / HALF_MIX_RATE
    }

    /// Pole radius; grows toward 1.0 as the damping code rises.
    pub fn radius(&self, t: f32) -> f32 {
        let db = self.damping.at(t) * DAMPING_DB_PER_UNIT;
        1.0 - 10f64.powf((-db / 20.0) as f64) as f32
    }

    /// `(a, b)` of the quadratic factor `1 + a·z⁻¹ + b·z⁻²`.
    pub fn factor(&self, t: f32) -> (f32, f32) {
        let r = self.radius(t);
        let a = -2.0 * r * (self.theta(t) as f64).cos() as f32;
        (a, r * r)
    }
}

/// Overall gain at one envelope position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gain {
    pub linear: f32,
    /// `linear` in 16.16, truncated.
    pub fixed: i32,
}

/// Output of [`FilterEnvelope::synthesize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficients {
    /// `2 * pole_count` coefficients in 16.16, lowest delay first.
    pub fixed: Vec<i32>,
    /// Present for [`Channel::First`] only.
    pub gain: Option<Gain>,
}

impl Coefficients {
    pub fn len(&self) -> usize {
        self.fixed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixed.is_empty()
    }
}

/// Decoded filter record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EnvelopeRepr", into = "EnvelopeRepr")]
pub struct FilterEnvelope {
    poles: [Vec<Pole>; 2],
    gain: Keyframes,
    /// Bit `4 * channel + pole` set when that pole has its own end keyframe.
    end_mask: u8,
}

/// Serialized form; checked on the way in so `encode` always has a valid record.
#[derive(Serialize, Deserialize)]
struct EnvelopeRepr {
    poles: [Vec<Pole>; 2],
    gain: Keyframes,
    end_mask: u8,
}

impl TryFrom<EnvelopeRepr> for FilterEnvelope {
    type Error = EnvelopeError;

    fn try_from(repr: EnvelopeRepr) -> Result<Self, Self::Error> {
        check_counts(&repr.poles)?;
        for (ch, list) in repr.poles.iter().enumerate() {
            for (i, pole) in list.iter().enumerate() {
                if is_moving(pole) && !has_end(repr.end_mask, ch, i) {
                    return Err(EnvelopeError::UnencodableEnd { channel: ch, pole: i });
                }
            }
        }
        Ok(FilterEnvelope {
            poles: repr.poles,
            gain: repr.gain,
            end_mask: repr.end_mask,
        })
    }
}

impl From<FilterEnvelope> for EnvelopeRepr {
    fn from(env: FilterEnvelope) -> Self {
        EnvelopeRepr {
            poles: env.poles,
            gain: env.gain,
            end_mask: env.end_mask,
        }
    }
}

fn has_end(mask: u8, channel: usize, pole: usize) -> bool {
    (mask as u32) & (1u32 << (channel * 4) << pole) != 0
}

fn is_moving(pole: &Pole) -> bool {
    !pole.corner.is_constant() || !pole.damping.is_constant()
}

fn check_counts(poles: &[Vec<Pole>; 2]) -> Result<(), EnvelopeError> {
    match poles.iter().position(|list| list.len() > MAX_POLES) {
        Some(ch) => Err(EnvelopeError::TooManyPoles { channel: ch, count: poles[ch].len() }),
        None => Ok(()),
    }
}

impl FilterEnvelope {
    /// The "no filtering" record.
    pub fn disabled() -> Self {
        FilterEnvelope::default()
    }

    /// Build an envelope directly. The end mask is derived from which poles
    /// move; a moving pole whose bit falls outside the mask byte is rejected.
    pub fn new(first: Vec<Pole>, second: Vec<Pole>, gain: Keyframes) -> Result<Self, EnvelopeError> {
        let poles = [first, second];
        check_counts(&poles)?;
        let mut end_mask = 0u8;
        for (ch, list) in poles.iter().enumerate() {
            for (i, _) in list.iter().enumerate().filter(|(_, p)| is_moving(p)) {
                let bit = ch * 4 + i;
                if bit >= 8 {
                    return Err(EnvelopeError::UnencodableEnd { channel: ch, pole: i });
                }
                end_mask |= 1 << bit;
            }
        }
        Ok(FilterEnvelope { poles, gain, end_mask })
    }

    /// Read one record. A leading zero byte is the disabled sentinel.
    pub fn decode<S: FilterSchedule>(reader: &mut ParamReader<'_>, schedule: &mut S) -> Result<Self, DecodeError> {
        let counts = reader.read_u8("pole counts")?;
        if counts == 0 {
            return Ok(FilterEnvelope::disabled());
        }
        let counts = [(counts >> 4) as usize, (counts & 0x0f) as usize];

        let gain_start = reader.read_u16("gain start")?;
        let gain_end = reader.read_u16("gain end")?;
        let gain = Keyframes { start: gain_start, end: gain_end };
        let end_mask = reader.read_u8("end mask")?;

        let mut poles: [Vec<Pole>; 2] = Default::default();
        for (ch, list) in poles.iter_mut().enumerate() {
            for _ in 0..counts[ch] {
                let corner = reader.read_u16("corner start")?;
                let damping = reader.read_u16("damping start")?;
                list.push(Pole {
                    corner: Keyframes::fixed(corner),
                    damping: Keyframes::fixed(damping),
                });
            }
        }

        for (ch, list) in poles.iter_mut().enumerate() {
            for (i, pole) in list.iter_mut().enumerate() {
                if has_end(end_mask, ch, i) {
                    pole.corner.end = reader.read_u16("corner end")?;
                    pole.damping.end = reader.read_u16("damping end")?;
                }
            }
        }

        let envelope = FilterEnvelope { poles, gain, end_mask };
        debug!(
            "Decoded filter: {}+{} poles, gain {}..{}, end mask {end_mask:#04x}",
            counts[0], counts[1], gain.start, gain.end
        );
        if envelope.is_time_varying() {
            schedule.schedule(reader)?;
        }
        Ok(envelope)
    }

    /// Write the record `decode` reads. Trailing schedule data is the owner's.
    pub fn encode(&self, writer: &mut ParamWriter) {
        if self.is_disabled() {
            writer.write_u8(0);
            return;
        }
        writer.write_u8(((self.poles[0].len() as u8) << 4) | self.poles[1].len() as u8);
        writer.write_u16(self.gain.start);
        writer.write_u16(self.gain.end);
        writer.write_u8(self.end_mask);
        for list in &self.poles {
            for pole in list {
                writer.write_u16(pole.corner.start);
                writer.write_u16(pole.damping.start);
            }
        }
        for (ch, list) in self.poles.iter().enumerate() {
            for (i, pole) in list.iter().enumerate() {
                if has_end(self.end_mask, ch, i) {
                    writer.write_u16(pole.corner.end);
                    writer.write_u16(pole.damping.end);
                }
            }
        }
    }

    pub fn pole_count(&self, channel: Channel) -> usize {
        self.poles[channel.index()].len()
    }

    pub fn poles(&self, channel: Channel) -> &[Pole] {
        &self.poles[channel.index()]
    }

    pub fn gain(&self) -> Keyframes {
        self.gain
    }

    pub fn end_mask(&self) -> u8 {
        self.end_mask
    }

    /// No poles on either channel.
    pub fn is_disabled(&self) -> bool {
        self.poles.iter().all(Vec::is_empty)
    }

    /// Whether the record needs re-evaluating across ticks.
    pub fn is_time_varying(&self) -> bool {
        self.end_mask != 0 || !self.gain.is_constant()
    }

    /// Gain of the first channel at `t`.
    pub fn gain_at(&self, t: f32) -> Gain {
        let db = self.gain.at(t) * GAIN_DB_PER_UNIT;
        let linear = 0.1f64.powf((db / 20.0) as f64) as f32;
        Gain { linear, fixed: fixed::truncate_f32(linear) }
    }

    /// Coefficients for `channel` at envelope position `t`.
    pub fn synthesize(&self, channel: Channel, t: f32) -> Coefficients {
        let gain = match channel {
            Channel::First => Some(self.gain_at(t)),
            Channel::Second => None,
        };

        let poles = self.poles(channel);
        let Some((head, tail)) = poles.split_first() else {
            return Coefficients { fixed: Vec::new(), gain };
        };

        let mut c = vec![0f32; poles.len() * 2];
        let (a, b) = head.factor(t);
        c[0] = a;
        c[1] = b;

        for (n, pole) in tail.iter().enumerate() {
            let i = n + 1;
            let (a, b) = pole.factor(t);
            c[i * 2 + 1] = c[i * 2 - 1] * b;
            c[i * 2] = c[i * 2 - 1] * a + c[i * 2 - 2] * b;
            for j in (2..i * 2).rev() {
                c[j] += c[j - 1] * a + c[j - 2] * b;
            }
            c[1] += c[0] * a + b;
            c[0] += a;
        }

        if let Some(g) = gain {
            for v in c.iter_mut() {
                *v *= g.linear;
            }
        }

        Coefficients {
            fixed: c.into_iter().map(fixed::truncate_f32).collect(),
            gain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::schedule::SegmentSchedule;

    /// Counts notifications without touching the stream.
    #[derive(Default)]
    struct Notified(usize);

    impl FilterSchedule for Notified {
        fn schedule(&mut self, _stream: &mut ParamReader<'_>) -> Result<(), DecodeError> {
            self.0 += 1;
            Ok(())
        }
    }

    fn decode(bytes: &[u8]) -> (FilterEnvelope, usize, usize) {
        let mut reader = ParamReader::new(bytes);
        let mut sched = Notified::default();
        let env = FilterEnvelope::decode(&mut reader, &mut sched).expect("record should decode");
        (env, sched.0, reader.position())
    }

    fn pole(corner: u16, damping: u16) -> Pole {
        Pole {
            corner: Keyframes::fixed(corner),
            damping: Keyframes::fixed(damping),
        }
    }

    #[test]
    fn zero_byte_disables_filter() {
        let (env, notified, consumed) = decode(&[0x00, 0xaa, 0xbb]);
        assert!(env.is_disabled());
        assert_eq!(env.pole_count(Channel::First), 0);
        assert_eq!(env.pole_count(Channel::Second), 0);
        assert_eq!(env.gain(), Keyframes::default());
        assert_eq!(notified, 0);
        assert_eq!(consumed, 1, "Sentinel ends the record");

        for t in [0.0, 0.5, 1.0] {
            let first = env.synthesize(Channel::First, t);
            assert!(first.is_empty());
            assert_eq!(first.gain.map(|g| g.fixed), Some(fixed::ONE), "Zero gain code is unity");
            let second = env.synthesize(Channel::Second, t);
            assert!(second.is_empty());
            assert_eq!(second.gain, None);
        }
    }

    #[test]
    fn parses_starts_then_ends() {
        #[rustfmt::skip]
        let bytes = [
            0x21,                   // 2 poles on the first channel, 1 on the second
            0x01, 0x00, 0x02, 0x00, // gain 256 -> 512
            0b0001_0010,            // end keyframes: first ch pole 1, second ch pole 0
            0x10, 0x00, 0x20, 0x00, // first ch pole 0 start
            0x11, 0x00, 0x21, 0x00, // first ch pole 1 start
            0x12, 0x00, 0x22, 0x00, // second ch pole 0 start
            0x13, 0x00, 0x23, 0x00, // first ch pole 1 end
            0x14, 0x00, 0x24, 0x00, // second ch pole 0 end
            0xee,                   // not ours
        ];
        let (env, notified, consumed) = decode(&bytes);
        assert_eq!(consumed, bytes.len() - 1);
        assert_eq!(notified, 1);
        assert_eq!(env.end_mask(), 0b0001_0010);
        assert_eq!(env.gain(), Keyframes { start: 0x100, end: 0x200 });

        let first = env.poles(Channel::First);
        assert_eq!(first.len(), 2);
        assert_eq!(first[0], pole(0x1000, 0x2000), "No end bit: end copies start");
        assert_eq!(first[1].corner, Keyframes { start: 0x1100, end: 0x1300 });
        assert_eq!(first[1].damping, Keyframes { start: 0x2100, end: 0x2300 });

        let second = env.poles(Channel::Second);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].corner, Keyframes { start: 0x1200, end: 0x1400 });
        assert_eq!(second[0].damping, Keyframes { start: 0x2200, end: 0x2400 });
    }

    #[test]
    fn static_record_does_not_notify() {
        let (env, notified, _) = decode(&[0x01, 0x00, 0x40, 0x00, 0x40, 0x00, 0x10, 0x00, 0x20, 0x00]);
        assert!(!env.is_time_varying());
        assert_eq!(notified, 0);

        // Gain alone moving is enough
        let (env, notified, _) = decode(&[0x01, 0x00, 0x40, 0x00, 0x41, 0x00, 0x10, 0x00, 0x20, 0x00]);
        assert!(env.is_time_varying());
        assert_eq!(notified, 1);
    }

    #[test]
    fn schedule_reads_its_own_tail() {
        let bytes = [
            0x10, 0x00, 0x00, 0x00, 0x00, 0x01, 0x10, 0x00, 0x20, 0x00, 0x11, 0x00, 0x21, 0x00,
            // segment schedule: two breakpoints
            0x02, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff,
        ];
        let mut reader = ParamReader::new(&bytes);
        let mut sched = SegmentSchedule::new();
        let env = FilterEnvelope::decode(&mut reader, &mut sched).unwrap();
        assert_eq!(env.pole_count(Channel::First), 1);
        assert!(sched.is_active());
        assert_eq!(sched.segments().len(), 2);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn truncated_record_errors() {
        let mut reader = ParamReader::new(&[0x11, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00]);
        let err = FilterEnvelope::decode(&mut reader, &mut Notified::default()).unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnexpectedEof {
                offset: 8,
                expected: "damping start"
            }
        );
    }

    #[test]
    fn encode_reproduces_record() {
        #[rustfmt::skip]
        let bytes = [
            0x12, 0x12, 0x34, 0x12, 0x34, 0b0010_0000,
            0x10, 0x00, 0x20, 0x00,
            0x11, 0x00, 0x21, 0x00,
            0x12, 0x00, 0x22, 0x00,
            0x15, 0x00, 0x25, 0x00,
        ];
        let (env, _, _) = decode(&bytes);
        let mut writer = ParamWriter::new();
        env.encode(&mut writer);
        assert_eq!(writer.into_bytes(), bytes.to_vec());

        let mut writer = ParamWriter::new();
        FilterEnvelope::disabled().encode(&mut writer);
        assert_eq!(writer.into_bytes(), vec![0]);
    }

    #[test]
    fn single_pole_coefficients() {
        // Damping 3946 is ~6.02 dB, so r ~ 0.5; corner 0 sits at 32.7 Hz, cos θ ~ 1
        let env = FilterEnvelope::new(Vec::new(), vec![pole(0, 3946)], Keyframes::default()).unwrap();
        let c = env.synthesize(Channel::Second, 0.0);
        assert_eq!(c.len(), 2);
        assert_eq!(c.gain, None);
        assert!((c.fixed[0] + fixed::ONE).abs() <= 16, "a ~ -2r: {:?}", c.fixed);
        assert!((c.fixed[1] - fixed::ONE / 4).abs() <= 16, "b ~ r²: {:?}", c.fixed);
    }

    #[test]
    fn zero_damping_collapses_pole() {
        let env = FilterEnvelope::new(vec![pole(4000, 0)], Vec::new(), Keyframes::default()).unwrap();
        let c = env.synthesize(Channel::First, 0.3);
        assert_eq!(c.fixed, vec![0, 0]);
    }

    #[test]
    fn cascade_multiplies_factors() {
        let p0 = pole(20000, 9000);
        let p1 = pole(40000, 12000);
        let env = FilterEnvelope::new(Vec::new(), vec![p0, p1], Keyframes::default()).unwrap();
        let c = env.synthesize(Channel::Second, 0.0);
        assert_eq!(c.len(), 4);

        let (a0, b0) = p0.factor(0.0);
        let (a1, b1) = p1.factor(0.0);
        let expected = [a0 + a1, b0 + a0 * a1 + b1, a0 * b1 + a1 * b0, b0 * b1];
        for (i, (&got, want)) in c.fixed.iter().zip(expected).enumerate() {
            let want = (want * 65536.0) as i32;
            assert!((got - want).abs() <= 2, "coefficient {i}: {got} vs {want}");
        }
    }

    #[test]
    fn keyframe_endpoints_match_static_records() {
        let moving = Pole {
            corner: Keyframes { start: 10000, end: 30000 },
            damping: Keyframes { start: 8000, end: 16000 },
        };
        let gain = Keyframes { start: 500, end: 2500 };
        let env = FilterEnvelope::new(vec![moving, pole(5000, 9000)], vec![moving], gain).unwrap();
        assert_eq!(env.end_mask(), 0b0001_0001);

        let at_start = FilterEnvelope::new(
            vec![pole(10000, 8000), pole(5000, 9000)],
            vec![pole(10000, 8000)],
            Keyframes::fixed(500),
        )
        .unwrap();
        let at_end = FilterEnvelope::new(
            vec![pole(30000, 16000), pole(5000, 9000)],
            vec![pole(30000, 16000)],
            Keyframes::fixed(2500),
        )
        .unwrap();

        for ch in Channel::ALL {
            assert_eq!(env.synthesize(ch, 0.0), at_start.synthesize(ch, 0.0), "{ch:?} at t = 0");
            assert_eq!(env.synthesize(ch, 1.0), at_end.synthesize(ch, 1.0), "{ch:?} at t = 1");
        }
    }

    #[test]
    fn corner_sweep_is_monotone() {
        // One octave up with fixed damping: cos θ falls, so a = -2r·cos θ rises
        let sweep = Pole {
            corner: Keyframes { start: 0, end: 8192 },
            damping: Keyframes::fixed(20000),
        };
        let env = FilterEnvelope::new(Vec::new(), vec![sweep], Keyframes::default()).unwrap();
        let mut prev = i32::MIN;
        for step in 0..=8 {
            let c = env.synthesize(Channel::Second, step as f32 / 8.0);
            assert!(c.fixed[0] >= prev, "step {step}: {} < {prev}", c.fixed[0]);
            assert_eq!(c.fixed[1], env.synthesize(Channel::Second, 0.0).fixed[1], "r is constant");
            prev = c.fixed[0];
        }
        assert!(prev > env.synthesize(Channel::Second, 0.0).fixed[0]);
    }

    #[test]
    fn gain_scales_first_channel_only() {
        // Gain 1973 is ~6.02 dB of cut, a factor of ~0.5
        let p = pole(12000, 10000);
        let env = FilterEnvelope::new(vec![p], vec![p], Keyframes::fixed(1973)).unwrap();
        let first = env.synthesize(Channel::First, 0.5);
        let second = env.synthesize(Channel::Second, 0.5);

        let gain = first.gain.expect("first channel reports gain");
        assert!((gain.linear - 0.5).abs() < 1e-3, "linear gain {}", gain.linear);
        assert!((gain.fixed - fixed::ONE / 2).abs() <= 8, "fixed gain {}", gain.fixed);
        assert_eq!(second.gain, None);

        for (i, (&f, &s)) in first.fixed.iter().zip(&second.fixed).enumerate() {
            let scaled = s as f32 * gain.linear;
            assert!((f as f32 - scaled).abs() <= 2.0, "coefficient {i}: {f} vs {scaled}");
            assert_ne!(f, s, "coefficient {i} should be scaled");
        }
    }

    #[test]
    fn channel_index_roundtrip() {
        for ch in Channel::ALL {
            assert_eq!(Channel::from_index(ch.index() as u8).unwrap(), ch);
        }
        assert!(matches!(Channel::from_index(2), Err(SfxError::InvalidChannel(2))));
    }

    #[test]
    fn envelope_serializes_to_json() {
        let env = FilterEnvelope::new(vec![pole(1, 2)], Vec::new(), Keyframes { start: 3, end: 4 }).unwrap();
        let json = serde_json::to_string(&env).unwrap();
        let back: FilterEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn moving_pole_sets_its_end_bit() {
        let sweep = Pole {
            corner: Keyframes { start: 0, end: 8192 },
            damping: Keyframes::fixed(20000),
        };
        let env = FilterEnvelope::new(vec![pole(100, 200), sweep], Vec::new(), Keyframes::default()).unwrap();
        assert_eq!(env.end_mask(), 0b0000_0010);
        assert!(env.is_time_varying());

        let mut writer = ParamWriter::new();
        env.encode(&mut writer);
        let bytes = writer.into_bytes();
        let (back, notified, consumed) = decode(&bytes);
        assert_eq!(back, env);
        assert_eq!(notified, 1);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn unencodable_envelopes_rejected() {
        let sweep = Pole {
            corner: Keyframes { start: 0, end: 8192 },
            damping: Keyframes::fixed(20000),
        };
        // Second-channel bits stop at pole 3
        let mut second = vec![pole(1, 1); 4];
        second.push(sweep);
        assert_eq!(
            FilterEnvelope::new(Vec::new(), second, Keyframes::default()),
            Err(EnvelopeError::UnencodableEnd { channel: 1, pole: 4 })
        );

        // First-channel pole 4 shares the second channel's bit 4
        let mut first = vec![pole(1, 1); 4];
        first.push(sweep);
        let env = FilterEnvelope::new(first, vec![pole(2, 2)], Keyframes::default()).unwrap();
        assert_eq!(env.end_mask(), 0b0001_0000);

        assert_eq!(
            FilterEnvelope::new(vec![pole(1, 1); MAX_POLES + 1], Vec::new(), Keyframes::default()),
            Err(EnvelopeError::TooManyPoles { channel: 0, count: 16 })
        );
        assert!(FilterEnvelope::new(vec![pole(1, 1); MAX_POLES], vec![pole(1, 1); MAX_POLES], Keyframes::default()).is_ok());
    }

    #[test]
    fn json_envelope_is_validated() {
        let still = serde_json::json!({
            "corner": { "start": 1, "end": 1 },
            "damping": { "start": 2, "end": 2 },
        });
        let gain = serde_json::json!({ "start": 0, "end": 0 });

        let crowded = vec![still.clone(); 17];
        let oversized = serde_json::json!({
            "poles": [crowded, []],
            "gain": gain,
            "end_mask": 0,
        });
        let err = serde_json::from_value::<FilterEnvelope>(oversized).unwrap_err();
        assert!(err.to_string().contains("17 poles"), "got {err}");

        let moving = serde_json::json!({
            "corner": { "start": 0, "end": 8192 },
            "damping": { "start": 2, "end": 2 },
        });
        let unmasked = serde_json::json!({ "poles": [[moving], []], "gain": gain, "end_mask": 0 });
        assert!(serde_json::from_value::<FilterEnvelope>(unmasked).is_err());

        let masked = serde_json::json!({ "poles": [[moving], [still]], "gain": gain, "end_mask": 1 });
        let env: FilterEnvelope = serde_json::from_value(masked).unwrap();
        assert_eq!(env.pole_count(Channel::First), 1);
        assert_eq!(env.pole_count(Channel::Second), 1);
        assert!(env.is_time_varying());
    }

    #[test]
    fn three_pole_sweep_is_bit_exact() {
        let moving = Pole {
            corner: Keyframes { start: 10000, end: 30000 },
            damping: Keyframes { start: 8000, end: 16000 },
        };
        let falling = Pole {
            corner: Keyframes { start: 40000, end: 20000 },
            damping: Keyframes { start: 30000, end: 12000 },
        };
        let gain = Keyframes { start: 500, end: 2500 };
        let env = FilterEnvelope::new(
            vec![moving, pole(5000, 9000), falling],
            vec![moving, pole(5000, 9000)],
            gain,
        )
        .unwrap();

        let first = env.synthesize(Channel::First, 0.37);
        assert_eq!(first.fixed, vec![-222166, 485383, -565688, 370830, -129618, 18869]);
        assert_eq!(first.gain.map(|g| g.fixed), Some(42390));

        let second = env.synthesize(Channel::Second, 0.37);
        assert_eq!(second.fixed, vec![-215959, 266838, -146516, 30163]);
        assert_eq!(second.gain, None);
    }
}
