//! Polyphase rate converter for mono 8-bit PCM.
//!
//! Converts between two sample rates whose ratio is reduced to `num / den`
//! (target over source). One 14-tap windowed-sinc kernel is precomputed per
//! output sub-sample phase, quantized to 16.16 fixed point, and applied by
//! scattering each input sample into a wide accumulator. The kernel
//! constants are part of the asset format and must not be tuned.

use std::borrow::Cow;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;

use log::{debug, trace};

use super::fixed;
use crate::config::MixerConfig;
use crate::error::RateError;

/// Taps per kernel.
pub const TAPS: usize = 14;

/// Extra output samples `convert` allocates for the kernel's support.
pub const CONVERT_MARGIN: usize = TAPS;

/// Margin applied by [`RateConverter::resampled_len`].
pub const RESAMPLED_MARGIN: usize = 6;

/// Angular step of the raised-cosine window (2π / 28).
const WINDOW_STEP: f64 = 0.2243994752564138;

/// One phase of the kernel bank.
pub type Kernel = [i32; TAPS];

/// Rational-ratio resampler with an immutable kernel bank.
#[derive(Debug, Clone, PartialEq)]
pub struct RateConverter {
    /// Reduced target rate.
    num: u32,
    /// Reduced source rate; also the number of kernel phases.
    den: u32,
    /// `None` when source and target rates match.
    kernels: Option<Vec<Kernel>>,
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

impl RateConverter {
    pub fn new(source_rate: u32, target_rate: u32) -> Result<Self, RateError> {
        if source_rate == 0 || target_rate == 0 {
            return Err(RateError::ZeroRate { source_rate, target_rate });
        }
        if source_rate == target_rate {
            return Ok(RateConverter { num: 1, den: 1, kernels: None });
        }

        let g = gcd(source_rate, target_rate);
        let den = source_rate / g;
        let num = target_rate / g;
        debug!("Building {den}-phase kernel bank: {source_rate} Hz => {target_rate} Hz ({num}/{den})");

        let kernels = (0..den).map(|phase| build_kernel(phase, num, den)).collect();
        Ok(RateConverter { num, den, kernels: Some(kernels) })
    }

    pub fn is_identity(&self) -> bool {
        self.kernels.is_none()
    }

    /// Reduced `(target, source)` ratio; `(1, 1)` for identity.
    pub fn ratio(&self) -> (u32, u32) {
        (self.num, self.den)
    }

    /// Number of kernel phases (0 for identity).
    pub fn phases(&self) -> usize {
        self.kernels.as_ref().map_or(0, Vec::len)
    }

    pub fn kernel(&self, phase: usize) -> Option<&Kernel> {
        self.kernels.as_ref()?.get(phase)
    }

    /// `floor(n * num / den)` without margin, or `n` for identity. Saturates.
    fn scale(&self, n: usize) -> usize {
        if self.is_identity() {
            return n;
        }
        let scaled = n as u128 * self.num as u128 / self.den as u128;
        usize::try_from(scaled).unwrap_or(usize::MAX)
    }

    /// Length of the buffer `convert` produces for `n` input samples.
    pub fn converted_len(&self, n: usize) -> usize {
        if self.is_identity() {
            return n;
        }
        self.scale(n).saturating_add(CONVERT_MARGIN)
    }

    /// Mixer-side buffer size for `n` source samples.
    pub fn resampled_len(&self, n: usize) -> usize {
        if self.is_identity() {
            return n;
        }
        self.scale(n).saturating_add(RESAMPLED_MARGIN)
    }

    /// Map a position (e.g. a loop point or seek offset) into the target rate.
    pub fn scale_position(&self, n: usize) -> usize {
        self.scale(n)
    }

    /// Resample `samples`. Matching rates hand the input back untouched.
    pub fn convert<'a>(&self, samples: &'a [i8]) -> Cow<'a, [i8]> {
        let Some(kernels) = &self.kernels else {
            return Cow::Borrowed(samples);
        };

        let mut acc = vec![0i64; self.converted_len(samples.len())];
        let mut out = 0usize;
        let mut phase = 0u64;
        let (num, den) = (self.num as u64, self.den as u64);

        for &sample in samples {
            let kernel = &kernels[phase as usize];
            let s = sample as i64;
            for (slot, &tap) in acc[out..out + TAPS].iter_mut().zip(kernel) {
                *slot += s * tap as i64;
            }

            phase += num;
            let carry = phase / den;
            out += carry as usize;
            phase -= carry * den;
        }

        Cow::Owned(acc.into_iter().map(fixed::requantize_i8).collect())
    }
}

/// Windowed-sinc taps for one phase, scaled by `num / den`.
fn build_kernel(phase: u32, num: u32, den: u32) -> Kernel {
    let mut kernel = [0; TAPS];
    let center = 6.0 + phase as f64 / den as f64;
    let first = ((center - 6.0).floor() as i64).max(0) as usize;
    let last = ((center + 7.0).ceil() as i64).min(TAPS as i64) as usize;
    let gain = num as f64 / den as f64;

    for (k, tap) in kernel.iter_mut().enumerate().take(last).skip(first) {
        let offset = k as f64 - center;
        let x = offset * PI;
        let mut v = gain;
        if !(-1.0e-4..=1.0e-4).contains(&x) {
            v = gain * (x.sin() / x);
        }
        v *= 0.54 + 0.46 * (WINDOW_STEP * offset).cos();
        *tap = fixed::round_f64(v);
    }
    kernel
}

/// Shares one converter per `(source, target)` pair across voices.
#[derive(Debug, Default)]
pub struct ConverterCache {
    converters: HashMap<(u32, u32), Arc<RateConverter>>,
}

impl ConverterCache {
    pub fn new() -> Self {
        ConverterCache { converters: HashMap::new() }
    }

    /// Pre-build a converter from every configured native rate to the output rate.
    pub fn with_config(config: &MixerConfig) -> Result<Self, RateError> {
        let mut cache = ConverterCache::new();
        for &rate in &config.native_rates {
            cache.get(rate, config.output_rate)?;
        }
        Ok(cache)
    }

    pub fn get(&mut self, source_rate: u32, target_rate: u32) -> Result<Arc<RateConverter>, RateError> {
        if let Some(converter) = self.converters.get(&(source_rate, target_rate)) {
            trace!("Reusing converter {source_rate} Hz => {target_rate} Hz");
            return Ok(Arc::clone(converter));
        }
        let converter = Arc::new(RateConverter::new(source_rate, target_rate)?);
        self.converters.insert((source_rate, target_rate), Arc::clone(&converter));
        Ok(converter)
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }
}
