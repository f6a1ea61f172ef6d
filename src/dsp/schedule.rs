//! Scheduling hook for time-varying filter envelopes.
//!
//! When a decoded filter record changes over time, the decoder hands the
//! stream to a [`FilterSchedule`] so the owner can read its own timing data
//! and keep calling `synthesize` each tick until the position reaches 1.0.

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::stream::ParamReader;

/// Notified once per decoded record that varies over its playback.
pub trait FilterSchedule {
    /// Called right after the filter record; may consume trailing bytes.
    fn schedule(&mut self, stream: &mut ParamReader<'_>) -> Result<(), DecodeError>;
}

/// One breakpoint of a [`SegmentSchedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Cumulative time of the breakpoint, `0..=65535` across the whole effect.
    pub duration: u16,
    /// Envelope level at the breakpoint, `0..=65535`.
    pub phase: u16,
}

/// Breakpoint envelope that maps playback progress to a filter position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentSchedule {
    segments: Vec<Segment>,
    active: bool,
}

const FULL_SCALE: f32 = u16::MAX as f32;

impl SegmentSchedule {
    pub fn new() -> Self {
        SegmentSchedule::default()
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        SegmentSchedule { segments, active: true }
    }

    /// Whether a time-varying record has been attached.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Filter position in `[0, 1]` at `progress` (fraction of the effect played).
    pub fn position(&self, progress: f32) -> f32 {
        let progress = progress.clamp(0.0, 1.0);
        let (first, rest) = match self.segments.split_first() {
            Some(split) => split,
            None => return progress,
        };

        let time = progress * FULL_SCALE;
        let mut prev = first;
        if time <= prev.duration as f32 {
            return prev.phase as f32 / FULL_SCALE;
        }
        for seg in rest {
            if time <= seg.duration as f32 {
                let span = seg.duration as f32 - prev.duration as f32;
                let frac = if span > 0.0 { (time - prev.duration as f32) / span } else { 1.0 };
                let level = prev.phase as f32 + frac * (seg.phase as f32 - prev.phase as f32);
                return (level / FULL_SCALE).clamp(0.0, 1.0);
            }
            prev = seg;
        }
        prev.phase as f32 / FULL_SCALE
    }

    /// The owner retires the envelope once playback has run its course.
    pub fn is_finished(&self, progress: f32) -> bool {
        progress >= 1.0
    }
}

impl FilterSchedule for SegmentSchedule {
    fn schedule(&mut self, stream: &mut ParamReader<'_>) -> Result<(), DecodeError> {
        let count = stream.read_u8("segment count")?;
        let mut segments = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let duration = stream.read_u16("segment duration")?;
            let phase = stream.read_u16("segment phase")?;
            segments.push(Segment { duration, phase });
        }
        self.segments = segments;
        self.active = true;
        Ok(())
    }
}
