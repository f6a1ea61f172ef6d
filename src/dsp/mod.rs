//! DSP core: fixed-point resampling and filter synthesis.
//!
//! Everything here is integer- or single-precision exact so converted
//! sound effects match the packed game data sample for sample.

pub mod filter;
pub mod fixed;
pub mod resampler;
pub mod schedule;
#[cfg(feature = "wav")]
pub mod wav;
