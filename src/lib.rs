pub mod config;
pub mod dsp;
pub mod error;
pub mod stream;

use crate::dsp::filter::{Channel, Coefficients, FilterEnvelope};
use crate::dsp::resampler::RateConverter;
use crate::dsp::schedule::SegmentSchedule;
use crate::error::SfxError;
use crate::stream::ParamReader;
use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the sfx_dsp version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// Resample a mono 8-bit buffer from `source_rate` to `target_rate`.
pub fn resample(source_rate: u32, target_rate: u32, samples: &[i8]) -> Result<Vec<i8>, SfxError> {
    let converter = RateConverter::new(source_rate, target_rate)?;
    Ok(converter.convert(samples).into_owned())
}

/// Decode one filter record and synthesize `channel` at envelope position `t`.
pub fn synthesize_record(record: &[u8], channel: u8, t: f32) -> Result<Coefficients, SfxError> {
    let channel = Channel::from_index(channel)?;
    let mut reader = ParamReader::new(record);
    let mut schedule = SegmentSchedule::new();
    let envelope = FilterEnvelope::decode(&mut reader, &mut schedule)?;
    Ok(envelope.synthesize(channel, t))
}

/// WASM-exposed: resample mono signed 8-bit PCM.
#[wasm_bindgen]
pub fn resample_pcm8(source_rate: u32, target_rate: u32, samples: &[i8]) -> Result<Vec<i8>, JsValue> {
    resample(source_rate, target_rate, samples).map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: filter coefficients for one record as `{ fixed, gain }`.
#[wasm_bindgen]
pub fn filter_coefficients(record: &[u8], channel: u8, t: f32) -> Result<JsValue, JsValue> {
    let coefficients = synthesize_record(record, channel, t).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    serde_wasm_bindgen::to_value(&coefficients).map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: resample and wrap the result in an 8-bit WAV file.
#[cfg(feature = "wav")]
#[wasm_bindgen]
pub fn resample_pcm8_wav(source_rate: u32, target_rate: u32, samples: &[i8]) -> Result<Vec<u8>, JsValue> {
    let pcm = resample(source_rate, target_rate, samples).map_err(|e| JsValue::from_str(&format!("{e}")))?;
    dsp::wav::encode_pcm8_wav(&pcm, target_rate).map_err(|e| JsValue::from_str(&format!("{e}")))
}
