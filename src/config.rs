//! Mixer-facing configuration.
//!
//! Loaded from the same JSON the asset tools emit, e.g.
//! `{"outputRate": 22050, "nativeRates": [11025, 22050]}`.

use serde::{Deserialize, Serialize};

use crate::error::SfxError;

/// Output rate of the external mixer (Hz).
pub const DEFAULT_OUTPUT_RATE: u32 = 22050;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixerConfig {
    /// Rate every voice is converted to before mixing.
    #[serde(default = "default_output_rate")]
    pub output_rate: u32,
    /// Native rates of the loaded sound effects; a converter is pre-built for each.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub native_rates: Vec<u32>,
}

fn default_output_rate() -> u32 {
    DEFAULT_OUTPUT_RATE
}

impl Default for MixerConfig {
    fn default() -> Self {
        MixerConfig {
            output_rate: DEFAULT_OUTPUT_RATE,
            native_rates: Vec::new(),
        }
    }
}

impl MixerConfig {
    pub fn from_json(json: &str) -> Result<Self, SfxError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, SfxError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
