use std::fmt;

#[derive(Debug)]
pub enum SfxError {
    Rate(RateError),
    Decode(DecodeError),
    Config(serde_json::Error),
    Envelope(EnvelopeError),
    InvalidChannel(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateError {
    ZeroRate { source_rate: u32, target_rate: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    TooManyPoles { channel: usize, count: usize },
    /// A moving pole whose end keyframe has no bit in the record's end mask.
    UnencodableEnd { channel: usize, pole: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    UnexpectedEof {
        offset: usize,
        expected: &'static str,
    },
}

impl fmt::Display for SfxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SfxError::Rate(e) => write!(f, "Rate error: {e}"),
            SfxError::Decode(e) => write!(f, "Decode error: {e}"),
            SfxError::Config(e) => write!(f, "Config error: {e}"),
            SfxError::Envelope(e) => write!(f, "Envelope error: {e}"),
            SfxError::InvalidChannel(ch) => write!(f, "Invalid filter channel {ch} (expected 0 or 1)"),
        }
    }
}

impl std::error::Error for SfxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SfxError::Rate(e) => Some(e),
            SfxError::Decode(e) => Some(e),
            SfxError::Config(e) => Some(e),
            SfxError::Envelope(e) => Some(e),
            SfxError::InvalidChannel(_) => None,
        }
    }
}

impl fmt::Display for RateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateError::ZeroRate { source_rate, target_rate } => {
                write!(f, "Sample rates must be non-zero (source {source_rate} Hz, target {target_rate} Hz)")
            }
        }
    }
}

impl std::error::Error for RateError {}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeError::TooManyPoles { channel, count } => {
                write!(f, "Channel {channel} has {count} poles, at most 15 fit a record")
            }
            EnvelopeError::UnencodableEnd { channel, pole } => {
                write!(f, "Pole {pole} on channel {channel} moves but its end keyframe cannot be encoded")
            }
        }
    }
}

impl std::error::Error for EnvelopeError {}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::UnexpectedEof { offset, expected } => {
                write!(f, "Unexpected end of stream at byte {offset}, expected {expected}")
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<RateError> for SfxError {
    fn from(e: RateError) -> Self {
        SfxError::Rate(e)
    }
}

impl From<DecodeError> for SfxError {
    fn from(e: DecodeError) -> Self {
        SfxError::Decode(e)
    }
}

impl From<EnvelopeError> for SfxError {
    fn from(e: EnvelopeError) -> Self {
        SfxError::Envelope(e)
    }
}

impl From<serde_json::Error> for SfxError {
    fn from(e: serde_json::Error) -> Self {
        SfxError::Config(e)
    }
}
