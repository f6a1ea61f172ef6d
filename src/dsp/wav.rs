//! WAV export for converted 8-bit PCM (feature `wav`).

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

/// Encode mono signed 8-bit samples as an 8-bit PCM WAV file.
pub fn encode_pcm8_wav(samples: &[i8], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 8,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len()));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}
