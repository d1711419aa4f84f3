//! Response assembly: turning [`AudioBuffer`]s into bytes on the wire.

use std::io::Cursor;

use serde::Deserialize;

use crate::error::TtsError;
use crate::AudioBuffer;

/// Encoding of the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Complete 16-bit PCM WAV file, sent once synthesis has finished.
    #[default]
    Wav,
    /// Headerless signed 16-bit little-endian mono PCM, streamed per segment.
    Pcm,
}

impl OutputFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Wav => "audio/wav",
            OutputFormat::Pcm => "audio/pcm",
        }
    }

    pub fn is_streamed(self) -> bool {
        matches!(self, OutputFormat::Pcm)
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Raw s16le bytes, exactly two per sample.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&to_i16(sample).to_le_bytes());
    }
    bytes
}

/// Encode the whole buffer as a mono 16-bit WAV file in memory.
pub fn encode_wav(audio: &AudioBuffer) -> Result<Vec<u8>, TtsError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let wav_error = |e: hound::Error| TtsError::SynthesisFailure(format!("WAV encoding: {e}"));

    let mut cursor = Cursor::new(Vec::with_capacity(44 + audio.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_error)?;
        let mut samples = writer.get_i16_writer(audio.len() as u32);
        for &sample in &audio.samples {
            samples.write_sample(to_i16(sample));
        }
        samples.flush().map_err(wav_error)?;
        writer.finalize().map_err(wav_error)?;
    }
    Ok(cursor.into_inner())
}
