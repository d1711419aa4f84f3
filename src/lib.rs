//! # kokoro-tts-api
//!
//! An HTTP text-to-speech service built on the Kokoro engine.
//!
//! A request flows through five stages:
//!
//! - [`text`]: normalize and segment the input text
//! - [`phonemizer`]: resolve phonemes with the Kokoro lexicon, falling back
//!   to espeak-ng for words it does not know
//! - [`voice`]: pick (or blend) the requested voice
//! - [`synth`]: run the acoustic model over model-sized phoneme windows
//! - [`audio`]: encode WAV or stream raw PCM
//!
//! [`server`] exposes the pipeline over HTTP; [`pipeline`] ties the stages
//! together per request.
//!
//! ## Features
//!
//! - `kokoro` (default): the ONNX-backed Kokoro model in [`engines::kokoro`]
//!
//! Without `kokoro` the crate still builds, and any [`AcousticModel`]
//! implementation can drive the pipeline.

pub mod audio;
pub mod config;
pub mod engines;
pub mod error;
pub mod language;
pub mod phonemizer;
pub mod pipeline;
pub mod server;
pub mod synth;
pub mod text;
pub mod voice;

pub use config::{ServerArgs, SynthesisConfig, SynthesisConfigBuilder};
pub use error::TtsError;
pub use language::Language;
pub use pipeline::{SynthesisRequest, TtsPipeline};

use voice::VoiceProfile;

/// Synthesized mono audio.
///
/// Contains raw f32 samples in [-1, 1] and their sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of the audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Append `other` directly after this buffer's last sample.
    pub fn append(&mut self, other: AudioBuffer) {
        debug_assert_eq!(self.sample_rate, other.sample_rate);
        if self.samples.is_empty() {
            self.samples = other.samples;
        } else {
            self.samples.extend_from_slice(&other.samples);
        }
    }
}

/// The neural model behind the synthesis engine.
///
/// Treated as a pure function of its inputs. Implementations may keep
/// internal scratch state, hence `&mut self`; the engine serializes calls.
pub trait AcousticModel: Send {
    /// Rate of the samples returned by [`AcousticModel::synthesize`].
    fn sample_rate(&self) -> u32;

    /// Longest phoneme string (in characters) accepted per call.
    fn max_phonemes(&self) -> usize;

    /// Style row for a whole utterance. Computed once per segment so every
    /// window of a long segment keeps the same prosody.
    fn style_index(&self, utterance: &str) -> usize {
        utterance.chars().count()
    }

    /// Turn one window of phonemes into a waveform, voiced with row
    /// `style_idx` of the voice's style table.
    fn synthesize(
        &mut self,
        phonemes: &str,
        voice: &VoiceProfile,
        speed: f32,
        style_idx: usize,
    ) -> Result<Vec<f32>, Box<dyn std::error::Error + Send + Sync>>;
}
