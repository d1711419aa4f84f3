//! The synthesis engine: the invocation contract around an [`AcousticModel`].

use std::sync::Mutex;
use std::time::Instant;

use crate::error::TtsError;
use crate::phonemizer::PhonemeSequence;
use crate::voice::VoiceProfile;
use crate::{AcousticModel, AudioBuffer};

pub const MIN_SPEED: f32 = 0.5;
pub const MAX_SPEED: f32 = 2.0;

/// Phoneme characters that make good window boundaries.
const WINDOW_BREAKS: &[char] = &[';', ':', ',', '.', '!', '?', '—', '…'];

/// Runs the model over phoneme windows and joins the results.
///
/// The model handle is shared by every request and guarded by a mutex, so
/// concurrent requests take turns instead of sharing inference state.
pub struct Synthesizer {
    model: Mutex<Box<dyn AcousticModel>>,
    sample_rate: u32,
    max_phonemes: usize,
}

impl Synthesizer {
    pub fn new(model: Box<dyn AcousticModel>) -> Self {
        let sample_rate = model.sample_rate();
        let max_phonemes = model.max_phonemes().max(1);
        Self {
            model: Mutex::new(model),
            sample_rate,
            max_phonemes,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// False once a model call has panicked while holding the lock.
    pub fn is_ready(&self) -> bool {
        !self.model.is_poisoned()
    }

    pub fn synthesize(
        &self,
        phonemes: &PhonemeSequence,
        voice: &VoiceProfile,
        speed: f32,
        deadline: Option<Instant>,
    ) -> Result<AudioBuffer, TtsError> {
        validate_speed(speed)?;
        if phonemes.is_empty() {
            return Err(TtsError::InvalidInput("no phonemes to synthesize".to_string()));
        }

        let rendered = phonemes.render();
        let windows = split_windows(&rendered, self.max_phonemes);
        if windows.len() > 1 {
            log::debug!(
                "Phoneme sequence exceeded limit ({} > {}), split into {} windows",
                rendered.chars().count(),
                self.max_phonemes,
                windows.len()
            );
        }

        let crossfade = (self.sample_rate / 100) as usize;
        let mut combined: Vec<f32> = Vec::with_capacity(rendered.len() * 300);
        let mut style_idx = None;

        for window in &windows {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(TtsError::TimedOut);
            }

            let audio = {
                let mut model = self.model.lock().map_err(|_| {
                    TtsError::SynthesisFailure("model is unavailable after a previous panic".into())
                })?;
                let style_idx = *style_idx.get_or_insert_with(|| model.style_index(&rendered));
                model
                    .synthesize(window, voice, speed, style_idx)
                    .map_err(|e| TtsError::SynthesisFailure(e.to_string()))?
            };

            if audio.is_empty() {
                return Err(TtsError::SynthesisFailure(format!(
                    "model returned no audio for {window:?}"
                )));
            }
            if audio.iter().any(|s| !s.is_finite()) {
                return Err(TtsError::SynthesisFailure(
                    "model returned non-finite samples".to_string(),
                ));
            }

            append_with_crossfade(&mut combined, &audio, crossfade);
        }

        Ok(AudioBuffer::new(combined, self.sample_rate))
    }
}

pub fn validate_speed(speed: f32) -> Result<(), TtsError> {
    if speed.is_finite() && (MIN_SPEED..=MAX_SPEED).contains(&speed) {
        Ok(())
    } else {
        Err(TtsError::InvalidInput(format!(
            "speed must be between {MIN_SPEED} and {MAX_SPEED}, got {speed}"
        )))
    }
}

/// Split a phoneme string into windows of at most `max_len` characters,
/// preferring to cut after punctuation, then at a space.
fn split_windows(phonemes: &str, max_len: usize) -> Vec<String> {
    let chars: Vec<char> = phonemes.chars().collect();
    let mut windows = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + max_len).min(chars.len());
        let split = if end == chars.len() {
            end
        } else {
            let slice = &chars[start..end];
            slice
                .iter()
                .rposition(|c| WINDOW_BREAKS.contains(c))
                .or_else(|| slice.iter().rposition(|&c| c == ' '))
                .map(|i| start + i + 1)
                .filter(|&s| s > start)
                .unwrap_or(end)
        };

        let window: String = chars[start..split].iter().collect();
        let window = window.trim();
        if !window.is_empty() {
            windows.push(window.to_string());
        }
        start = split;
    }
    windows
}

/// Join `src` onto `dst` with a linear crossfade of up to `crossfade_samples`.
fn append_with_crossfade(dst: &mut Vec<f32>, src: &[f32], crossfade_samples: usize) {
    let overlap = crossfade_samples.min(dst.len()).min(src.len());
    if overlap == 0 {
        dst.extend_from_slice(src);
        return;
    }

    let dst_start = dst.len() - overlap;
    for i in 0..overlap {
        let t = (i + 1) as f32 / (overlap as f32 + 1.0);
        dst[dst_start + i] = dst[dst_start + i] * (1.0 - t) + src[i] * t;
    }
    dst.extend_from_slice(&src[overlap..]);
}
