use crate::language::Language;

/// Failures a synthesis request can end in.
///
/// Each pipeline stage fails closed with one of these kinds; the gateway maps
/// them onto HTTP status codes.
#[derive(thiserror::Error, Debug)]
pub enum TtsError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("Language '{0}' is not supported")]
    UnsupportedLanguage(String),
    #[error("Voice '{0}' not found. GET /voices lists the available voices.")]
    VoiceNotFound(String),
    #[error("Voice '{voice}' cannot speak language '{language}'")]
    VoiceLanguageMismatch { voice: String, language: Language },
    #[error("Synthesis failed: {0}")]
    SynthesisFailure(String),
    #[error("Synthesis exceeded the request time limit")]
    TimedOut,
}

impl TtsError {
    /// Stable machine-readable name used in JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            TtsError::InvalidInput(_) => "invalid_input",
            TtsError::UnsupportedLanguage(_) => "unsupported_language",
            TtsError::VoiceNotFound(_) => "voice_not_found",
            TtsError::VoiceLanguageMismatch { .. } => "voice_language_mismatch",
            TtsError::SynthesisFailure(_) => "synthesis_failure",
            TtsError::TimedOut => "timed_out",
        }
    }
}
