//! Process-wide configuration.
//!
//! [`ServerArgs`] is what the operator controls (flags or environment
//! variables). It is turned into an immutable [`SynthesisConfig`] once at
//! startup and passed by reference into the gateway and pipeline; no stage
//! reads the environment on its own.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use derive_builder::Builder;
use regex::Regex;

use crate::language::Language;
use crate::synth::{MAX_SPEED, MIN_SPEED};

pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;
pub const DEFAULT_SPLIT_PATTERN: &str = r"\n+";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("LANG_CODE '{0}' is not a supported language")]
    Language(String),
    #[error("SPLIT_PATTERN is not a valid regex: {0}")]
    SplitPattern(#[from] regex::Error),
    #[error("{0}")]
    Invalid(String),
}

/// Immutable synthesis defaults and limits shared by every request.
#[derive(Debug, Clone, Builder)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct SynthesisConfig {
    #[builder(default = "Language::AmericanEnglish")]
    pub language: Language,
    #[builder(setter(into), default = "\"af_heart\".to_string()")]
    pub default_voice: String,
    #[builder(default = "1.0")]
    pub default_speed: f32,
    #[builder(default = "DEFAULT_SAMPLE_RATE")]
    pub sample_rate: u32,
    /// Splits request text into independently synthesized paragraphs.
    #[builder(default = "default_split_pattern()")]
    pub split_pattern: Regex,
    #[builder(default = "20_000")]
    pub max_text_chars: usize,
    #[builder(default = "400")]
    pub max_segment_chars: usize,
    /// Upper bound on the wall time spent synthesizing one request.
    #[builder(default = "Duration::from_secs(120)")]
    pub request_timeout: Duration,
}

impl SynthesisConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(speed) = self.default_speed {
            if !(MIN_SPEED..=MAX_SPEED).contains(&speed) {
                return Err(format!(
                    "default speed {speed} is outside {MIN_SPEED}..={MAX_SPEED}"
                ));
            }
        }
        if self.sample_rate == Some(0) {
            return Err("sample rate must be positive".to_string());
        }
        if self.max_segment_chars == Some(0) {
            return Err("max segment length must be positive".to_string());
        }
        Ok(())
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            language: Language::AmericanEnglish,
            default_voice: "af_heart".to_string(),
            default_speed: 1.0,
            sample_rate: DEFAULT_SAMPLE_RATE,
            split_pattern: default_split_pattern(),
            max_text_chars: 20_000,
            max_segment_chars: 400,
            request_timeout: Duration::from_secs(120),
        }
    }
}

fn default_split_pattern() -> Regex {
    Regex::new(DEFAULT_SPLIT_PATTERN).expect("default split pattern is valid")
}

/// Command line and environment surface of the server binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "kokoro-tts-api")]
#[command(version, about = "Kokoro text-to-speech HTTP service", long_about = None)]
pub struct ServerArgs {
    /// Directory holding the Kokoro ONNX model, voices-v1.0.bin and optional lexicons
    #[arg(long, env = "MODEL_DIR", default_value = "models/kokoro")]
    pub model_dir: PathBuf,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Default language: a Kokoro code ('a' = American English) or an espeak name
    #[arg(long, env = "LANG_CODE", default_value = "a")]
    pub lang_code: String,

    #[arg(long, env = "DEFAULT_VOICE", default_value = "af_heart")]
    pub default_voice: String,

    #[arg(long, env = "DEFAULT_SPEED", default_value_t = 1.0)]
    pub default_speed: f32,

    /// Regex separating independently synthesized paragraphs
    #[arg(long, env = "SPLIT_PATTERN", default_value = DEFAULT_SPLIT_PATTERN)]
    pub split_pattern: String,

    #[arg(long, env = "SAMPLE_RATE", default_value_t = DEFAULT_SAMPLE_RATE)]
    pub sample_rate: u32,

    #[arg(long, env = "MAX_TEXT_CHARS", default_value_t = 20_000)]
    pub max_text_chars: usize,

    #[arg(long, env = "MAX_SEGMENT_CHARS", default_value_t = 400)]
    pub max_segment_chars: usize,

    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 120)]
    pub request_timeout_secs: u64,

    /// espeak-ng binary; defaults to `espeak-ng` on PATH
    #[arg(long, env = "ESPEAK_BIN")]
    pub espeak_bin: Option<PathBuf>,

    /// espeak-ng data directory, for bundled installs
    #[arg(long, env = "ESPEAK_DATA_PATH")]
    pub espeak_data: Option<PathBuf>,

    /// ONNX runtime intra/inter op threads (runtime default when unset)
    #[arg(long, env = "NUM_THREADS")]
    pub num_threads: Option<usize>,

    /// Where to cache the optimized ONNX graph between restarts
    #[arg(long, env = "OPTIMIZED_MODEL_CACHE")]
    pub optimized_model_cache: Option<PathBuf>,
}

impl ServerArgs {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn synthesis_config(&self) -> Result<SynthesisConfig, ConfigError> {
        let language: Language = self
            .lang_code
            .parse()
            .map_err(|_| ConfigError::Language(self.lang_code.clone()))?;
        let split_pattern = Regex::new(&self.split_pattern)?;

        SynthesisConfigBuilder::default()
            .language(language)
            .default_voice(self.default_voice.clone())
            .default_speed(self.default_speed)
            .sample_rate(self.sample_rate)
            .split_pattern(split_pattern)
            .max_text_chars(self.max_text_chars)
            .max_segment_chars(self.max_segment_chars)
            .request_timeout(Duration::from_secs(self.request_timeout_secs))
            .build()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}
