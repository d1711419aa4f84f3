use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView2};
use ort::execution_providers::CPUExecutionProvider;
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use super::vocab::Vocab;
use crate::voice::VoiceProfile;
use crate::AcousticModel;

/// Maximum number of phoneme tokens per call (before padding).
pub const MAX_PHONEME_LEN: usize = 510;

/// Style vector dimension for Kokoro.
pub const STYLE_DIM: usize = 256;

/// Output sample rate of the Kokoro model.
pub const SAMPLE_RATE: u32 = 24000;

const PREFERRED_ONNX: &str = "kokoro-quant-convinteger.onnx";

#[derive(thiserror::Error, Debug)]
pub enum KokoroError {
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("Invalid config.json: {0}")]
    Config(String),
    #[error("Failed to parse voice file: {0}")]
    VoiceParse(String),
    #[error("No phoneme in {0:?} is in the model vocabulary")]
    NoTokens(String),
    #[error("Voice '{voice}' has {found}-dim style vectors, the model needs {STYLE_DIM}")]
    StyleDim { voice: String, found: usize },
}

/// The Kokoro-82M ONNX session plus what it needs to tokenize phonemes.
pub struct KokoroModel {
    session: Session,
    vocab: Vocab,
    /// "input_ids" or "tokens", depending on the export.
    tokens_input_name: String,
    /// True if the speed input expects int32, false for float32.
    speed_is_int32: bool,
}

impl KokoroModel {
    /// Load the ONNX model from `model_dir`.
    ///
    /// The directory must contain an `.onnx` file (preferably
    /// `kokoro-quant-convinteger.onnx`) and may contain a `config.json`
    /// vocabulary.
    pub fn load(
        model_dir: &Path,
        num_threads: Option<usize>,
        optimized_cache_path: Option<&Path>,
    ) -> Result<Self, KokoroError> {
        let onnx_path = find_onnx_file(model_dir)?;
        log::info!("Loading Kokoro model from {}", onnx_path.display());

        let session = init_session(&onnx_path, num_threads, optimized_cache_path)?;
        let tokens_input_name = detect_tokens_input(&session);
        let speed_is_int32 = detect_speed_type(&session);
        log::info!("Detected: tokens_input='{tokens_input_name}', speed_is_int32={speed_is_int32}");

        Ok(Self {
            session,
            vocab: Vocab::load(model_dir)?,
            tokens_input_name,
            speed_is_int32,
        })
    }

    /// Synthesize one window of phonemes with row `style_idx` of the
    /// voice's style table.
    pub fn infer(
        &mut self,
        phonemes: &str,
        voice: &VoiceProfile,
        speed: f32,
        style_idx: usize,
    ) -> Result<Vec<f32>, KokoroError> {
        let mut tokens = self.vocab.encode(phonemes);
        if tokens.is_empty() {
            return Err(KokoroError::NoTokens(phonemes.to_string()));
        }
        if tokens.len() > MAX_PHONEME_LEN {
            log::warn!(
                "Truncating {} tokens to the model limit of {MAX_PHONEME_LEN}",
                tokens.len()
            );
            tokens.truncate(MAX_PHONEME_LEN);
        }

        let style = voice.embedding.style(style_idx);
        if style.len() != STYLE_DIM {
            return Err(KokoroError::StyleDim {
                voice: voice.id.clone(),
                found: style.len(),
            });
        }
        self.run(&tokens, style, speed)
    }

    fn run(&mut self, tokens: &[i64], style: &[f32], speed: f32) -> Result<Vec<f32>, KokoroError> {
        // [[0, t1..tN, 0]]
        let mut padded = Vec::with_capacity(tokens.len() + 2);
        padded.push(0);
        padded.extend_from_slice(tokens);
        padded.push(0);
        let tokens_arr = Array2::from_shape_vec((1, padded.len()), padded)?;
        let style_view = ArrayView2::from_shape((1, STYLE_DIM), style)?;

        let output = if self.speed_is_int32 {
            let speed_arr = ndarray::arr1(&[speed.round() as i32]);
            let inputs = inputs![
                self.tokens_input_name.as_str() => TensorRef::from_array_view(tokens_arr.view())?,
                "style" => TensorRef::from_array_view(style_view)?,
                "speed" => TensorRef::from_array_view(speed_arr.view())?,
            ];
            self.session.run(inputs)?
        } else {
            let speed_arr = ndarray::arr1(&[speed]);
            let inputs = inputs![
                self.tokens_input_name.as_str() => TensorRef::from_array_view(tokens_arr.view())?,
                "style" => TensorRef::from_array_view(style_view)?,
                "speed" => TensorRef::from_array_view(speed_arr.view())?,
            ];
            self.session.run(inputs)?
        };

        let (_, waveform) = output
            .iter()
            .next()
            .ok_or_else(|| KokoroError::Ort(ort::Error::new("No output from model")))?;
        let waveform = waveform.try_extract_array::<f32>()?;
        Ok(waveform.iter().copied().collect())
    }
}

impl AcousticModel for KokoroModel {
    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn max_phonemes(&self) -> usize {
        MAX_PHONEME_LEN
    }

    fn style_index(&self, utterance: &str) -> usize {
        style_index(&self.vocab, utterance)
    }

    fn synthesize(
        &mut self,
        phonemes: &str,
        voice: &VoiceProfile,
        speed: f32,
        style_idx: usize,
    ) -> Result<Vec<f32>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.infer(phonemes, voice, speed, style_idx)?)
    }
}

/// Kokoro voices hold one style row per utterance length in tokens.
fn style_index(vocab: &Vocab, utterance: &str) -> usize {
    vocab.encode(utterance).len()
}

/// Prefers `kokoro-quant-convinteger.onnx`, then the first `.onnx` file found.
fn find_onnx_file(model_dir: &Path) -> Result<PathBuf, KokoroError> {
    let preferred = model_dir.join(PREFERRED_ONNX);
    if preferred.exists() {
        return Ok(preferred);
    }

    for entry in std::fs::read_dir(model_dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("onnx") {
            log::info!("Using ONNX file: {}", path.display());
            return Ok(path);
        }
    }

    Err(KokoroError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("No .onnx file found in {}", model_dir.display()),
    )))
}

/// Build the ORT session.
///
/// With a cache path, the first load runs Level3 optimization and writes the
/// optimized graph there; later loads read it back with optimization disabled.
fn init_session(
    onnx_path: &Path,
    num_threads: Option<usize>,
    optimized_cache_path: Option<&Path>,
) -> Result<Session, KokoroError> {
    let (load_path, opt_level, write_cache) = match optimized_cache_path {
        Some(cache) if cache.exists() => {
            log::info!("Loading pre-optimized Kokoro graph from {}", cache.display());
            (cache, GraphOptimizationLevel::Disable, None)
        }
        Some(cache) => {
            log::info!(
                "First load: running Level3 optimization, saving graph to {}",
                cache.display()
            );
            (onnx_path, GraphOptimizationLevel::Level3, Some(cache))
        }
        None => (onnx_path, GraphOptimizationLevel::Level3, None),
    };

    let mut builder = Session::builder()?
        .with_optimization_level(opt_level)?
        .with_execution_providers([CPUExecutionProvider::default().build()])?
        .with_parallel_execution(true)?;

    if let Some(cache) = write_cache {
        builder = builder.with_optimized_model_path(cache)?;
    }

    if let Some(threads) = num_threads {
        builder = builder
            .with_intra_threads(threads)?
            .with_inter_threads(threads)?;
    }

    Ok(builder.commit_from_file(load_path)?)
}

fn detect_tokens_input(session: &Session) -> String {
    session
        .inputs()
        .iter()
        .map(|input| input.name())
        .find(|name| *name == "input_ids" || *name == "tokens")
        .unwrap_or("input_ids")
        .to_string()
}

/// Whether the `speed` input is int32. Modern exports use int32.
fn detect_speed_type(session: &Session) -> bool {
    session
        .inputs()
        .iter()
        .find(|input| input.name() == "speed")
        .map(|input| {
            let dtype = format!("{:?}", input.dtype());
            dtype.contains("Int32") || dtype.contains("int32")
        })
        .unwrap_or(true)
}
