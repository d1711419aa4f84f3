use std::path::{Path, PathBuf};

use super::model::{KokoroError, KokoroModel};
use super::voices::load_voices;
use crate::voice::VoiceSet;

/// File name of the voice archive inside the model directory.
pub const VOICES_FILE: &str = "voices-v1.0.bin";

/// Parameters for loading the Kokoro model.
#[derive(Debug, Clone, Default)]
pub struct KokoroModelParams {
    /// Number of CPU threads to use for inference.
    /// `None` uses the ORT default (typically all available cores).
    pub num_threads: Option<usize>,
    /// Where to cache the Level3-optimized ONNX graph.
    ///
    /// The first load writes it; later loads skip the 5-10 s optimization.
    /// Must be writable.
    pub optimized_model_cache_path: Option<PathBuf>,
}

/// A loaded Kokoro model directory: the ONNX model and its voices.
///
/// ```rust,no_run
/// use kokoro_tts_api::engines::kokoro::{KokoroEngine, KokoroModelParams};
/// use std::path::Path;
///
/// let engine = KokoroEngine::load(Path::new("models/kokoro"), KokoroModelParams::default())?;
/// println!("{} voices", engine.voices().len());
/// let (model, voices) = engine.into_parts();
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct KokoroEngine {
    model: KokoroModel,
    voices: VoiceSet,
}

impl KokoroEngine {
    /// Load the voices and the model from `model_dir`. Blocking.
    pub fn load(model_dir: &Path, params: KokoroModelParams) -> Result<Self, KokoroError> {
        let voices_path = model_dir.join(VOICES_FILE);
        if !voices_path.exists() {
            return Err(KokoroError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!(
                    "Voice file not found at {}. Download it from the Kokoro model repository.",
                    voices_path.display()
                ),
            )));
        }
        let voices = load_voices(&voices_path)?;
        if voices.is_empty() {
            return Err(KokoroError::VoiceParse(format!(
                "{} contains no voices",
                voices_path.display()
            )));
        }

        let model = KokoroModel::load(
            model_dir,
            params.num_threads,
            params.optimized_model_cache_path.as_deref(),
        )?;
        Ok(Self { model, voices })
    }

    pub fn voices(&self) -> &VoiceSet {
        &self.voices
    }

    pub fn into_parts(self) -> (KokoroModel, VoiceSet) {
        (self.model, self.voices)
    }
}
