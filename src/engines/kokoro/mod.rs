//! Kokoro-82M acoustic model (ONNX).
//!
//! # Model Directory Layout
//!
//! ```text
//! models/kokoro/
//! ├── kokoro-quant-convinteger.onnx   # 8-bit quantized model (any .onnx works)
//! ├── voices-v1.0.bin                 # Voice archive (.npz)
//! ├── config.json                     # Optional vocabulary
//! └── us_gold.json ...                # Optional lexicons, see `phonemizer::lexicon`
//! ```
//!
//! Download links:
//! - Model: <https://github.com/taylorchu/kokoro-onnx/releases/tag/v0.2.0>
//! - Voices: <https://github.com/thewh1teagle/kokoro-onnx/releases/tag/model-files-v1.0>
//!
//! # Voice Naming Convention
//!
//! Voices follow `{language}{gender}_{name}`; the first letter is the
//! language code:
//!
//! | Prefix | Language |
//! |---|---|
//! | `af_`, `am_` | American English |
//! | `bf_`, `bm_` | British English |
//! | `ef_`, `em_` | Spanish |
//! | `ff_` | French |
//! | `hf_`, `hm_` | Hindi |
//! | `if_`, `im_` | Italian |
//! | `jf_`, `jm_` | Japanese |
//! | `pf_`, `pm_` | Brazilian Portuguese |
//! | `zf_`, `zm_` | Mandarin Chinese |

pub mod engine;
pub mod model;
pub mod vocab;
pub mod voices;

pub use engine::{KokoroEngine, KokoroModelParams};
pub use model::{KokoroError, KokoroModel};
