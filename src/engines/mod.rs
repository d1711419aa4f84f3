//! Acoustic model backends.
//!
//! Enable via Cargo features:
//! - `kokoro` - Kokoro-82M (ONNX)

#[cfg(feature = "kokoro")]
pub mod kokoro;
