use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::model::{KokoroError, STYLE_DIM};
use crate::voice::{VoiceEmbedding, VoiceProfile, VoiceSet};

const NPY_MAGIC: &[u8] = b"\x93NUMPY";

/// Load every voice in a `.npz` archive.
///
/// Each entry is a `.npy` array named after its voice (`af_heart.npy`). A
/// voice's languages follow its name prefix.
pub fn load_voices(path: &Path) -> Result<VoiceSet, KokoroError> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| KokoroError::VoiceParse(format!("failed to open archive: {e}")))?;

    let mut voices = VoiceSet::default();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| KokoroError::VoiceParse(format!("failed to read entry {i}: {e}")))?;
        if entry.is_dir() {
            continue;
        }

        let name = entry.name().to_string();
        let id = name.trim_end_matches(".npy");
        if id.is_empty() {
            continue;
        }

        let mut data = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut data)
            .map_err(|e| KokoroError::VoiceParse(format!("failed to read {name}: {e}")))?;

        let embedding = VoiceEmbedding::new(STYLE_DIM, parse_npy(&data, &name)?)
            .ok_or_else(|| KokoroError::VoiceParse(format!("{name}: no style vectors")))?;
        voices.insert(VoiceProfile::from_name(id, embedding));
    }

    log::info!("Loaded {} voices from {}", voices.len(), path.display());
    Ok(voices)
}

/// Parse a little-endian float32 `.npy` array of shape `[N, 256]` (or
/// `[N, 1, 256]`) into row-major floats.
fn parse_npy(data: &[u8], name: &str) -> Result<Vec<f32>, KokoroError> {
    let bad = |msg: String| KokoroError::VoiceParse(format!("{name}: {msg}"));

    if data.len() < 10 || !data.starts_with(NPY_MAGIC) {
        return Err(bad("not a numpy array".to_string()));
    }

    // v1 stores the header length as u16 at [8..10]; v2+ as u32 at [8..12].
    let major = data[6];
    let (header_start, header_len) = if major == 1 {
        (10, u16::from_le_bytes([data[8], data[9]]) as usize)
    } else {
        let len = data
            .get(8..12)
            .ok_or_else(|| bad("header truncated".to_string()))?;
        (12, u32::from_le_bytes([len[0], len[1], len[2], len[3]]) as usize)
    };
    let body_start = header_start + header_len;
    let header = data
        .get(header_start..body_start)
        .ok_or_else(|| bad(format!("header truncated (need {body_start} bytes)")))?;

    let header = String::from_utf8_lossy(header);
    if !header.contains("<f4") {
        return Err(bad(format!("expected little-endian float32, header is {header}")));
    }
    if header.contains("'fortran_order': True") {
        return Err(bad("fortran-ordered arrays are not supported".to_string()));
    }

    let body = &data[body_start..];
    if body.len() % 4 != 0 {
        return Err(bad(format!("{} data bytes is not a multiple of 4", body.len())));
    }
    let floats: Vec<f32> = body
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    if floats.len() % STYLE_DIM != 0 {
        return Err(bad(format!(
            "{} floats is not a multiple of the style dimension {STYLE_DIM}",
            floats.len()
        )));
    }
    Ok(floats)
}
