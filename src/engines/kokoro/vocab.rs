use std::collections::HashMap;
use std::path::Path;

use super::model::KokoroError;

/// Kokoro-82M token table as runs of consecutive ids: `(first_id, symbols)`.
///
/// Used when the model directory has no `config.json`.
const BUILTIN_RUNS: &[(i64, &str)] = &[
    (1, ";:,.!?"),
    (9, "—…\"()\u{201c}\u{201d} \u{0303}ʣʥʦʨᵝꭧAI"),
    (31, "O"),
    (33, "Q"),
    (35, "ST"),
    (39, "W"),
    (41, "Yᵊabcdef"),
    (50, "hijklmnopqrstuvwxyzɑɐɒæ"),
    (75, "βɔɕç"),
    (80, "ɖðʤə"),
    (85, "ɚɛɜ"),
    (90, "ɟ"),
    (92, "ɡ"),
    (99, "ɥ"),
    (101, "ɨɪʝ"),
    (110, "ɯɰŋɳɲɴø"),
    (118, "ɸθœ"),
    (123, "ɹ"),
    (125, "ɾɻ"),
    (128, "ʁɽʂʃʈʧ"),
    (135, "ʊʋ"),
    (138, "ʌɣɤ"),
    (142, "χʎ"),
    (147, "ʒʔ"),
    (156, "ˈˌː"),
    (162, "ʰ"),
    (164, "ʲ"),
    (169, "↓"),
    (171, "→↗↘"),
    (177, "ᵻ"),
];

/// Phoneme symbol to model token id.
#[derive(Debug, Clone)]
pub struct Vocab {
    ids: HashMap<char, i64>,
}

impl Vocab {
    pub fn builtin() -> Self {
        let ids = BUILTIN_RUNS
            .iter()
            .flat_map(|&(first, symbols)| {
                symbols
                    .chars()
                    .enumerate()
                    .map(move |(offset, ch)| (ch, first + offset as i64))
            })
            .collect();
        Self { ids }
    }

    /// Read the `"vocab"` object of a Kokoro `config.json`.
    pub fn from_config(config_path: &Path) -> Result<Self, KokoroError> {
        let content = std::fs::read_to_string(config_path)?;
        let json: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| KokoroError::Config(format!("failed to parse JSON: {e}")))?;

        let table = json
            .get("vocab")
            .and_then(|v| v.as_object())
            .ok_or_else(|| KokoroError::Config("missing 'vocab' object".to_string()))?;

        let mut ids = HashMap::with_capacity(table.len());
        for (symbol, id) in table {
            let mut chars = symbol.chars();
            let (Some(ch), None) = (chars.next(), chars.next()) else {
                return Err(KokoroError::Config(format!(
                    "vocab key {symbol:?} is not a single character"
                )));
            };
            let id = id
                .as_i64()
                .ok_or_else(|| KokoroError::Config(format!("non-integer id for {symbol:?}")))?;
            ids.insert(ch, id);
        }
        Ok(Self { ids })
    }

    /// `config.json` from `model_dir` when present, the built-in table otherwise.
    pub fn load(model_dir: &Path) -> Result<Self, KokoroError> {
        let config_path = model_dir.join("config.json");
        if config_path.exists() {
            log::info!("Loading vocab from {}", config_path.display());
            Self::from_config(&config_path)
        } else {
            log::warn!("config.json not found, using built-in vocab");
            Ok(Self::builtin())
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn id(&self, symbol: char) -> Option<i64> {
        self.ids.get(&symbol).copied()
    }

    /// Token ids for `phonemes`. Symbols outside the table are dropped.
    pub fn encode(&self, phonemes: &str) -> Vec<i64> {
        let mut dropped = 0usize;
        let ids = phonemes
            .chars()
            .filter_map(|ch| {
                let id = self.id(ch);
                dropped += usize::from(id.is_none());
                id
            })
            .collect();
        if dropped > 0 {
            log::debug!("Dropped {dropped} symbol(s) missing from the vocab");
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_ids_match_the_published_table() {
        let vocab = Vocab::builtin();
        assert_eq!(vocab.len(), 114);
        assert_eq!(vocab.id(';'), Some(1));
        assert_eq!(vocab.id(' '), Some(16));
        assert_eq!(vocab.id('A'), Some(24));
        assert_eq!(vocab.id('a'), Some(43));
        assert_eq!(vocab.id('h'), Some(50));
        assert_eq!(vocab.id('ɹ'), Some(123));
        assert_eq!(vocab.id('ˈ'), Some(156));
        assert_eq!(vocab.id('ᵻ'), Some(177));
        assert_eq!(vocab.id('g'), None);
    }

    #[test]
    fn encode_drops_unknown_symbols() {
        let vocab = Vocab::builtin();
        assert_eq!(vocab.encode("hə§"), vec![50, 83]);
    }

    #[test]
    fn reads_config_json() {
        let dir = std::env::temp_dir().join(format!("kokoro-vocab-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, r#"{"vocab": {"a": 1, "ə": 2}}"#).unwrap();

        let vocab = Vocab::load(&dir).unwrap();
        assert_eq!(vocab.len(), 2);
        assert_eq!(vocab.encode("aə"), vec![1, 2]);

        std::fs::write(&path, r#"{"vocab": {"ab": 1}}"#).unwrap();
        assert!(matches!(
            Vocab::from_config(&path),
            Err(KokoroError::Config(_))
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
