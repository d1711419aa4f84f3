use std::collections::HashMap;
use std::path::Path;

use super::Phonemizer;
use crate::error::TtsError;
use crate::language::Language;

#[derive(thiserror::Error, Debug)]
pub enum LexiconError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse lexicon {file}: {source}")]
    Json {
        file: String,
        source: serde_json::Error,
    },
}

/// Lexicon files per language, highest priority first.
const LEXICON_FILES: &[(Language, &[&str])] = &[
    (Language::AmericanEnglish, &["us_gold.json", "us_silver.json"]),
    (Language::BritishEnglish, &["gb_gold.json", "gb_silver.json"]),
];

/// Primary phonemizer: the pronunciation dictionaries shipped with Kokoro.
///
/// Entries map a word to its phonemes, either directly (`"hello": "həlˈO"`)
/// or per part of speech, in which case the `DEFAULT` reading is used.
#[derive(Debug, Default)]
pub struct LexiconPhonemizer {
    lexicons: HashMap<Language, HashMap<String, String>>,
}

impl LexiconPhonemizer {
    /// Load every known lexicon file present in `dir`. Missing files are
    /// skipped; a language without any file is left to the fallback.
    pub fn load_dir(dir: &Path) -> Result<Self, LexiconError> {
        let mut phonemizer = Self::default();
        for (language, files) in LEXICON_FILES {
            // Lowest priority first so better sources overwrite.
            for file in files.iter().rev() {
                let path = dir.join(file);
                if !path.exists() {
                    continue;
                }
                let content = std::fs::read_to_string(&path)?;
                let entries = parse_lexicon(&content).map_err(|source| LexiconError::Json {
                    file: path.display().to_string(),
                    source,
                })?;
                log::info!("Loaded {} lexicon entries from {}", entries.len(), path.display());
                phonemizer.extend(*language, entries);
            }
        }
        if phonemizer.lexicons.is_empty() {
            log::warn!(
                "No lexicon found in {}; every word will go through espeak-ng",
                dir.display()
            );
        }
        Ok(phonemizer)
    }

    pub fn extend<I>(&mut self, language: Language, entries: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.lexicons.entry(language).or_default().extend(entries);
    }

    pub fn with_entries<I, K, V>(mut self, language: Language, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.extend(
            language,
            entries.into_iter().map(|(k, v)| (k.into(), v.into())),
        );
        self
    }

    pub fn lookup(&self, word: &str, language: Language) -> Option<&str> {
        let lexicon = self.lexicons.get(&language)?;
        if let Some(p) = lexicon.get(word) {
            return Some(p.as_str());
        }
        let lower = word.to_lowercase();
        if let Some(p) = lexicon.get(&lower) {
            return Some(p.as_str());
        }
        let mut chars = lower.chars();
        let capitalized: String = chars
            .next()
            .map(|first| first.to_uppercase().chain(chars).collect())
            .unwrap_or_default();
        lexicon.get(&capitalized).map(String::as_str)
    }
}

impl Phonemizer for LexiconPhonemizer {
    fn name(&self) -> &str {
        "lexicon"
    }

    fn supports(&self, language: Language) -> bool {
        self.lexicons.get(&language).is_some_and(|l| !l.is_empty())
    }

    fn phonemize(
        &self,
        spans: &[&str],
        language: Language,
    ) -> Result<Vec<Option<String>>, TtsError> {
        Ok(spans
            .iter()
            .map(|span| self.lookup(span, language).map(str::to_string))
            .collect())
    }
}

fn parse_lexicon(content: &str) -> Result<HashMap<String, String>, serde_json::Error> {
    let raw: HashMap<String, serde_json::Value> = serde_json::from_str(content)?;
    Ok(raw
        .into_iter()
        .filter_map(|(word, value)| {
            let phonemes = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Object(mut by_tag) => match by_tag.remove("DEFAULT") {
                    Some(serde_json::Value::String(s)) => s,
                    _ => return None,
                },
                _ => return None,
            };
            Some((word, phonemes))
        })
        .collect())
}
