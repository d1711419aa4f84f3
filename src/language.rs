use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::TtsError;

/// Languages the Kokoro voice set covers.
///
/// Each language has a single-letter Kokoro code, which is also the first
/// character of every voice name in that language (`af_heart`, `bf_emma`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    AmericanEnglish,
    BritishEnglish,
    Spanish,
    French,
    Hindi,
    Italian,
    Japanese,
    BrazilianPortuguese,
    Mandarin,
}

impl Language {
    pub const ALL: [Language; 9] = [
        Language::AmericanEnglish,
        Language::BritishEnglish,
        Language::Spanish,
        Language::French,
        Language::Hindi,
        Language::Italian,
        Language::Japanese,
        Language::BrazilianPortuguese,
        Language::Mandarin,
    ];

    /// Kokoro language code, e.g. `'a'` for American English.
    pub fn code(self) -> char {
        match self {
            Language::AmericanEnglish => 'a',
            Language::BritishEnglish => 'b',
            Language::Spanish => 'e',
            Language::French => 'f',
            Language::Hindi => 'h',
            Language::Italian => 'i',
            Language::Japanese => 'j',
            Language::BrazilianPortuguese => 'p',
            Language::Mandarin => 'z',
        }
    }

    /// espeak-ng voice used when this language falls back to espeak.
    pub fn espeak_code(self) -> &'static str {
        match self {
            Language::AmericanEnglish => "en-us",
            Language::BritishEnglish => "en-gb",
            Language::Spanish => "es",
            Language::French => "fr",
            Language::Hindi => "hi",
            Language::Italian => "it",
            Language::Japanese => "ja",
            Language::BrazilianPortuguese => "pt-br",
            Language::Mandarin => "cmn",
        }
    }

    pub fn is_english(self) -> bool {
        matches!(self, Language::AmericanEnglish | Language::BritishEnglish)
    }

    pub fn from_code(code: char) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.code() == code)
    }

    /// Language encoded in a voice name prefix (`af_heart` -> American English).
    pub fn from_voice_name(voice: &str) -> Option<Self> {
        voice.chars().next().and_then(Self::from_code)
    }
}

impl FromStr for Language {
    type Err = TtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        let mut chars = normalized.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Self::from_code(c).ok_or_else(|| TtsError::UnsupportedLanguage(s.to_string()));
        }
        let lang = match normalized.as_str() {
            "en-us" | "en" => Language::AmericanEnglish,
            "en-gb" => Language::BritishEnglish,
            "es" => Language::Spanish,
            "fr" | "fr-fr" => Language::French,
            "hi" => Language::Hindi,
            "it" => Language::Italian,
            "ja" => Language::Japanese,
            "pt-br" | "pt" => Language::BrazilianPortuguese,
            "zh" | "cmn" => Language::Mandarin,
            _ => return Err(TtsError::UnsupportedLanguage(s.to_string())),
        };
        Ok(lang)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl Serialize for Language {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
