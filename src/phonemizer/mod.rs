//! Text to phoneme conversion.
//!
//! Two phonemizers cooperate through [`PhonemizerRouter`]: the primary one
//! (the Kokoro pronunciation lexicon) resolves the words it knows, and the
//! fallback one (espeak-ng) is asked only about the runs of words the primary
//! left unresolved. Each fallback result is spliced back at the position of
//! the run it came from.

pub mod espeak;
pub mod lexicon;

use std::fmt;

use crate::error::TtsError;
use crate::language::Language;

pub use espeak::{EspeakConfig, EspeakError, EspeakPhonemizer};
pub use lexicon::{LexiconError, LexiconPhonemizer};

/// A text-to-phoneme converter.
pub trait Phonemizer: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this phonemizer can be asked about `language` at all.
    fn supports(&self, language: Language) -> bool;

    /// Transcribe each span. The result has one entry per input span, in
    /// order; `None` marks a span this phonemizer cannot transcribe.
    fn phonemize(
        &self,
        spans: &[&str],
        language: Language,
    ) -> Result<Vec<Option<String>>, TtsError>;
}

/// Which phonemizer produced a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhonemeSource {
    Primary,
    Fallback,
}

/// Outcome of resolving one unit of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Primary(String),
    Fallback(String),
    Unresolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    Word,
    Punctuation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhonemeSpan {
    /// Source text the phonemes stand for (one or more words, or one mark).
    pub text: String,
    pub phonemes: String,
    pub source: PhonemeSource,
    pub kind: SpanKind,
}

/// Phonemes for one normalized segment, in the order of the input text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhonemeSequence {
    spans: Vec<PhonemeSpan>,
}

impl PhonemeSequence {
    pub fn spans(&self) -> &[PhonemeSpan] {
        &self.spans
    }

    pub fn is_empty(&self) -> bool {
        !self.spans.iter().any(|s| s.kind == SpanKind::Word)
    }

    /// Phoneme string handed to the model: words separated by spaces,
    /// punctuation attached to the preceding word.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for span in &self.spans {
            if span.kind == SpanKind::Word && !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&span.phonemes);
        }
        out
    }

    pub fn fallback_spans(&self) -> impl Iterator<Item = &PhonemeSpan> {
        self.spans
            .iter()
            .filter(|s| s.source == PhonemeSource::Fallback)
    }
}

impl fmt::Display for PhonemeSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Punct(char),
}

/// Split a segment into words and boundary punctuation. Separators between
/// digits (`2.0`, `1,000`) stay inside the word.
fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for (idx, ch) in text.char_indices() {
        if is_boundary_punctuation(ch)
            && !is_numeric_connector_between_digits(text, idx, ch.len_utf8(), ch)
        {
            flush_word(&mut tokens, &mut current);
            tokens.push(Token::Punct(ch));
            continue;
        }
        if ch.is_whitespace() {
            flush_word(&mut tokens, &mut current);
            continue;
        }
        current.push(ch);
    }
    flush_word(&mut tokens, &mut current);
    tokens
}

fn flush_word(tokens: &mut Vec<Token>, current: &mut String) {
    if !current.is_empty() {
        tokens.push(Token::Word(std::mem::take(current)));
    }
}

fn is_boundary_punctuation(ch: char) -> bool {
    matches!(
        ch,
        '.' | '!' | '?' | ',' | ';' | ':' | '—' | '…' | '"' | '(' | ')' | '\u{201c}' | '\u{201d}'
    )
}

fn is_numeric_connector_between_digits(text: &str, idx: usize, ch_len: usize, ch: char) -> bool {
    if !matches!(ch, '.' | ',') {
        return false;
    }
    let prev = text[..idx].chars().next_back();
    let next = text[idx + ch_len..].chars().next();
    matches!(
        (prev, next),
        (Some(left), Some(right)) if left.is_ascii_digit() && right.is_ascii_digit()
    )
}

/// A word, a run of unresolved words, or a punctuation mark.
struct Unit {
    text: String,
    kind: SpanKind,
    resolution: Resolution,
}

/// Two-stage phoneme resolution: primary first, fallback for the gaps.
pub struct PhonemizerRouter {
    primary: Box<dyn Phonemizer>,
    fallback: Box<dyn Phonemizer>,
}

impl PhonemizerRouter {
    pub fn new(primary: Box<dyn Phonemizer>, fallback: Box<dyn Phonemizer>) -> Self {
        Self { primary, fallback }
    }

    /// Whether any phonemizer can handle `language`.
    pub fn covers(&self, language: Language) -> bool {
        self.primary.supports(language) || self.fallback.supports(language)
    }

    pub fn phonemize(&self, segment: &str, language: Language) -> Result<PhonemeSequence, TtsError> {
        if !self.covers(language) {
            return Err(TtsError::UnsupportedLanguage(language.to_string()));
        }

        let tokens = tokenize(segment);
        let primary = self.resolve_primary(&tokens, language)?;
        let mut units = group_unresolved(tokens, primary);
        self.resolve_fallback(&mut units, language)?;

        let mut spans = Vec::with_capacity(units.len());
        for unit in units {
            let (phonemes, source) = match unit.resolution {
                Resolution::Primary(p) => (p, PhonemeSource::Primary),
                Resolution::Fallback(p) => (p, PhonemeSource::Fallback),
                Resolution::Unresolved => {
                    return Err(TtsError::InvalidInput(format!(
                        "could not phonemize {:?} for language '{language}'",
                        unit.text
                    )))
                }
            };
            spans.push(PhonemeSpan {
                text: unit.text,
                phonemes,
                source,
                kind: unit.kind,
            });
        }

        let sequence = PhonemeSequence { spans };
        if sequence.is_empty() {
            return Err(TtsError::InvalidInput(format!(
                "segment {segment:?} has no speakable words"
            )));
        }
        Ok(sequence)
    }

    /// Stage one: one resolution per token.
    fn resolve_primary(
        &self,
        tokens: &[Token],
        language: Language,
    ) -> Result<Vec<Resolution>, TtsError> {
        let mut resolutions: Vec<Resolution> = tokens
            .iter()
            .map(|t| match t {
                Token::Punct(ch) => Resolution::Primary(ch.to_string()),
                Token::Word(_) => Resolution::Unresolved,
            })
            .collect();

        if !self.primary.supports(language) {
            return Ok(resolutions);
        }

        let (indices, words): (Vec<usize>, Vec<&str>) = tokens
            .iter()
            .enumerate()
            .filter_map(|(i, t)| match t {
                Token::Word(w) => Some((i, w.as_str())),
                Token::Punct(_) => None,
            })
            .unzip();
        if words.is_empty() {
            return Ok(resolutions);
        }

        let results = self.primary.phonemize(&words, language)?;
        check_arity(self.primary.name(), words.len(), results.len())?;
        for (idx, result) in indices.into_iter().zip(results) {
            if let Some(phonemes) = result.filter(|p| !p.is_empty()) {
                resolutions[idx] = Resolution::Primary(phonemes);
            }
        }
        Ok(resolutions)
    }

    /// Stage two: ask the fallback about every unresolved run in one batch.
    fn resolve_fallback(&self, units: &mut [Unit], language: Language) -> Result<(), TtsError> {
        let pending: Vec<usize> = units
            .iter()
            .enumerate()
            .filter(|(_, u)| u.resolution == Resolution::Unresolved)
            .map(|(i, _)| i)
            .collect();
        if pending.is_empty() || !self.fallback.supports(language) {
            return Ok(());
        }

        let texts: Vec<&str> = pending.iter().map(|&i| units[i].text.as_str()).collect();
        log::debug!(
            "{} could not resolve {:?}; asking {}",
            self.primary.name(),
            texts,
            self.fallback.name()
        );
        let results = self.fallback.phonemize(&texts, language)?;
        check_arity(self.fallback.name(), texts.len(), results.len())?;

        for (idx, result) in pending.into_iter().zip(results) {
            if let Some(phonemes) = result.filter(|p| !p.is_empty()) {
                units[idx].resolution = Resolution::Fallback(phonemes);
            }
        }
        Ok(())
    }
}

/// Merge consecutive unresolved words into runs so the fallback sees them
/// with their neighbours. Resolved words and punctuation stay single units,
/// so runs never cross punctuation.
fn group_unresolved(tokens: Vec<Token>, resolutions: Vec<Resolution>) -> Vec<Unit> {
    let mut units: Vec<Unit> = Vec::with_capacity(tokens.len());
    for (token, resolution) in tokens.into_iter().zip(resolutions) {
        match token {
            Token::Punct(ch) => units.push(Unit {
                text: ch.to_string(),
                kind: SpanKind::Punctuation,
                resolution,
            }),
            Token::Word(word) => {
                if resolution == Resolution::Unresolved {
                    if let Some(last) = units.last_mut() {
                        if last.kind == SpanKind::Word && last.resolution == Resolution::Unresolved {
                            last.text.push(' ');
                            last.text.push_str(&word);
                            continue;
                        }
                    }
                }
                units.push(Unit {
                    text: word,
                    kind: SpanKind::Word,
                    resolution,
                });
            }
        }
    }
    units
}

fn check_arity(name: &str, expected: usize, got: usize) -> Result<(), TtsError> {
    if expected == got {
        Ok(())
    } else {
        Err(TtsError::SynthesisFailure(format!(
            "{name} returned {got} transcriptions for {expected} spans"
        )))
    }
}
