//! Text normalization and segmentation.
//!
//! Raw request text is split into paragraphs, cleaned, expanded (English
//! abbreviations and numbers) and cut into sentence-sized segments that are
//! phonemized and synthesized one at a time.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::TtsError;
use crate::language::Language;

static SPACES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static ABBREVIATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(Mr|Mrs|Ms|Dr|Prof|St|Jr|Sr|vs|etc|e\.g|i\.e)\.").expect("valid regex")
});
static CURRENCY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([$£€])(\d{1,3}(?:,\d{3})+|\d+)(?:\.(\d{1,2}))?\b").expect("valid regex")
});
static PERCENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,3}(?:,\d{3})+|\d+)(\.\d+)?%").expect("valid regex")
});
static ORDINAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d+)(st|nd|rd|th)\b").expect("valid regex"));
static DECIMAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,3}(?:,\d{3})+|\d+)\.(\d+)\b").expect("valid regex"));
static INTEGER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,3}(?:,\d{3})+|\d+)\b").expect("valid regex"));

/// Longest digit run read as a cardinal; longer runs are read digit by digit.
const MAX_CARDINAL_DIGITS: usize = 15;

/// Split `text` into normalized, non-empty segments in reading order.
pub fn normalize(
    text: &str,
    language: Language,
    split_pattern: &Regex,
    max_segment_chars: usize,
) -> Result<Vec<String>, TtsError> {
    let mut segments = Vec::new();

    for paragraph in split_pattern.split(text) {
        let cleaned = clean(paragraph);
        if cleaned.is_empty() {
            continue;
        }
        let expanded = if language.is_english() {
            expand_numbers(&expand_abbreviations(&cleaned))
        } else {
            cleaned
        };

        for sentence in split_sentences(&expanded) {
            for piece in split_long(sentence, max_segment_chars) {
                if piece.chars().any(char::is_alphanumeric) {
                    segments.push(piece);
                }
            }
        }
    }

    if segments.is_empty() {
        return Err(TtsError::InvalidInput(
            "text contains nothing to speak after normalization".to_string(),
        ));
    }
    Ok(segments)
}

/// Collapse whitespace and fold typographic variants the model vocab lacks.
fn clean(text: &str) -> String {
    let folded: String = text
        .chars()
        .map(|ch| match ch {
            '\u{2018}' | '\u{2019}' | '\u{02bc}' => '\'',
            '\u{2013}' | '\u{2012}' | '\u{2015}' => '—',
            '\u{00a0}' | '\u{2009}' | '\u{202f}' => ' ',
            _ => ch,
        })
        .collect();
    SPACES_RE.replace_all(folded.trim(), " ").into_owned()
}

fn expand_abbreviations(text: &str) -> String {
    ABBREVIATION_RE
        .replace_all(text, |caps: &Captures| {
            match &caps[1] {
                "Mr" => "Mister",
                "Mrs" => "Missus",
                "Ms" => "Miz",
                "Dr" => "Doctor",
                "Prof" => "Professor",
                "St" => "Saint",
                "Jr" => "Junior",
                "Sr" => "Senior",
                "vs" => "versus",
                "etc" => "et cetera",
                "e.g" => "for example",
                "i.e" => "that is",
                other => other,
            }
            .to_string()
        })
        .into_owned()
}

/// Spell out numbers the way an English reader would say them.
pub fn expand_numbers(text: &str) -> String {
    let text = CURRENCY_RE.replace_all(text, |caps: &Captures| {
        let (unit, units, sub, subs) = match &caps[1] {
            "$" => ("dollar", "dollars", "cent", "cents"),
            "£" => ("pound", "pounds", "penny", "pence"),
            _ => ("euro", "euros", "cent", "cents"),
        };
        let whole = parse_grouped(&caps[2]);
        let mut spoken = format!(
            "{} {}",
            cardinal_or_digits(&caps[2]),
            if whole == Some(1) { unit } else { units }
        );
        if let Some(fraction) = caps.get(3) {
            let mut digits = fraction.as_str().to_string();
            if digits.len() == 1 {
                digits.push('0');
            }
            let cents: u64 = digits.parse().unwrap_or(0);
            if cents > 0 {
                spoken.push_str(&format!(
                    " and {} {}",
                    number_to_words(cents),
                    if cents == 1 { sub } else { subs }
                ));
            }
        }
        spoken
    });
    let text = PERCENT_RE.replace_all(&text, |caps: &Captures| {
        let mut spoken = cardinal_or_digits(&caps[1]);
        if let Some(fraction) = caps.get(2) {
            spoken.push_str(" point ");
            spoken.push_str(&spell_digits(&fraction.as_str()[1..]));
        }
        spoken.push_str(" percent");
        spoken
    });
    let text = ORDINAL_RE.replace_all(&text, |caps: &Captures| match caps[1].parse::<u64>() {
        Ok(n) if caps[1].len() <= MAX_CARDINAL_DIGITS => ordinal_words(n),
        _ => caps[0].to_string(),
    });
    let text = DECIMAL_RE.replace_all(&text, |caps: &Captures| {
        format!("{} point {}", cardinal_or_digits(&caps[1]), spell_digits(&caps[2]))
    });
    let text = INTEGER_RE.replace_all(&text, |caps: &Captures| cardinal_or_digits(&caps[1]));
    text.into_owned()
}

fn parse_grouped(digits: &str) -> Option<u64> {
    let plain: Cow<'_, str> = if digits.contains(',') {
        Cow::Owned(digits.replace(',', ""))
    } else {
        Cow::Borrowed(digits)
    };
    if plain.len() > MAX_CARDINAL_DIGITS {
        return None;
    }
    plain.parse().ok()
}

fn cardinal_or_digits(digits: &str) -> String {
    match parse_grouped(digits) {
        Some(n) => number_to_words(n),
        None => spell_digits(&digits.replace(',', "")),
    }
}

fn spell_digits(digits: &str) -> String {
    digits
        .chars()
        .filter_map(|c| c.to_digit(10))
        .map(|d| ONES[d as usize])
        .collect::<Vec<_>>()
        .join(" ")
}

const ONES: [&str; 20] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen",
];
const TENS: [&str; 10] = [
    "", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety",
];
const SCALES: [(u64, &str); 4] = [
    (1_000_000_000_000, "trillion"),
    (1_000_000_000, "billion"),
    (1_000_000, "million"),
    (1_000, "thousand"),
];

/// English cardinal words, space separated so each word is a lexicon entry.
pub fn number_to_words(n: u64) -> String {
    if n == 0 {
        return ONES[0].to_string();
    }
    let mut words = Vec::new();
    let mut rest = n;
    for (scale, name) in SCALES {
        if rest >= scale {
            push_below_thousand(&mut words, rest / scale);
            words.push(name);
            rest %= scale;
        }
    }
    push_below_thousand(&mut words, rest);
    words.join(" ")
}

fn push_below_thousand(words: &mut Vec<&'static str>, n: u64) {
    let hundreds = n / 100;
    let rest = (n % 100) as usize;
    if hundreds > 0 {
        words.push(ONES[hundreds as usize]);
        words.push("hundred");
    }
    match rest {
        0 => {}
        1..=19 => words.push(ONES[rest]),
        _ => {
            words.push(TENS[rest / 10]);
            if rest % 10 != 0 {
                words.push(ONES[rest % 10]);
            }
        }
    }
}

fn ordinal_words(n: u64) -> String {
    let cardinal = number_to_words(n);
    let (head, last) = match cardinal.rsplit_once(' ') {
        Some((head, last)) => (Some(head), last),
        None => (None, cardinal.as_str()),
    };
    let ordinal = match last {
        "one" => "first".to_string(),
        "two" => "second".to_string(),
        "three" => "third".to_string(),
        "five" => "fifth".to_string(),
        "eight" => "eighth".to_string(),
        "nine" => "ninth".to_string(),
        "twelve" => "twelfth".to_string(),
        w if w.ends_with('y') => format!("{}ieth", &w[..w.len() - 1]),
        w => format!("{w}th"),
    };
    match head {
        Some(head) => format!("{head} {ordinal}"),
        None => ordinal,
    }
}

/// Cut after `.`, `!` or `?` when followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?' | '…') {
            continue;
        }
        match chars.peek() {
            Some(&(_, next)) if next.is_whitespace() => {
                let end = idx + ch.len_utf8();
                sentences.push(text[start..end].trim());
                start = end;
            }
            _ => {}
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences.retain(|s| !s.is_empty());
    sentences
}

/// Break a sentence longer than `max_chars`, preferring clause punctuation,
/// then spaces, then a hard cut.
fn split_long(sentence: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = sentence.trim();

    while rest.chars().count() > max_chars {
        let limit = rest
            .char_indices()
            .nth(max_chars)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let window = &rest[..limit];
        let cut = window
            .rfind([',', ';', ':', '—'])
            .map(|i| i + window[i..].chars().next().map_or(1, char::len_utf8))
            .filter(|&i| i > 0)
            .or_else(|| window.rfind(' ').filter(|&i| i > 0))
            .unwrap_or(limit);

        let (head, tail) = rest.split_at(cut);
        let head = head.trim();
        if !head.is_empty() {
            pieces.push(head.to_string());
        }
        rest = tail.trim_start();
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn newline_pattern() -> Regex {
        Regex::new(r"\n+").unwrap()
    }

    fn en(text: &str) -> Vec<String> {
        normalize(text, Language::AmericanEnglish, &newline_pattern(), 400).unwrap()
    }

    #[test]
    fn collapses_whitespace_and_splits_sentences() {
        assert_eq!(
            en("  Hello   world.  How\tare you?  "),
            vec!["Hello world.".to_string(), "How are you?".to_string()]
        );
    }

    #[test]
    fn splits_paragraphs_on_the_configured_pattern() {
        assert_eq!(
            en("First line\n\nSecond line"),
            vec!["First line".to_string(), "Second line".to_string()]
        );
        let bars = Regex::new(r"\|").unwrap();
        let segments = normalize("one|two", Language::AmericanEnglish, &bars, 400).unwrap();
        assert_eq!(segments, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn empty_or_punctuation_only_input_is_invalid() {
        for text in ["", "   \n\n ", "... !!"] {
            let err = normalize(text, Language::AmericanEnglish, &newline_pattern(), 400)
                .unwrap_err();
            assert!(matches!(err, TtsError::InvalidInput(_)), "{text:?}");
        }
    }

    #[test]
    fn expands_english_abbreviations_before_sentence_split() {
        assert_eq!(
            en("Dr. Smith met Mr. Jones."),
            vec!["Doctor Smith met Mister Jones.".to_string()]
        );
    }

    #[test]
    fn expands_numbers_in_english() {
        assert_eq!(expand_numbers("I have 21 cats"), "I have twenty one cats");
        assert_eq!(expand_numbers("1,000 users"), "one thousand users");
        assert_eq!(expand_numbers("version 2.5"), "version two point five");
        assert_eq!(expand_numbers("the 3rd time"), "the third time");
        assert_eq!(expand_numbers("the 20th time"), "the twentieth time");
        assert_eq!(expand_numbers("50% off"), "fifty percent off");
        assert_eq!(
            expand_numbers("costs $3.50"),
            "costs three dollars and fifty cents"
        );
        assert_eq!(expand_numbers("$1"), "one dollar");
    }

    #[test]
    fn cardinals() {
        assert_eq!(number_to_words(0), "zero");
        assert_eq!(number_to_words(115), "one hundred fifteen");
        assert_eq!(
            number_to_words(1_002_003),
            "one million two thousand three"
        );
    }

    #[test]
    fn leaves_digits_for_other_languages() {
        let segments = normalize("Tengo 3 gatos.", Language::Spanish, &newline_pattern(), 400)
            .unwrap();
        assert_eq!(segments, vec!["Tengo 3 gatos.".to_string()]);
    }

    #[test]
    fn long_sentences_split_at_clauses_then_words() {
        let pieces = split_long("alpha beta, gamma delta epsilon", 14);
        assert_eq!(pieces, vec!["alpha beta,", "gamma delta", "epsilon"]);
        for piece in &pieces {
            assert!(piece.chars().count() <= 14);
        }
    }

    #[test]
    fn hard_cuts_unbroken_text() {
        let pieces = split_long("abcdefghij", 4);
        assert_eq!(pieces, vec!["abcd", "efgh", "ij"]);
    }
}
