use std::borrow::Cow;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::Phonemizer;
use crate::error::TtsError;
use crate::language::Language;

#[derive(thiserror::Error, Debug)]
pub enum EspeakError {
    #[error(
        "espeak-ng not found. Install: Linux: `sudo apt-get install espeak-ng`, \
         macOS: `brew install espeak-ng`, Windows: https://espeak-ng.org/download"
    )]
    NotFound,
    #[error("I/O error talking to espeak-ng: {0}")]
    Io(#[from] std::io::Error),
    #[error("espeak-ng exited with code {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
}

/// Where to find espeak-ng. `None` fields use the system defaults.
#[derive(Debug, Clone, Default)]
pub struct EspeakConfig {
    pub bin_path: Option<PathBuf>,
    pub data_path: Option<PathBuf>,
}

/// Rule-based fallback phonemizer backed by the espeak-ng binary.
#[derive(Debug, Clone, Default)]
pub struct EspeakPhonemizer {
    config: EspeakConfig,
}

impl EspeakPhonemizer {
    pub fn new(config: EspeakConfig) -> Self {
        Self { config }
    }

    /// Check that espeak-ng can be started; returns its version banner.
    pub fn probe(&self) -> Result<String, EspeakError> {
        let output = self
            .command()
            .arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(spawn_error)?;
        if !output.status.success() {
            return Err(EspeakError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn command(&self) -> Command {
        let bin = self
            .config
            .bin_path
            .as_deref()
            .map(|p| p.as_os_str().to_owned())
            .unwrap_or_else(|| "espeak-ng".into());
        let mut cmd = Command::new(bin);
        if let Some(data) = &self.config.data_path {
            cmd.env("ESPEAK_DATA_PATH", data);
        }
        cmd
    }

    fn run(&self, input: &str, voice: &str) -> Result<String, EspeakError> {
        let mut child = self
            .command()
            .args(["--ipa", "--stdin", "-q", "-v", voice])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(newline_terminated(input).as_bytes())?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(EspeakError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// One espeak-ng call for the whole batch, one line per span. If the
    /// line count does not line up, each span is transcribed on its own.
    fn run_batch(&self, spans: &[&str], voice: &str) -> Result<Vec<String>, EspeakError> {
        let output = self.run(&spans.join("\n"), voice)?;
        let lines: Vec<&str> = output.lines().collect();
        if lines.len() == spans.len() {
            return Ok(lines.into_iter().map(str::to_string).collect());
        }

        log::debug!(
            "espeak-ng returned {} lines for {} spans, retrying one by one",
            lines.len(),
            spans.len()
        );
        spans.iter().map(|span| self.run(span, voice)).collect()
    }
}

impl Phonemizer for EspeakPhonemizer {
    fn name(&self) -> &str {
        "espeak-ng"
    }

    fn supports(&self, _language: Language) -> bool {
        true
    }

    fn phonemize(
        &self,
        spans: &[&str],
        language: Language,
    ) -> Result<Vec<Option<String>>, TtsError> {
        // espeak reads stdin line by line; a span must not contain its own breaks.
        let flattened: Vec<String> = spans.iter().map(|s| s.replace(['\n', '\r'], " ")).collect();
        let refs: Vec<&str> = flattened.iter().map(String::as_str).collect();

        let lines = self
            .run_batch(&refs, language.espeak_code())
            .map_err(|e| TtsError::SynthesisFailure(format!("fallback phonemizer: {e}")))?;

        Ok(lines
            .iter()
            .map(|line| {
                let ipa = clean_ipa(line, language);
                (!ipa.is_empty()).then_some(ipa)
            })
            .collect())
    }
}

fn spawn_error(e: std::io::Error) -> EspeakError {
    if e.kind() == std::io::ErrorKind::NotFound {
        EspeakError::NotFound
    } else {
        EspeakError::Io(e)
    }
}

/// espeak-ng under-processes the last token of stdin without a final newline.
fn newline_terminated(input: &str) -> Cow<'_, str> {
    if input.ends_with('\n') {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(format!("{input}\n"))
    }
}

/// espeak IPA sequences and the compact symbols the English lexicon uses.
const ENGLISH_FOLDS: &[(&str, &str)] = &[
    ("eɪ", "A"),
    ("aɪ", "I"),
    ("aʊ", "W"),
    ("ɔɪ", "Y"),
    ("oʊ", "O"),
    ("əʊ", "Q"),
    ("tʃ", "ʧ"),
    ("dʒ", "ʤ"),
    ("ɚ", "əɹ"),
    ("r", "ɹ"),
];

/// Strip espeak's word-joining underscores and, for English, fold its IPA
/// into the lexicon's symbol set so both phonemizers agree.
fn clean_ipa(line: &str, language: Language) -> String {
    let mut ipa: String = line.trim().chars().filter(|&c| c != '_').collect();
    if language.is_english() {
        for (from, to) in ENGLISH_FOLDS {
            if ipa.contains(from) {
                ipa = ipa.replace(from, to);
            }
        }
    }
    ipa
}
