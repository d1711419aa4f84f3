#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use tower::ServiceExt;

use kokoro_tts_api::language::Language;
use kokoro_tts_api::phonemizer::{LexiconPhonemizer, Phonemizer, PhonemizerRouter};
use kokoro_tts_api::server::{self, AppState};
use kokoro_tts_api::synth::Synthesizer;
use kokoro_tts_api::voice::{VoiceEmbedding, VoiceProfile, VoiceResolver, VoiceSet};
use kokoro_tts_api::{AcousticModel, SynthesisConfig, TtsError, TtsPipeline};

pub const SAMPLES_PER_PHONEME: f32 = 100.0;

/// What the fake model saw, shared with the test.
#[derive(Clone, Default)]
pub struct ModelLog {
    calls: Arc<AtomicUsize>,
    windows: Arc<Mutex<Vec<String>>>,
}

impl ModelLog {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn windows(&self) -> Vec<String> {
        self.windows.lock().unwrap().clone()
    }
}

/// Deterministic stand-in for Kokoro: a constant tone whose length is
/// proportional to the phoneme count and inversely to speed.
pub struct FakeModel {
    log: ModelLog,
    /// Fails any window containing this text.
    fail_on: Option<&'static str>,
    delay: Duration,
}

impl AcousticModel for FakeModel {
    fn sample_rate(&self) -> u32 {
        24_000
    }

    fn max_phonemes(&self) -> usize {
        510
    }

    fn synthesize(
        &mut self,
        phonemes: &str,
        _voice: &VoiceProfile,
        speed: f32,
        _style_idx: usize,
    ) -> Result<Vec<f32>, Box<dyn std::error::Error + Send + Sync>> {
        self.log.calls.fetch_add(1, Ordering::SeqCst);
        self.log.windows.lock().unwrap().push(phonemes.to_string());
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail_on.is_some_and(|bad| phonemes.contains(bad)) {
            return Err("inference failed".into());
        }
        let len = phonemes.chars().count() as f32 * SAMPLES_PER_PHONEME / speed;
        Ok(vec![0.25; len as usize])
    }
}

/// Fallback stand-in: "phonemizes" English by lowercasing, except for words
/// spelled with `q`, which it cannot handle.
pub struct Lowercaser;

impl Phonemizer for Lowercaser {
    fn name(&self) -> &str {
        "lowercaser"
    }

    fn supports(&self, _language: Language) -> bool {
        true
    }

    fn phonemize(
        &self,
        spans: &[&str],
        _language: Language,
    ) -> Result<Vec<Option<String>>, TtsError> {
        Ok(spans
            .iter()
            .map(|s| (!s.contains('q')).then(|| s.to_lowercase()))
            .collect())
    }
}

pub struct Harness {
    pub config: SynthesisConfig,
    pub fail_on: Option<&'static str>,
    pub delay: Duration,
}

impl Default for Harness {
    fn default() -> Self {
        Self {
            config: SynthesisConfig::default(),
            fail_on: None,
            delay: Duration::ZERO,
        }
    }
}

impl Harness {
    pub fn build(self) -> (Router, ModelLog) {
        let log = ModelLog::default();
        let voices: VoiceSet = ["af_heart", "af_bella", "bf_emma", "ef_dora"]
            .into_iter()
            .map(|id| VoiceProfile::from_name(id, VoiceEmbedding::new(4, vec![0.5; 8]).unwrap()))
            .collect();
        let lexicon = LexiconPhonemizer::default()
            .with_entries(
                Language::AmericanEnglish,
                [("hello", "həlˈO"), ("world", "wˈɜɹld")],
            )
            .with_entries(Language::BritishEnglish, [("hello", "həlˈəʊ")]);
        let model = FakeModel {
            log: log.clone(),
            fail_on: self.fail_on,
            delay: self.delay,
        };

        let config = Arc::new(self.config);
        let pipeline = TtsPipeline::new(
            config.clone(),
            PhonemizerRouter::new(Box::new(lexicon), Box::new(Lowercaser)),
            VoiceResolver::new(Arc::new(voices), config.default_voice.clone()),
            Synthesizer::new(Box::new(model)),
        )
        .unwrap();
        (server::router(AppState::new(pipeline)), log)
    }
}

pub fn app() -> (Router, ModelLog) {
    Harness::default().build()
}

pub async fn post_tts(app: Router, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri("/tts")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Decode a WAV body into (sample rate, channels, sample count).
pub fn wav_info(bytes: &[u8]) -> (u32, u16, usize) {
    let reader = hound::WavReader::new(std::io::Cursor::new(bytes)).unwrap();
    let spec = reader.spec();
    (spec.sample_rate, spec.channels, reader.len() as usize)
}
