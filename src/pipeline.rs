//! Per-request orchestration of the synthesis stages.
//!
//! A request is first turned into a [`SynthesisPlan`] (normalized segments,
//! their phonemes, and the resolved voice). Planning surfaces every client
//! error before any audio exists. The plan is then synthesized one segment at
//! a time.

use std::sync::Arc;
use std::time::Instant;

use regex::Regex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::audio::OutputFormat;
use crate::config::SynthesisConfig;
use crate::error::TtsError;
use crate::language::Language;
use crate::phonemizer::{PhonemeSequence, PhonemizerRouter};
use crate::synth::Synthesizer;
use crate::text;
use crate::voice::{VoiceProfile, VoiceResolver};
use crate::AudioBuffer;

/// A validated request with every default applied, except the voice, which
/// the resolver defaults.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    pub language: Language,
    pub voice: Option<String>,
    pub speed: f32,
    pub format: OutputFormat,
    /// Overrides the configured paragraph split pattern.
    pub split_pattern: Option<Regex>,
}

impl SynthesisRequest {
    /// A request for `text` using the configured defaults.
    pub fn with_defaults(text: impl Into<String>, config: &SynthesisConfig) -> Self {
        Self {
            text: text.into(),
            language: config.language,
            voice: None,
            speed: config.default_speed,
            format: OutputFormat::default(),
            split_pattern: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisPlan {
    pub segments: Vec<PhonemeSequence>,
    pub voice: Arc<VoiceProfile>,
    pub speed: f32,
}

/// The full text-to-audio pipeline, shared by all requests.
pub struct TtsPipeline {
    config: Arc<SynthesisConfig>,
    router: PhonemizerRouter,
    resolver: VoiceResolver,
    synthesizer: Synthesizer,
}

impl TtsPipeline {
    /// Assemble the pipeline, refusing configurations it could never serve.
    pub fn new(
        config: Arc<SynthesisConfig>,
        router: PhonemizerRouter,
        resolver: VoiceResolver,
        synthesizer: Synthesizer,
    ) -> Result<Self, TtsError> {
        if synthesizer.sample_rate() != config.sample_rate {
            return Err(TtsError::SynthesisFailure(format!(
                "model produces {} Hz audio but {} Hz is configured",
                synthesizer.sample_rate(),
                config.sample_rate
            )));
        }
        if !router.covers(config.language) {
            return Err(TtsError::UnsupportedLanguage(config.language.to_string()));
        }
        resolver.resolve(None, config.language)?;

        Ok(Self {
            config,
            router,
            resolver,
            synthesizer,
        })
    }

    pub fn config(&self) -> &SynthesisConfig {
        &self.config
    }

    pub fn resolver(&self) -> &VoiceResolver {
        &self.resolver
    }

    pub fn is_ready(&self) -> bool {
        self.synthesizer.is_ready()
    }

    /// Normalize, resolve the voice and phonemize every segment. Blocking:
    /// the fallback phonemizer runs as a subprocess. Gives up between
    /// segments once `deadline` has passed.
    pub fn plan(
        &self,
        request: &SynthesisRequest,
        deadline: Option<Instant>,
    ) -> Result<SynthesisPlan, TtsError> {
        let voice = self
            .resolver
            .resolve(request.voice.as_deref(), request.language)?;
        if !self.router.covers(request.language) {
            return Err(TtsError::UnsupportedLanguage(request.language.to_string()));
        }

        let split_pattern = request
            .split_pattern
            .as_ref()
            .unwrap_or(&self.config.split_pattern);
        let segments = text::normalize(
            &request.text,
            request.language,
            split_pattern,
            self.config.max_segment_chars,
        )?;

        let segments = segments
            .iter()
            .map(|segment| {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    return Err(TtsError::TimedOut);
                }
                self.router.phonemize(segment, request.language)
            })
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!(
            "Planned {} segment(s) with voice '{}' at speed {}",
            segments.len(),
            voice.id,
            request.speed
        );
        Ok(SynthesisPlan {
            segments,
            voice,
            speed: request.speed,
        })
    }

    /// Synthesize one planned segment. Blocking.
    pub fn synthesize_segment(
        &self,
        plan: &SynthesisPlan,
        index: usize,
        deadline: Option<Instant>,
    ) -> Result<AudioBuffer, TtsError> {
        let segment = plan.segments.get(index).ok_or_else(|| {
            TtsError::SynthesisFailure(format!("segment {index} is not part of the plan"))
        })?;
        self.synthesizer
            .synthesize(segment, &plan.voice, plan.speed, deadline)
    }

    /// Synthesize a plan segment by segment into `tx`. Blocking; run it on
    /// the runtime's blocking pool.
    ///
    /// A segment is synthesized only once the channel has room for it, so
    /// with capacity 1 the model is not invoked again until the previous
    /// chunk has been taken. Stops after the first error, or as soon as the
    /// receiver is gone.
    pub fn produce(
        &self,
        plan: SynthesisPlan,
        tx: mpsc::Sender<Result<AudioBuffer, TtsError>>,
        deadline: Option<Instant>,
    ) {
        let Ok(runtime) = Handle::try_current() else {
            log::error!("produce called outside a tokio runtime");
            return;
        };
        for index in 0..plan.segments.len() {
            let Ok(permit) = runtime.block_on(tx.reserve()) else {
                log::debug!("Receiver dropped, abandoning synthesis at segment {index}");
                return;
            };
            let result = self.synthesize_segment(&plan, index, deadline);
            let failed = result.is_err();
            permit.send(result);
            if failed {
                return;
            }
        }
    }

    /// Plan and synthesize a request into one buffer. Blocking.
    pub fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioBuffer, TtsError> {
        let deadline = Instant::now() + self.config.request_timeout;
        let plan = self.plan(request, Some(deadline))?;
        let mut audio = AudioBuffer::new(Vec::new(), self.config.sample_rate);
        for index in 0..plan.segments.len() {
            audio.append(self.synthesize_segment(&plan, index, Some(deadline))?);
        }
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::phonemizer::{LexiconPhonemizer, Phonemizer};
    use crate::voice::{VoiceEmbedding, VoiceSet};
    use crate::AcousticModel;

    struct CountingModel(Arc<AtomicUsize>);

    impl AcousticModel for CountingModel {
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
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0.1; (phonemes.chars().count() as f32 * 50.0 / speed) as usize])
        }
    }

    /// Echoes every span back, lowercased.
    struct Speller;

    impl Phonemizer for Speller {
        fn name(&self) -> &str {
            "speller"
        }

        fn supports(&self, language: Language) -> bool {
            language.is_english()
        }

        fn phonemize(
            &self,
            spans: &[&str],
            _language: Language,
        ) -> Result<Vec<Option<String>>, TtsError> {
            Ok(spans.iter().map(|s| Some(s.to_lowercase())).collect())
        }
    }

    fn pipeline() -> (TtsPipeline, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let voices: VoiceSet = ["af_heart", "bf_emma"]
            .into_iter()
            .map(|id| VoiceProfile::from_name(id, VoiceEmbedding::new(2, vec![0.0; 4]).unwrap()))
            .collect();
        let config = Arc::new(SynthesisConfig::default());
        let lexicon = LexiconPhonemizer::default()
            .with_entries(Language::AmericanEnglish, [("hello", "həlˈO")]);
        let pipeline = TtsPipeline::new(
            config.clone(),
            PhonemizerRouter::new(Box::new(lexicon), Box::new(Speller)),
            VoiceResolver::new(Arc::new(voices), config.default_voice.clone()),
            Synthesizer::new(Box::new(CountingModel(calls.clone()))),
        )
        .unwrap();
        (pipeline, calls)
    }

    #[test]
    fn plans_one_phoneme_sequence_per_segment() {
        let (pipeline, calls) = pipeline();
        let request = SynthesisRequest::with_defaults("Hello there.\nHello again!", pipeline.config());
        let plan = pipeline.plan(&request, None).unwrap();
        assert_eq!(plan.segments.len(), 2);
        assert_eq!(plan.segments[0].render(), "həlˈO there.");
        assert_eq!(plan.voice.id, "af_heart");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_text_never_reaches_the_model() {
        let (pipeline, calls) = pipeline();
        let request = SynthesisRequest::with_defaults("  \n ", pipeline.config());
        let err = pipeline.synthesize(&request).unwrap_err();
        assert!(matches!(err, TtsError::InvalidInput(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn repeated_requests_have_identical_length() {
        let (pipeline, _) = pipeline();
        let request = SynthesisRequest::with_defaults("Hello world. Again.", pipeline.config());
        let first = pipeline.synthesize(&request).unwrap();
        let second = pipeline.synthesize(&request).unwrap();
        assert!(!first.is_empty());
        assert_eq!(first.len(), second.len());
    }

    #[test]
    fn planning_stops_once_the_deadline_has_passed() {
        let (pipeline, calls) = pipeline();
        let request = SynthesisRequest::with_defaults("one\ntwo", pipeline.config());
        let past = Instant::now() - std::time::Duration::from_millis(1);
        let err = pipeline.plan(&request, Some(past)).unwrap_err();
        assert!(matches!(err, TtsError::TimedOut));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    fn shared_plan(text: &str) -> (Arc<TtsPipeline>, SynthesisPlan, Arc<AtomicUsize>) {
        let (pipeline, calls) = pipeline();
        let request = SynthesisRequest::with_defaults(text, pipeline.config());
        let plan = pipeline.plan(&request, None).unwrap();
        (Arc::new(pipeline), plan, calls)
    }

    #[tokio::test]
    async fn producer_stops_when_the_receiver_is_gone() {
        let (pipeline, plan, calls) = shared_plan("one\ntwo\nthree");
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        tokio::task::spawn_blocking(move || pipeline.produce(plan, tx, None))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn producer_sends_segments_in_order() {
        let (pipeline, plan, _) = shared_plan("a\nbbbb");
        let (tx, mut rx) = mpsc::channel(4);
        tokio::task::spawn_blocking(move || pipeline.produce(plan, tx, None))
            .await
            .unwrap();
        let first = rx.recv().await.unwrap().unwrap();
        let second = rx.recv().await.unwrap().unwrap();
        assert!(first.len() < second.len());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn producer_waits_for_each_chunk_to_be_taken() {
        let (pipeline, plan, calls) = shared_plan("one\ntwo\nthree");
        let (tx, mut rx) = mpsc::channel(1);
        let producer = tokio::task::spawn_blocking(move || pipeline.produce(plan, tx, None));

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        rx.recv().await.unwrap().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        while let Some(chunk) = rx.recv().await {
            chunk.unwrap();
        }
        producer.await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn producer_outside_a_runtime_sends_nothing() {
        let (pipeline, plan, calls) = shared_plan("one");
        let (tx, mut rx) = mpsc::channel(1);
        pipeline.produce(plan, tx, None);
        assert!(rx.blocking_recv().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn startup_rejects_a_default_voice_for_another_language() {
        let calls = Arc::new(AtomicUsize::new(0));
        let voices: VoiceSet = [VoiceProfile::from_name(
            "bf_emma",
            VoiceEmbedding::new(1, vec![0.0]).unwrap(),
        )]
        .into_iter()
        .collect();
        let config = Arc::new(
            crate::SynthesisConfigBuilder::default()
                .default_voice("bf_emma")
                .build()
                .unwrap(),
        );
        let result = TtsPipeline::new(
            config.clone(),
            PhonemizerRouter::new(Box::new(Speller), Box::new(Speller)),
            VoiceResolver::new(Arc::new(voices), config.default_voice.clone()),
            Synthesizer::new(Box::new(CountingModel(calls))),
        );
        assert!(matches!(result, Err(TtsError::VoiceLanguageMismatch { .. })));
    }
}
