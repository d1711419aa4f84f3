use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;

use kokoro_tts_api::engines::kokoro::{KokoroEngine, KokoroModelParams};
use kokoro_tts_api::phonemizer::{
    EspeakConfig, EspeakPhonemizer, LexiconPhonemizer, PhonemizerRouter,
};
use kokoro_tts_api::server::{self, AppState};
use kokoro_tts_api::synth::Synthesizer;
use kokoro_tts_api::voice::VoiceResolver;
use kokoro_tts_api::{ServerArgs, TtsPipeline};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = ServerArgs::parse();
    let config = Arc::new(args.synthesis_config().context("invalid configuration")?);

    let espeak = EspeakPhonemizer::new(EspeakConfig {
        bin_path: args.espeak_bin.clone(),
        data_path: args.espeak_data.clone(),
    });
    let version = espeak.probe().context("espeak-ng is required for fallback phonemization")?;
    log::info!("Using {version}");

    let lexicon = LexiconPhonemizer::load_dir(&args.model_dir)
        .with_context(|| format!("failed to load lexicons from {}", args.model_dir.display()))?;

    let model_dir = args.model_dir.clone();
    let params = KokoroModelParams {
        num_threads: args.num_threads,
        optimized_model_cache_path: args.optimized_model_cache.clone(),
    };
    let engine = tokio::task::spawn_blocking(move || KokoroEngine::load(&model_dir, params))
        .await
        .context("model loading task panicked")?
        .with_context(|| format!("failed to load Kokoro from {}", args.model_dir.display()))?;
    let (model, voices) = engine.into_parts();
    log::info!("Voices: {}", voices.ids().join(", "));

    let pipeline = TtsPipeline::new(
        config.clone(),
        PhonemizerRouter::new(Box::new(lexicon), Box::new(espeak)),
        VoiceResolver::new(Arc::new(voices), config.default_voice.clone()),
        Synthesizer::new(Box::new(model)),
    )
    .context("refusing to start")?;
    log::info!(
        "Ready: language '{}', default voice '{}', {} Hz",
        config.language,
        config.default_voice,
        config.sample_rate
    );

    let addr = args.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    server::serve(listener, AppState::new(pipeline)).await?;
    Ok(())
}
