use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use regex::RegexBuilder;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::timeout_at;

use super::{ApiError, AppState, RequestPhase, RequestTracker};
use crate::audio::{encode_pcm16, encode_wav, OutputFormat};
use crate::config::SynthesisConfig;
use crate::error::TtsError;
use crate::pipeline::SynthesisRequest;
use crate::synth::validate_speed;
use crate::AudioBuffer;

/// Compiled size cap for caller-supplied split patterns.
const SPLIT_PATTERN_SIZE_LIMIT: usize = 1 << 16;

/// JSON body of `POST /tts`.
#[derive(Debug, Default, Deserialize)]
pub struct TtsRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, alias = "voice_id")]
    pub voice: Option<String>,
    #[serde(default, alias = "lang_code", alias = "language_code")]
    pub language: Option<String>,
    #[serde(default)]
    pub speed: Option<f32>,
    #[serde(default, alias = "output_format")]
    pub format: Option<OutputFormat>,
    #[serde(default)]
    pub split_pattern: Option<String>,
    #[serde(default)]
    pub sample_rate: Option<u32>,
}

impl TtsRequest {
    /// Validate the body and fill every omitted field from `config`.
    pub fn into_request(self, config: &SynthesisConfig) -> Result<SynthesisRequest, TtsError> {
        let text = self.text.unwrap_or_default();
        if text.trim().is_empty() {
            return Err(TtsError::InvalidInput(
                "Field 'text' is required and must be non-empty".to_string(),
            ));
        }
        let length = text.chars().count();
        if length > config.max_text_chars {
            return Err(TtsError::InvalidInput(format!(
                "text is {length} characters long; the limit is {}",
                config.max_text_chars
            )));
        }

        let language = match non_blank(self.language) {
            Some(code) => code.parse()?,
            None => config.language,
        };

        let speed = self.speed.unwrap_or(config.default_speed);
        validate_speed(speed)?;

        if let Some(rate) = self.sample_rate {
            if rate != config.sample_rate {
                return Err(TtsError::InvalidInput(format!(
                    "sample_rate must be {} (the model's output rate), got {rate}",
                    config.sample_rate
                )));
            }
        }

        let split_pattern = non_blank(self.split_pattern)
            .map(|pattern| {
                RegexBuilder::new(&pattern)
                    .size_limit(SPLIT_PATTERN_SIZE_LIMIT)
                    .build()
                    .map_err(|e| TtsError::InvalidInput(format!("invalid split_pattern: {e}")))
            })
            .transpose()?;

        Ok(SynthesisRequest {
            text,
            language,
            voice: non_blank(self.voice),
            speed,
            format: self.format.unwrap_or_default(),
            split_pattern,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub(super) async fn synthesize(
    State(state): State<AppState>,
    payload: Result<Json<TtsRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let mut tracker = RequestTracker::new();
    tracker.advance(RequestPhase::Validating);

    let config = state.pipeline.config();
    let request = match payload {
        Ok(Json(body)) => body.into_request(config),
        Err(rejection) => Err(TtsError::InvalidInput(rejection.body_text())),
    };
    let request = match request {
        Ok(request) => request,
        Err(e) => return Err(tracker.fail(e)),
    };
    let format = request.format;
    let deadline = Instant::now() + config.request_timeout;

    tracker.advance(RequestPhase::Pipelining);
    let pipeline = Arc::clone(&state.pipeline);
    let planning =
        tokio::task::spawn_blocking(move || pipeline.plan(&request, Some(deadline)));
    let plan = match timeout_at(deadline.into(), planning).await {
        Ok(Ok(Ok(plan))) => plan,
        Ok(Ok(Err(e))) => return Err(tracker.fail(e)),
        Ok(Err(join)) => {
            return Err(tracker.fail(TtsError::SynthesisFailure(format!(
                "planning task failed: {join}"
            ))))
        }
        Err(_) => return Err(tracker.fail(TtsError::TimedOut)),
    };

    let (tx, mut rx) = mpsc::channel(1);
    let pipeline = Arc::clone(&state.pipeline);
    tokio::task::spawn_blocking(move || pipeline.produce(plan, tx, Some(deadline)));

    // Nothing has been sent yet, so the first segment can still fail as JSON.
    let first = match next_chunk(&mut rx, deadline).await {
        Some(Ok(audio)) => audio,
        Some(Err(e)) => return Err(tracker.fail(e)),
        None => {
            return Err(tracker.fail(TtsError::SynthesisFailure(
                "synthesis produced no audio".to_string(),
            )))
        }
    };

    match format {
        OutputFormat::Wav => {
            let mut audio = first;
            while let Some(next) = next_chunk(&mut rx, deadline).await {
                match next {
                    Ok(chunk) => audio.append(chunk),
                    Err(e) => return Err(tracker.fail(e)),
                }
            }
            let bytes = match encode_wav(&audio) {
                Ok(bytes) => bytes,
                Err(e) => return Err(tracker.fail(e)),
            };
            tracker.advance(RequestPhase::Streaming);
            let response = audio_response(
                format,
                audio.sample_rate,
                Body::from(bytes),
                Some(audio.duration_secs()),
            );
            tracker.advance(RequestPhase::Complete);
            Ok(response)
        }
        OutputFormat::Pcm => {
            tracker.advance(RequestPhase::Streaming);
            let sample_rate = first.sample_rate;
            let stream = async_stream::stream! {
                let mut sent = first.len();
                yield Ok::<Bytes, std::io::Error>(Bytes::from(encode_pcm16(&first.samples)));
                loop {
                    match next_chunk(&mut rx, deadline).await {
                        Some(Ok(chunk)) => {
                            sent += chunk.len();
                            yield Ok(Bytes::from(encode_pcm16(&chunk.samples)));
                        }
                        Some(Err(e)) => {
                            // Audio is already on the wire: abort instead of appending JSON.
                            tracker.record_failure(&e);
                            yield Err(std::io::Error::other(e.to_string()));
                            break;
                        }
                        None => {
                            log::debug!("request {}: streamed {sent} samples", tracker.id());
                            tracker.advance(RequestPhase::Complete);
                            break;
                        }
                    }
                }
            };
            Ok(audio_response(
                format,
                sample_rate,
                Body::from_stream(stream),
                None,
            ))
        }
    }
}

async fn next_chunk(
    rx: &mut mpsc::Receiver<Result<AudioBuffer, TtsError>>,
    deadline: Instant,
) -> Option<Result<AudioBuffer, TtsError>> {
    match timeout_at(deadline.into(), rx.recv()).await {
        Ok(item) => item,
        Err(_) => Some(Err(TtsError::TimedOut)),
    }
}

fn audio_response(
    format: OutputFormat,
    sample_rate: u32,
    body: Body,
    duration_secs: Option<f64>,
) -> Response {
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(format.content_type()),
    );
    headers.insert("x-sample-rate", HeaderValue::from(sample_rate));
    headers.insert("x-channels", HeaderValue::from_static("1"));
    if format.is_streamed() {
        headers.insert("x-sample-format", HeaderValue::from_static("s16le"));
    }
    if let Some(secs) = duration_secs {
        if let Ok(value) = HeaderValue::from_str(&format!("{secs:.3}")) {
            headers.insert("x-audio-duration", value);
        }
    }
    response
}

pub(super) async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.pipeline.is_ready();
    let config = state.pipeline.config();
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if ready { "ok" } else { "error" },
            "model": "kokoro",
            "lang_code": config.language,
            "sample_rate": config.sample_rate,
            "default_voice": config.default_voice,
            "ready": ready,
        })),
    )
}

pub(super) async fn voices(State(state): State<AppState>) -> impl IntoResponse {
    let resolver = state.pipeline.resolver();
    Json(json!({
        "voices": resolver.voices().ids(),
        "default": resolver.default_voice(),
    }))
}

pub(super) async fn index(State(state): State<AppState>) -> Html<String> {
    let config = state.pipeline.config();
    let voices = state.pipeline.resolver().voices().ids().join(", ");
    Html(format!(
        r#"<html>
  <head>
    <title>Kokoro TTS API</title>
    <style>
      body {{ font-family: system-ui, sans-serif; padding: 2rem; }}
      code {{ background: #f2f2f2; padding: 2px 4px; border-radius: 4px; }}
      .card {{ border: 1px solid #eee; border-radius: 8px; padding: 1rem; margin: 1rem 0; }}
    </style>
  </head>
  <body>
    <h1>Kokoro TTS API</h1>
    <div class="card">
      <h2>Endpoints</h2>
      <ul>
        <li><code>GET /</code> this page</li>
        <li><code>GET /health</code> health and config</li>
        <li><code>GET /voices</code> available voices</li>
        <li><code>POST /tts</code> synthesize speech (WAV, or streamed PCM with <code>"format": "pcm"</code>)</li>
      </ul>
    </div>
    <div class="card">
      <h2>Quick start</h2>
      <pre><code>curl -sS -X POST http://localhost:8080/tts \
  -H "Content-Type: application/json" \
  -d '{{"text":"Hello from Kokoro!", "voice":"{voice}"}}' \
  --output out.wav</code></pre>
    </div>
    <div class="card">
      <h2>Defaults</h2>
      <ul>
        <li>LANG_CODE: <code>{lang}</code></li>
        <li>DEFAULT_VOICE: <code>{voice}</code></li>
        <li>DEFAULT_SPEED: <code>{speed}</code></li>
        <li>SAMPLE_RATE: <code>{rate}</code></li>
        <li>Voices: <code>{voices}</code></li>
      </ul>
    </div>
  </body>
</html>
"#,
        lang = config.language,
        voice = config.default_voice,
        speed = config.default_speed,
        rate = config.sample_rate,
        voices = voices,
    ))
}
