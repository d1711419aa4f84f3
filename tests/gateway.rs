mod common;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;

use common::{
    app, body_bytes, body_json, get, post_tts, wav_info, Harness, SAMPLES_PER_PHONEME,
};
use kokoro_tts_api::SynthesisConfigBuilder;

#[tokio::test]
async fn hello_world_returns_a_wav() {
    let (app, log) = app();
    let response = post_tts(app, json!({"text": "Hello world", "voice": "af_heart"})).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "audio/wav");
    assert_eq!(response.headers()["x-sample-rate"], "24000");

    let (rate, channels, samples) = wav_info(&body_bytes(response).await);
    assert_eq!(rate, 24_000);
    assert_eq!(channels, 1);
    assert!(samples > 0);
    assert_eq!(log.windows(), vec!["həlˈO wˈɜɹld"]);
}

#[tokio::test]
async fn omitted_fields_use_configured_defaults() {
    let config = SynthesisConfigBuilder::default()
        .default_voice("bf_emma")
        .language("b".parse().unwrap())
        .build()
        .unwrap();
    let (app, log) = Harness {
        config,
        ..Default::default()
    }
    .build();

    let response = post_tts(app, json!({"text": "Hello"})).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(log.windows(), vec!["həlˈəʊ"]);
}

#[tokio::test]
async fn unknown_voice_is_not_found() {
    let (app, log) = app();
    let response = post_tts(app, json!({"text": "Hello", "voice": "zz_nobody"})).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["kind"], "voice_not_found");
    assert!(body["error"]["message"].as_str().unwrap().contains("zz_nobody"));
    assert_eq!(log.calls(), 0);
}

#[tokio::test]
async fn empty_text_is_rejected_before_synthesis() {
    for text in [json!(""), json!("   \n  "), json!(null)] {
        let (app, log) = app();
        let response = post_tts(app, json!({ "text": text })).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["kind"], "invalid_input");
        assert_eq!(log.calls(), 0);
    }
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    let (app, _) = app();
    let request = Request::builder()
        .method("POST")
        .uri("/tts")
        .header("content-type", "application/json")
        .body(Body::from("{\"text\": "))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["kind"], "invalid_input");
}

#[tokio::test]
async fn language_errors_are_unprocessable() {
    let (mismatch_app, _) = app();
    let response = post_tts(
        mismatch_app,
        json!({"text": "Hello", "voice": "bf_emma", "language": "a"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body_json(response).await["error"]["kind"],
        "voice_language_mismatch"
    );

    let (unknown_app, _) = app();
    let response = post_tts(unknown_app, json!({"text": "Hello", "language": "klingon"})).await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        body_json(response).await["error"]["kind"],
        "unsupported_language"
    );
}

#[tokio::test]
async fn faster_speech_is_shorter() {
    let text = "Hello world, this is a test.";
    let (normal, _) = app();
    let (fast, _) = app();

    let normal = post_tts(normal, json!({"text": text, "speed": 1.0})).await;
    let fast = post_tts(fast, json!({"text": text, "speed": 2.0})).await;
    let (_, _, normal_len) = wav_info(&body_bytes(normal).await);
    let (_, _, fast_len) = wav_info(&body_bytes(fast).await);
    assert!(fast_len < normal_len);
}

#[tokio::test]
async fn repeated_requests_are_deterministic() {
    let (app, _) = app();
    let body = json!({"text": "Hello world.\nA second paragraph here."});
    let first = body_bytes(post_tts(app.clone(), body.clone()).await).await;
    let second = body_bytes(post_tts(app, body).await).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn pcm_streams_raw_samples() {
    let (app, log) = app();
    let response = post_tts(
        app,
        json!({"text": "Hello world", "format": "pcm"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "audio/pcm");
    assert_eq!(response.headers()["x-sample-format"], "s16le");
    let bytes = body_bytes(response).await;

    let phonemes: usize = log.windows().iter().map(|w| w.chars().count()).sum();
    assert_eq!(bytes.len(), 2 * phonemes * SAMPLES_PER_PHONEME as usize);
}

#[tokio::test]
async fn unknown_words_are_spliced_from_the_fallback() {
    let (app, log) = app();
    let response = post_tts(app, json!({"text": "Hello big world, friend!"})).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(log.windows(), vec!["həlˈO big wˈɜɹld, friend!"]);
}

#[tokio::test]
async fn unpronounceable_text_is_invalid_input() {
    let (app, log) = app();
    let response = post_tts(app, json!({"text": "Hello qwerty"})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(log.calls(), 0);
}

#[tokio::test]
async fn wav_failure_is_reported_as_json() {
    let (app, _) = Harness {
        fail_on: Some("boom"),
        ..Default::default()
    }
    .build();
    let response = post_tts(app, json!({"text": "Hello\nboom"})).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(response).await["error"]["kind"],
        "synthesis_failure"
    );
}

#[tokio::test]
async fn pcm_failure_after_first_chunk_aborts_the_body() {
    let (app, _) = Harness {
        fail_on: Some("boom"),
        ..Default::default()
    }
    .build();
    let response = post_tts(app, json!({"text": "Hello\nboom", "format": "pcm"})).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .is_err());
}

#[tokio::test]
async fn slow_synthesis_times_out() {
    let config = SynthesisConfigBuilder::default()
        .request_timeout(Duration::from_millis(20))
        .build()
        .unwrap();
    let (app, _) = Harness {
        config,
        delay: Duration::from_millis(300),
        ..Default::default()
    }
    .build();
    let response = post_tts(app, json!({"text": "Hello"})).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["error"]["kind"], "timed_out");
}

#[tokio::test]
async fn concurrent_requests_all_succeed() {
    let (app, _) = app();
    let requests = (0..4).map(|_| {
        let app = app.clone();
        tokio::spawn(async move {
            let response = post_tts(app, json!({"text": "Hello world"})).await;
            assert_eq!(response.status(), StatusCode::OK);
            body_bytes(response).await
        })
    });
    let mut bodies = Vec::new();
    for handle in requests.collect::<Vec<_>>() {
        bodies.push(handle.await.unwrap());
    }
    assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test]
async fn synthesize_alias_and_field_aliases() {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    let (app, _) = app();
    let request = Request::builder()
        .method("POST")
        .uri("/synthesize")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"text": "Hola", "voice_id": "ef_dora", "lang_code": "e"}).to_string(),
        ))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_and_voices_describe_the_service() {
    let (app, _) = app();
    let response = get(app.clone(), "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["lang_code"], "a");
    assert_eq!(health["sample_rate"], 24_000);
    assert_eq!(health["default_voice"], "af_heart");

    let voices = body_json(get(app.clone(), "/voices").await).await;
    assert_eq!(
        voices["voices"],
        json!(["af_bella", "af_heart", "bf_emma", "ef_dora"])
    );
    assert_eq!(voices["default"], "af_heart");

    let index = get(app, "/").await;
    assert_eq!(index.status(), StatusCode::OK);
    let page = String::from_utf8(body_bytes(index).await).unwrap();
    assert!(page.contains("POST /tts"));
}
