use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::TtsError;

/// A [`TtsError`] on its way out as a JSON error response.
#[derive(Debug)]
pub struct ApiError(pub TtsError);

impl From<TtsError> for ApiError {
    fn from(err: TtsError) -> Self {
        Self(err)
    }
}

pub fn status_for(err: &TtsError) -> StatusCode {
    match err {
        TtsError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        TtsError::UnsupportedLanguage(_) | TtsError::VoiceLanguageMismatch { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        TtsError::VoiceNotFound(_) => StatusCode::NOT_FOUND,
        TtsError::SynthesisFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        TtsError::TimedOut => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "kind": self.0.kind(),
                "message": self.0.to_string(),
            }
        });
        (status_for(&self.0), Json(body)).into_response()
    }
}
