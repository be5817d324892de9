//! API data models

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::transcription::TranscriptSegment;

/// Render function request body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderVideoRequest {
    /// Base64-encoded audio payload
    #[serde(default)]
    pub audio_data: Option<String>,
    #[serde(default)]
    pub subtitles: Option<Vec<SubtitleItem>>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

/// One caption in the render request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleItem {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

impl From<SubtitleItem> for TranscriptSegment {
    fn from(item: SubtitleItem) -> Self {
        TranscriptSegment::new(item.start, item.end, item.text)
    }
}

/// Render function success response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderVideoResponse {
    pub video_url: String,
}

/// Transcription route success response
#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    pub segments: Vec<TranscribedSegment>,
}

/// Transcript segment as exposed over the API
#[derive(Debug, Serialize)]
pub struct TranscribedSegment {
    pub start_time: f64,
    pub end_time: f64,
    pub speaker: String,
    pub text: String,
}

impl From<TranscriptSegment> for TranscribedSegment {
    fn from(segment: TranscriptSegment) -> Self {
        Self {
            start_time: segment.start,
            end_time: segment.end,
            speaker: segment
                .speaker
                .unwrap_or_else(|| "SPEAKER_00".to_string()),
            text: segment.text,
        }
    }
}

/// Error body shared by every failing route
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// An uploaded audio file extracted from a multipart form
#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub filename: Option<String>,
}

/// API error taxonomy mapped onto HTTP status codes
#[derive(Debug)]
pub enum ApiError {
    /// Rejected before any external call
    BadRequest(String),
    /// Authentication configuration problem
    Auth(String),
    /// Upstream or processing failure
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(message)
            | ApiError::Auth(message)
            | ApiError::Internal(message) => message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.message().to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        ApiError::Internal(format!("{:#}", error))
    }
}
