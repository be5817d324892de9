//! API request handlers

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;
use tracing::info;

use super::models::{
    ApiError, AudioUpload, RenderVideoRequest, RenderVideoResponse, TranscribeResponse,
};
use super::server::AppState;
use crate::formats::{FormatName, VideoFormat};
use crate::render::RenderRequest;
use crate::transcription::{validate_segments, TranscriptSegment, TranscriptionError};

/// Handle health check requests
pub async fn health_check() -> Value {
    serde_json::json!({
        "status": "healthy",
        "service": "clipcast",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    })
}

/// Render function: decode, render, upload, return the public URL
pub async fn render_video(
    state: &AppState,
    request: RenderVideoRequest,
) -> Result<RenderVideoResponse, ApiError> {
    let (audio_data, subtitles, format) = match (
        request.audio_data,
        request.subtitles,
        request.format,
    ) {
        (Some(audio_data), Some(subtitles), Some(format)) => (audio_data, subtitles, format),
        _ => return Err(ApiError::BadRequest("Missing required fields".to_string())),
    };

    let audio = BASE64
        .decode(audio_data.as_bytes())
        .map_err(|_| ApiError::BadRequest("Invalid base64 audio data".to_string()))?;
    if audio.is_empty() {
        return Err(ApiError::BadRequest("Empty audio payload".to_string()));
    }

    let format: FormatName = format
        .parse()
        .map_err(|e: anyhow::Error| ApiError::BadRequest(e.to_string()))?;

    let segments: Vec<TranscriptSegment> = subtitles.into_iter().map(Into::into).collect();
    validate_segments(&segments).map_err(ApiError::BadRequest)?;

    // Bound concurrent renders; excess requests queue here
    let _permit = state
        .render_slots
        .acquire()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let request = RenderRequest {
        audio,
        segments,
        format: VideoFormat::by_name(format),
        filename: request.filename.unwrap_or_else(|| "audio.mp3".to_string()),
    };

    let video_url = state
        .renderer
        .render_and_upload(request)
        .await
        .map_err(ApiError::from)?;

    Ok(RenderVideoResponse { video_url })
}

/// Transcription route: validate the upload and invoke the hosted model
pub async fn transcribe(
    state: &AppState,
    upload: Option<AudioUpload>,
) -> Result<TranscribeResponse, ApiError> {
    if state.config.transcription.api_token.is_none() {
        return Err(ApiError::Internal(
            "Transcription API token is not configured".to_string(),
        ));
    }

    let upload = upload.ok_or_else(|| ApiError::BadRequest("No file provided".to_string()))?;

    if upload.bytes.is_empty() {
        return Err(ApiError::BadRequest("No file provided".to_string()));
    }
    if !upload.mime_type.starts_with("audio/") {
        return Err(ApiError::BadRequest(format!(
            "Unsupported audio type: {}",
            upload.mime_type
        )));
    }
    if upload.bytes.len() > state.config.server.max_upload_bytes {
        return Err(ApiError::BadRequest(format!(
            "File too large: {} bytes (limit {})",
            upload.bytes.len(),
            state.config.server.max_upload_bytes
        )));
    }

    info!(
        "🎤 Transcribing upload {} ({} bytes, {})",
        upload.filename.as_deref().unwrap_or("unnamed"),
        upload.bytes.len(),
        upload.mime_type
    );

    let segments = state
        .transcriber
        .transcribe(&upload.bytes, &upload.mime_type)
        .await
        .map_err(|e| match e {
            TranscriptionError::AuthFailed => ApiError::Auth(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        })?;

    Ok(TranscribeResponse {
        segments: segments.into_iter().map(Into::into).collect(),
    })
}

/// Forwarding route: base64 the upload and call the render function
pub async fn create_video(
    state: &AppState,
    audio: Option<AudioUpload>,
    subtitles: Option<String>,
    format: Option<String>,
) -> Result<RenderVideoResponse, ApiError> {
    let (audio, subtitles) = match (audio, subtitles) {
        (Some(audio), Some(subtitles)) if !audio.bytes.is_empty() => (audio, subtitles),
        _ => {
            return Err(ApiError::BadRequest(
                "Missing required files or data".to_string(),
            ))
        }
    };

    let subtitles: Value = serde_json::from_str(&subtitles)
        .map_err(|_| ApiError::BadRequest("Invalid subtitles JSON".to_string()))?;
    let format = format.unwrap_or_else(|| "landscape".to_string());

    info!("📤 Forwarding render request to {}", state.config.server.render_function_url);

    let body = serde_json::json!({
        "audioData": BASE64.encode(&audio.bytes),
        "subtitles": subtitles,
        "format": format,
        "filename": audio.filename.as_deref().unwrap_or("audio.mp3"),
    });

    let response = state
        .http
        .post(&state.config.server.render_function_url)
        .json(&body)
        .send()
        .await
        .map_err(|e| ApiError::Internal(format!("Render function unreachable: {}", e)))?;

    if !response.status().is_success() {
        return Err(ApiError::Internal(format!(
            "Render function error: HTTP {}",
            response.status()
        )));
    }

    let payload: Value = response
        .json()
        .await
        .map_err(|e| ApiError::Internal(format!("Invalid response from render function: {}", e)))?;

    let video_url = payload
        .get("videoUrl")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ApiError::Internal("Invalid response from render function".to_string())
        })?;

    Ok(RenderVideoResponse {
        video_url: video_url.to_string(),
    })
}
