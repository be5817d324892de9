//! HTTP server implementation for the API

use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use super::handlers;
use super::models::{ApiError, AudioUpload, RenderVideoRequest};
use crate::config::Config;
use crate::render::CloudRenderer;
use crate::storage::build_store;
use crate::transcription::ReplicateClient;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub transcriber: Arc<ReplicateClient>,
    pub renderer: Arc<CloudRenderer>,
    pub render_slots: Arc<Semaphore>,
    pub http: reqwest::Client,
}

/// Configure and start the HTTP server
pub async fn start_http_server(config: Arc<Config>) -> Result<()> {
    let port = config.server.port;
    info!("🚀 Starting HTTP server on port {}", port);

    let store = build_store(&config.storage)?;
    let renderer = CloudRenderer::new(config.render.clone(), config.storage.clone(), store);
    let transcriber = ReplicateClient::new(config.transcription.clone())?;

    let app_state = AppState {
        render_slots: Arc::new(Semaphore::new(config.performance.max_concurrent_renders)),
        transcriber: Arc::new(transcriber),
        renderer: Arc::new(renderer),
        http: reqwest::Client::new(),
        config: config.clone(),
    };

    // Permissive CORS so browser front ends can call us directly
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    // Uploads arrive base64-inflated, so allow some slack over the raw limit
    let body_limit = config.server.max_upload_bytes * 2;

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/render", post(render_handler).options(preflight_handler))
        .route(
            "/api/transcribe",
            post(transcribe_handler).options(preflight_handler),
        )
        .route(
            "/api/videos",
            post(create_video_handler).options(preflight_handler),
        )
        .with_state(app_state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(body_limit)),
        );

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("🌐 API server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Preflight handler; CORS headers are attached by the layer
async fn preflight_handler() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Health check handler
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(handlers::health_check().await))
}

/// Render function handler
async fn render_handler(
    State(state): State<AppState>,
    Json(request): Json<RenderVideoRequest>,
) -> Response {
    match handlers::render_video(&state, request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Transcription route handler
async fn transcribe_handler(State(state): State<AppState>, multipart: Multipart) -> Response {
    let upload = match extract_audio_upload(multipart, &["file", "audio"]).await {
        Ok(upload) => upload,
        Err(e) => return e.into_response(),
    };

    match handlers::transcribe(&state, upload).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Forwarding route handler
async fn create_video_handler(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut audio: Option<AudioUpload> = None;
    let mut subtitles: Option<String> = None;
    let mut format: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return ApiError::BadRequest(format!("Malformed multipart body: {}", e))
                    .into_response()
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "audio" => {
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let filename = field.file_name().map(str::to_string);
                match field.bytes().await {
                    Ok(bytes) => {
                        audio = Some(AudioUpload {
                            bytes: bytes.to_vec(),
                            mime_type,
                            filename,
                        })
                    }
                    Err(e) => {
                        return ApiError::BadRequest(format!("Failed to read upload: {}", e))
                            .into_response()
                    }
                }
            }
            "subtitles" => match field.text().await {
                Ok(text) => subtitles = Some(text),
                Err(e) => {
                    return ApiError::BadRequest(format!("Failed to read subtitles: {}", e))
                        .into_response()
                }
            },
            "format" => match field.text().await {
                Ok(text) => format = Some(text),
                Err(e) => {
                    return ApiError::BadRequest(format!("Failed to read format: {}", e))
                        .into_response()
                }
            },
            _ => {}
        }
    }

    match handlers::create_video(&state, audio, subtitles, format).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Pull the first matching file field out of a multipart form
async fn extract_audio_upload(
    mut multipart: Multipart,
    field_names: &[&str],
) -> Result<Option<AudioUpload>, ApiError> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Ok(None),
            Err(e) => return Err(ApiError::BadRequest(format!("Malformed multipart body: {}", e))),
        };

        let name = field.name().unwrap_or_default().to_string();
        if !field_names.contains(&name.as_str()) {
            continue;
        }

        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let filename = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?;

        return Ok(Some(AudioUpload {
            bytes: bytes.to_vec(),
            mime_type,
            filename,
        }));
    }
}
