//! Hosted prediction-API client for speech transcription
//!
//! Submits audio as a base64 data URL, creates a prediction, polls it to a
//! terminal state, and normalizes the model output into transcript segments.
//! Every call re-invokes the model; nothing is cached.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{retry_with_backoff, Sleeper, TokioSleeper, TranscriptSegment, TranscriptionError};
use crate::config::TranscriptionConfig;

/// Model input knobs carried over from the production route
const LANGUAGE_DETECTION_MIN_PROB: f64 = 0.0;
const LANGUAGE_DETECTION_MAX_TRIES: u32 = 5;
const VAD_ONSET: f64 = 0.5;
const VAD_OFFSET: f64 = 0.363;

/// Fallback speaker label when the model omits diarization
const DEFAULT_SPEAKER: &str = "SPEAKER_00";

/// Client for a Replicate-style prediction API
pub struct ReplicateClient {
    config: TranscriptionConfig,
    client: reqwest::Client,
    sleeper: Arc<dyn Sleeper>,
}

impl ReplicateClient {
    /// Create a new client from configuration
    pub fn new(config: TranscriptionConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connection_timeout))
            .build()?;

        Ok(Self {
            config,
            client,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replace the sleep dependency (test hook)
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Transcribe an audio buffer, retrying with exponential backoff
    ///
    /// Segments are returned in the order the model delivered them.
    pub async fn transcribe(
        &self,
        audio: &[u8],
        mime_type: &str,
    ) -> Result<Vec<TranscriptSegment>, TranscriptionError> {
        if self.config.api_token.is_none() {
            return Err(TranscriptionError::AuthFailed);
        }
        let version = self.model_version()?;
        let data_url = audio_data_url(mime_type, audio);

        info!(
            "🎤 Submitting {} byte audio payload for transcription",
            audio.len()
        );

        let deadline = Duration::from_secs(self.config.request_timeout);
        let timeout_secs = self.config.request_timeout;
        let client = self;
        let version: &str = &version;
        let data_url: &str = &data_url;

        retry_with_backoff(
            self.config.max_retries,
            Duration::from_millis(self.config.backoff_base_ms),
            self.config.backoff_factor,
            &self.sleeper,
            move || async move {
                match tokio::time::timeout(deadline, client.run_prediction(version, data_url)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(TranscriptionError::Timeout(timeout_secs)),
                }
            },
        )
        .await
    }

    /// Create one prediction and poll it to completion
    async fn run_prediction(
        &self,
        version: &str,
        data_url: &str,
    ) -> Result<Vec<TranscriptSegment>, TranscriptionError> {
        let request = CreatePrediction {
            version,
            input: PredictionInput {
                audio_file: data_url,
                language_detection_min_prob: LANGUAGE_DETECTION_MIN_PROB,
                language_detection_max_tries: LANGUAGE_DETECTION_MAX_TRIES,
                vad_onset: VAD_ONSET,
                vad_offset: VAD_OFFSET,
            },
        };

        let url = format!("{}/predictions", self.config.api_url.trim_end_matches('/'));
        debug!("Creating prediction at {}", url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header()?)
            .json(&request)
            .send()
            .await?;

        let mut prediction = self.parse_prediction_response(response).await?;

        // Poll until the prediction reaches a terminal state
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        while !prediction.is_terminal() {
            self.sleeper.sleep(poll_interval).await;

            let poll_url = prediction
                .urls
                .as_ref()
                .map(|urls| urls.get.clone())
                .unwrap_or_else(|| {
                    format!(
                        "{}/predictions/{}",
                        self.config.api_url.trim_end_matches('/'),
                        prediction.id
                    )
                });

            let response = self
                .client
                .get(&poll_url)
                .header("Authorization", self.auth_header()?)
                .send()
                .await?;
            prediction = self.parse_prediction_response(response).await?;
            debug!("Prediction {} status: {}", prediction.id, prediction.status);
        }

        if prediction.status != "succeeded" {
            let detail = prediction
                .error
                .unwrap_or_else(|| format!("prediction {}", prediction.status));
            return Err(TranscriptionError::Model(detail));
        }

        let output = prediction
            .output
            .ok_or_else(|| TranscriptionError::Model("No output received from model".to_string()))?;

        let segments = normalize_segments(output.segments);
        info!("✅ Transcription produced {} segments", segments.len());
        Ok(segments)
    }

    async fn parse_prediction_response(
        &self,
        response: reqwest::Response,
    ) -> Result<Prediction, TranscriptionError> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(TranscriptionError::AuthFailed);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(TranscriptionError::Model(format!(
                "API error {}: {}",
                status, text
            )));
        }
        Ok(response.json::<Prediction>().await?)
    }

    fn auth_header(&self) -> Result<String, TranscriptionError> {
        let token = self
            .config
            .api_token
            .as_deref()
            .ok_or(TranscriptionError::AuthFailed)?;
        Ok(format!("Token {}", token))
    }

    /// Version hash from the configured `owner/name:version` endpoint
    fn model_version(&self) -> Result<String, TranscriptionError> {
        let endpoint = self.config.endpoint.as_deref().ok_or_else(|| {
            TranscriptionError::Model("Transcription endpoint is not configured".to_string())
        })?;
        let (_owner, _name, version) = parse_endpoint(endpoint)?;
        Ok(version)
    }
}

/// Parse an `owner/name:version` model endpoint
pub(crate) fn parse_endpoint(endpoint: &str) -> Result<(String, String, String), TranscriptionError> {
    let (model_path, version) = endpoint.split_once(':').ok_or_else(|| {
        TranscriptionError::Model(format!(
            "Invalid endpoint format '{}'. Expected owner/name:version",
            endpoint
        ))
    })?;
    let (owner, name) = model_path.split_once('/').ok_or_else(|| {
        TranscriptionError::Model(format!(
            "Invalid endpoint format '{}'. Expected owner/name:version",
            endpoint
        ))
    })?;
    if owner.is_empty() || name.is_empty() || version.is_empty() {
        return Err(TranscriptionError::Model(format!(
            "Invalid endpoint format '{}'. Expected owner/name:version",
            endpoint
        )));
    }
    Ok((owner.to_string(), name.to_string(), version.to_string()))
}

/// Base64 data URL for an audio payload
pub fn audio_data_url(mime_type: &str, audio: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, BASE64.encode(audio))
}

fn normalize_segments(raw: Vec<RawSegment>) -> Vec<TranscriptSegment> {
    raw.into_iter()
        .map(|segment| TranscriptSegment {
            start: segment.start,
            end: segment.end,
            text: segment.text.trim().to_string(),
            speaker: Some(
                segment
                    .speaker
                    .unwrap_or_else(|| DEFAULT_SPEAKER.to_string()),
            ),
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct CreatePrediction<'a> {
    version: &'a str,
    input: PredictionInput<'a>,
}

#[derive(Debug, Serialize)]
struct PredictionInput<'a> {
    audio_file: &'a str,
    language_detection_min_prob: f64,
    language_detection_max_tries: u32,
    vad_onset: f64,
    vad_offset: f64,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    urls: Option<PredictionUrls>,
    #[serde(default)]
    output: Option<PredictionOutput>,
    #[serde(default)]
    error: Option<String>,
}

impl Prediction {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    get: String,
}

#[derive(Debug, Deserialize)]
struct PredictionOutput {
    #[serde(default)]
    segments: Vec<RawSegment>,
}

#[derive(Debug, Deserialize)]
struct RawSegment {
    start: f64,
    end: f64,
    text: String,
    #[serde(default)]
    speaker: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_parsing() {
        let (owner, name, version) = parse_endpoint("acme/whisper-diarize:abc123").unwrap();
        assert_eq!(owner, "acme");
        assert_eq!(name, "whisper-diarize");
        assert_eq!(version, "abc123");

        assert!(parse_endpoint("acme/whisper-diarize").is_err());
        assert!(parse_endpoint("whisper:abc").is_err());
        assert!(parse_endpoint("acme/:abc").is_err());
    }

    #[test]
    fn test_audio_data_url() {
        let url = audio_data_url("audio/mpeg", b"abc");
        assert_eq!(url, "data:audio/mpeg;base64,YWJj");
    }

    #[test]
    fn test_prediction_deserialization() {
        let json = r#"{
            "id": "p1",
            "status": "succeeded",
            "urls": {"get": "https://api.example.com/v1/predictions/p1"},
            "output": {
                "segments": [
                    {"start": 0.0, "end": 2.4, "text": " Hello there ", "speaker": "SPEAKER_01"},
                    {"start": 2.4, "end": 4.0, "text": "General"}
                ]
            }
        }"#;
        let prediction: Prediction = serde_json::from_str(json).unwrap();
        assert!(prediction.is_terminal());

        let segments = normalize_segments(prediction.output.unwrap().segments);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "Hello there");
        assert_eq!(segments[0].speaker.as_deref(), Some("SPEAKER_01"));
        assert_eq!(segments[1].speaker.as_deref(), Some("SPEAKER_00"));
    }

    #[test]
    fn test_pending_prediction_is_not_terminal() {
        let json = r#"{"id": "p2", "status": "processing"}"#;
        let prediction: Prediction = serde_json::from_str(json).unwrap();
        assert!(!prediction.is_terminal());
        assert!(prediction.output.is_none());
    }
}
