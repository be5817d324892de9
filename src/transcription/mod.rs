//! Transcription boundary: segment model, retry policy, hosted model client

pub mod replicate;

pub use replicate::ReplicateClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A single time-stamped transcript segment, as delivered by the model
///
/// Segments are immutable once received and are never re-sorted locally;
/// ordering and overlap are whatever the model produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Transcribed text
    pub text: String,
    /// Speaker label, when the model provides diarization
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub speaker: Option<String>,
}

impl TranscriptSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            speaker: None,
        }
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64((self.end - self.start).max(0.0))
    }
}

/// Validate segments at the service boundary
///
/// The caption builder itself performs no validation; malformed input is
/// rejected here before any render or upload work starts.
pub fn validate_segments(segments: &[TranscriptSegment]) -> Result<(), String> {
    for (i, segment) in segments.iter().enumerate() {
        if segment.start < 0.0 || !segment.start.is_finite() {
            return Err(format!("Segment {}: negative or invalid start time", i + 1));
        }
        if !(segment.end > segment.start) {
            return Err(format!("Segment {}: end time is not after start time", i + 1));
        }
        if segment.text.trim().is_empty() {
            return Err(format!("Segment {}: empty text", i + 1));
        }
    }
    Ok(())
}

/// Transcription failure taxonomy
#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    /// The hosted model rejected our credentials (HTTP 401-class)
    #[error("Authentication failed. Please check your API token.")]
    AuthFailed,

    /// The model or its API reported a failure
    #[error("Transcription model error: {0}")]
    Model(String),

    /// Transport-level failure talking to the API
    #[error("Transcription transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The model call exceeded the configured deadline
    #[error("Transcription timed out after {0} seconds")]
    Timeout(u64),

    /// All retry attempts failed
    #[error("Transcription failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl TranscriptionError {
    pub fn is_auth(&self) -> bool {
        matches!(self, TranscriptionError::AuthFailed)
    }
}

/// Injected sleep dependency so backoff timing is testable without delays
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real clock, used everywhere outside tests
#[derive(Debug, Clone, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Run `op` up to `max_attempts` times with exponential backoff
///
/// The delay after attempt `n` is `base_delay * factor^n`, so with the
/// default base of one second and factor two the waits are 2s, 4s, 8s, ...
/// Authentication errors are surfaced immediately; retrying them cannot
/// succeed until configuration changes.
pub async fn retry_with_backoff<T, F, Fut>(
    max_attempts: u32,
    base_delay: Duration,
    factor: u32,
    sleeper: &Arc<dyn Sleeper>,
    mut op: F,
) -> Result<T, TranscriptionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TranscriptionError>>,
{
    let max_attempts = max_attempts.max(1);

    for attempt in 1..=max_attempts {
        info!("🎤 Transcription attempt {}/{}", attempt, max_attempts);

        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_auth() => return Err(err),
            Err(err) => {
                warn!("Attempt {}/{} failed: {}", attempt, max_attempts, err);

                if attempt == max_attempts {
                    return Err(TranscriptionError::RetriesExhausted {
                        attempts: max_attempts,
                        last: err.to_string(),
                    });
                }

                let backoff = base_delay * factor.saturating_pow(attempt);
                info!("⏳ Waiting {:?} before next attempt", backoff);
                sleeper.sleep(backoff).await;
            }
        }
    }

    unreachable!("retry loop returns on the final attempt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records requested sleeps instead of waiting
    #[derive(Default)]
    struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    fn sleeper() -> (Arc<RecordingSleeper>, Arc<dyn Sleeper>) {
        let recorder = Arc::new(RecordingSleeper::default());
        let dynamic: Arc<dyn Sleeper> = recorder.clone();
        (recorder, dynamic)
    }

    #[tokio::test]
    async fn test_fail_twice_then_succeed_waits_increasing_backoff() {
        let (recorder, sleeper) = sleeper();
        let attempts = Mutex::new(0u32);

        let result = retry_with_backoff(3, Duration::from_secs(1), 2, &sleeper, || {
            let n = {
                let mut guard = attempts.lock().unwrap();
                *guard += 1;
                *guard
            };
            async move {
                if n < 3 {
                    Err(TranscriptionError::Model(format!("boom {}", n)))
                } else {
                    Ok("transcript")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "transcript");
        assert_eq!(*attempts.lock().unwrap(), 3);

        let slept = recorder.slept.lock().unwrap().clone();
        assert_eq!(slept, vec![Duration::from_secs(2), Duration::from_secs(4)]);
        assert!(slept.windows(2).all(|w| w[1] > w[0]));
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_final_failure() {
        let (recorder, sleeper) = sleeper();

        let result: Result<(), _> =
            retry_with_backoff(3, Duration::from_secs(1), 2, &sleeper, || async {
                Err(TranscriptionError::Model("always down".to_string()))
            })
            .await;

        match result {
            Err(TranscriptionError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(last.contains("always down"));
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
        // No sleep after the final attempt
        assert_eq!(recorder.slept.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_auth_errors_are_not_retried() {
        let (recorder, sleeper) = sleeper();
        let attempts = Mutex::new(0u32);

        let result: Result<(), _> =
            retry_with_backoff(3, Duration::from_secs(1), 2, &sleeper, || {
                *attempts.lock().unwrap() += 1;
                async { Err(TranscriptionError::AuthFailed) }
            })
            .await;

        assert!(matches!(result, Err(TranscriptionError::AuthFailed)));
        assert_eq!(*attempts.lock().unwrap(), 1);
        assert!(recorder.slept.lock().unwrap().is_empty());
    }

    #[test]
    fn test_segment_validation() {
        let good = vec![
            TranscriptSegment::new(0.0, 2.0, "Hello"),
            TranscriptSegment::new(1.5, 3.0, "world"),
        ];
        assert!(validate_segments(&good).is_ok());

        let negative = vec![TranscriptSegment::new(-1.0, 2.0, "Hello")];
        assert!(validate_segments(&negative).unwrap_err().contains("start"));

        let inverted = vec![TranscriptSegment::new(2.0, 1.0, "Hello")];
        assert!(validate_segments(&inverted).unwrap_err().contains("end time"));

        let blank = vec![TranscriptSegment::new(0.0, 1.0, "   ")];
        assert!(validate_segments(&blank).unwrap_err().contains("empty"));
    }

    #[test]
    fn test_segment_duration() {
        let segment = TranscriptSegment::new(1.0, 3.5, "hi");
        assert_eq!(segment.duration(), Duration::from_secs_f64(2.5));
    }
}
