use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::captions::{duration_to_frames, CaptionTrack};
use crate::config::{RenderConfig, StorageConfig};
use crate::engine::{probe_duration, solid_background_png, FfmpegEngine, MediaEngine};
use crate::formats::VideoFormat;
use crate::storage::ObjectStore;
use crate::transcription::{validate_segments, TranscriptSegment};

/// Server render pipeline stages
///
/// `Failed` is reachable from every step; there are no retries at this
/// layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderStage {
    Received,
    Validated,
    DurationMeasured,
    Bundled,
    CompositionSelected,
    Rendering,
    Uploading,
    Done,
    Failed,
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenderStage::Received => "received",
            RenderStage::Validated => "validated",
            RenderStage::DurationMeasured => "duration-measured",
            RenderStage::Bundled => "bundled",
            RenderStage::CompositionSelected => "composition-selected",
            RenderStage::Rendering => "rendering",
            RenderStage::Uploading => "uploading",
            RenderStage::Done => "done",
            RenderStage::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Parameters for exactly one server-side render invocation
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub audio: Vec<u8>,
    pub segments: Vec<TranscriptSegment>,
    pub format: VideoFormat,
    pub filename: String,
}

/// Server render pipeline: measure, render, upload, clean up
pub struct CloudRenderer {
    render_config: RenderConfig,
    storage_config: StorageConfig,
    store: Arc<dyn ObjectStore>,
}

impl CloudRenderer {
    pub fn new(
        render_config: RenderConfig,
        storage_config: StorageConfig,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            render_config,
            storage_config,
            store,
        }
    }

    /// Run the full pipeline and return the public video URL
    ///
    /// The engine working directory is removed regardless of outcome.
    pub async fn render_and_upload(&self, request: RenderRequest) -> Result<String> {
        let mut stage = RenderStage::Received;
        info!(
            "🎬 Render request received: {} ({} segments, {} audio bytes)",
            request.filename,
            request.segments.len(),
            request.audio.len()
        );

        let mut engine = FfmpegEngine::new(&self.render_config);
        let result = self.run_pipeline(&mut stage, &request, &mut engine).await;

        if let Err(e) = engine.dispose().await {
            warn!("Failed to remove working directory: {:#}", e);
        }

        match &result {
            Ok(url) => info!("🎉 Video creation complete: {}", url),
            Err(e) => {
                error!("❌ Render failed at stage '{}': {:#}", stage, e);
            }
        }

        result
    }

    async fn run_pipeline(
        &self,
        stage: &mut RenderStage,
        request: &RenderRequest,
        engine: &mut FfmpegEngine,
    ) -> Result<String> {
        *stage = RenderStage::Validated;
        if request.audio.is_empty() {
            return Err(anyhow!("Empty audio payload"));
        }
        validate_segments(&request.segments).map_err(|e| anyhow!(e))?;

        engine.load().await?;

        *stage = RenderStage::DurationMeasured;
        engine.write_input("audio.mp3", &request.audio).await?;
        let audio_path = engine.path_of("audio.mp3")?;
        let duration = probe_duration(&self.render_config.ffprobe_path, &audio_path).await?;
        info!("📊 Audio duration: {:.2}s", duration);

        *stage = RenderStage::Bundled;
        let background = solid_background_png(request.format.width, request.format.height)?;
        engine.write_input("background.png", &background).await?;
        let font = tokio::fs::read(&self.render_config.font_path).await.map_err(|e| {
            anyhow!(
                "Failed to read font file {}: {}",
                self.render_config.font_path.display(),
                e
            )
        })?;
        engine.write_input("font.ttf", &font).await?;

        *stage = RenderStage::CompositionSelected;
        let track = CaptionTrack::build(&request.segments, request.format);
        let frames = duration_to_frames(duration, request.format.fps);
        info!(
            "🎞️  Selected {} composition: {} frames at {}fps",
            request.format.name, frames, request.format.fps
        );

        *stage = RenderStage::Rendering;
        let container_secs = (duration.max(0.0).ceil() as u64).to_string();
        let filter_complex = track.filter_complex("font.ttf");
        let frame_limit = frames.to_string();
        let args: Vec<String> = [
            "-loop",
            "1",
            "-t",
            container_secs.as_str(),
            "-i",
            "background.png",
            "-i",
            "audio.mp3",
            "-filter_complex",
            filter_complex.as_str(),
            "-map",
            "[v]",
            "-map",
            "1:a",
            "-c:v",
            "libx264",
            "-preset",
            self.render_config.x264_preset.as_str(),
            "-c:a",
            "aac",
            "-frames:v",
            frame_limit.as_str(),
            "-shortest",
            "-y",
            "output.mp4",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        engine.encode(&args, duration, None).await?;

        *stage = RenderStage::Uploading;
        let output = engine.read_output("output.mp4").await?;
        let name = object_name(&request.filename, Utc::now().timestamp_millis());
        self.store
            .put(
                &name,
                output,
                "video/mp4",
                &self.storage_config.cache_control,
            )
            .await?;
        self.store.make_public(&name).await?;

        *stage = RenderStage::Done;
        Ok(self.store.public_url(&name))
    }
}

/// Collision-resistant object name: millisecond timestamp plus a sanitized
/// filename stem
pub fn object_name(filename: &str, timestamp_millis: i64) -> String {
    let stem = filename
        .rsplit_once('.')
        .map(|(stem, _ext)| stem)
        .unwrap_or(filename);

    let sanitized: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let stem = if sanitized.is_empty() {
        "audio".to_string()
    } else {
        sanitized
    };

    format!("{}_{}.mp4", timestamp_millis, stem)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        assert_eq!(RenderStage::Received.to_string(), "received");
        assert_eq!(RenderStage::DurationMeasured.to_string(), "duration-measured");
        assert_eq!(
            RenderStage::CompositionSelected.to_string(),
            "composition-selected"
        );
        assert_eq!(RenderStage::Failed.to_string(), "failed");
    }

    #[test]
    fn test_object_name_strips_extension_and_prefixes_timestamp() {
        assert_eq!(
            object_name("episode 12.mp3", 1700000000000),
            "1700000000000_episode_12.mp4"
        );
    }

    #[test]
    fn test_object_name_sanitizes_unsafe_characters() {
        assert_eq!(
            object_name("weird/name?.wav", 42),
            "42_weird_name_.mp4"
        );
        assert_eq!(object_name(".mp3", 42), "42_audio.mp4");
    }

    #[test]
    fn test_object_name_without_extension() {
        assert_eq!(object_name("raw-upload", 7), "7_raw-upload.mp4");
    }
}
