use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::captions::CaptionTrack;
use crate::config::RenderConfig;
use crate::engine::{solid_background_png, MediaEngine, ProgressFn};
use crate::formats::VideoFormat;
use crate::transcription::TranscriptSegment;

/// Fixed working-file set; cleaned both before and after every render
pub const WORKING_FILES: [&str; 4] = ["background.png", "audio.mp3", "font.ttf", "output.mp4"];

struct EngineSlot {
    engine: Box<dyn MediaEngine>,
    loaded: bool,
}

/// Local render dispatch over an owned media engine
///
/// The engine loads lazily exactly once and the mutex makes "one render at
/// a time per engine" an enforced invariant rather than a caller
/// convention. Construct one per engine instance and share by reference.
pub struct LocalRenderer {
    slot: Mutex<EngineSlot>,
    font_path: PathBuf,
    x264_preset: String,
}

impl LocalRenderer {
    pub fn new(engine: Box<dyn MediaEngine>, config: &RenderConfig) -> Self {
        Self {
            slot: Mutex::new(EngineSlot {
                engine,
                loaded: false,
            }),
            font_path: config.font_path.clone(),
            x264_preset: config.x264_preset.clone(),
        }
    }

    /// Render captioned video for an audio buffer, returning the MP4 bytes
    ///
    /// `fallback_secs` supplies the output duration when `segments` is
    /// empty; with segments present the last caption's end wins.
    pub async fn render(
        &self,
        audio: &[u8],
        segments: &[TranscriptSegment],
        format: VideoFormat,
        fallback_secs: f64,
        progress: Option<ProgressFn>,
    ) -> Result<Vec<u8>> {
        let mut slot = self.slot.lock().await;

        if !slot.loaded {
            info!("🎞️  Loading media engine");
            slot.engine.load().await?;
            slot.loaded = true;
        }

        // Clear leftovers from any earlier run before writing new inputs
        Self::cleanup_working_files(slot.engine.as_mut()).await;

        let result = self
            .run_render(slot.engine.as_mut(), audio, segments, format, fallback_secs, progress)
            .await;

        Self::cleanup_working_files(slot.engine.as_mut()).await;

        result
    }

    async fn run_render(
        &self,
        engine: &mut dyn MediaEngine,
        audio: &[u8],
        segments: &[TranscriptSegment],
        format: VideoFormat,
        fallback_secs: f64,
        progress: Option<ProgressFn>,
    ) -> Result<Vec<u8>> {
        info!(
            "🎬 Starting {} render: {} segments, {} audio bytes",
            format.name,
            segments.len(),
            audio.len()
        );

        let background = solid_background_png(format.width, format.height)?;
        engine.write_input("background.png", &background).await?;
        engine.write_input("audio.mp3", audio).await?;

        let font = tokio::fs::read(&self.font_path)
            .await
            .with_context(|| format!("Failed to read font file {}", self.font_path.display()))?;
        engine.write_input("font.ttf", &font).await?;

        let track = CaptionTrack::build(segments, format);
        let duration = track.duration(fallback_secs);
        let container_secs = track.container_duration_secs(fallback_secs).to_string();
        let filter_complex = track.filter_complex("font.ttf");

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
            self.x264_preset.as_str(),
            "-c:a",
            "aac",
            "-shortest",
            "-y",
            "output.mp4",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        engine.encode(&args, duration, progress.as_ref()).await?;

        let output = engine.read_output("output.mp4").await?;
        info!("✅ Render complete: {} bytes", output.len());
        Ok(output)
    }

    /// Best-effort removal of the working-file set
    async fn cleanup_working_files(engine: &mut dyn MediaEngine) {
        for name in WORKING_FILES {
            if let Err(e) = engine.remove_file(name).await {
                warn!("Failed to delete working file {}: {:#}", name, e);
            }
        }
    }

    /// Tear down the engine working area
    pub async fn dispose(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        slot.loaded = false;
        slot.engine.dispose().await
    }
}
