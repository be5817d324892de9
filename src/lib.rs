/// clipcast - captioned clip video generation
///
/// Orchestration layer around hosted speech transcription and ffmpeg
/// rendering: transcript segments in, frame-accurate caption overlays and
/// MP4 video out, locally or through the HTTP render pipeline.
pub mod api;
pub mod captions;
pub mod config;
pub mod engine;
pub mod formats;
pub mod render;
pub mod storage;
pub mod transcription;

// Re-export main types for easy access
pub use crate::captions::{duration_to_frames, CaptionTrack, OverlayStage};
pub use crate::config::{Config, ConfigBuilder};
pub use crate::engine::{probe_duration, FfmpegEngine, MediaEngine, ProgressFn};
pub use crate::formats::{FormatName, LayoutPolicy, VerticalAnchor, VideoFormat};
pub use crate::render::{CloudRenderer, LocalRenderer, RenderRequest, RenderStage};
pub use crate::storage::{build_store, FsStore, GcsStore, ObjectStore};
pub use crate::transcription::{
    validate_segments, ReplicateClient, Sleeper, TokioSleeper, TranscriptSegment,
    TranscriptionError,
};
