//! Caption overlay construction
//!
//! Turns time-stamped transcript segments into typed overlay stages and
//! serializes them to a drawtext filter graph at the render boundary.

pub mod filter;
pub mod overlay;

pub use filter::{duration_to_frames, CaptionTrack};
pub use overlay::OverlayStage;
