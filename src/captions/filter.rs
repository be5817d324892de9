use serde::{Deserialize, Serialize};

use super::overlay::OverlayStage;
use crate::formats::VideoFormat;
use crate::transcription::TranscriptSegment;

/// Composed caption track for one render
///
/// Holds one overlay stage per transcript segment, in input order, plus the
/// format preset that fixes layout, scaling, and frame rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionTrack {
    format: VideoFormat,
    stages: Vec<OverlayStage>,
}

impl CaptionTrack {
    /// Build a track from segments; an empty segment list is a valid track
    pub fn build(segments: &[TranscriptSegment], format: VideoFormat) -> Self {
        let layout = format.layout();
        let stages = segments
            .iter()
            .map(|segment| OverlayStage::from_segment(segment, layout))
            .collect();

        Self { format, stages }
    }

    pub fn format(&self) -> VideoFormat {
        self.format
    }

    pub fn stages(&self) -> &[OverlayStage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// All overlay stages serialized and joined with the filter separator
    pub fn overlay_filter(&self, font_file: &str) -> String {
        self.stages
            .iter()
            .map(|stage| stage.to_drawtext(font_file))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Full filter_complex: scaled background, then the overlay chain
    pub fn filter_complex(&self, font_file: &str) -> String {
        let base = format!(
            "[0:v]scale={}:{},format=yuv420p",
            self.format.width, self.format.height
        );

        if self.stages.is_empty() {
            format!("{}[v]", base)
        } else {
            format!("{}[bg];[bg]{}[v]", base, self.overlay_filter(font_file))
        }
    }

    /// Raw output duration in seconds
    ///
    /// The last stage's end wins; with no stages the caller-supplied
    /// fallback (typically the measured audio length) is used.
    pub fn duration(&self, fallback_secs: f64) -> f64 {
        self.stages.last().map(|stage| stage.end).unwrap_or(fallback_secs)
    }

    /// Container duration rounded up to whole seconds
    pub fn container_duration_secs(&self, fallback_secs: f64) -> u64 {
        self.duration(fallback_secs).max(0.0).ceil() as u64
    }

    /// Output frame count for this track's preset frame rate
    pub fn frame_count(&self, fallback_secs: f64) -> u64 {
        duration_to_frames(self.duration(fallback_secs), self.format.fps)
    }
}

/// Frames needed to cover a duration at a frame rate, always rounding up
///
/// Products that land within floating-point noise of a whole frame count
/// (5.4s at 30fps is 162.000...01 in f64) are snapped before the ceiling so
/// the count never inflates by one.
pub fn duration_to_frames(duration_secs: f64, fps: u32) -> u64 {
    if duration_secs <= 0.0 {
        return 0;
    }

    let exact = duration_secs * fps as f64;
    let nearest = exact.round();
    let frames = if (exact - nearest).abs() < 1e-9 {
        nearest
    } else {
        exact.ceil()
    };

    frames as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::VideoFormat;
    use crate::transcription::TranscriptSegment;

    fn segment(start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment::new(start, end, text)
    }

    #[test]
    fn test_one_stage_per_segment_in_input_order() {
        let segments = vec![
            segment(0.0, 2.0, "first"),
            segment(2.0, 4.0, "second"),
            segment(1.0, 3.0, "third arrives out of order"),
        ];
        let track = CaptionTrack::build(&segments, VideoFormat::LANDSCAPE);

        assert_eq!(track.stages().len(), 3);
        assert_eq!(track.stages()[0].lines, vec!["first"]);
        assert_eq!(track.stages()[1].lines, vec!["second"]);
        assert_eq!(track.stages()[2].start, 1.0);
    }

    #[test]
    fn test_drawtext_stage_serialization() {
        let track = CaptionTrack::build(&[segment(0.0, 2.0, "Hello world")], VideoFormat::LANDSCAPE);
        let stage = track.stages()[0].to_drawtext("font.ttf");

        assert_eq!(
            stage,
            "drawtext=fontfile=font.ttf:\
             text='Hello world':\
             fontsize=36:\
             fontcolor=white:\
             box=1:\
             boxcolor=black@0.85:\
             boxborderw=8:\
             x=(w-text_w)/2:\
             y=(h/2)-5:\
             line_spacing=10:\
             enable='between(t,0,2)'"
        );
    }

    #[test]
    fn test_tall_format_uses_lower_anchor_and_larger_glyphs() {
        let track = CaptionTrack::build(&[segment(0.5, 3.25, "Hello world")], VideoFormat::TIKTOK);
        let stage = track.stages()[0].to_drawtext("font.ttf");

        assert!(stage.contains("fontsize=44"));
        assert!(stage.contains("boxborderw=10"));
        assert!(stage.contains("y=(h*0.8)-6"));
        assert!(stage.contains("enable='between(t,0.5,3.25)'"));
    }

    #[test]
    fn test_filter_complex_with_overlays() {
        let segments = vec![segment(0.0, 1.0, "one"), segment(1.0, 2.0, "two")];
        let track = CaptionTrack::build(&segments, VideoFormat::LANDSCAPE);
        let filter = track.filter_complex("font.ttf");

        assert!(filter.starts_with("[0:v]scale=1920:1080,format=yuv420p[bg];[bg]drawtext="));
        assert!(filter.ends_with("[v]"));
        assert_eq!(filter.matches("drawtext=").count(), 2);
        assert!(filter.contains("',drawtext="));
    }

    #[test]
    fn test_filter_complex_without_overlays() {
        let track = CaptionTrack::build(&[], VideoFormat::SQUARE);
        assert_eq!(
            track.filter_complex("font.ttf"),
            "[0:v]scale=1080:1080,format=yuv420p[v]"
        );
    }

    #[test]
    fn test_duration_from_last_segment() {
        let segments = vec![segment(0.0, 2.0, "a"), segment(2.0, 7.3, "b")];
        let track = CaptionTrack::build(&segments, VideoFormat::LANDSCAPE);

        assert_eq!(track.duration(99.0), 7.3);
        assert_eq!(track.container_duration_secs(99.0), 8);
    }

    #[test]
    fn test_empty_track_uses_fallback_duration() {
        let track = CaptionTrack::build(&[], VideoFormat::SQUARE);
        assert_eq!(track.duration(5.4), 5.4);
        assert_eq!(track.container_duration_secs(5.4), 6);
        assert_eq!(track.frame_count(5.4), 162);
    }

    #[test]
    fn test_frames_round_up() {
        assert_eq!(duration_to_frames(0.0, 30), 0);
        assert_eq!(duration_to_frames(0.001, 30), 1);
        assert_eq!(duration_to_frames(2.0, 30), 60);
        assert_eq!(duration_to_frames(5.4, 30), 162);
        assert_eq!(duration_to_frames(1.01, 30), 31);
        assert_eq!(duration_to_frames(10.0, 24), 240);
    }

    #[test]
    fn test_frames_are_monotonic() {
        let mut last = 0;
        for i in 0..600 {
            let frames = duration_to_frames(i as f64 * 0.01, 30);
            assert!(frames >= last);
            last = frames;
        }
    }

    #[test]
    fn test_hello_world_landscape_scenario() {
        // One caption, landscape 1920x1080 at 30fps
        let track = CaptionTrack::build(&[segment(0.0, 2.0, "Hello world")], VideoFormat::LANDSCAPE);

        assert_eq!(track.stages().len(), 1);
        assert_eq!(track.duration(0.0), 2.0);
        assert_eq!(track.container_duration_secs(0.0), 2);
        assert_eq!(track.frame_count(0.0), 60);
        assert!(track
            .filter_complex("font.ttf")
            .contains("enable='between(t,0,2)'"));
    }
}
