use serde::{Deserialize, Serialize};

use crate::formats::LayoutPolicy;
use crate::transcription::TranscriptSegment;

/// One caption overlay stage: wrapped text plus its visibility window
///
/// The stage is a plain data record; nothing here touches the renderer
/// syntax until [`OverlayStage::to_drawtext`] is called.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayStage {
    /// Wrapped, unescaped caption lines
    pub lines: Vec<String>,
    /// Visibility window start in seconds
    pub start: f64,
    /// Visibility window end in seconds (inclusive)
    pub end: f64,
    /// Layout applied when this stage is serialized
    pub layout: LayoutPolicy,
}

impl OverlayStage {
    /// Build a stage from one transcript segment
    pub fn from_segment(segment: &TranscriptSegment, layout: LayoutPolicy) -> Self {
        Self {
            lines: wrap_lines(&segment.text, layout.max_line_chars),
            start: segment.start,
            end: segment.end,
            layout,
        }
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Upward shift keeping a multi-line block centered on its anchor
    pub fn block_offset(&self) -> f64 {
        (self.line_count() as u32 * self.layout.line_height) as f64 / 2.0
    }

    /// Escaped text with renderer line breaks between wrapped lines
    pub fn escaped_text(&self) -> String {
        self.lines
            .iter()
            .map(|line| escape_drawtext(line))
            .collect::<Vec<_>>()
            .join("\\\n")
    }

    /// Serialize this stage to a drawtext filter expression
    pub fn to_drawtext(&self, font_file: &str) -> String {
        format!(
            "drawtext=fontfile={font}:\
             text='{text}':\
             fontsize={font_size}:\
             fontcolor=white:\
             box=1:\
             boxcolor=black@0.85:\
             boxborderw={box_border}:\
             x=(w-text_w)/2:\
             y={anchor}-{offset}:\
             line_spacing={line_height}:\
             enable='between(t,{start},{end})'",
            font = font_file,
            text = self.escaped_text(),
            font_size = self.layout.font_size,
            box_border = self.layout.box_border,
            anchor = self.layout.anchor.expression(),
            offset = self.block_offset(),
            line_height = self.layout.line_height,
            start = self.start,
            end = self.end,
        )
    }
}

/// Greedily pack words into lines within a character budget
///
/// Words are never split; a word longer than the budget occupies a line of
/// its own.
pub fn wrap_lines(text: &str, max_line_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
        } else if current.len() + 1 + word.len() <= max_line_chars {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(current);
            current = word.to_string();
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }

    lines
}

/// Escape a caption line for the filter-graph string-literal syntax
///
/// The escape order is backslash, quote, brackets, colon, comma; running
/// the backslash pass first keeps the later sequences unambiguous so the
/// renderer's two-level unescape recovers the original text.
pub fn escape_drawtext(line: &str) -> String {
    let mut out = line.replace('\\', "\\\\\\\\");
    out = out.replace('\'', "'\\\\\\''");
    for bracket in ['[', ']', '(', ')', '{', '}'] {
        out = out.replace(bracket, &format!("\\\\{}", bracket));
    }
    out = out.replace(':', "\\\\:");
    out.replace(',', "\\\\,")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::LayoutPolicy;

    #[test]
    fn test_short_text_is_one_line() {
        let lines = wrap_lines("Hello world", 100);
        assert_eq!(lines, vec!["Hello world"]);
    }

    #[test]
    fn test_wrapping_preserves_word_boundaries() {
        let text = "the quick brown fox jumps over the lazy dog again and again";
        let budget = 20;
        let lines = wrap_lines(text, budget);

        assert!(lines.len() > 1);
        for line in &lines {
            assert!(line.len() <= budget, "line over budget: {:?}", line);
        }
        let rejoined = lines.join(" ");
        assert_eq!(rejoined, text);
    }

    #[test]
    fn test_overlong_word_gets_its_own_line() {
        let lines = wrap_lines("a pneumonoultramicroscopicsilicovolcanoconiosis b", 10);
        assert_eq!(
            lines,
            vec!["a", "pneumonoultramicroscopicsilicovolcanoconiosis", "b"]
        );
    }

    #[test]
    fn test_blank_text_wraps_to_nothing() {
        assert!(wrap_lines("   ", 60).is_empty());
    }

    #[test]
    fn test_escape_sequences() {
        assert_eq!(escape_drawtext("a:b"), "a\\\\:b");
        assert_eq!(escape_drawtext("a,b"), "a\\\\,b");
        assert_eq!(escape_drawtext("[hi]"), "\\\\[hi\\\\]");
        assert_eq!(escape_drawtext("(x)"), "\\\\(x\\\\)");
        assert_eq!(escape_drawtext("{y}"), "\\\\{y\\\\}");
        assert_eq!(escape_drawtext("it's"), "it'\\\\\\''s");
        assert_eq!(escape_drawtext("a\\b"), "a\\\\\\\\b");
    }

    /// Inverse of `escape_drawtext`; the quote sequence is unescaped first
    /// because it contains backslashes itself.
    fn unescape_drawtext(escaped: &str) -> String {
        let mut out = escaped.replace("'\\\\\\''", "'");
        out = out.replace("\\\\\\\\", "\\");
        for bracket in ['[', ']', '(', ')', '{', '}'] {
            out = out.replace(&format!("\\\\{}", bracket), &bracket.to_string());
        }
        out = out.replace("\\\\:", ":");
        out.replace("\\\\,", ",")
    }

    #[test]
    fn test_escape_round_trips() {
        let samples = [
            "plain text",
            "it's 10:30, let's go",
            "tags [intro] (verse) {chorus}",
            "path\\with\\backslashes",
            "mix: it's \\ [a], {b} (c)",
        ];
        for sample in samples {
            assert_eq!(unescape_drawtext(&escape_drawtext(sample)), sample);
        }
    }

    #[test]
    fn test_stage_block_offset() {
        let segment = crate::transcription::TranscriptSegment::new(0.0, 2.0, "Hello world");
        let stage = OverlayStage::from_segment(&segment, LayoutPolicy::WIDE);
        assert_eq!(stage.line_count(), 1);
        assert_eq!(stage.block_offset(), 5.0);

        let tall = OverlayStage::from_segment(&segment, LayoutPolicy::TALL);
        assert_eq!(tall.block_offset(), 6.0);
    }

    #[test]
    fn test_multiline_escaped_text_joins_with_renderer_break() {
        let stage = OverlayStage {
            lines: vec!["one".to_string(), "two".to_string()],
            start: 0.0,
            end: 1.0,
            layout: LayoutPolicy::WIDE,
        };
        assert_eq!(stage.escaped_text(), "one\\\ntwo");
    }
}
