use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output format preset name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatName {
    Landscape,
    Portrait,
    Square,
    Tiktok,
}

impl fmt::Display for FormatName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FormatName::Landscape => "landscape",
            FormatName::Portrait => "portrait",
            FormatName::Square => "square",
            FormatName::Tiktok => "tiktok",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for FormatName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "landscape" => Ok(FormatName::Landscape),
            "portrait" => Ok(FormatName::Portrait),
            "square" => Ok(FormatName::Square),
            "tiktok" => Ok(FormatName::Tiktok),
            other => Err(anyhow::anyhow!("Unknown video format: {}", other)),
        }
    }
}

/// Output video format preset
///
/// A fixed catalog entry; adding a format means adding one `VideoFormat`
/// constant here plus one `LayoutPolicy` row below.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoFormat {
    pub name: FormatName,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl VideoFormat {
    pub const LANDSCAPE: VideoFormat = VideoFormat {
        name: FormatName::Landscape,
        width: 1920,
        height: 1080,
        fps: 30,
    };

    pub const PORTRAIT: VideoFormat = VideoFormat {
        name: FormatName::Portrait,
        width: 1080,
        height: 1920,
        fps: 30,
    };

    pub const SQUARE: VideoFormat = VideoFormat {
        name: FormatName::Square,
        width: 1080,
        height: 1080,
        fps: 30,
    };

    pub const TIKTOK: VideoFormat = VideoFormat {
        name: FormatName::Tiktok,
        width: 1080,
        height: 1920,
        fps: 30,
    };

    /// Full preset catalog
    pub fn catalog() -> &'static [VideoFormat] {
        &[
            VideoFormat::LANDSCAPE,
            VideoFormat::PORTRAIT,
            VideoFormat::SQUARE,
            VideoFormat::TIKTOK,
        ]
    }

    /// Look up a preset by name
    pub fn by_name(name: FormatName) -> VideoFormat {
        match name {
            FormatName::Landscape => VideoFormat::LANDSCAPE,
            FormatName::Portrait => VideoFormat::PORTRAIT,
            FormatName::Square => VideoFormat::SQUARE,
            FormatName::Tiktok => VideoFormat::TIKTOK,
        }
    }

    /// Tall (portrait-orientation) presets get the narrow caption layout
    pub fn is_tall(&self) -> bool {
        self.height > self.width
    }

    /// Caption layout policy for this preset
    pub fn layout(&self) -> LayoutPolicy {
        if self.is_tall() {
            LayoutPolicy::TALL
        } else {
            LayoutPolicy::WIDE
        }
    }
}

/// Vertical anchor for the caption block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerticalAnchor {
    /// Centered on the frame midpoint
    Center,
    /// Biased toward 80% of frame height
    LowerThird,
}

impl VerticalAnchor {
    /// drawtext expression for the anchor line, before the block offset
    pub fn expression(&self) -> &'static str {
        match self {
            VerticalAnchor::Center => "(h/2)",
            VerticalAnchor::LowerThird => "(h*0.8)",
        }
    }
}

/// Caption layout policy, one row per format class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutPolicy {
    /// Greedy line-wrap character budget
    pub max_line_chars: usize,
    /// Caption font size in pixels
    pub font_size: u32,
    /// Line height used for spacing and block centering
    pub line_height: u32,
    /// Background box padding
    pub box_border: u32,
    /// Vertical anchor for the caption block
    pub anchor: VerticalAnchor,
}

impl LayoutPolicy {
    /// Wide formats: generous line budget, midpoint anchor
    pub const WIDE: LayoutPolicy = LayoutPolicy {
        max_line_chars: 100,
        font_size: 36,
        line_height: 10,
        box_border: 8,
        anchor: VerticalAnchor::Center,
    };

    /// Tall formats: narrow budget, larger glyphs, lower anchor
    pub const TALL: LayoutPolicy = LayoutPolicy {
        max_line_chars: 60,
        font_size: 44,
        line_height: 12,
        box_border: 10,
        anchor: VerticalAnchor::LowerThird,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_is_complete() {
        let catalog = VideoFormat::catalog();
        assert_eq!(catalog.len(), 4);
        for format in catalog {
            assert!(format.width > 0);
            assert!(format.height > 0);
            assert!(format.fps > 0);
        }
    }

    #[test]
    fn test_by_name_round_trip() {
        for format in VideoFormat::catalog() {
            assert_eq!(VideoFormat::by_name(format.name), *format);
        }
    }

    #[test]
    fn test_format_name_parsing() {
        assert_eq!("landscape".parse::<FormatName>().unwrap(), FormatName::Landscape);
        assert_eq!("tiktok".parse::<FormatName>().unwrap(), FormatName::Tiktok);
        assert!("vertical".parse::<FormatName>().is_err());
    }

    #[test]
    fn test_layout_classes() {
        assert_eq!(VideoFormat::LANDSCAPE.layout(), LayoutPolicy::WIDE);
        assert_eq!(VideoFormat::SQUARE.layout(), LayoutPolicy::WIDE);
        assert_eq!(VideoFormat::PORTRAIT.layout(), LayoutPolicy::TALL);
        assert_eq!(VideoFormat::TIKTOK.layout(), LayoutPolicy::TALL);
    }

    #[test]
    fn test_anchor_expressions() {
        assert_eq!(VerticalAnchor::Center.expression(), "(h/2)");
        assert_eq!(VerticalAnchor::LowerThird.expression(), "(h*0.8)");
    }

    #[test]
    fn test_serde_names_are_lowercase() {
        let json = serde_json::to_string(&FormatName::Tiktok).unwrap();
        assert_eq!(json, "\"tiktok\"");
        let parsed: FormatName = serde_json::from_str("\"square\"").unwrap();
        assert_eq!(parsed, FormatName::Square);
    }
}
