// Size policy: the fixed family of variants rendered for every upload,
// and the pure arithmetic that decides each variant's pixel dimensions.

use serde::Serialize;
use std::fmt;

/// One of the five rendering policies. Each label also names the storage
/// subdirectory its variants are written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SizeLabel {
    #[serde(rename = "original")]
    Original,
    #[serde(rename = "256")]
    Small,
    #[serde(rename = "512")]
    Medium,
    #[serde(rename = "1024")]
    Large,
    #[serde(rename = "2048")]
    ExtraLarge,
}

impl SizeLabel {
    /// Every label, in rendering order.
    pub const ALL: [SizeLabel; 5] = [
        SizeLabel::Original,
        SizeLabel::Small,
        SizeLabel::Medium,
        SizeLabel::Large,
        SizeLabel::ExtraLarge,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SizeLabel::Original => "original",
            SizeLabel::Small => "256",
            SizeLabel::Medium => "512",
            SizeLabel::Large => "1024",
            SizeLabel::ExtraLarge => "2048",
        }
    }

    /// Target long edge in pixels, or `None` for the unresized original.
    pub fn long_edge(self) -> Option<u32> {
        match self {
            SizeLabel::Original => None,
            SizeLabel::Small => Some(256),
            SizeLabel::Medium => Some(512),
            SizeLabel::Large => Some(1024),
            SizeLabel::ExtraLarge => Some(2048),
        }
    }

    pub fn from_segment(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|label| label.as_str() == segment)
    }
}

impl fmt::Display for SizeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the renderer has to do for one label and one source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePlan {
    /// Re-encode the decoded pixels as they are, at maximum quality.
    Unscaled,
    /// Resample into a `width` x `height` box.
    Scaled { width: u32, height: u32 },
}

/// Decide how `label` is rendered for a `width` x `height` source.
///
/// Images are never upscaled: a target at or above the source's long edge
/// is rendered exactly like the original.
pub fn plan_for(label: SizeLabel, width: u32, height: u32) -> ResizePlan {
    let Some(target) = label.long_edge() else {
        return ResizePlan::Unscaled;
    };

    if target >= width.max(height) {
        return ResizePlan::Unscaled;
    }

    let (width, height) = fit_long_edge(width, height, target);
    ResizePlan::Scaled { width, height }
}

/// Dimensions of the box whose long edge is `target`, keeping the source's
/// aspect ratio. Neither side collapses below one pixel.
pub fn fit_long_edge(width: u32, height: u32, target: u32) -> (u32, u32) {
    let aspect_ratio = width as f64 / height as f64;

    if aspect_ratio >= 1.0 {
        // Landscape or square
        let h = (target as f64 / aspect_ratio).round() as u32;
        (target, h.max(1))
    } else {
        // Portrait
        let w = (target as f64 * aspect_ratio).round() as u32;
        (w.max(1), target)
    }
}
