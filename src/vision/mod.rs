//! Perception types and collaborator interfaces
//!
//! The detector, OCR engine and button-activity classifier are external
//! collaborators. This module only fixes their contracts and the geometry
//! shared by every decision function.

pub mod banner;
pub mod capture;
pub mod ocr;
pub mod text;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

pub use banner::{BannerDescriptor, BannerMatcher, BannerScore, BannerTemplate};
pub use capture::Frame;
pub use ocr::{OcrEngine, OcrResult};

/// Axis-aligned bounding box in frame pixel coordinates (x0,y0 top-left)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    /// Create a new box, normalizing the corner order
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Center point of the box
    pub fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    /// Check whether a point lies inside the box (edges inclusive)
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    /// Check whether the center of `other` lies inside this box
    pub fn contains_center_of(&self, other: &BBox) -> bool {
        let (cx, cy) = other.center();
        self.contains(cx, cy)
    }

    /// Clamp to frame bounds and convert to an integer crop rectangle
    /// `(x, y, width, height)`. Returns `None` for empty rectangles.
    pub fn to_crop_rect(
        &self,
        frame_width: u32,
        frame_height: u32,
    ) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x0.max(0.0).floor() as u32;
        let y0 = self.y0.max(0.0).floor() as u32;
        let x1 = (self.x1.max(0.0).ceil() as u32).min(frame_width);
        let y1 = (self.y1.max(0.0).ceil() as u32).min(frame_height);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0, y0, x1 - x0, y1 - y0))
    }
}

/// A labeled box produced by the object detector for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Detector class name (see [`labels`])
    pub label: String,
    pub bbox: BBox,
    /// Detector confidence in [0, 1]
    pub confidence: f32,
}

impl Detection {
    pub fn new(label: impl Into<String>, bbox: BBox, confidence: f32) -> Self {
        Self {
            label: label.into(),
            bbox,
            confidence,
        }
    }
}

/// Object detector collaborator.
///
/// Returns zero or more labeled boxes; no ordering guarantee.
pub trait Detector {
    fn detect(&self, frame: &Frame) -> Vec<Detection>;
}

/// Button-activity classifier collaborator.
///
/// Returns the probability in [0, 1] that the depicted control is clickable.
pub trait ActivityClassifier {
    fn predict_active(&self, crop: &RgbaImage) -> f32;
}

/// Detector class names used by the race flow
pub mod labels {
    /// Primary green button (race, try again, next, confirmations)
    pub const BUTTON_GREEN: &str = "button_green";
    /// Secondary white button (view results, cancel)
    pub const BUTTON_WHITE: &str = "button_white";
    /// Skip control shown during race playback and result animations
    pub const BUTTON_SKIP: &str = "button_skip";
    /// Race card container on the race list
    pub const RACE_CARD: &str = "race_card";
    /// Star icon drawn on race cards
    pub const RACE_STAR: &str = "race_star";
    /// Banner thumbnail inside a race card
    pub const RACE_BANNER: &str = "race_banner";
    /// Prefix of grade badge labels (`race_badge_g1`, `race_badge_op`, ...)
    pub const RACE_BADGE_PREFIX: &str = "race_badge_";
}

/// Vision system errors
#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    #[error("Invalid frame data: expected {expected} bytes, got {actual}")]
    InvalidFrameData { expected: usize, actual: usize },
    #[error("Failed to load image {path}: {source}")]
    ImageLoad {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("Failed to read banner directory: {0}")]
    Io(#[from] std::io::Error),
}
