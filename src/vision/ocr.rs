//! OCR collaborator contract
//!
//! The engine itself is external; the core only reads text for a box of a
//! given frame and treats empty or low-confidence output as "no text".

use super::{BBox, Frame};

/// Text read from a frame region
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OcrResult {
    pub text: String,
    pub confidence: f32,
}

impl OcrResult {
    /// Result with the given text and confidence
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }

    /// The empty result engines return on failure
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when nothing was read
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Text if the engine was at least `min_confidence` sure of it
    pub fn text_above(&self, min_confidence: f32) -> Option<&str> {
        if self.is_empty() || self.confidence < min_confidence {
            None
        } else {
            Some(self.text.as_str())
        }
    }
}

/// OCR engine collaborator.
///
/// Best effort: returns an empty result on failure and never panics.
pub trait OcrEngine {
    fn read(&self, frame: &Frame, bbox: &BBox) -> OcrResult;
}
