//! Decision engine
//!
//! Turns detector output and OCR into single, justified click targets: the
//! evidence-fusion selector for buttons and the race card resolver for the
//! race list.

pub mod policy;
pub mod resolver;
pub mod selector;

use crate::vision::{BBox, Detection};

pub use policy::{MatchPolicy, PolicyBuilder, PolicyError};
pub use resolver::{RaceResolver, Resolution, ResolutionKind};
pub use selector::Selector;

/// A detection together with the evidence gathered while judging it
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub detection: Detection,
    /// Caption read by OCR, if OCR ran
    pub ocr_text: Option<String>,
    /// Best text score against the expected captions or titles
    pub ocr_score: f32,
    /// Banner similarity, if templates were available
    pub template_score: Option<f32>,
    /// Deduction for contradicting evidence (e.g. a mismatched grade)
    pub rank_penalty: f32,
    /// Final score the candidate was ranked by
    pub adjusted_score: f32,
}

impl Candidate {
    /// Candidate with no evidence beyond the detection itself
    pub fn new(detection: Detection) -> Self {
        Self {
            detection,
            ocr_text: None,
            ocr_score: 0.0,
            template_score: None,
            rank_penalty: 0.0,
            adjusted_score: 0.0,
        }
    }

    pub fn bbox(&self) -> &BBox {
        &self.detection.bbox
    }

    pub fn label(&self) -> &str {
        &self.detection.label
    }
}
