//! Pre-race lobby resolution
//!
//! The lobby offers a review control ("view results", only usable once the
//! race has been run before) and the main action ("race"). The decision for
//! one frame is pure; [`LobbyResolver::resolve`] retries it over a backoff
//! schedule until it yields an action.

use std::fmt::{self, Write};

use super::FlowError;
use crate::ai::{Candidate, MatchPolicy, PolicyError, Selector};
use crate::config::settings::{LobbySettings, Vocabulary};
use crate::game::state::LobbyEntry;
use crate::vision::labels::{BUTTON_GREEN, BUTTON_WHITE};
use crate::vision::text::best_match;
use crate::vision::{ActivityClassifier, BBox, Detection, Frame, OcrEngine};
use crate::Toolkit;

/// A lobby control to click
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LobbyAction {
    /// Click the review control
    ViewResults(BBox),
    /// Click the main action
    StartRace(BBox),
}

impl LobbyAction {
    /// Box of the control to click
    pub fn bbox(&self) -> &BBox {
        match self {
            LobbyAction::ViewResults(bbox) | LobbyAction::StartRace(bbox) => bbox,
        }
    }
}

/// Outcome of judging one lobby frame
#[derive(Debug, Clone, PartialEq)]
pub enum LobbyDecision {
    /// A control is safe to click
    Act(LobbyAction),
    /// Nothing safe to click on this frame, with what was seen
    Unresolved(String),
}

/// Review control as seen on one frame
#[derive(Debug, Clone, Copy, PartialEq)]
struct ReviewState {
    bbox: BBox,
    active_probability: f32,
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "present (p_active={:.2})", self.active_probability)
    }
}

/// Decides between reviewing results and starting the race
#[derive(Debug, Clone)]
pub struct LobbyResolver {
    settings: LobbySettings,
    selector: Selector,
    review: MatchPolicy,
    action: MatchPolicy,
}

impl LobbyResolver {
    pub fn new(
        settings: LobbySettings,
        vocabulary: &Vocabulary,
        selector: Selector,
    ) -> Result<Self, PolicyError> {
        let review = MatchPolicy::builder("lobby_review", [BUTTON_WHITE])
            .expect(vocabulary.terminal_review.iter().cloned())
            .forbid(vocabulary.terminal_action.iter().cloned())
            .greedy(false)
            .min_confidence(settings.min_confidence)
            .build()?;
        let action = MatchPolicy::builder("lobby_action", [BUTTON_GREEN])
            .expect(vocabulary.terminal_action.iter().cloned())
            .forbid(vocabulary.try_again.iter().cloned())
            .greedy(false)
            .min_confidence(settings.min_confidence)
            .build()?;

        Ok(Self {
            settings,
            selector,
            review,
            action,
        })
    }

    /// Decide on one frame. Calling it twice on the same frame gives the
    /// same answer.
    pub fn decide(
        &self,
        frame: &Frame,
        detections: &[Detection],
        ocr: &dyn OcrEngine,
        classifier: &dyn ActivityClassifier,
        entry: LobbyEntry,
    ) -> LobbyDecision {
        let review = self
            .selector
            .evaluate(frame, detections, &self.review, ocr)
            .map(|candidate| self.review_state(frame, &candidate, classifier));
        let action = self
            .selector
            .evaluate(frame, detections, &self.action, ocr)
            .map(|candidate| *candidate.bbox());

        if let Some(review) = review {
            if review.active_probability >= self.settings.active_threshold {
                return LobbyDecision::Act(LobbyAction::ViewResults(review.bbox));
            }
        }

        let reason = match (review, action, entry) {
            (None, Some(_), LobbyEntry::AfterRetry)
                if !self.settings.fallback_to_action_after_retry =>
            {
                format!(
                    "frame {}: review control missing after retry, refusing main action",
                    frame.id
                )
            }
            (_, Some(bbox), _) => return LobbyDecision::Act(LobbyAction::StartRace(bbox)),
            (review, None, entry) => format!(
                "frame {}: review {}, action absent, entry {:?}",
                frame.id,
                review.map_or_else(|| "absent".to_string(), |r| r.to_string()),
                entry
            ),
        };

        LobbyDecision::Unresolved(format!(
            "{}; {}",
            reason,
            self.describe_candidates(frame, detections, ocr)
        ))
    }

    /// Observe and decide, backing off between unresolved attempts
    pub fn resolve(&self, kit: &Toolkit<'_>, entry: LobbyEntry) -> Result<LobbyAction, FlowError> {
        let mut diagnostics = String::new();
        let attempts = self.settings.backoff_ms.len() + 1;

        for attempt in 0..attempts {
            let (frame, detections) = kit.observe();
            match self.decide(&frame, &detections, kit.ocr, kit.classifier, entry) {
                LobbyDecision::Act(action) => {
                    log::info!("Lobby decision: {:?}", action);
                    return Ok(action);
                }
                LobbyDecision::Unresolved(reason) => {
                    log::debug!("Lobby attempt {} unresolved: {}", attempt + 1, reason);
                    diagnostics = reason;
                }
            }

            if let Some(&pause) = self.settings.backoff_ms.get(attempt) {
                kit.clock.sleep(std::time::Duration::from_millis(pause));
            }
        }

        log::error!(
            "Lobby unresolved after {} attempts: {}",
            attempts,
            diagnostics
        );
        Err(FlowError::LobbyUnresolved {
            attempts,
            diagnostics,
        })
    }

    /// Per-policy counts, confidences and caption scores of every detection
    /// with an allowed label
    fn describe_candidates(
        &self,
        frame: &Frame,
        detections: &[Detection],
        ocr: &dyn OcrEngine,
    ) -> String {
        let mut out = String::new();
        for policy in [&self.review, &self.action] {
            let seen: Vec<&Detection> = detections
                .iter()
                .filter(|d| policy.allows_label(&d.label))
                .collect();
            if !out.is_empty() {
                out.push_str("; ");
            }
            let _ = write!(
                out,
                "{} [{}]: {} seen",
                policy.tag(),
                policy.allowed_labels().join(", "),
                seen.len()
            );
            for detection in seen {
                let text = ocr.read(frame, &detection.bbox).text;
                let score = best_match(&text, policy.expected_texts()).map_or(0.0, |m| m.score);
                let _ = write!(
                    out,
                    " (conf {:.2}, '{}' scored {:.2})",
                    detection.confidence, text, score
                );
            }
        }
        out
    }

    fn review_state(
        &self,
        frame: &Frame,
        candidate: &Candidate,
        classifier: &dyn ActivityClassifier,
    ) -> ReviewState {
        let active_probability = frame
            .crop(candidate.bbox())
            .map_or(0.0, |crop| classifier.predict_active(&crop));
        ReviewState {
            bbox: *candidate.bbox(),
            active_probability,
        }
    }
}
