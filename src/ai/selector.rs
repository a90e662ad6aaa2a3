//! Evidence-fusion control selector
//!
//! Chooses at most one detection to click under a [`MatchPolicy`]. The
//! cascade is: filter by label/confidence/exclusion zones, take a lone
//! candidate greedily, take the bottom-most candidate when the policy prefers
//! it, and otherwise read every candidate's caption and keep the single best
//! text match. A candidate whose caption matches a forbidden string is never
//! returned.

use std::time::Duration;

use super::{Candidate, MatchPolicy};
use crate::clock::Deadline;
use crate::config::settings::SelectorSettings;
use crate::vision::text::best_match;
use crate::vision::{Detection, Frame, OcrEngine};
use crate::Toolkit;

/// Floor for the polling pause so a zero interval still lets time pass
const MIN_POLL_PAUSE: Duration = Duration::from_millis(10);

/// Bottom edges closer than this (px) sit on the same row
const SAME_ROW_EPSILON: f32 = 1.0;

/// Picks click targets from detector and OCR evidence
#[derive(Debug, Clone, Default)]
pub struct Selector {
    settings: SelectorSettings,
}

impl Selector {
    /// Create a selector with the given thresholds
    pub fn new(settings: SelectorSettings) -> Self {
        Self { settings }
    }

    /// Thresholds this selector judges with
    pub fn settings(&self) -> &SelectorSettings {
        &self.settings
    }

    /// Judge one frame. Pure apart from the OCR calls it makes.
    pub fn evaluate(
        &self,
        frame: &Frame,
        detections: &[Detection],
        policy: &MatchPolicy,
        ocr: &dyn OcrEngine,
    ) -> Option<Candidate> {
        let mut candidates: Vec<&Detection> = detections
            .iter()
            .filter(|d| policy.allows_label(&d.label))
            .filter(|d| d.confidence >= policy.min_confidence())
            .filter(|d| !policy.is_excluded(&d.bbox))
            .collect();

        if candidates.is_empty() {
            log::trace!("[{}] no candidates on frame {}", policy.tag(), frame.id);
            return None;
        }

        if policy.allow_greedy_click() {
            if candidates.len() == 1 {
                return self.greedy_pick(frame, candidates[0], policy, ocr);
            }
            if policy.prefer_bottom() {
                candidates.sort_by(|a, b| b.bbox.y1.total_cmp(&a.bbox.y1));
                return candidates
                    .into_iter()
                    .find_map(|d| self.greedy_pick(frame, d, policy, ocr));
            }
        }

        self.pick_by_text(frame, &candidates, policy, ocr)
    }

    /// Whether the policy would select something on this frame
    pub fn observed_on(
        &self,
        frame: &Frame,
        detections: &[Detection],
        policy: &MatchPolicy,
        ocr: &dyn OcrEngine,
    ) -> bool {
        self.evaluate(frame, detections, policy, ocr).is_some()
    }

    /// Capture a fresh frame and judge it once
    pub fn select_once(&self, kit: &Toolkit<'_>, policy: &MatchPolicy) -> Option<Candidate> {
        let (frame, detections) = kit.observe();
        self.evaluate(&frame, &detections, policy, kit.ocr)
    }

    /// Poll fresh frames until the policy selects something or its timeout
    /// passes. A zero timeout makes exactly one attempt.
    pub fn select(&self, kit: &Toolkit<'_>, policy: &MatchPolicy) -> Option<Candidate> {
        let deadline = Deadline::after(kit.clock, policy.timeout());
        loop {
            if let Some(candidate) = self.select_once(kit, policy) {
                log::debug!(
                    "[{}] selected {} '{}' (score {:.2})",
                    policy.tag(),
                    candidate.label(),
                    candidate.ocr_text.as_deref().unwrap_or(""),
                    candidate.adjusted_score
                );
                return Some(candidate);
            }
            if deadline.expired(kit.clock) {
                log::debug!("[{}] nothing selected within {:?}", policy.tag(), policy.timeout());
                return None;
            }
            kit.clock.sleep(
                policy
                    .poll_interval()
                    .max(MIN_POLL_PAUSE)
                    .min(deadline.remaining(kit.clock)),
            );
        }
    }

    /// Poll until the policy is satisfied, without clicking anything
    pub fn observed(&self, kit: &Toolkit<'_>, policy: &MatchPolicy) -> bool {
        self.select(kit, policy).is_some()
    }

    /// Poll until any of the policies is satisfied on a frame; returns the
    /// index of the first satisfied policy.
    pub fn wait_for_any(
        &self,
        kit: &Toolkit<'_>,
        policies: &[&MatchPolicy],
        timeout: Duration,
        poll_interval: Duration,
    ) -> Option<usize> {
        let deadline = Deadline::after(kit.clock, timeout);
        loop {
            let (frame, detections) = kit.observe();
            if let Some(index) = policies
                .iter()
                .position(|p| self.observed_on(&frame, &detections, p, kit.ocr))
            {
                return Some(index);
            }
            if deadline.expired(kit.clock) {
                return None;
            }
            kit.clock.sleep(
                poll_interval
                    .max(MIN_POLL_PAUSE)
                    .min(deadline.remaining(kit.clock)),
            );
        }
    }

    fn read_caption(&self, frame: &Frame, detection: &Detection, ocr: &dyn OcrEngine) -> String {
        ocr.read(frame, &detection.bbox)
            .text_above(self.settings.min_ocr_confidence)
            .unwrap_or_default()
            .to_string()
    }

    fn forbidden_score(&self, caption: &str, policy: &MatchPolicy) -> f32 {
        best_match(caption, policy.forbidden_texts()).map_or(0.0, |m| m.score)
    }

    fn is_vetoed(&self, expected_score: Option<f32>, forbidden_score: f32) -> bool {
        forbidden_score >= self.settings.veto_threshold
            || expected_score.is_some_and(|expected| forbidden_score > expected)
    }

    /// Take a candidate without requiring an expected caption. OCR runs only
    /// when the policy has forbidden captions to check.
    fn greedy_pick(
        &self,
        frame: &Frame,
        detection: &Detection,
        policy: &MatchPolicy,
        ocr: &dyn OcrEngine,
    ) -> Option<Candidate> {
        let mut candidate = Candidate::new(detection.clone());
        candidate.adjusted_score = detection.confidence;

        if policy.forbidden_texts().is_empty() {
            return Some(candidate);
        }

        let caption = self.read_caption(frame, detection, ocr);
        let expected = best_match(&caption, policy.expected_texts()).map(|m| m.score);
        let forbidden = self.forbidden_score(&caption, policy);
        if self.is_vetoed(expected, forbidden) {
            log::debug!(
                "[{}] vetoed '{}' (forbidden score {:.2})",
                policy.tag(),
                caption,
                forbidden
            );
            return None;
        }

        candidate.ocr_score = expected.unwrap_or(0.0);
        candidate.ocr_text = Some(caption);
        Some(candidate)
    }

    fn pick_by_text(
        &self,
        frame: &Frame,
        candidates: &[&Detection],
        policy: &MatchPolicy,
        ocr: &dyn OcrEngine,
    ) -> Option<Candidate> {
        if policy.expected_texts().is_empty() {
            log::debug!(
                "[{}] {} candidates and no caption to tell them apart",
                policy.tag(),
                candidates.len()
            );
            return None;
        }

        // (candidate, priority index of the matched caption)
        let mut scored: Vec<(Candidate, usize)> = Vec::new();
        for detection in candidates {
            let caption = self.read_caption(frame, detection, ocr);
            let Some(matched) = best_match(&caption, policy.expected_texts()) else {
                continue;
            };
            let forbidden = self.forbidden_score(&caption, policy);
            if self.is_vetoed(Some(matched.score), forbidden) {
                log::debug!(
                    "[{}] vetoed '{}' (expected {:.2}, forbidden {:.2})",
                    policy.tag(),
                    caption,
                    matched.score,
                    forbidden
                );
                continue;
            }
            if matched.score < self.settings.min_text_score {
                continue;
            }

            let mut candidate = Candidate::new((*detection).clone());
            candidate.ocr_text = Some(caption);
            candidate.ocr_score = matched.score;
            candidate.adjusted_score = matched.score;
            scored.push((candidate, matched.index));
        }

        scored.sort_by(|a, b| b.0.adjusted_score.total_cmp(&a.0.adjusted_score));
        let top_score = scored.first()?.0.adjusted_score;

        let tied: Vec<(Candidate, usize)> = scored
            .into_iter()
            .filter(|(c, _)| top_score - c.adjusted_score <= self.settings.tie_epsilon)
            .collect();
        if tied.len() == 1 {
            return tied.into_iter().next().map(|(c, _)| c);
        }

        // Tied on score: a higher-priority caption wins outright
        let best_priority = tied.iter().map(|(_, i)| *i).min()?;
        let mut leaders: Vec<Candidate> = tied
            .into_iter()
            .filter(|(_, i)| *i == best_priority)
            .map(|(c, _)| c)
            .collect();
        if leaders.len() == 1 {
            return leaders.pop();
        }

        if policy.prefer_bottom() {
            leaders.sort_by(|a, b| b.bbox().y1.total_cmp(&a.bbox().y1));
            if leaders[0].bbox().y1 - leaders[1].bbox().y1 > SAME_ROW_EPSILON {
                return leaders.into_iter().next();
            }
            log::debug!(
                "[{}] {} candidates tied on the same row at {:.2}, refusing to guess",
                policy.tag(),
                leaders.len(),
                top_score
            );
            return None;
        }

        log::debug!(
            "[{}] {} candidates tied at {:.2}, refusing to guess",
            policy.tag(),
            leaders.len(),
            top_score
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{Element, FakeGame};
    use crate::vision::labels::{BUTTON_GREEN, BUTTON_SKIP, BUTTON_WHITE};
    use crate::vision::BBox;

    fn green(x0: f32, y0: f32, text: &str) -> Element {
        Element::new(BUTTON_GREEN, BBox::new(x0, y0, x0 + 120.0, y0 + 40.0)).text(text)
    }

    #[test]
    fn test_forbidden_caption_is_never_selected() {
        let mut game = FakeGame::new();
        let screen = game.add_screen("result");
        game.add(screen, green(50.0, 600.0, "Race"));
        let kit = game.toolkit();

        let policy = MatchPolicy::builder("retry", [BUTTON_GREEN])
            .expect(["try again"])
            .forbid(["race", "next"])
            .greedy(false)
            .timeout(Duration::ZERO)
            .build()
            .unwrap();
        assert!(Selector::default().select(&kit, &policy).is_none());

        // Greedy lone candidate is still vetoed by its caption
        let greedy = MatchPolicy::builder("greedy", [BUTTON_GREEN])
            .forbid(["race"])
            .timeout(Duration::ZERO)
            .build()
            .unwrap();
        assert!(Selector::default().select(&kit, &greedy).is_none());
    }

    #[test]
    fn test_lone_candidate_fast_path_skips_ocr() {
        let mut game = FakeGame::new();
        let screen = game.add_screen("race");
        game.add(
            screen,
            Element::new(BUTTON_SKIP, BBox::new(300.0, 700.0, 380.0, 740.0)).text("Skip"),
        );
        let kit = game.toolkit();

        let policy = MatchPolicy::builder("skip", [BUTTON_SKIP])
            .timeout(Duration::ZERO)
            .build()
            .unwrap();
        let candidate = Selector::default().select(&kit, &policy).unwrap();
        assert_eq!(candidate.label(), BUTTON_SKIP);
        assert!(candidate.ocr_text.is_none());
        assert_eq!(game.ocr_calls(), 0);
    }

    #[test]
    fn test_text_match_picks_expected_caption() {
        let mut game = FakeGame::new();
        let screen = game.add_screen("loss");
        game.add(screen, green(50.0, 600.0, "Try Again"));
        game.add(screen, green(250.0, 600.0, "Next"));
        let kit = game.toolkit();

        let policy = MatchPolicy::builder("retry", [BUTTON_GREEN])
            .expect(["try again"])
            .forbid(["next"])
            .greedy(false)
            .timeout(Duration::ZERO)
            .build()
            .unwrap();
        let candidate = Selector::default().select(&kit, &policy).unwrap();
        assert_eq!(candidate.ocr_text.as_deref(), Some("Try Again"));
        assert!(candidate.ocr_score > 0.99);
    }

    #[test]
    fn test_ties_without_bottom_preference_are_ambiguous() {
        let mut game = FakeGame::new();
        let screen = game.add_screen("dialog");
        game.add(screen, green(50.0, 300.0, "OK"));
        game.add(screen, green(50.0, 600.0, "OK"));
        let kit = game.toolkit();

        let builder = MatchPolicy::builder("confirm", [BUTTON_GREEN])
            .expect(["ok"])
            .greedy(false)
            .timeout(Duration::ZERO);
        let strict = builder.clone().build().unwrap();
        assert!(Selector::default().select(&kit, &strict).is_none());

        let bottom = builder.prefer_bottom(true).build().unwrap();
        let candidate = Selector::default().select(&kit, &bottom).unwrap();
        assert_eq!(candidate.bbox().y0, 600.0);
    }

    #[test]
    fn test_same_row_tie_is_ambiguous_even_with_bottom_preference() {
        let mut game = FakeGame::new();
        let screen = game.add_screen("dialog");
        game.add(screen, green(50.0, 600.0, "OK"));
        game.add(screen, green(250.0, 600.0, "OK"));
        let kit = game.toolkit();

        let policy = MatchPolicy::builder("confirm", [BUTTON_GREEN])
            .expect(["ok"])
            .greedy(false)
            .prefer_bottom(true)
            .timeout(Duration::ZERO)
            .build()
            .unwrap();
        assert!(Selector::default().select(&kit, &policy).is_none());
        assert!(game.clicks().is_empty());
    }

    #[test]
    fn test_caption_priority_breaks_ties() {
        let mut game = FakeGame::new();
        let screen = game.add_screen("dialog");
        game.add(screen, green(50.0, 300.0, "OK"));
        game.add(screen, green(250.0, 300.0, "Use"));
        let kit = game.toolkit();

        let policy = MatchPolicy::builder("confirm", [BUTTON_GREEN])
            .expect(["use", "ok"])
            .greedy(false)
            .timeout(Duration::ZERO)
            .build()
            .unwrap();
        let candidate = Selector::default().select(&kit, &policy).unwrap();
        assert_eq!(candidate.ocr_text.as_deref(), Some("Use"));
    }

    #[test]
    fn test_prefer_bottom_greedy_takes_lowest() {
        let mut game = FakeGame::new();
        let screen = game.add_screen("dialog");
        game.add(screen, green(50.0, 300.0, "Cancel"));
        game.add(screen, green(50.0, 500.0, "Race"));
        let kit = game.toolkit();

        let policy = MatchPolicy::builder("bottom", [BUTTON_GREEN])
            .prefer_bottom(true)
            .timeout(Duration::ZERO)
            .build()
            .unwrap();
        let candidate = Selector::default().select(&kit, &policy).unwrap();
        assert_eq!(candidate.bbox().y0, 500.0);
        assert_eq!(game.ocr_calls(), 0);
    }

    #[test]
    fn test_prefer_bottom_greedy_skips_forbidden_lowest() {
        let mut game = FakeGame::new();
        let screen = game.add_screen("dialog");
        game.add(screen, green(50.0, 300.0, "Use"));
        game.add(screen, green(50.0, 600.0, "Race"));
        let kit = game.toolkit();

        let policy = MatchPolicy::builder("bottom", [BUTTON_GREEN])
            .forbid(["race"])
            .prefer_bottom(true)
            .timeout(Duration::ZERO)
            .build()
            .unwrap();
        let candidate = Selector::default().select(&kit, &policy).unwrap();
        assert_eq!(candidate.bbox().y0, 300.0);
        assert_eq!(candidate.ocr_text.as_deref(), Some("Use"));
        assert_eq!(game.ocr_calls(), 2);
    }

    #[test]
    fn test_exclusion_zone_and_confidence_filter() {
        let mut game = FakeGame::new();
        let screen = game.add_screen("menu");
        game.add(screen, green(50.0, 20.0, "Race"));
        game.add(screen, green(50.0, 600.0, "Race").confidence(0.2));
        let kit = game.toolkit();

        let policy = MatchPolicy::builder("zoned", [BUTTON_GREEN])
            .exclude(BBox::new(0.0, 0.0, 420.0, 100.0))
            .timeout(Duration::ZERO)
            .build()
            .unwrap();
        assert!(Selector::default().select(&kit, &policy).is_none());
    }

    #[test]
    fn test_select_polls_until_timeout() {
        let mut game = FakeGame::new();
        let screen = game.add_screen("empty");
        game.add(
            screen,
            Element::new(BUTTON_WHITE, BBox::new(0.0, 0.0, 10.0, 10.0)).text("Cancel"),
        );
        let kit = game.toolkit();
        let start = game.elapsed();

        let policy = MatchPolicy::builder("absent", [BUTTON_GREEN])
            .timeout(Duration::from_secs(2))
            .poll_interval(Duration::from_millis(500))
            .build()
            .unwrap();
        assert!(!Selector::default().observed(&kit, &policy));
        assert_eq!(game.elapsed() - start, Duration::from_secs(2));
        assert_eq!(game.captures(), 5);
    }
}
