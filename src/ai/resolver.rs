//! Race card resolver
//!
//! Finds the card of the scheduled race on the race list. Every visible card
//! is scored by its title OCR against the titles the schedule expects, with a
//! penalty for a contradicting grade badge. The best few cards get a second
//! OCR pass and a banner comparison, and the fused score decides. Races in an
//! ambiguity group must also beat every lookalike's banner by a margin.
//!
//! With nothing scheduled the card with the most stars is taken, ties going
//! to the more prestigious grade.

use super::Candidate;
use crate::config::settings::{ResolverSettings, ScanMode};
use crate::game::cards::{collect_cards, list_region, RaceCard};
use crate::game::entity::{EntityIndex, Grade};
use crate::game::state::LobbyPlan;
use crate::input::ScrollDirection;
use crate::vision::text::title_score;
use crate::vision::{BBox, BannerMatcher, BannerTemplate, Detection, Frame, OcrEngine};
use crate::Toolkit;

/// Score given to cards discarded for lack of any evidence
pub const DISCARD_SCORE: f32 = -1.0;

/// How a card was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionKind {
    /// Only one card on the first page
    SingleCard,
    /// Nothing scheduled; most stars won
    Fallback,
    /// Matched against the scheduled race
    Scheduled,
}

/// The card to click
#[derive(Debug, Clone)]
pub struct Resolution {
    pub card: RaceCard,
    pub candidate: Candidate,
    /// Zero-based list page the card was found on
    pub page: usize,
    pub kind: ResolutionKind,
}

/// What the schedule expects to find on the list
#[derive(Debug, Clone)]
pub struct RaceTarget {
    pub name: String,
    pub canonical_key: String,
    pub expected_titles: Vec<String>,
    pub expected_grade: Option<Grade>,
    /// Templates of the race and of every lookalike
    pub templates: Vec<BannerTemplate>,
}

/// One card with its fused evidence
#[derive(Debug, Clone)]
pub struct ScoredCard {
    pub card: RaceCard,
    pub candidate: Candidate,
    /// Lead of the race's banner score over the best lookalike
    pub rival_margin: Option<f32>,
    pub acceptable: bool,
}

/// Result of scoring one page
#[derive(Debug, Clone, Default)]
pub struct PageScan {
    /// Escalated cards, best first
    pub scored: Vec<ScoredCard>,
}

impl PageScan {
    /// Best card that cleared every acceptance rule
    pub fn accepted(&self) -> Option<&ScoredCard> {
        self.scored.iter().find(|s| s.acceptable)
    }
}

/// Picks the scheduled race's card on the race list
pub struct RaceResolver<'a> {
    index: &'a EntityIndex,
    matcher: &'a BannerMatcher,
    settings: ResolverSettings,
    min_ocr_confidence: f32,
}

impl<'a> RaceResolver<'a> {
    /// Resolver over a race index and its registered banners
    pub fn new(
        index: &'a EntityIndex,
        matcher: &'a BannerMatcher,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            index,
            matcher,
            settings,
            min_ocr_confidence: 0.2,
        }
    }

    /// Minimum OCR confidence for a title reading to count
    pub fn with_min_ocr_confidence(mut self, min_ocr_confidence: f32) -> Self {
        self.min_ocr_confidence = min_ocr_confidence;
        self
    }

    /// Settings this resolver scores with
    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Expected titles, grade and banners of the planned race
    pub fn target_for(&self, plan: &LobbyPlan) -> Option<RaceTarget> {
        let name = plan.planned_entity_name.as_deref()?;
        let canonical_key = plan.canonical_key()?;
        let date_key = plan.date_key.as_deref();

        Some(RaceTarget {
            name: name.to_string(),
            canonical_key,
            expected_titles: self.index.expected_titles(name, date_key),
            expected_grade: self.index.expected_grade(name, date_key),
            templates: self.index.banner_templates_for_group(name),
        })
    }

    /// Find the card to click, scrolling the list as needed
    pub fn resolve(&self, kit: &Toolkit<'_>, plan: &LobbyPlan) -> Option<Resolution> {
        let (frame, detections) = kit.observe();
        let cards = collect_cards(&detections, self.settings.card_min_confidence);

        if cards.len() == 1 {
            log::info!("Single race card visible, selecting it");
            return cards
                .into_iter()
                .next()
                .map(|card| Self::unscored(card, 0, ResolutionKind::SingleCard));
        }

        let Some(target) = self.target_for(plan) else {
            let pick = Self::fallback_pick(&cards).cloned();
            if let Some(card) = &pick {
                log::info!(
                    "No race scheduled, taking card with {} stars ({:?})",
                    card.stars,
                    card.grade()
                );
            }
            return pick.map(|card| Self::unscored(card, 0, ResolutionKind::Fallback));
        };

        log::info!(
            "Looking for '{}' ({} titles, {} banner templates)",
            target.name,
            target.expected_titles.len(),
            target.templates.len()
        );

        match self.settings.scan_mode {
            ScanMode::PageGreedy => self.scan_greedy(kit, &target, frame, detections),
            ScanMode::Global => self.scan_global(kit, &target, frame, detections),
        }
    }

    /// Most stars, then most prestigious grade, then topmost
    pub fn fallback_pick(cards: &[RaceCard]) -> Option<&RaceCard> {
        let key = |card: &RaceCard| (card.stars, card.grade().map_or(0, |g| g.prestige() + 1));
        cards
            .iter()
            .reduce(|best, card| if key(card) > key(best) { card } else { best })
    }

    /// Score every card of one frame against the target
    pub fn score_page(
        &self,
        frame: &Frame,
        detections: &[Detection],
        ocr: &dyn OcrEngine,
        target: &RaceTarget,
    ) -> PageScan {
        let cards = collect_cards(detections, self.settings.card_min_confidence);
        let mut scored: Vec<ScoredCard> = cards
            .into_iter()
            .map(|card| self.score_title(frame, ocr, target, card))
            .collect();

        scored.sort_by(|a, b| {
            b.candidate
                .adjusted_score
                .total_cmp(&a.candidate.adjusted_score)
        });
        scored.truncate(self.settings.top_k.max(1));

        for card in &mut scored {
            self.escalate(frame, ocr, target, card);
        }

        scored.sort_by(|a, b| {
            b.candidate
                .adjusted_score
                .total_cmp(&a.candidate.adjusted_score)
        });
        PageScan { scored }
    }

    fn read(&self, ocr: &dyn OcrEngine, frame: &Frame, region: &BBox) -> String {
        ocr.read(frame, region)
            .text_above(self.min_ocr_confidence)
            .unwrap_or_default()
            .to_string()
    }

    fn best_title_score(text: &str, titles: &[String]) -> f32 {
        titles
            .iter()
            .map(|title| title_score(text, title))
            .fold(0.0, f32::max)
    }

    /// First pass: title OCR and grade badge
    fn score_title(
        &self,
        frame: &Frame,
        ocr: &dyn OcrEngine,
        target: &RaceTarget,
        card: RaceCard,
    ) -> ScoredCard {
        let text = self.read(ocr, frame, &card.title_region());
        let ocr_score = Self::best_title_score(&text, &target.expected_titles);
        let penalty = match (card.grade(), target.expected_grade) {
            (Some(shown), Some(expected)) if shown != expected => self.settings.rank_penalty,
            _ => 0.0,
        };

        let mut candidate = Candidate::new(card.detection.clone());
        candidate.ocr_text = (!text.is_empty()).then_some(text);
        candidate.ocr_score = ocr_score;
        candidate.rank_penalty = penalty;
        candidate.adjusted_score = ocr_score - penalty;

        ScoredCard {
            card,
            candidate,
            rival_margin: None,
            acceptable: false,
        }
    }

    /// Second pass: second OCR region and banner fusion
    fn escalate(
        &self,
        frame: &Frame,
        ocr: &dyn OcrEngine,
        target: &RaceTarget,
        scored: &mut ScoredCard,
    ) {
        let s = &self.settings;

        let second = self.read(ocr, frame, &scored.card.banner_text_region());
        if !second.is_empty() {
            let second_score = Self::best_title_score(&second, &target.expected_titles);
            if second_score > scored.candidate.ocr_score {
                scored.candidate.ocr_score = second_score;
            }
        }
        let ocr_score = scored.candidate.ocr_score;
        let penalty = scored.candidate.rank_penalty;

        let banner_scores = if target.templates.is_empty() {
            Vec::new()
        } else {
            frame
                .crop(&scored.card.banner_region())
                .map(|crop| self.matcher.score_against(&crop, &target.templates))
                .unwrap_or_default()
        };
        let own = banner_scores
            .iter()
            .find(|b| b.canonical_key == target.canonical_key)
            .map(|b| b.score);
        let rival = banner_scores
            .iter()
            .filter(|b| b.canonical_key != target.canonical_key)
            .map(|b| b.score)
            .reduce(f32::max);

        let fused = match own {
            Some(banner) => {
                let weight = if banner >= s.high_confidence_banner {
                    s.high_confidence_banner_weight
                } else {
                    s.banner_weight
                };
                weight * banner + (1.0 - weight) * ocr_score - penalty
            }
            None => ocr_score - penalty,
        };

        scored.candidate.template_score = own;
        scored.rival_margin = own.zip(rival).map(|(own, rival)| own - rival);

        if ocr_score < s.ocr_discard_floor && own.unwrap_or(0.0) < s.banner_discard_floor {
            log::debug!(
                "Discarding card at y={:.0}: title {:.2}, banner {:.2}",
                scored.card.bbox().y0,
                ocr_score,
                own.unwrap_or(0.0)
            );
            scored.candidate.adjusted_score = DISCARD_SCORE;
            scored.acceptable = false;
            return;
        }

        scored.candidate.adjusted_score = fused;
        let clears_group = scored.rival_margin.map_or(true, |m| m >= s.group_margin);
        if !clears_group {
            log::debug!(
                "Card '{}' leads its lookalikes by only {:.3}, not committing",
                scored.candidate.ocr_text.as_deref().unwrap_or(""),
                scored.rival_margin.unwrap_or_default()
            );
        }
        scored.acceptable = fused >= s.accept_threshold && clears_group;
    }

    fn scroll(
        &self,
        kit: &Toolkit<'_>,
        frame: &Frame,
        detections: &[Detection],
        direction: ScrollDirection,
    ) {
        let cards = collect_cards(detections, self.settings.card_min_confidence);
        let (width, height) = frame.dimensions();
        let region = list_region(&cards)
            .unwrap_or_else(|| BBox::new(0.0, 0.0, width as f32, height as f32));
        kit.input.scroll(&region, direction);
        kit.clock.sleep(self.settings.scroll_settle());
    }

    /// Accept the first page with an acceptable card
    fn scan_greedy(
        &self,
        kit: &Toolkit<'_>,
        target: &RaceTarget,
        mut frame: Frame,
        mut detections: Vec<Detection>,
    ) -> Option<Resolution> {
        for page in 0..self.settings.max_pages.max(1) {
            if page > 0 {
                self.scroll(kit, &frame, &detections, ScrollDirection::Down);
                (frame, detections) = kit.observe();
            }

            let scan = self.score_page(&frame, &detections, kit.ocr, target);
            if let Some(best) = scan.accepted() {
                log::info!(
                    "Found '{}' on page {} (score {:.2})",
                    target.name,
                    page,
                    best.candidate.adjusted_score
                );
                return Some(Self::scored(best, page));
            }
            log::debug!("Page {} has no acceptable card for '{}'", page, target.name);
        }

        log::warn!("'{}' not found in {} pages", target.name, self.settings.max_pages);
        None
    }

    /// Score every page, then scroll back to the best one and re-identify it
    fn scan_global(
        &self,
        kit: &Toolkit<'_>,
        target: &RaceTarget,
        mut frame: Frame,
        mut detections: Vec<Detection>,
    ) -> Option<Resolution> {
        let pages = self.settings.max_pages.max(1);
        let mut best: Option<(usize, f32)> = None;

        for page in 0..pages {
            if page > 0 {
                self.scroll(kit, &frame, &detections, ScrollDirection::Down);
                (frame, detections) = kit.observe();
            }
            let scan = self.score_page(&frame, &detections, kit.ocr, target);
            if let Some(accepted) = scan.accepted() {
                let score = accepted.candidate.adjusted_score;
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some((page, score));
                }
            }
        }

        let Some((best_page, best_score)) = best else {
            log::warn!("'{}' not found in {} pages", target.name, pages);
            return None;
        };

        for _ in best_page..pages - 1 {
            self.scroll(kit, &frame, &detections, ScrollDirection::Up);
            (frame, detections) = kit.observe();
        }

        let scan = self.score_page(&frame, &detections, kit.ocr, target);
        match scan.accepted() {
            Some(found) => {
                log::info!(
                    "Returned to page {} for '{}' (score {:.2}, scanned {:.2})",
                    best_page,
                    target.name,
                    found.candidate.adjusted_score,
                    best_score
                );
                Some(Self::scored(found, best_page))
            }
            None => {
                log::warn!(
                    "Lost '{}' after scrolling back to page {}",
                    target.name,
                    best_page
                );
                None
            }
        }
    }

    fn scored(scored: &ScoredCard, page: usize) -> Resolution {
        Resolution {
            card: scored.card.clone(),
            candidate: scored.candidate.clone(),
            page,
            kind: ResolutionKind::Scheduled,
        }
    }

    fn unscored(card: RaceCard, page: usize, kind: ResolutionKind) -> Resolution {
        let mut candidate = Candidate::new(card.detection.clone());
        candidate.adjusted_score = card.stars as f32;
        Resolution {
            card,
            candidate,
            page,
            kind,
        }
    }
}
