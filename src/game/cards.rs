//! Race cards on the race list
//!
//! A race card is assembled from several detections of one frame: the card
//! container, the star icons and grade badge inside it, and optionally its
//! banner thumbnail. Text regions are derived from that geometry.

use crate::vision::labels::{RACE_BANNER, RACE_CARD, RACE_STAR};
use crate::vision::{BBox, Detection};

use super::entity::Grade;

/// Share of the card width covered by the banner when it is not detected
const BANNER_WIDTH_FRACTION: f32 = 0.38;

/// Grade badge found inside a card
#[derive(Debug, Clone, PartialEq)]
pub struct Badge {
    pub grade: Grade,
    pub bbox: BBox,
}

/// One race card of the current frame
#[derive(Debug, Clone, PartialEq)]
pub struct RaceCard {
    /// The card container detection
    pub detection: Detection,
    /// Number of star icons inside the card
    pub stars: u32,
    pub badge: Option<Badge>,
    /// Detected banner thumbnail, if any
    pub banner: Option<BBox>,
}

impl RaceCard {
    pub fn bbox(&self) -> &BBox {
        &self.detection.bbox
    }

    /// Banner thumbnail, or the left part of the card when not detected
    pub fn banner_region(&self) -> BBox {
        if let Some(banner) = self.banner {
            return banner;
        }
        let card = self.bbox();
        BBox::new(
            card.x0,
            card.y0,
            card.x0 + card.width() * BANNER_WIDTH_FRACTION,
            card.y1,
        )
    }

    /// Region holding the race title, right of the grade badge
    pub fn title_region(&self) -> BBox {
        let card = *self.bbox();
        match &self.badge {
            Some(badge) => {
                let pad = badge.bbox.height() * 0.15;
                BBox::new(
                    badge.bbox.x1,
                    (badge.bbox.y0 - pad).max(card.y0),
                    card.x1,
                    (badge.bbox.y1 + pad).min(card.y1),
                )
            }
            None => {
                let banner = self.banner_region();
                BBox::new(banner.x1, card.y0, card.x1, card.y0 + card.height() * 0.5)
            }
        }
    }

    /// Text region beside the banner, below the title row
    pub fn banner_text_region(&self) -> BBox {
        let card = *self.bbox();
        let banner = self.banner_region();
        BBox::new(banner.x1, card.y0 + card.height() * 0.5, card.x1, card.y1)
    }

    pub fn grade(&self) -> Option<Grade> {
        self.badge.as_ref().map(|b| b.grade)
    }
}

/// Assemble race cards from one frame's detections, top to bottom
pub fn collect_cards(detections: &[Detection], min_confidence: f32) -> Vec<RaceCard> {
    let mut cards: Vec<RaceCard> = detections
        .iter()
        .filter(|d| d.label == RACE_CARD && d.confidence >= min_confidence)
        .map(|card| {
            let inside = |d: &&Detection| card.bbox.contains_center_of(&d.bbox);

            let stars = detections
                .iter()
                .filter(|d| d.label == RACE_STAR)
                .filter(inside)
                .count() as u32;

            let badge = detections
                .iter()
                .filter(inside)
                .filter_map(|d| {
                    Grade::from_label(&d.label).map(|grade| (grade, d.bbox, d.confidence))
                })
                .max_by(|a, b| a.2.total_cmp(&b.2))
                .map(|(grade, bbox, _)| Badge { grade, bbox });

            let banner = detections
                .iter()
                .filter(|d| d.label == RACE_BANNER)
                .filter(inside)
                .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
                .map(|d| d.bbox);

            RaceCard {
                detection: card.clone(),
                stars,
                badge,
                banner,
            }
        })
        .collect();

    cards.sort_by(|a, b| a.bbox().y0.total_cmp(&b.bbox().y0));
    cards
}

/// Smallest box covering every card, used as the scroll region
pub fn list_region(cards: &[RaceCard]) -> Option<BBox> {
    let first = cards.first()?.bbox();
    Some(cards.iter().skip(1).fold(*first, |acc, card| {
        let b = card.bbox();
        BBox::new(acc.x0.min(b.x0), acc.y0.min(b.y0), acc.x1.max(b.x1), acc.y1.max(b.y1))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: &str, x0: f32, y0: f32, x1: f32, y1: f32) -> Detection {
        Detection::new(label, BBox::new(x0, y0, x1, y1), 0.9)
    }

    #[test]
    fn test_collect_cards_assigns_children() {
        let detections = vec![
            det(RACE_CARD, 0.0, 100.0, 400.0, 180.0),
            det(RACE_CARD, 0.0, 0.0, 400.0, 80.0),
            det(RACE_STAR, 300.0, 60.0, 310.0, 70.0),
            det(RACE_STAR, 315.0, 60.0, 325.0, 70.0),
            det(RACE_STAR, 300.0, 160.0, 310.0, 170.0),
            det("race_badge_g1", 160.0, 5.0, 190.0, 25.0),
            det("race_badge_op", 160.0, 105.0, 190.0, 125.0),
            det(RACE_BANNER, 5.0, 105.0, 150.0, 175.0),
        ];

        let cards = collect_cards(&detections, 0.5);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].bbox().y0, 0.0);
        assert_eq!(cards[0].stars, 2);
        assert_eq!(cards[0].grade(), Some(Grade::G1));
        assert!(cards[0].banner.is_none());
        assert_eq!(cards[1].stars, 1);
        assert_eq!(cards[1].grade(), Some(Grade::Op));
        assert_eq!(cards[1].banner_region(), BBox::new(5.0, 105.0, 150.0, 175.0));
    }

    #[test]
    fn test_low_confidence_cards_are_ignored() {
        let detections = vec![Detection::new(RACE_CARD, BBox::new(0.0, 0.0, 10.0, 10.0), 0.2)];
        assert!(collect_cards(&detections, 0.5).is_empty());
    }

    #[test]
    fn test_title_region_follows_badge() {
        let detections = vec![
            det(RACE_CARD, 0.0, 0.0, 400.0, 80.0),
            det("race_badge_g2", 160.0, 10.0, 190.0, 30.0),
        ];
        let card = &collect_cards(&detections, 0.5)[0];
        let title = card.title_region();
        assert_eq!(title.x0, 190.0);
        assert_eq!(title.x1, 400.0);
        assert!(title.y0 < 10.0 && title.y1 > 30.0);
    }

    #[test]
    fn test_regions_without_badge_or_banner() {
        let detections = vec![det(RACE_CARD, 0.0, 0.0, 100.0, 40.0)];
        let card = &collect_cards(&detections, 0.5)[0];
        assert_eq!(card.banner_region(), BBox::new(0.0, 0.0, 38.0, 40.0));
        assert_eq!(card.title_region(), BBox::new(38.0, 0.0, 100.0, 20.0));
        assert_eq!(card.banner_text_region(), BBox::new(38.0, 20.0, 100.0, 40.0));
    }

    #[test]
    fn test_list_region_covers_all_cards() {
        let detections = vec![
            det(RACE_CARD, 10.0, 0.0, 400.0, 80.0),
            det(RACE_CARD, 0.0, 100.0, 390.0, 180.0),
        ];
        let cards = collect_cards(&detections, 0.5);
        assert_eq!(list_region(&cards), Some(BBox::new(0.0, 0.0, 400.0, 180.0)));
        assert_eq!(list_region(&[]), None);
    }
}
