//! Human behavior simulation for clicks
//!
//! Adds realistic variance to click positions and post-click waits so the
//! automation does not hit the exact same pixel at a fixed cadence.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

use super::StealthConfig;
use crate::vision::BBox;

/// Human reaction time range in milliseconds
const MIN_REACTION_TIME_MS: u64 = 180;
const MAX_REACTION_TIME_MS: u64 = 350;

/// Floor for any humanized delay
const MIN_DELAY_MS: u64 = 50;

/// Humanizer for generating realistic timing and positions
pub struct Humanizer {
    rng: StdRng,
    config: StealthConfig,
}

impl Humanizer {
    /// Create a humanizer seeded from OS entropy
    pub fn new(config: StealthConfig) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            config,
        }
    }

    /// Create a reproducible humanizer
    pub fn seeded(config: StealthConfig, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            config,
        }
    }

    pub fn config(&self) -> &StealthConfig {
        &self.config
    }

    /// Pick the point to click inside a box.
    ///
    /// The point always stays within the central `position_jitter_fraction`
    /// of the box, so it never lands on a neighbouring control.
    pub fn click_point(&mut self, bbox: &BBox) -> (i32, i32) {
        let (cx, cy) = bbox.center();
        if !self.config.humanize_position {
            return (cx.round() as i32, cy.round() as i32);
        }

        let fraction = self.config.position_jitter_fraction.clamp(0.0, 1.0);
        let half_w = bbox.width() * fraction / 2.0;
        let half_h = bbox.height() * fraction / 2.0;

        let dx = self.gaussian_unit() * half_w;
        let dy = self.gaussian_unit() * half_h;

        ((cx + dx).round() as i32, (cy + dy).round() as i32)
    }

    /// Humanize a delay with variance
    pub fn humanize_delay(&mut self, base_delay_ms: u64, variance_percent: u32) -> u64 {
        if variance_percent == 0 {
            return base_delay_ms;
        }

        let variance = (base_delay_ms as f64 * variance_percent as f64 / 100.0) as i64;
        let offset = self.rng.gen_range(-variance..=variance);

        (base_delay_ms as i64 + offset).max(MIN_DELAY_MS as i64) as u64
    }

    /// Wait after a click before the next frame is worth capturing
    pub fn settle_delay(&mut self) -> Duration {
        if !self.config.humanize_timing {
            return Duration::from_millis(self.config.base_settle_ms);
        }

        let reaction = self
            .rng
            .gen_range(MIN_REACTION_TIME_MS..=MAX_REACTION_TIME_MS);
        let settle = self.humanize_delay(
            self.config.base_settle_ms,
            self.config.timing_variance_percent,
        );

        let pause = if self.rng.gen::<f32>() < self.config.micro_pause_probability {
            self.rng.gen_range(500..=2000)
        } else {
            0
        };

        Duration::from_millis(reaction + settle + pause)
    }

    /// Roughly normal value in [-1, 1] (sum of three uniforms)
    fn gaussian_unit(&mut self) -> f32 {
        let sum: f32 = (0..3).map(|_| self.rng.gen::<f32>() - 0.5).sum();
        (sum / 1.5).clamp(-1.0, 1.0)
    }
}

impl Default for Humanizer {
    fn default() -> Self {
        Self::new(StealthConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_click_point_stays_in_central_region() {
        let mut humanizer = Humanizer::seeded(StealthConfig::default(), 7);
        let bbox = BBox::new(100.0, 200.0, 300.0, 260.0);
        let fraction = humanizer.config().position_jitter_fraction;

        for _ in 0..200 {
            let (x, y) = humanizer.click_point(&bbox);
            let max_dx = bbox.width() * fraction / 2.0 + 1.0;
            let max_dy = bbox.height() * fraction / 2.0 + 1.0;
            assert!((x as f32 - 200.0).abs() <= max_dx);
            assert!((y as f32 - 230.0).abs() <= max_dy);
        }
    }

    #[test]
    fn test_disabled_position_clicks_center() {
        let mut humanizer = Humanizer::seeded(StealthConfig::disabled(), 1);
        let bbox = BBox::new(0.0, 0.0, 10.0, 20.0);
        assert_eq!(humanizer.click_point(&bbox), (5, 10));
    }

    #[test]
    fn test_humanize_delay_variance() {
        let mut humanizer = Humanizer::seeded(StealthConfig::default(), 42);
        let base = 500u64;

        let mut min_seen = base;
        let mut max_seen = base;

        for _ in 0..1000 {
            let delay = humanizer.humanize_delay(base, 30);
            min_seen = min_seen.min(delay);
            max_seen = max_seen.max(delay);
        }

        assert!(min_seen < base);
        assert!(max_seen > base);
        assert!(min_seen >= 350 && max_seen <= 650);
    }

    #[test]
    fn test_zero_variance_returns_base() {
        let mut humanizer = Humanizer::seeded(StealthConfig::default(), 3);
        for _ in 0..10 {
            assert_eq!(humanizer.humanize_delay(500, 0), 500);
        }
    }

    #[test]
    fn test_settle_delay_without_timing_humanization() {
        let mut humanizer = Humanizer::seeded(StealthConfig::disabled(), 3);
        assert_eq!(
            humanizer.settle_delay(),
            Duration::from_millis(StealthConfig::disabled().base_settle_ms)
        );
    }
}
