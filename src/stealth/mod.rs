//! Stealth and anti-detection module
//!
//! Clicks land on a jittered point inside the chosen control, and waits
//! after clicks carry random variance with occasional micro-pauses.

pub mod humanize;

use serde::{Deserialize, Serialize};

pub use humanize::Humanizer;

/// Configuration for stealth behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StealthConfig {
    /// Enable humanized timing
    pub humanize_timing: bool,
    /// Enable humanized click positions
    pub humanize_position: bool,
    /// Share of the box width/height the click point may wander over (0-1)
    pub position_jitter_fraction: f32,
    /// Base wait after a click (ms)
    pub base_settle_ms: u64,
    /// Delay variance percentage (0-100)
    pub timing_variance_percent: u32,
    /// Probability of a micro-pause after a click (0.0-1.0)
    pub micro_pause_probability: f32,
}

impl Default for StealthConfig {
    fn default() -> Self {
        Self {
            humanize_timing: true,
            humanize_position: true,
            position_jitter_fraction: 0.5,
            base_settle_ms: 400,
            timing_variance_percent: 30,
            micro_pause_probability: 0.05,
        }
    }
}

impl StealthConfig {
    /// Create a config with no stealth (for testing)
    pub fn disabled() -> Self {
        Self {
            humanize_timing: false,
            humanize_position: false,
            position_jitter_fraction: 0.0,
            base_settle_ms: 300,
            timing_variance_percent: 0,
            micro_pause_probability: 0.0,
        }
    }
}
