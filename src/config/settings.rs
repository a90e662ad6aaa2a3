//! Automation settings
//!
//! Defines every tunable threshold, timeout and text vocabulary used by the
//! decision core. Durations are stored in milliseconds.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::stealth::StealthConfig;
use crate::vision::text::normalize;

/// Main settings structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Evidence-fusion selector thresholds
    pub selector: SelectorSettings,
    /// Banner similarity fusion
    pub banner: BannerSettings,
    /// Race card disambiguation
    pub resolver: ResolverSettings,
    /// Race flow retry/recovery
    pub race: RaceFlowSettings,
    /// Pre-race lobby resolution
    pub lobby: LobbySettings,
    /// On-screen captions the flow looks for
    pub vocabulary: Vocabulary,
    /// Click jitter and timing variance
    pub stealth: StealthConfig,
}

impl Settings {
    /// Parse settings from JSON and validate them
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Write settings to a JSON file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Check cross-field invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.vocabulary.validate()
    }

    /// Never retry, accept only very confident race matches
    pub fn conservative_preset() -> Self {
        Self {
            resolver: ResolverSettings {
                accept_threshold: 0.8,
                group_margin: 0.05,
                ..Default::default()
            },
            race: RaceFlowSettings {
                retry_on_loss: false,
                max_retries: 0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Retry lost races with alarm clocks and scan every page before choosing
    pub fn farming_preset() -> Self {
        Self {
            resolver: ResolverSettings {
                scan_mode: ScanMode::Global,
                ..Default::default()
            },
            race: RaceFlowSettings {
                retry_on_loss: true,
                max_retries: 5,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Evidence-fusion selector thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorSettings {
    /// Minimum fuzzy score for an expected caption to authorize a click
    pub min_text_score: f32,
    /// Forbidden-caption score that vetoes a candidate outright
    pub veto_threshold: f32,
    /// Scores closer than this are treated as a tie
    pub tie_epsilon: f32,
    /// Minimum OCR confidence for text to count at all
    pub min_ocr_confidence: f32,
    /// Default polling interval (ms)
    pub poll_interval_ms: u64,
    /// Default click timeout (ms)
    pub click_timeout_ms: u64,
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            min_text_score: 0.68,
            veto_threshold: 0.8,
            tie_epsilon: 0.01,
            min_ocr_confidence: 0.2,
            poll_interval_ms: 250,
            click_timeout_ms: 5000,
        }
    }
}

impl SelectorSettings {
    /// Pause between selector polls
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// How long a click waits for its control
    pub fn click_timeout(&self) -> Duration {
        Duration::from_millis(self.click_timeout_ms)
    }
}

/// Weights for the fused banner similarity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BannerSettings {
    /// Perceptual hash weight
    pub hash_weight: f32,
    /// Color histogram weight
    pub histogram_weight: f32,
    /// Aspect ratio weight
    pub size_weight: f32,
    /// Histogram bins per channel
    pub histogram_bins: usize,
}

impl Default for BannerSettings {
    fn default() -> Self {
        Self {
            hash_weight: 0.5,
            histogram_weight: 0.35,
            size_weight: 0.15,
            histogram_bins: 16,
        }
    }
}

/// How the resolver walks the race list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Accept the first page that yields a confident winner
    #[default]
    PageGreedy,
    /// Score every page, then return to the best one
    Global,
}

/// Race card disambiguation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    /// Candidates per page that get the banner/second-OCR pass
    pub top_k: usize,
    /// Penalty for a grade badge that contradicts the schedule
    pub rank_penalty: f32,
    /// Title score below which a card is considered unreadable
    pub ocr_discard_floor: f32,
    /// Banner score below which a card is considered unmatched
    pub banner_discard_floor: f32,
    /// Minimum adjusted score to accept a card
    pub accept_threshold: f32,
    /// Banner score from which banner evidence dominates
    pub high_confidence_banner: f32,
    /// Banner weight in the ordinary case
    pub banner_weight: f32,
    /// Banner weight once the banner score is high-confidence
    pub high_confidence_banner_weight: f32,
    /// Pages to scan before giving up
    pub max_pages: usize,
    /// Lead the scheduled race needs over every lookalike
    pub group_margin: f32,
    pub scan_mode: ScanMode,
    /// Delay after scrolling the list (ms)
    pub scroll_settle_ms: u64,
    /// Minimum detector confidence for a race card
    pub card_min_confidence: f32,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            top_k: 4,
            rank_penalty: 0.15,
            ocr_discard_floor: 0.35,
            banner_discard_floor: 0.55,
            accept_threshold: 0.72,
            high_confidence_banner: 0.9,
            banner_weight: 0.4,
            high_confidence_banner_weight: 0.6,
            max_pages: 4,
            group_margin: 0.03,
            scan_mode: ScanMode::PageGreedy,
            scroll_settle_ms: 600,
            card_min_confidence: 0.5,
        }
    }
}

impl ResolverSettings {
    /// Pause after a scroll before the next capture
    pub fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_ms)
    }
}

/// Race flow retry/recovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceFlowSettings {
    /// Retry lost races with the try-again control
    pub retry_on_loss: bool,
    /// Retries allowed per race
    pub max_retries: u32,
    /// How long to look for the loss screen (ms)
    pub loss_probe_timeout_ms: u64,
    /// Detector confidence accepted for the loss indicator
    pub loss_min_confidence: f32,
    /// Deadline of the post-retry interstitial loop (ms)
    pub retry_transition_timeout_ms: u64,
    /// Poll interval of the post-retry interstitial loop (ms)
    pub retry_transition_poll_ms: u64,
    /// Detector confidence required to call the lobby reached
    pub terminal_min_confidence: f32,
    /// Deadline for reaching a stable result screen (ms)
    pub result_timeout_ms: u64,
    /// Poll interval while skipping result screens (ms)
    pub result_poll_ms: u64,
    /// Deadline for the race to start playing (ms)
    pub race_start_timeout_ms: u64,
    /// Timeout for an optional second race confirmation (ms)
    pub second_confirm_timeout_ms: u64,
}

impl Default for RaceFlowSettings {
    fn default() -> Self {
        Self {
            retry_on_loss: true,
            max_retries: 3,
            loss_probe_timeout_ms: 2000,
            loss_min_confidence: 0.25,
            retry_transition_timeout_ms: 10_000,
            retry_transition_poll_ms: 300,
            terminal_min_confidence: 0.7,
            result_timeout_ms: 60_000,
            result_poll_ms: 500,
            race_start_timeout_ms: 30_000,
            second_confirm_timeout_ms: 1500,
        }
    }
}

impl RaceFlowSettings {
    /// How long to look for the try-again control after a race
    pub fn loss_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.loss_probe_timeout_ms)
    }

    /// Budget for clicking through retry confirmations
    pub fn retry_transition_timeout(&self) -> Duration {
        Duration::from_millis(self.retry_transition_timeout_ms)
    }

    /// Pause between retry-transition frames
    pub fn retry_transition_poll(&self) -> Duration {
        Duration::from_millis(self.retry_transition_poll_ms)
    }

    /// How long to keep skipping result screens
    pub fn result_timeout(&self) -> Duration {
        Duration::from_millis(self.result_timeout_ms)
    }

    /// Pause between result-skip frames
    pub fn result_poll(&self) -> Duration {
        Duration::from_millis(self.result_poll_ms)
    }

    /// How long to wait for the race to start
    pub fn race_start_timeout(&self) -> Duration {
        Duration::from_millis(self.race_start_timeout_ms)
    }

    /// How long to look for a second race confirmation
    pub fn second_confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.second_confirm_timeout_ms)
    }
}

/// Pre-race lobby settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbySettings {
    /// Classifier probability from which the result-review control counts as active
    pub active_threshold: f32,
    /// Waits between lobby attempts (ms); one attempt more than entries
    pub backoff_ms: Vec<u64>,
    /// Detector confidence for lobby controls
    pub min_confidence: f32,
    /// After a retry, start the race when the review control is missing
    pub fallback_to_action_after_retry: bool,
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self {
            active_threshold: 0.51,
            backoff_ms: vec![500, 1000, 2000, 4000],
            min_confidence: 0.5,
            fallback_to_action_after_retry: false,
        }
    }
}

/// Captions the flow reads on screen.
///
/// `confirmations` must share no entry with `terminal_review` or
/// `terminal_action`: the main race control looks like a confirmation and
/// must be unreachable from the interstitial-clearing logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    pub try_again: Vec<String>,
    pub advance: Vec<String>,
    pub skip: Vec<String>,
    pub confirmations: Vec<String>,
    pub terminal_review: Vec<String>,
    pub terminal_action: Vec<String>,
    pub race_confirm: Vec<String>,
}

impl Default for Vocabulary {
    fn default() -> Self {
        fn words(list: &[&str]) -> Vec<String> {
            list.iter().map(|s| s.to_string()).collect()
        }

        Self {
            try_again: words(&["try again"]),
            advance: words(&["next"]),
            skip: words(&["skip", "close"]),
            confirmations: words(&["use", "use item", "ok", "yes", "confirm"]),
            terminal_review: words(&["view results"]),
            terminal_action: words(&["race"]),
            race_confirm: words(&["race"]),
        }
    }
}

impl Vocabulary {
    /// Enforce that confirmation and terminal vocabularies are disjoint
    pub fn validate(&self) -> Result<(), ConfigError> {
        let confirmations: BTreeSet<String> =
            self.confirmations.iter().map(|s| normalize(s)).collect();

        for text in self.terminal_review.iter().chain(&self.terminal_action) {
            let key = normalize(text);
            if confirmations.contains(&key) {
                return Err(ConfigError::OverlappingVocabulary(text.clone()));
            }
        }

        if self.try_again.is_empty() || self.advance.is_empty() {
            return Err(ConfigError::EmptyVocabulary);
        }

        Ok(())
    }
}

/// Settings errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Caption '{0}' appears in both the confirmation and the terminal vocabulary")]
    OverlappingVocabulary(String),
    #[error("Try-again and advance vocabularies must not be empty")]
    EmptyVocabulary,
}
