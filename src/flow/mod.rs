//! Race flow orchestration
//!
//! Drives one race from the race list (or the lobby) to the point where the
//! career moves on: lobby resolution, result skipping, the loss probe, the
//! retry transition and the advance click.

pub mod lobby;
pub mod race;

use std::time::Duration;

use crate::ai::PolicyError;
use crate::config::ConfigError;
use crate::game::state::{RacePhase, RetrySession};

pub use lobby::{LobbyAction, LobbyDecision, LobbyResolver};
pub use race::RaceFlow;

/// How a race flow ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceOutcome {
    /// The result was accepted and the career moved on
    Advanced,
    /// No card on the race list could be chosen
    NoEligibleRace,
    /// The session deadline passed between phases
    DeadlineExceeded,
}

/// Summary of one flow run
#[derive(Debug, Clone)]
pub struct RaceReport {
    pub outcome: RaceOutcome,
    /// Every phase entered, in order
    pub phases: Vec<RacePhase>,
    pub session: RetrySession,
    /// Clicks made on confirmation dialogs during retry transitions
    pub confirmation_clicks: u32,
}

impl RaceReport {
    /// Number of times a phase was entered
    pub fn visits(&self, phase: RacePhase) -> usize {
        self.phases.iter().filter(|p| **p == phase).count()
    }
}

/// Race flow errors
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Invalid policy: {0}")]
    Policy(#[from] PolicyError),
    #[error("Invalid settings: {0}")]
    Config(#[from] ConfigError),
    #[error("Lobby unresolved after {attempts} attempts: {diagnostics}")]
    LobbyUnresolved { attempts: usize, diagnostics: String },
    #[error("Race did not start within {0:?}")]
    RaceStartTimeout(Duration),
    #[error("Control '{tag}' not found during {phase:?}")]
    ControlNotFound { tag: String, phase: RacePhase },
}
