//! Race flow state
//!
//! Phases of one race, the per-race retry bookkeeping, and the lobby plan
//! describing which race the career schedule wants next.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::entity::canonicalize;

/// Phase of the race flow state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RacePhase {
    /// Picking the scheduled card on the race list
    SelectRace,
    /// Pre-race lobby: view results or start the race
    Lobby,
    /// Race started, waiting for the result screens
    RaceRunning,
    /// Clicking through result screens until a stable one shows
    ResultSkipLoop,
    /// Loss probe and retry/advance decision
    TryAgainDecision,
    /// Confirmations between try-again and the lobby
    RetryTransition,
    /// Moving past the result
    Advance,
    /// The race is finished
    Done,
    /// The flow gave up
    Aborted,
}

impl RacePhase {
    /// Check if this phase ends the flow
    pub fn is_terminal(&self) -> bool {
        matches!(self, RacePhase::Done | RacePhase::Aborted)
    }
}

/// How the lobby was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LobbyEntry {
    /// First visit for this race
    Fresh,
    /// Back from a retry transition
    AfterRetry,
}

/// Retry bookkeeping for one race attempt sequence.
///
/// Owned by the caller and passed through the flow explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySession {
    pub loss_count: u32,
    pub retry_attempts: u32,
    pub retry_successes: u32,
    /// Wall-clock bound for the whole race, checked between phases
    #[serde(skip)]
    pub deadline: Option<Instant>,
}

impl RetrySession {
    pub fn new(deadline: Option<Instant>) -> Self {
        Self {
            loss_count: 0,
            retry_attempts: 0,
            retry_successes: 0,
            deadline,
        }
    }

    /// Whether another retry is allowed under `max_retries`
    pub fn can_retry(&self, max_retries: u32) -> bool {
        self.retry_attempts < max_retries
    }

    pub fn record_loss(&mut self) {
        self.loss_count += 1;
    }

    pub fn record_retry_attempt(&mut self) {
        self.retry_attempts += 1;
    }

    pub fn record_retry_success(&mut self) {
        self.retry_successes += 1;
    }

    pub fn deadline_passed(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }
}

impl Default for RetrySession {
    fn default() -> Self {
        Self::new(None)
    }
}

/// The race the career schedule wants on the current date
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LobbyPlan {
    pub planned_entity_name: Option<String>,
    pub planned_entity_canonical: Option<String>,
    /// Career date key used to pick the expected title
    pub date_key: Option<String>,
}

impl LobbyPlan {
    /// Plan for a named race
    pub fn scheduled(name: impl Into<String>, date_key: Option<String>) -> Self {
        let name = name.into();
        Self {
            planned_entity_canonical: Some(canonicalize(&name)),
            planned_entity_name: Some(name),
            date_key,
        }
    }

    /// Nothing scheduled: pick by stars and grade
    pub fn unscheduled() -> Self {
        Self::default()
    }

    /// Canonical key of the planned race, derived from the name if unset
    pub fn canonical_key(&self) -> Option<String> {
        self.planned_entity_canonical
            .clone()
            .or_else(|| self.planned_entity_name.as_deref().map(canonicalize))
    }
}
