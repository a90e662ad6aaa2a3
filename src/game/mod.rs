//! Game domain module
//!
//! This module contains the race index, the race cards read off the race
//! list, and the state carried through a race.

pub mod cards;
pub mod entity;
pub mod state;

pub use cards::{collect_cards, Badge, RaceCard};
pub use entity::{canonicalize, EntityIndex, EntityRecord, Grade, IndexError, TemplateStore};
pub use state::{LobbyEntry, LobbyPlan, RacePhase, RetrySession};
