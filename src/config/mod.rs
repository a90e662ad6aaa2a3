//! Configuration module
//!
//! Handles thresholds, timeouts and on-screen vocabularies for the decision core.

pub mod settings;

pub use settings::{ConfigError, Settings};
