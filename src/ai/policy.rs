//! Match policies
//!
//! A [`MatchPolicy`] states which detector labels may be clicked, which
//! captions authorize a click, which captions veto it, and how long to keep
//! looking. Policies are validated at construction so an overlapping
//! expected/forbidden vocabulary can never reach the selector.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::vision::text::normalize;
use crate::vision::BBox;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

/// Declarative rule for choosing one control on screen
#[derive(Debug, Clone, PartialEq)]
pub struct MatchPolicy {
    tag: String,
    allowed_labels: Vec<String>,
    expected_texts: Vec<String>,
    forbidden_texts: Vec<String>,
    prefer_bottom: bool,
    allow_greedy_click: bool,
    min_confidence: f32,
    exclusion_zones: Vec<BBox>,
    timeout: Duration,
    poll_interval: Duration,
}

impl MatchPolicy {
    /// Start a policy for controls of the given detector labels.
    ///
    /// `tag` only names the policy in logs.
    pub fn builder<I, S>(tag: &str, labels: I) -> PolicyBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PolicyBuilder {
            policy: MatchPolicy {
                tag: tag.to_string(),
                allowed_labels: labels.into_iter().map(Into::into).collect(),
                expected_texts: Vec::new(),
                forbidden_texts: Vec::new(),
                prefer_bottom: false,
                allow_greedy_click: true,
                min_confidence: DEFAULT_MIN_CONFIDENCE,
                exclusion_zones: Vec::new(),
                timeout: DEFAULT_TIMEOUT,
                poll_interval: DEFAULT_POLL_INTERVAL,
            },
        }
    }

    /// Name used in logs and diagnostics
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Detector labels a click may land on
    pub fn allowed_labels(&self) -> &[String] {
        &self.allowed_labels
    }

    /// Authorizing captions, in priority order
    pub fn expected_texts(&self) -> &[String] {
        &self.expected_texts
    }

    /// Captions that veto a candidate
    pub fn forbidden_texts(&self) -> &[String] {
        &self.forbidden_texts
    }

    /// Whether the lowest candidate breaks ties
    pub fn prefer_bottom(&self) -> bool {
        self.prefer_bottom
    }

    /// Whether a lone candidate may be clicked without a caption match
    pub fn allow_greedy_click(&self) -> bool {
        self.allow_greedy_click
    }

    /// Minimum detector confidence
    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    /// Regions whose candidates are ignored
    pub fn exclusion_zones(&self) -> &[BBox] {
        &self.exclusion_zones
    }

    /// How long `select` keeps polling
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Pause between polls
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Check if a detection label is clickable under this policy
    pub fn allows_label(&self, label: &str) -> bool {
        self.allowed_labels.iter().any(|l| l == label)
    }

    /// Check if a box lies inside an exclusion zone
    pub fn is_excluded(&self, bbox: &BBox) -> bool {
        self.exclusion_zones
            .iter()
            .any(|zone| zone.contains_center_of(bbox))
    }
}

/// Builder for [`MatchPolicy`]
#[derive(Debug, Clone)]
pub struct PolicyBuilder {
    policy: MatchPolicy,
}

impl PolicyBuilder {
    /// Captions that authorize a click, highest priority first
    pub fn expect<I, S>(mut self, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.policy
            .expected_texts
            .extend(texts.into_iter().map(Into::into));
        self
    }

    /// Captions that veto a click
    pub fn forbid<I, S>(mut self, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.policy
            .forbidden_texts
            .extend(texts.into_iter().map(Into::into));
        self
    }

    pub fn prefer_bottom(mut self, prefer_bottom: bool) -> Self {
        self.policy.prefer_bottom = prefer_bottom;
        self
    }

    /// Allow clicking a lone candidate without reading its caption
    pub fn greedy(mut self, allow: bool) -> Self {
        self.policy.allow_greedy_click = allow;
        self
    }

    pub fn min_confidence(mut self, min_confidence: f32) -> Self {
        self.policy.min_confidence = min_confidence;
        self
    }

    /// Ignore detections centered inside `zone`
    pub fn exclude(mut self, zone: BBox) -> Self {
        self.policy.exclusion_zones.push(zone);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.policy.timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.policy.poll_interval = poll_interval;
        self
    }

    /// Validate and produce the policy
    pub fn build(self) -> Result<MatchPolicy, PolicyError> {
        let policy = self.policy;

        if policy.allowed_labels.is_empty() {
            return Err(PolicyError::NoLabels(policy.tag));
        }

        let expected = normalized_set(&policy.expected_texts, &policy.tag)?;
        let forbidden = normalized_set(&policy.forbidden_texts, &policy.tag)?;
        if let Some(text) = expected.intersection(&forbidden).next() {
            return Err(PolicyError::Overlap {
                tag: policy.tag,
                text: text.clone(),
            });
        }

        if !policy.allow_greedy_click && policy.expected_texts.is_empty() {
            return Err(PolicyError::NeverAuthorized(policy.tag));
        }

        if !(0.0..=1.0).contains(&policy.min_confidence) {
            return Err(PolicyError::InvalidConfidence {
                tag: policy.tag,
                value: policy.min_confidence,
            });
        }

        Ok(policy)
    }
}

fn normalized_set(texts: &[String], tag: &str) -> Result<BTreeSet<String>, PolicyError> {
    texts
        .iter()
        .map(|text| {
            let n = normalize(text);
            if n.is_empty() {
                Err(PolicyError::EmptyText(tag.to_string()))
            } else {
                Ok(n)
            }
        })
        .collect()
}

/// Policy construction errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    #[error("Policy '{0}' allows no detector labels")]
    NoLabels(String),
    #[error("Policy '{tag}' both expects and forbids '{text}'")]
    Overlap { tag: String, text: String },
    #[error("Policy '{0}' has an empty caption")]
    EmptyText(String),
    #[error(
        "Policy '{0}' can never authorize a click: \
         no expected captions and greedy clicks disabled"
    )]
    NeverAuthorized(String),
    #[error("Policy '{tag}' has confidence floor {value} outside [0, 1]")]
    InvalidConfidence { tag: String, value: f32 },
}
