//! Race index
//!
//! Canonical race dataset: every race keyed by a canonical string, its
//! scheduled occurrences with their printed titles and grades, the banner
//! templates registered for it, and the groups of races whose banners and
//! titles are confusable.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use serde::Deserialize;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::vision::banner::BannerTemplate;
use crate::vision::labels::RACE_BADGE_PREFIX;

/// Lookalike races known to be confused on screen
static BUILTIN_AMBIGUITY_GROUPS: Lazy<Vec<Vec<String>>> = Lazy::new(|| {
    [["Asahi Hai Futurity Stakes", "Hanshin Juvenile Fillies"]]
        .iter()
        .map(|group| group.iter().map(|name| canonicalize(name)).collect())
        .collect()
});

/// Collapse spelling variants of a race name into one key.
///
/// Strips accents, punctuation, whitespace and case.
pub fn canonicalize(name: &str) -> String {
    name.nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Race grade as shown on the card badge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Grade {
    G1,
    G2,
    G3,
    /// Open
    Op,
    /// Pre-Open
    PreOp,
    Debut,
    Maiden,
}

impl Grade {
    /// Parse a grade name (`"G1"`, `"OP"`, `"Pre-OP"`, ...)
    pub fn parse(text: &str) -> Option<Self> {
        match canonicalize(text).as_str() {
            "g1" | "gi" => Some(Grade::G1),
            "g2" | "gii" => Some(Grade::G2),
            "g3" | "giii" => Some(Grade::G3),
            "op" | "open" => Some(Grade::Op),
            "preop" | "preopen" => Some(Grade::PreOp),
            "debut" | "makedebut" => Some(Grade::Debut),
            "maiden" => Some(Grade::Maiden),
            _ => None,
        }
    }

    /// Grade of a badge detection label (`race_badge_g1`)
    pub fn from_label(label: &str) -> Option<Self> {
        label.strip_prefix(RACE_BADGE_PREFIX).and_then(Self::parse)
    }

    /// Higher is more prestigious
    pub fn prestige(&self) -> u8 {
        match self {
            Grade::G1 => 6,
            Grade::G2 => 5,
            Grade::G3 => 4,
            Grade::Op => 3,
            Grade::PreOp => 2,
            Grade::Debut => 1,
            Grade::Maiden => 0,
        }
    }
}

/// One scheduled running of a race
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    /// Career date key (e.g. `"Y1-12-2"`)
    pub date_key: String,
    /// Title printed on that date, when it differs from the display title
    pub title: Option<String>,
    pub rank: Option<Grade>,
}

/// A race in the index
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    /// Name as first seen in the dataset
    pub name: String,
    pub canonical_key: String,
    pub display_title: String,
    pub rank: Option<Grade>,
    pub schedule_order: u32,
    pub occurrences: Vec<Occurrence>,
}

impl EntityRecord {
    pub fn occurrence_dates(&self) -> impl Iterator<Item = &str> {
        self.occurrences.iter().map(|o| o.date_key.as_str())
    }

    pub fn occurrence(&self, date_key: &str) -> Option<&Occurrence> {
        self.occurrences.iter().find(|o| o.date_key == date_key)
    }

    /// Every title ever printed for this race, display title first
    pub fn all_titles(&self) -> Vec<String> {
        let mut titles = vec![self.display_title.clone()];
        for title in self.occurrences.iter().filter_map(|o| o.title.as_ref()) {
            if !titles.iter().any(|t| canonicalize(t) == canonicalize(title)) {
                titles.push(title.clone());
            }
        }
        titles
    }

    fn merge(&mut self, other: EntityRecord) {
        self.schedule_order = self.schedule_order.min(other.schedule_order);
        if self.rank.is_none() {
            self.rank = other.rank;
        }
        for occurrence in other.occurrences {
            if self.occurrence(&occurrence.date_key).is_none() {
                self.occurrences.push(occurrence);
            }
        }
    }
}

/// Lookup of banner templates by canonical key
pub trait TemplateStore {
    /// Registered templates; empty if the race has no banner
    fn templates_for(&self, canonical_key: &str) -> Vec<BannerTemplate>;
}

/// Union-find over canonical keys, remembering the order keys were added
#[derive(Debug, Clone, Default)]
struct DisjointSet {
    parent: HashMap<String, String>,
    order: Vec<String>,
}

impl DisjointSet {
    fn find(&self, key: &str) -> String {
        let mut current = key;
        while let Some(parent) = self.parent.get(current) {
            if parent == current {
                break;
            }
            current = parent.as_str();
        }
        current.to_string()
    }

    fn union(&mut self, a: &str, b: &str) {
        for key in [a, b] {
            if !self.parent.contains_key(key) {
                self.parent.insert(key.to_string(), key.to_string());
                self.order.push(key.to_string());
            }
        }
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            self.parent.insert(root_b, root_a);
        }
    }

    fn members(&self, key: &str) -> Vec<String> {
        if !self.parent.contains_key(key) {
            return Vec::new();
        }
        let root = self.find(key);
        self.order
            .iter()
            .filter(|k| self.find(k) == root)
            .cloned()
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct RawIndex {
    #[serde(default)]
    races: Vec<RawRace>,
    #[serde(default)]
    ambiguity_groups: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawRace {
    name: String,
    #[serde(default)]
    display_title: Option<String>,
    #[serde(default)]
    rank: Option<String>,
    #[serde(default)]
    schedule_order: Option<u32>,
    #[serde(default)]
    occurrences: Vec<RawOccurrence>,
}

#[derive(Debug, Deserialize)]
struct RawOccurrence {
    date_key: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    rank: Option<String>,
}

/// The race index
#[derive(Debug, Clone)]
pub struct EntityIndex {
    records: HashMap<String, EntityRecord>,
    banners: HashMap<String, Vec<BannerTemplate>>,
    groups: DisjointSet,
}

impl EntityIndex {
    /// Empty index seeded with the built-in lookalike groups
    pub fn new() -> Self {
        let mut index = Self {
            records: HashMap::new(),
            banners: HashMap::new(),
            groups: DisjointSet::default(),
        };
        for group in BUILTIN_AMBIGUITY_GROUPS.iter() {
            index.add_ambiguity_group(group);
        }
        index
    }

    /// Parse an index from its JSON dataset
    pub fn from_json_str(json: &str) -> Result<Self, IndexError> {
        let raw: RawIndex = serde_json::from_str(json)?;
        let mut index = Self::new();

        for (position, race) in raw.races.into_iter().enumerate() {
            let record = Self::record_from_raw(race, position as u32)?;
            index.insert(record);
        }

        for group in &raw.ambiguity_groups {
            if group.iter().any(|name| canonicalize(name).is_empty()) {
                return Err(IndexError::EmptyName);
            }
            index.add_ambiguity_group(group);
        }

        log::info!(
            "Race index loaded: {} races, {} ambiguity groups",
            index.len(),
            raw.ambiguity_groups.len()
        );
        Ok(index)
    }

    /// Load an index from a JSON file
    pub fn from_path(path: &Path) -> Result<Self, IndexError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    fn record_from_raw(race: RawRace, position: u32) -> Result<EntityRecord, IndexError> {
        let canonical_key = canonicalize(&race.name);
        if canonical_key.is_empty() {
            return Err(IndexError::EmptyName);
        }

        let parse_grade = |text: &Option<String>| -> Result<Option<Grade>, IndexError> {
            match text {
                None => Ok(None),
                Some(t) => Grade::parse(t).map(Some).ok_or_else(|| IndexError::UnknownGrade {
                    race: race.name.clone(),
                    grade: t.clone(),
                }),
            }
        };

        let rank = parse_grade(&race.rank)?;
        let mut occurrences = Vec::with_capacity(race.occurrences.len());
        for occ in &race.occurrences {
            occurrences.push(Occurrence {
                date_key: occ.date_key.clone(),
                title: occ.title.clone(),
                rank: parse_grade(&occ.rank)?,
            });
        }

        Ok(EntityRecord {
            display_title: race.display_title.clone().unwrap_or_else(|| race.name.clone()),
            name: race.name,
            canonical_key,
            rank,
            schedule_order: race.schedule_order.unwrap_or(position),
            occurrences,
        })
    }

    /// Add a record; spelling variants of an existing race are merged into it
    pub fn insert(&mut self, record: EntityRecord) {
        match self.records.get_mut(&record.canonical_key) {
            Some(existing) => {
                log::debug!(
                    "Merging race variant '{}' into '{}'",
                    record.name,
                    existing.name
                );
                existing.merge(record);
            }
            None => {
                self.records.insert(record.canonical_key.clone(), record);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up a race by any spelling of its name
    pub fn get(&self, name: &str) -> Option<&EntityRecord> {
        self.records.get(&canonicalize(name))
    }

    /// Titles a card for this race may show.
    ///
    /// With a known date only that occurrence's title is expected; otherwise
    /// every title ever associated with the race. Unknown races expect
    /// their own name.
    pub fn expected_titles(&self, name: &str, date_key: Option<&str>) -> Vec<String> {
        let Some(record) = self.get(name) else {
            return vec![name.to_string()];
        };

        if let Some(date) = date_key {
            if let Some(occurrence) = record.occurrence(date) {
                return vec![occurrence
                    .title
                    .clone()
                    .unwrap_or_else(|| record.display_title.clone())];
            }
        }

        record.all_titles()
    }

    /// Grade the badge of this race should show
    pub fn expected_grade(&self, name: &str, date_key: Option<&str>) -> Option<Grade> {
        let record = self.get(name)?;
        date_key
            .and_then(|date| record.occurrence(date))
            .and_then(|o| o.rank)
            .or(record.rank)
    }

    /// Register a banner template under its canonical key
    pub fn register_banner(&mut self, template: BannerTemplate) {
        self.banners
            .entry(template.canonical_key.clone())
            .or_default()
            .push(template);
    }

    /// Mark races as mutually confusable
    pub fn add_ambiguity_group<S: AsRef<str>>(&mut self, names: &[S]) {
        let keys: Vec<String> = names.iter().map(|n| canonicalize(n.as_ref())).collect();
        if let Some((first, rest)) = keys.split_first() {
            for key in rest {
                self.groups.union(first, key);
            }
        }
    }

    /// Canonical keys confusable with `name`, in the order the group was
    /// configured, whichever member is queried. Ungrouped races return
    /// themselves.
    pub fn ambiguity_group(&self, name: &str) -> Vec<String> {
        let key = canonicalize(name);
        let members = self.groups.members(&key);
        if members.is_empty() {
            vec![key]
        } else {
            members
        }
    }

    /// Banner templates of every member of the race's ambiguity group
    pub fn banner_templates_for_group(&self, name: &str) -> Vec<BannerTemplate> {
        self.ambiguity_group(name)
            .iter()
            .flat_map(|key| self.templates_for(key))
            .collect()
    }
}

impl Default for EntityIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateStore for EntityIndex {
    fn templates_for(&self, canonical_key: &str) -> Vec<BannerTemplate> {
        self.banners.get(canonical_key).cloned().unwrap_or_default()
    }
}

/// Race index errors
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Failed to read race index: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed race index: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Race index entry has an empty name")]
    EmptyName,
    #[error("Race '{race}' has unknown grade '{grade}'")]
    UnknownGrade { race: String, grade: String },
}
