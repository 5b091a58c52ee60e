// src/quality/mod.rs

//! Quality verdicts and their algebra.
//!
//! A [`Quality`] is an ordered severity label (`Null`, `Good`, `Medium`,
//! `Bad`) plus the reasons accumulated while checking and a small metadata
//! map. Verdicts from several checkers, objects or tasks are folded with
//! [`Quality::combine`], the worst-finite operator:
//!
//! - the worse of two concrete qualities wins,
//! - `Null` is the identity (it only wins against another `Null`),
//! - reasons are merged by set union, keeping first-seen order.
//!
//! Equality compares only the level and the name.

pub mod reason;

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use reason::{MODULE_KIND_MIN_ID, Reason, ReasonKind, ReasonKindRegistry};

/// Severity level of `Quality::NULL`.
pub const NULL_LEVEL: u32 = 0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quality {
    level: u32,
    name: Cow<'static, str>,
    #[serde(default)]
    reasons: Vec<Reason>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

impl Quality {
    pub const NULL: Quality = Quality::constant(NULL_LEVEL, "Null");
    pub const GOOD: Quality = Quality::constant(1, "Good");
    pub const MEDIUM: Quality = Quality::constant(2, "Medium");
    pub const BAD: Quality = Quality::constant(3, "Bad");

    const fn constant(level: u32, name: &'static str) -> Self {
        Self {
            level,
            name: Cow::Borrowed(name),
            reasons: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// A custom level, e.g. for module-specific severities.
    pub fn new(level: u32, name: impl Into<String>) -> Self {
        Self {
            level,
            name: Cow::Owned(name.into()),
            reasons: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_null(&self) -> bool {
        self.level == NULL_LEVEL
    }

    /// `true` if `self` is strictly worse than `other`. Always `false` when
    /// either side is `Null`.
    pub fn is_worse_than(&self, other: &Quality) -> bool {
        !self.is_null() && !other.is_null() && self.level > other.level
    }

    /// `true` if `self` is strictly better than `other`. Always `false` when
    /// either side is `Null`.
    pub fn is_better_than(&self, other: &Quality) -> bool {
        !self.is_null() && !other.is_null() && self.level < other.level
    }

    /// Replace level and name, keeping reasons and metadata.
    pub fn set(&mut self, other: &Quality) {
        self.level = other.level;
        self.name = other.name.clone();
    }

    pub fn reasons(&self) -> &[Reason] {
        &self.reasons
    }

    /// Append a reason. Duplicated `(kind, text)` pairs are kept only once.
    pub fn add_reason(&mut self, kind: ReasonKind, text: impl Into<String>) -> &mut Self {
        let reason = Reason::new(kind, text);
        if !self.reasons.contains(&reason) {
            self.reasons.push(reason);
        }
        self
    }

    /// Builder flavour of [`Quality::add_reason`].
    pub fn with_reason(mut self, kind: ReasonKind, text: impl Into<String>) -> Self {
        self.add_reason(kind, text);
        self
    }

    pub fn has_reason_kind(&self, kind: &ReasonKind) -> bool {
        self.reasons.iter().any(|r| &r.kind == kind)
    }

    /// Add a metadata entry; an existing key keeps its value.
    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.entry(key.into()).or_insert_with(|| value.into());
    }

    /// Update an existing metadata entry; unknown keys are ignored.
    pub fn update_metadata(&mut self, key: &str, value: impl Into<String>) {
        if let Some(slot) = self.metadata.get_mut(key) {
            *slot = value.into();
        }
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn metadata_map(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// The worst-finite operator `self ⊕ other`.
    pub fn combine(&self, other: &Quality) -> Quality {
        let (winner, loser) = if self.is_null() {
            (other, self)
        } else if other.is_null() || self.level >= other.level {
            (self, other)
        } else {
            (other, self)
        };

        let mut result = Quality {
            level: winner.level,
            name: winner.name.clone(),
            reasons: self.reasons.clone(),
            metadata: winner.metadata.clone(),
        };
        for reason in &other.reasons {
            if !result.reasons.contains(reason) {
                result.reasons.push(reason.clone());
            }
        }
        for (key, value) in &loser.metadata {
            result
                .metadata
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        result
    }

    /// Fold an iterator of qualities with [`Quality::combine`], starting from `Null`.
    pub fn worst_of<'a>(qualities: impl IntoIterator<Item = &'a Quality>) -> Quality {
        qualities
            .into_iter()
            .fold(Quality::NULL, |acc, q| acc.combine(q))
    }
}

impl Default for Quality {
    fn default() -> Self {
        Quality::NULL
    }
}

impl PartialEq for Quality {
    fn eq(&self, other: &Self) -> bool {
        self.level == other.level && self.name == other.name
    }
}

impl Eq for Quality {}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "null" => Ok(Quality::NULL),
            "good" => Ok(Quality::GOOD),
            "medium" => Ok(Quality::MEDIUM),
            "bad" => Ok(Quality::BAD),
            other => Err(format!(
                "invalid quality: {other} (expected \"null\", \"good\", \"medium\" or \"bad\")"
            )),
        }
    }
}
