// src/quality/reason.rs

//! Reason kinds attached to a [`Quality`](super::Quality) to explain a verdict.
//!
//! The built-in kinds use fixed ids below [`MODULE_KIND_MIN_ID`]. Modules may
//! register their own kinds in the range starting at that id; the
//! [`ReasonKindRegistry`] keeps module-registered ids from overlapping.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{QcError, Result};

/// First id available to module-defined reason kinds.
pub const MODULE_KIND_MIN_ID: u16 = 1000;

/// Kind of a quality reason.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "ReasonKindRepr", try_from = "ReasonKindRepr")]
pub enum ReasonKind {
    Unknown,
    ProcessingError,
    BadTracking,
    BadPID,
    LimitedAcceptance,
    BadHitQuality,
    /// Kind registered by a module, `id >= MODULE_KIND_MIN_ID`.
    Module { id: u16, name: String },
}

impl ReasonKind {
    const BUILTIN: [ReasonKind; 6] = [
        ReasonKind::Unknown,
        ReasonKind::ProcessingError,
        ReasonKind::BadTracking,
        ReasonKind::BadPID,
        ReasonKind::LimitedAcceptance,
        ReasonKind::BadHitQuality,
    ];

    pub fn id(&self) -> u16 {
        match self {
            ReasonKind::Unknown => 1,
            ReasonKind::ProcessingError => 2,
            ReasonKind::BadTracking => 3,
            ReasonKind::BadPID => 4,
            ReasonKind::LimitedAcceptance => 5,
            ReasonKind::BadHitQuality => 6,
            ReasonKind::Module { id, .. } => *id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ReasonKind::Unknown => "Unknown",
            ReasonKind::ProcessingError => "ProcessingError",
            ReasonKind::BadTracking => "BadTracking",
            ReasonKind::BadPID => "BadPID",
            ReasonKind::LimitedAcceptance => "LimitedAcceptance",
            ReasonKind::BadHitQuality => "BadHitQuality",
            ReasonKind::Module { name, .. } => name,
        }
    }

    /// Build a module-defined kind, rejecting ids in the reserved range.
    pub fn module(id: u16, name: impl Into<String>) -> Result<Self> {
        if id < MODULE_KIND_MIN_ID {
            return Err(QcError::ConfigError(format!(
                "reason kind id {id} is reserved (module kinds start at {MODULE_KIND_MIN_ID})"
            )));
        }
        Ok(ReasonKind::Module {
            id,
            name: name.into(),
        })
    }

    fn builtin(id: u16) -> Option<Self> {
        Self::BUILTIN.iter().find(|k| k.id() == id).cloned()
    }
}

impl fmt::Display for ReasonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Serialize, Deserialize)]
struct ReasonKindRepr {
    id: u16,
    name: String,
}

impl From<ReasonKind> for ReasonKindRepr {
    fn from(kind: ReasonKind) -> Self {
        Self {
            id: kind.id(),
            name: kind.name().to_string(),
        }
    }
}

impl TryFrom<ReasonKindRepr> for ReasonKind {
    type Error = String;

    fn try_from(repr: ReasonKindRepr) -> std::result::Result<Self, Self::Error> {
        if let Some(kind) = ReasonKind::builtin(repr.id) {
            return Ok(kind);
        }
        if repr.id >= MODULE_KIND_MIN_ID {
            return Ok(ReasonKind::Module {
                id: repr.id,
                name: repr.name,
            });
        }
        Err(format!("unknown reason kind id {} ({})", repr.id, repr.name))
    }
}

/// A `(kind, text)` pair explaining a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reason {
    pub kind: ReasonKind,
    pub text: String,
}

impl Reason {
    pub fn new(kind: ReasonKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.text)
    }
}

/// Module-registered reason kinds, keyed by id.
#[derive(Debug, Default)]
pub struct ReasonKindRegistry {
    kinds: BTreeMap<u16, ReasonKind>,
}

impl ReasonKindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module kind. Re-registering the same `(id, name)` is a no-op;
    /// reusing an id under another name is an error.
    pub fn register(&mut self, id: u16, name: &str) -> Result<ReasonKind> {
        let kind = ReasonKind::module(id, name)?;
        match self.kinds.get(&id) {
            Some(existing) if existing.name() == name => Ok(existing.clone()),
            Some(existing) => Err(QcError::ConfigError(format!(
                "reason kind id {id} already registered as `{}`",
                existing.name()
            ))),
            None => {
                self.kinds.insert(id, kind.clone());
                Ok(kind)
            }
        }
    }

    /// Look up a kind by id, built-in kinds included.
    pub fn get(&self, id: u16) -> Option<ReasonKind> {
        ReasonKind::builtin(id).or_else(|| self.kinds.get(&id).cloned())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReasonKind> {
        self.kinds.values()
    }
}
