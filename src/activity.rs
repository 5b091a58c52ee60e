// src/activity.rs

//! Data-taking activity ("run") and validity intervals.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Ten years in milliseconds, the default upper bound of an object's validity.
pub const TEN_YEARS_MS: i64 = 1000 * 60 * 60 * 24 * 365 * 10;

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Closed interval `[min, max]` in milliseconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidityInterval {
    pub min: i64,
    pub max: i64,
}

impl ValidityInterval {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    /// Validity starting at `from` and lasting ten years.
    pub fn starting_at(from: i64) -> Self {
        Self {
            min: from,
            max: from.saturating_add(TEN_YEARS_MS),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min <= self.max
    }

    pub fn contains(&self, timestamp_ms: i64) -> bool {
        self.min <= timestamp_ms && timestamp_ms <= self.max
    }
}

/// A bounded period of data-taking, created by the controlling environment
/// before `start` and immutable while it lasts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(default)]
    pub id: i64,
    #[serde(default, rename = "type")]
    pub activity_type: i32,
    #[serde(default)]
    pub period_name: Option<String>,
    #[serde(default)]
    pub pass_name: Option<String>,
    #[serde(default)]
    pub partition_name: Option<String>,
    #[serde(default)]
    pub beam_type: Option<String>,
    #[serde(default = "default_provenance")]
    pub provenance: String,
    #[serde(default)]
    pub valid_from_ms: i64,
    #[serde(default)]
    pub valid_until_ms: i64,
}

fn default_provenance() -> String {
    "qc".to_string()
}

impl Default for Activity {
    fn default() -> Self {
        Self {
            id: 0,
            activity_type: 0,
            period_name: None,
            pass_name: None,
            partition_name: None,
            beam_type: None,
            provenance: default_provenance(),
            valid_from_ms: 0,
            valid_until_ms: 0,
        }
    }
}

impl Activity {
    pub fn new(id: i64, activity_type: i32) -> Self {
        Self {
            id,
            activity_type,
            ..Self::default()
        }
    }

    pub fn with_period(mut self, period: impl Into<String>) -> Self {
        self.period_name = Some(period.into());
        self
    }

    pub fn with_pass(mut self, pass: impl Into<String>) -> Self {
        self.pass_name = Some(pass.into());
        self
    }

    pub fn with_beam_type(mut self, beam: impl Into<String>) -> Self {
        self.beam_type = Some(beam.into());
        self
    }

    pub fn validity(&self) -> ValidityInterval {
        ValidityInterval::new(self.valid_from_ms, self.valid_until_ms)
    }

    /// Run-type label used to select activity-specific custom parameters.
    pub fn run_type_name(&self) -> String {
        match self.activity_type {
            1 => "PHYSICS".to_string(),
            2 => "TECHNICAL".to_string(),
            3 => "PEDESTAL".to_string(),
            4 => "PULSER".to_string(),
            5 => "LASER".to_string(),
            6 => "CALIBRATION".to_string(),
            7 => "COSMICS".to_string(),
            8 => "SYNTHETIC".to_string(),
            other => other.to_string(),
        }
    }
}
