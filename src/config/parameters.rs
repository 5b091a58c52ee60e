// src/config/parameters.rs

//! Custom parameters of tasks and checks.
//!
//! Values are stored per `(runType, beamType)` pair. The pair
//! `("default", "default")` holds the flat `customParameters` table; the
//! nested `extendedParameters.<runType>.<beamType>` tables override it for
//! matching activities.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Serialize;

use crate::activity::Activity;
use crate::errors::{QcError, Result};

pub const DEFAULT_KEY: &str = "default";

type Table = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CustomParameters {
    // runType -> beamType -> key -> value
    values: BTreeMap<String, BTreeMap<String, Table>>,
}

impl CustomParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the flat table and the nested per-activity tables.
    pub fn from_tables(flat: &Table, extended: &BTreeMap<String, BTreeMap<String, Table>>) -> Self {
        let mut params = Self::new();
        for (key, value) in flat {
            params.set(key, value, DEFAULT_KEY, DEFAULT_KEY);
        }
        for (run_type, beams) in extended {
            for (beam_type, table) in beams {
                for (key, value) in table {
                    params.set(key, value, run_type, beam_type);
                }
            }
        }
        params
    }

    pub fn set(&mut self, key: &str, value: &str, run_type: &str, beam_type: &str) {
        self.values
            .entry(run_type.to_string())
            .or_default()
            .entry(beam_type.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    /// Default value of `key`; a missing key is a configuration error.
    pub fn at(&self, key: &str) -> Result<&str> {
        self.at_optional(key, DEFAULT_KEY, DEFAULT_KEY)
            .ok_or_else(|| QcError::ConfigError(format!("missing custom parameter `{key}`")))
    }

    /// Exact lookup for a `(runType, beamType)` pair, no fallback.
    pub fn at_optional(&self, key: &str, run_type: &str, beam_type: &str) -> Option<&str> {
        self.values
            .get(run_type)?
            .get(beam_type)?
            .get(key)
            .map(String::as_str)
    }

    pub fn at_or_default<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.at_optional(key, DEFAULT_KEY, DEFAULT_KEY).unwrap_or(default)
    }

    /// Lookup for an activity: `(run, beam)`, then `(run, default)`, then
    /// `(default, default)`.
    pub fn at_for_activity(&self, key: &str, activity: &Activity) -> Option<&str> {
        let run_type = activity.run_type_name();
        let beam_type = activity.beam_type.as_deref().unwrap_or(DEFAULT_KEY);
        self.at_optional(key, &run_type, beam_type)
            .or_else(|| self.at_optional(key, &run_type, DEFAULT_KEY))
            .or_else(|| self.at_optional(key, DEFAULT_KEY, DEFAULT_KEY))
    }

    /// Default value parsed as `T`. `Ok(None)` when absent.
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.at_optional(key, DEFAULT_KEY, DEFAULT_KEY) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
                QcError::ConfigError(format!("custom parameter `{key}` = `{raw}`: {e}"))
            }),
        }
    }

    /// The default table, as passed to modules that only care about it.
    pub fn defaults(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .get(DEFAULT_KEY)
            .and_then(|beams| beams.get(DEFAULT_KEY))
            .into_iter()
            .flat_map(|t| t.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }

    pub fn is_empty(&self) -> bool {
        self.values.values().all(|b| b.values().all(BTreeMap::is_empty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> CustomParameters {
        let mut flat = Table::new();
        flat.insert("threshold".into(), "5".into());
        flat.insert("mode".into(), "fast".into());
        let mut pp = Table::new();
        pp.insert("threshold".into(), "7".into());
        let mut physics_default = Table::new();
        physics_default.insert("mode".into(), "precise".into());
        let mut extended = BTreeMap::new();
        extended.insert(
            "PHYSICS".to_string(),
            BTreeMap::from([("pp".to_string(), pp), ("default".to_string(), physics_default)]),
        );
        CustomParameters::from_tables(&flat, &extended)
    }

    #[test]
    fn default_lookups() {
        let p = params();
        assert_eq!(p.at("threshold").ok(), Some("5"));
        assert!(p.at("missing").is_err());
        assert_eq!(p.at_or_default("missing", "x"), "x");
        assert_eq!(p.parse::<u32>("threshold").ok().flatten(), Some(5));
        assert!(p.parse::<u32>("mode").is_err());
    }

    #[test]
    fn activity_lookup_falls_back() {
        let p = params();
        let pp_physics = Activity::new(1, 1).with_beam_type("pp");
        assert_eq!(p.at_for_activity("threshold", &pp_physics), Some("7"));
        assert_eq!(p.at_for_activity("mode", &pp_physics), Some("precise"));

        let cosmics = Activity::new(2, 2);
        assert_eq!(p.at_for_activity("threshold", &cosmics), Some("5"));
    }
}
