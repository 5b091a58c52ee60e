// src/config/validate.rs

use std::collections::BTreeMap;
use std::sync::OnceLock;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use regex::Regex;

use crate::artifact::ROOT_CLASS;
use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{QcError, Result};
use crate::types::DataSourceKind;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::QcError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_work(cfg)?;
    validate_identifiers(cfg)?;
    validate_common(cfg)?;
    validate_tasks(cfg)?;
    validate_data_sampling(cfg)?;
    validate_check_sources(cfg)?;
    validate_class_hierarchy(cfg)?;
    Ok(())
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_\-]+$").expect("identifier pattern is valid"))
}

/// `true` for names usable as task, check, object or detector identifiers.
pub fn is_identifier(name: &str) -> bool {
    identifier_pattern().is_match(name)
}

fn ensure_identifier(what: &str, name: &str) -> Result<()> {
    if !is_identifier(name) {
        return Err(QcError::ConfigError(format!(
            "{what} '{name}' is not a valid identifier (allowed: letters, digits, '_' and '-')"
        )));
    }
    Ok(())
}

fn ensure_has_work(cfg: &RawConfigFile) -> Result<()> {
    if cfg.tasks.is_empty() && cfg.checks.is_empty() {
        return Err(QcError::ConfigError(
            "config must contain at least one [tasks.<name>] or [checks.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_identifiers(cfg: &RawConfigFile) -> Result<()> {
    ensure_identifier("detector", &cfg.common.detector)?;
    for (name, task) in cfg.tasks.iter() {
        ensure_identifier("task", name)?;
        if let Some(det) = &task.detector_name {
            ensure_identifier("detector", det)?;
        }
    }
    for (name, check) in cfg.checks.iter() {
        ensure_identifier("check", name)?;
        if let Some(det) = &check.detector_name {
            ensure_identifier("detector", det)?;
        }
    }
    for name in cfg.data_sampling.keys() {
        ensure_identifier("data source", name)?;
    }
    Ok(())
}

fn validate_common(cfg: &RawConfigFile) -> Result<()> {
    if cfg.common.repository_timeout_seconds == 0 {
        return Err(QcError::ConfigError(
            "[common].repositoryTimeoutSeconds must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_tasks(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.tasks.iter() {
        if task.module_name.trim().is_empty() || task.class_name.trim().is_empty() {
            return Err(QcError::ConfigError(format!(
                "task '{name}' must name a moduleName and a className"
            )));
        }
        if task.cycle_duration_seconds <= 0 {
            return Err(QcError::ConfigError(format!(
                "task '{name}': cycleDurationSeconds must be > 0 (got {})",
                task.cycle_duration_seconds
            )));
        }
        if task.max_cycles == Some(0) {
            return Err(QcError::ConfigError(format!(
                "task '{name}': maxCycles must be > 0 when set"
            )));
        }
        if task.reset_after_cycles == Some(0) {
            return Err(QcError::ConfigError(format!(
                "task '{name}': resetAfterCycles must be > 0 when set"
            )));
        }
        if task.poll_timeout_ms == 0 {
            return Err(QcError::ConfigError(format!(
                "task '{name}': pollTimeoutMs must be > 0"
            )));
        }
        if let Some(source) = &task.data_source {
            if !cfg.data_sampling.contains_key(source) {
                return Err(QcError::ConfigError(format!(
                    "task '{name}' uses unknown data source '{source}'"
                )));
            }
        }
    }
    Ok(())
}

fn validate_data_sampling(cfg: &RawConfigFile) -> Result<()> {
    for (name, source) in cfg.data_sampling.iter() {
        match source.kind {
            DataSourceKind::Replay if source.path.is_none() => {
                return Err(QcError::ConfigError(format!(
                    "data source '{name}': a replay source needs a `path`"
                )));
            }
            DataSourceKind::Generator if !(source.rate_per_second > 0.0) => {
                return Err(QcError::ConfigError(format!(
                    "data source '{name}': ratePerSecond must be > 0"
                )));
            }
            DataSourceKind::Generator if !(source.min < source.max) => {
                return Err(QcError::ConfigError(format!(
                    "data source '{name}': min must be lower than max"
                )));
            }
            _ => {}
        }
        if source.blocks_per_batch == 0 {
            return Err(QcError::ConfigError(format!(
                "data source '{name}': blocksPerBatch must be >= 1"
            )));
        }
    }
    Ok(())
}

fn validate_check_sources(cfg: &RawConfigFile) -> Result<()> {
    for (name, check) in cfg.checks.iter() {
        if check.module_name.trim().is_empty() || check.class_name.trim().is_empty() {
            return Err(QcError::ConfigError(format!(
                "check '{name}' must name a moduleName and a className"
            )));
        }
        if check.data_source.is_empty() {
            return Err(QcError::ConfigError(format!(
                "check '{name}' has an empty dataSource list"
            )));
        }
        for source in check.data_source.iter() {
            if !cfg.tasks.contains_key(&source.task) {
                return Err(QcError::ConfigError(format!(
                    "check '{name}' reads from unknown task '{}'",
                    source.task
                )));
            }
            for object in source.objects.iter() {
                ensure_identifier("object", object)?;
            }
        }
    }
    Ok(())
}

fn validate_class_hierarchy(cfg: &RawConfigFile) -> Result<()> {
    classes_in_order(&cfg.classes).map(|_| ())
}

/// `[classes]` entries as `(child, parent)` pairs, parents first.
pub fn classes_in_order(classes: &BTreeMap<String, String>) -> Result<Vec<(String, String)>> {
    // Edge direction: parent -> child.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    graph.add_node(ROOT_CLASS);

    for (child, parent) in classes.iter() {
        if child == ROOT_CLASS {
            return Err(QcError::ConfigError(format!(
                "class '{ROOT_CLASS}' cannot have a parent"
            )));
        }
        graph.add_edge(parent.as_str(), child.as_str(), ());
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order
            .into_iter()
            .filter_map(|class| classes.get_key_value(class))
            .map(|(child, parent)| (child.clone(), parent.clone()))
            .collect()),
        Err(cycle) => Err(QcError::ConfigError(format!(
            "cycle detected in [classes] involving class '{}'",
            cycle.node_id()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::load_from_str;

    fn validate(toml: &str) -> Result<ConfigFile> {
        ConfigFile::try_from(load_from_str(toml)?)
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("skeleton-task_1"));
        assert!(!is_identifier("bad name"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn empty_config_is_rejected() {
        assert!(matches!(validate(""), Err(QcError::ConfigError(_))));
    }

    #[test]
    fn non_positive_cycle_duration_is_rejected() {
        let err = validate(
            r#"
            [tasks.t]
            moduleName = "Skeleton"
            className = "SkeletonTask"
            cycleDurationSeconds = 0
            "#,
        );
        assert!(matches!(err, Err(QcError::ConfigError(_))));
    }

    #[test]
    fn check_must_read_known_task() {
        let err = validate(
            r#"
            [checks.c]
            moduleName = "Skeleton"
            className = "FixedQuality"
            dataSource = [{ task = "ghost" }]
            "#,
        );
        assert!(matches!(err, Err(QcError::ConfigError(m)) if m.contains("ghost")));
    }

    #[test]
    fn class_cycles_are_rejected() {
        let err = validate(
            r#"
            [tasks.t]
            moduleName = "Skeleton"
            className = "SkeletonTask"

            [classes]
            A = "B"
            B = "A"
            "#,
        );
        assert!(matches!(err, Err(QcError::ConfigError(m)) if m.contains("cycle")));
    }

    #[test]
    fn classes_are_ordered_parents_first() -> Result<()> {
        let classes = BTreeMap::from([
            ("AGrandChild".to_string(), "BChild".to_string()),
            ("BChild".to_string(), "TH1".to_string()),
        ]);
        let order = classes_in_order(&classes)?;
        let names: Vec<&str> = order.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(names, vec!["BChild", "AGrandChild"]);
        Ok(())
    }
}
