// src/repository/paths.rs

//! Repository path layout.
//!
//! - monitor objects: `<provenance>/<detector>/MO/<task>/<object>`
//! - quality objects: `<provenance>/<detector>/QO/<check>[/<object>]`

/// Provenance prefix used when none is configured.
pub const DEFAULT_PROVENANCE: &str = "qc";

pub fn mo_path(provenance: &str, detector: &str, task_name: &str, object_name: &str) -> String {
    let mut path = format!("{}/{}/MO/{}", provenance_or_default(provenance), detector, task_name);
    if !object_name.is_empty() {
        path.push('/');
        path.push_str(object_name);
    }
    path
}

pub fn qo_path(provenance: &str, detector: &str, check_name: &str, object_name: Option<&str>) -> String {
    let mut path = format!("{}/{}/QO/{}", provenance_or_default(provenance), detector, check_name);
    if let Some(object) = object_name.filter(|o| !o.is_empty()) {
        path.push('/');
        path.push_str(object);
    }
    path
}

/// Split `a/b/c` into (`a/b`, `c`).
pub fn split_object_path(path: &str) -> Option<(&str, &str)> {
    let trimmed = path.trim_end_matches('/');
    let (dir, name) = trimmed.rsplit_once('/')?;
    (!dir.is_empty() && !name.is_empty()).then_some((dir, name))
}

/// Task name of a monitor-object path `<prov>/<det>/MO/<task>/<object>`.
pub fn owning_task(path: &str) -> Option<&str> {
    let mut parts = path.split('/');
    let (_prov, _det, kind, task, object) =
        (parts.next()?, parts.next()?, parts.next()?, parts.next()?, parts.next()?);
    (kind == "MO" && !object.is_empty()).then_some(task)
}

fn provenance_or_default(provenance: &str) -> &str {
    if provenance.is_empty() {
        DEFAULT_PROVENANCE
    } else {
        provenance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mo_paths() {
        assert_eq!(mo_path("qc", "TST", "task", "histo"), "qc/TST/MO/task/histo");
        assert_eq!(mo_path("", "TST", "task", ""), "qc/TST/MO/task");
    }

    #[test]
    fn qo_paths() {
        assert_eq!(qo_path("qc", "DET", "xyzCheck", None), "qc/DET/QO/xyzCheck");
        assert_eq!(
            qo_path("qc", "DET", "xyzCheck", Some("objectABC")),
            "qc/DET/QO/xyzCheck/objectABC"
        );
    }

    #[test]
    fn splits_paths() {
        assert_eq!(
            split_object_path("qc/TST/MO/task/histo"),
            Some(("qc/TST/MO/task", "histo"))
        );
        assert_eq!(split_object_path("histo"), None);
    }

    #[test]
    fn owning_task_of_mo_paths_only() {
        assert_eq!(owning_task("qc/TST/MO/task/histo"), Some("task"));
        assert_eq!(owning_task("qc/TST/QO/check/histo"), None);
        assert_eq!(owning_task("qc/TST/MO/task"), None);
    }
}
