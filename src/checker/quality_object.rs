// src/checker/quality_object.rs

use serde::{Deserialize, Serialize};

use crate::activity::{Activity, ValidityInterval};
use crate::quality::Quality;
use crate::repository::paths;

/// Verdict of one check on one primary object, stored next to the object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityObject {
    pub quality: Quality,
    pub check_name: String,
    pub detector: String,
    /// Primary object first, then any other inspected objects.
    pub monitor_object_names: Vec<String>,
    #[serde(default)]
    pub activity: Activity,
    #[serde(default)]
    pub validity: ValidityInterval,
}

impl QualityObject {
    /// `<provenance>/<detector>/QO/<check>/<primary object>`.
    pub fn path(&self) -> String {
        paths::qo_path(
            &self.activity.provenance,
            &self.detector,
            &self.check_name,
            self.monitor_object_names.first().map(String::as_str),
        )
    }
}
