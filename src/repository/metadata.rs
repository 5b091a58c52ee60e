// src/repository/metadata.rs

//! Metadata attached to every stored object.

use std::collections::BTreeMap;

use crate::artifact::MonitorObject;
use crate::checker::QualityObject;
use crate::errors::Result;

pub type Metadata = BTreeMap<String, String>;

/// Version of the framework stamped on stored objects.
pub const QC_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod keys {
    pub const RUN: &str = "Run";
    pub const PERIOD_NAME: &str = "PeriodName";
    pub const PASS_NAME: &str = "PassName";
    pub const ACTIVITY_TYPE: &str = "activityType";
    pub const VALID_FROM: &str = "validFromMs";
    pub const VALID_UNTIL: &str = "validUntilMs";
    pub const QC_VERSION: &str = "qcVersion";
    pub const OWNER_TASK: &str = "ownerTaskName";
    pub const QUALITY_LEVEL: &str = "qualityLevel";
    pub const QUALITY_NAME: &str = "qualityName";
    pub const OBJECT_TYPE: &str = "ObjectType";
    pub const CHECK_NAME: &str = "checkName";
    pub const PAYLOAD_CHECKSUM: &str = "payloadChecksum";
    pub const CYCLE_NUMBER: &str = "cycleNumber";
}

/// Metadata for a monitor object: activity, validity, quality and the
/// object's own user metadata (which never overrides the reserved keys).
pub fn for_monitor_object(object: &MonitorObject) -> Metadata {
    let activity = object.activity();
    let validity = object.validity();
    let mut md = Metadata::new();
    md.insert(keys::RUN.into(), activity.id.to_string());
    md.insert(keys::PERIOD_NAME.into(), activity.period_name.clone().unwrap_or_default());
    md.insert(keys::PASS_NAME.into(), activity.pass_name.clone().unwrap_or_default());
    md.insert(keys::ACTIVITY_TYPE.into(), activity.activity_type.to_string());
    md.insert(keys::VALID_FROM.into(), validity.min.to_string());
    md.insert(keys::VALID_UNTIL.into(), validity.max.to_string());
    md.insert(keys::QC_VERSION.into(), QC_VERSION.into());
    md.insert(keys::OWNER_TASK.into(), object.task_name().to_string());
    md.insert(keys::QUALITY_LEVEL.into(), object.quality().level().to_string());
    md.insert(keys::QUALITY_NAME.into(), object.quality().name().to_string());
    md.insert(keys::OBJECT_TYPE.into(), object.class_name().to_string());
    for (key, value) in object.metadata_map() {
        md.entry(key.clone()).or_insert_with(|| value.clone());
    }
    md
}

pub fn for_quality_object(qo: &QualityObject) -> Metadata {
    let mut md = Metadata::new();
    md.insert(keys::RUN.into(), qo.activity.id.to_string());
    md.insert(keys::PERIOD_NAME.into(), qo.activity.period_name.clone().unwrap_or_default());
    md.insert(keys::PASS_NAME.into(), qo.activity.pass_name.clone().unwrap_or_default());
    md.insert(keys::ACTIVITY_TYPE.into(), qo.activity.activity_type.to_string());
    md.insert(keys::VALID_FROM.into(), qo.validity.min.to_string());
    md.insert(keys::VALID_UNTIL.into(), qo.validity.max.to_string());
    md.insert(keys::QC_VERSION.into(), QC_VERSION.into());
    md.insert(keys::CHECK_NAME.into(), qo.check_name.clone());
    md.insert(keys::QUALITY_LEVEL.into(), qo.quality.level().to_string());
    md.insert(keys::QUALITY_NAME.into(), qo.quality.name().to_string());
    md
}

/// blake3 digest of the serialized payload, hex encoded.
pub fn payload_checksum(object: &MonitorObject) -> Result<String> {
    let bytes = object.payload().to_bytes()?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

/// `validFromMs` parsed from metadata, 0 if absent or malformed.
pub fn valid_from(md: &Metadata) -> i64 {
    md.get(keys::VALID_FROM)
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// `validUntilMs` parsed from metadata, `i64::MAX` if absent or malformed.
pub fn valid_until(md: &Metadata) -> i64 {
    md.get(keys::VALID_UNTIL)
        .and_then(|v| v.parse().ok())
        .unwrap_or(i64::MAX)
}

/// `true` if every entry of `filter` is present with the same value in `md`.
pub fn matches(md: &Metadata, filter: &Metadata) -> bool {
    filter.iter().all(|(k, v)| md.get(k) == Some(v))
}
