// src/errors.rs

//! Crate-wide error type and helpers.
//!
//! Errors raised inside the check-and-publish pipeline never surface here:
//! they are recovered locally and recorded as quality reasons or telemetry
//! counters. What remains are configuration problems, lifecycle misuse,
//! registry misuse by user code, and fatal faults of state-transition hooks.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QcError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Lifecycle error: {0}")]
    LifecycleError(String),

    #[error("Unknown object: {0}")]
    UnknownObject(String),

    #[error("Object is already being published: {0}")]
    DuplicateName(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Processing error: {0}")]
    ProcessingError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Repository unreachable: {0}")]
    RepositoryUnreachable(String),

    #[error("Task fault in `{hook}`: {message}")]
    TaskFault { hook: &'static str, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl QcError {
    /// Stable label used in status reports and per-kind telemetry counters.
    pub fn kind(&self) -> &'static str {
        match self {
            QcError::ConfigError(_) | QcError::TomlError(_) => "config",
            QcError::LifecycleError(_) => "lifecycle",
            QcError::UnknownObject(_) => "unknown_object",
            QcError::DuplicateName(_) => "duplicate_name",
            QcError::TypeMismatch(_) => "type_mismatch",
            QcError::ProcessingError(_) => "processing",
            QcError::StorageError(_) => "storage",
            QcError::RepositoryUnreachable(_) => "repository_unreachable",
            QcError::TaskFault { .. } => "task_fault",
            QcError::IoError(_) => "io",
            QcError::JsonError(_) => "json",
            QcError::Other(_) => "other",
        }
    }

    /// Process exit code used by the CLI.
    ///
    /// 0 success, 1 config error, 2 runtime fault, 3 repository unreachable.
    pub fn exit_code(&self) -> i32 {
        match self {
            QcError::ConfigError(_) | QcError::TomlError(_) => 1,
            QcError::RepositoryUnreachable(_) => 3,
            _ => 2,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, QcError>;

/// Run a user hook, turning a panic into an error.
///
/// Module code is foreign to the runtime; a panic there must not unwind
/// through the cycle loop.
pub fn call_guarded<T>(hook: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(hook)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            Err(anyhow::anyhow!("panicked: {message}"))
        }
    }
}
