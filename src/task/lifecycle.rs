// src/task/lifecycle.rs

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a task runner.
///
/// ```text
///          configure      start        cycle        stop
/// [CREATED] ──────▶ [READY] ──▶ [ACTIVE] ◀─▶ [CYCLING] ──▶ [STOPPED]
///                      ▲                                      │
///                      └──────────────── reset ◀──────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Created,
    Ready,
    Active,
    Cycling,
    Stopped,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Created => "CREATED",
            TaskState::Ready => "READY",
            TaskState::Active => "ACTIVE",
            TaskState::Cycling => "CYCLING",
            TaskState::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}

const STOP: u8 = 0b01;
const ABORT: u8 = 0b10;

/// Cross-thread stop requests for a running cycle.
///
/// A stop lets the current cycle finish its `endOfCycle`, publication and
/// `endOfActivity`; an abort skips all of them. Requests are observed at
/// the next poll boundary.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flags: Arc<AtomicU8>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.flags.fetch_or(STOP, Ordering::SeqCst);
    }

    pub fn request_abort(&self) {
        self.flags.fetch_or(ABORT, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.flags.load(Ordering::SeqCst) & STOP != 0
    }

    pub fn abort_requested(&self) -> bool {
        self.flags.load(Ordering::SeqCst) & ABORT != 0
    }

    pub(crate) fn clear(&self) {
        self.flags.store(0, Ordering::SeqCst);
    }
}

/// Fault report for the controlling environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub component: String,
    pub kind: &'static str,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_share_flags() {
        let handle = StopHandle::new();
        let clone = handle.clone();
        assert!(!handle.stop_requested());
        clone.request_stop();
        assert!(handle.stop_requested());
        assert!(!handle.abort_requested());
        clone.request_abort();
        assert!(handle.abort_requested());
        handle.clear();
        assert!(!clone.stop_requested());
    }

    #[test]
    fn states_display_in_upper_case() {
        assert_eq!(TaskState::Cycling.to_string(), "CYCLING");
    }
}
