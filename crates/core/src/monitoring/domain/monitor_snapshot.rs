use serde::Serialize;

use crate::monitoring::domain::violation_tracker::{ViolationCounts, ViolationState};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Constructed; nothing requested yet.
    Uninitialized,
    /// Detector loading, or failed to load (see `MonitorSnapshot::error`).
    Initializing,
    /// Detector loaded, not sampling.
    Ready,
    Monitoring,
    Stopped,
}

/// Read-only view of the monitor, published after every state change.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonitorSnapshot {
    pub lifecycle: LifecycleState,
    pub is_monitoring: bool,
    pub face_count: usize,
    pub is_looking_away: bool,
    pub violation_count: u64,
    pub suspicious_activity: bool,
    pub error: Option<String>,
    pub ticks: u64,
    /// Ticks dropped because the source was not decodable or a detection
    /// was still in flight.
    pub skipped_ticks: u64,
    pub detection_errors: u64,
    pub counts: ViolationCounts,
}

impl MonitorSnapshot {
    pub(crate) fn apply_violations(&mut self, state: &ViolationState) {
        self.violation_count = state.violation_count;
        self.suspicious_activity = state.suspicious_activity;
        self.is_looking_away = state.looking_away;
        self.counts = state.counts;
    }
}

impl Default for MonitorSnapshot {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleState::Uninitialized,
            is_monitoring: false,
            face_count: 0,
            is_looking_away: false,
            violation_count: 0,
            suspicious_activity: false,
            error: None,
            ticks: 0,
            skipped_ticks: 0,
            detection_errors: 0,
            counts: ViolationCounts::default(),
        }
    }
}
