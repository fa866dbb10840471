use crate::detection::domain::detection::Detection;
use crate::monitoring::domain::monitor_snapshot::MonitorSnapshot;
use crate::monitoring::domain::violation_tracker::ViolationEvent;

/// Consumer of monitor output.
///
/// Called from the monitor thread; implementations should return quickly.
/// Nothing a listener does can affect the monitor.
pub trait MonitorListener: Send {
    /// Once per rising edge of a violation condition.
    fn on_violation(&mut self, event: &ViolationEvent);

    /// Every completed detection, including empty ones.
    fn on_detection_result(&mut self, detections: &[Detection]);

    /// After each state change. Default: no-op.
    fn on_snapshot(&mut self, _snapshot: &MonitorSnapshot) {}
}

/// Discards everything. Used when only snapshots are polled, and in tests.
pub struct NullMonitorListener;

impl MonitorListener for NullMonitorListener {
    fn on_violation(&mut self, _event: &ViolationEvent) {}
    fn on_detection_result(&mut self, _detections: &[Detection]) {}
}

/// Routes monitor output to the `log` crate.
pub struct LogMonitorListener;

impl MonitorListener for LogMonitorListener {
    fn on_violation(&mut self, event: &ViolationEvent) {
        log::warn!(
            "Violation at {:.1}s: {}",
            event.timestamp_ms as f64 / 1000.0,
            event.description
        );
    }

    fn on_detection_result(&mut self, detections: &[Detection]) {
        log::debug!("Detected {} face(s)", detections.len());
    }

    fn on_snapshot(&mut self, snapshot: &MonitorSnapshot) {
        log::trace!(
            "{:?}: faces={} away={} violations={}",
            snapshot.lifecycle,
            snapshot.face_count,
            snapshot.is_looking_away,
            snapshot.violation_count
        );
    }
}
