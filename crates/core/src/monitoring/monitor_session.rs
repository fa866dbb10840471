use crate::detection::domain::detection::Detection;
use crate::detection::domain::face_detector::DetectionError;
use crate::monitoring::domain::gaze_estimator::{GazeEstimator, GazeThresholds};
use crate::monitoring::domain::monitor_listener::MonitorListener;
use crate::monitoring::domain::monitor_snapshot::{LifecycleState, MonitorSnapshot};
use crate::monitoring::domain::violation_tracker::ViolationTracker;

/// Per-tick decision pipeline: detections → gaze → violations → listener.
///
/// Owned by the monitor thread, which is its only writer. Estimator
/// histories and violation state survive stop/start; only
/// [`reset_violations`](Self::reset_violations) clears the running count.
pub struct MonitorSession {
    estimator: GazeEstimator,
    tracker: ViolationTracker,
    listener: Box<dyn MonitorListener>,
    snapshot: MonitorSnapshot,
}

impl MonitorSession {
    pub fn new(thresholds: GazeThresholds, listener: Box<dyn MonitorListener>) -> Self {
        Self {
            estimator: GazeEstimator::new(thresholds),
            tracker: ViolationTracker::new(),
            listener,
            snapshot: MonitorSnapshot::default(),
        }
    }

    pub fn snapshot(&self) -> &MonitorSnapshot {
        &self.snapshot
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.snapshot.lifecycle
    }

    pub fn set_lifecycle(&mut self, lifecycle: LifecycleState) {
        if self.snapshot.lifecycle != lifecycle {
            log::info!("Monitor {:?} -> {:?}", self.snapshot.lifecycle, lifecycle);
        }
        self.snapshot.lifecycle = lifecycle;
        self.snapshot.is_monitoring = lifecycle == LifecycleState::Monitoring;
    }

    pub fn set_error(&mut self, error: Option<String>) {
        self.snapshot.error = error;
    }

    pub fn record_tick(&mut self) {
        self.snapshot.ticks += 1;
    }

    pub fn record_skip(&mut self) {
        self.snapshot.skipped_ticks += 1;
    }

    /// Transient failure: logged and counted, state otherwise untouched.
    pub fn record_detection_error(&mut self, tick: u64, error: &DetectionError) {
        log::warn!("Detection failed on tick {tick}: {error}");
        self.snapshot.detection_errors += 1;
    }

    pub fn apply_detections(&mut self, detections: &[Detection], tick: u64, timestamp_ms: u64) {
        self.listener.on_detection_result(detections);

        let face_count = detections.len();
        let looking_away = match detections {
            [face] => {
                let assessment = self.estimator.estimate(face);
                log::trace!("Tick {tick}: {assessment:?}");
                assessment.looking_away
            }
            _ => false,
        };

        let events = self.tracker.update(face_count, looking_away, tick, timestamp_ms);
        self.snapshot.face_count = face_count;
        self.snapshot.apply_violations(self.tracker.state());

        for event in &events {
            self.listener.on_violation(event);
        }
    }

    pub fn reset_violations(&mut self) {
        self.tracker.reset_violations();
        self.snapshot.apply_violations(self.tracker.state());
    }

    /// Tells the listener about the current snapshot and returns a copy
    /// for publishing.
    pub fn publish(&mut self) -> MonitorSnapshot {
        self.listener.on_snapshot(&self.snapshot);
        self.snapshot.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::detection::domain::detection::{BoundingBox, FaceKeypoints, Point};
    use crate::monitoring::domain::violation_tracker::{ViolationEvent, ViolationKind};

    #[derive(Default)]
    struct Recorded {
        violations: Vec<ViolationEvent>,
        results: Vec<usize>,
        snapshots: usize,
    }

    struct RecordingListener(Arc<Mutex<Recorded>>);

    impl MonitorListener for RecordingListener {
        fn on_violation(&mut self, event: &ViolationEvent) {
            self.0.lock().unwrap().violations.push(event.clone());
        }

        fn on_detection_result(&mut self, detections: &[Detection]) {
            self.0.lock().unwrap().results.push(detections.len());
        }

        fn on_snapshot(&mut self, _snapshot: &MonitorSnapshot) {
            self.0.lock().unwrap().snapshots += 1;
        }
    }

    fn session() -> (MonitorSession, Arc<Mutex<Recorded>>) {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let listener = RecordingListener(recorded.clone());
        (
            MonitorSession::new(GazeThresholds::default(), Box::new(listener)),
            recorded,
        )
    }

    fn face(nose_dx: f64) -> Detection {
        let kp = FaceKeypoints::new(
            Point::new(250.0, 200.0),
            Point::new(350.0, 200.0),
            Point::new(300.0 + nose_dx * 100.0, 200.0),
        );
        Detection::new(BoundingBox::new(200.0, 100.0, 200.0, 200.0), kp, 0.9)
    }

    #[test]
    fn test_every_result_reaches_listener() {
        let (mut s, rec) = session();
        s.apply_detections(&[], 0, 0);
        s.apply_detections(&[face(0.0)], 1, 1000);
        s.apply_detections(&[face(0.0), face(0.0)], 2, 2000);
        assert_eq!(rec.lock().unwrap().results, vec![0, 1, 2]);
    }

    #[test]
    fn test_face_count_sequence_raises_two_violations() {
        let (mut s, rec) = session();
        s.apply_detections(&[face(0.0)], 0, 0);
        s.apply_detections(&[], 1, 1000);
        s.apply_detections(&[face(0.0), face(0.0)], 2, 2000);

        let kinds: Vec<_> = rec
            .lock()
            .unwrap()
            .violations
            .iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec![ViolationKind::NoFace, ViolationKind::MultipleFaces]);
        assert_eq!(s.snapshot().violation_count, 2);
        assert_eq!(s.snapshot().face_count, 2);
    }

    #[test]
    fn test_sustained_look_away_counts_once() {
        let (mut s, rec) = session();
        for tick in 0..5 {
            s.apply_detections(&[face(0.0)], tick, tick * 1000);
        }
        for tick in 5..10 {
            s.apply_detections(&[face(1.2)], tick, tick * 1000);
        }
        assert_eq!(rec.lock().unwrap().violations.len(), 1);
        assert!(s.snapshot().is_looking_away);
        assert_eq!(s.snapshot().counts.looking_away, 1);
    }

    #[test]
    fn test_multiple_faces_skip_gaze_estimation() {
        let (mut s, _rec) = session();
        s.apply_detections(&[face(1.5), face(1.5)], 0, 0);
        assert!(!s.snapshot().is_looking_away);
    }

    #[test]
    fn test_detection_error_is_counted_without_state_change() {
        let (mut s, rec) = session();
        s.apply_detections(&[face(0.0)], 0, 0);
        s.record_detection_error(1, &DetectionError::Inference("boom".into()));
        assert_eq!(s.snapshot().detection_errors, 1);
        assert_eq!(s.snapshot().face_count, 1);
        assert!(rec.lock().unwrap().violations.is_empty());
    }

    #[test]
    fn test_reset_keeps_lifecycle() {
        let (mut s, _rec) = session();
        s.set_lifecycle(LifecycleState::Monitoring);
        s.apply_detections(&[], 0, 0);
        s.reset_violations();
        assert_eq!(s.snapshot().violation_count, 0);
        assert!(!s.snapshot().suspicious_activity);
        assert!(s.snapshot().is_monitoring);
        assert_eq!(s.lifecycle(), LifecycleState::Monitoring);
    }

    #[test]
    fn test_publish_notifies_listener() {
        let (mut s, rec) = session();
        s.set_lifecycle(LifecycleState::Ready);
        let snap = s.publish();
        assert_eq!(snap.lifecycle, LifecycleState::Ready);
        assert!(!snap.is_monitoring);
        assert_eq!(rec.lock().unwrap().snapshots, 1);
    }
}
