//! Smoothed "looking away" decision for a single detected face.
//!
//! The base rule compares the nose offset from the eye midpoint, scaled by
//! inter-eye distance, against a fixed threshold. Rolling histories of
//! confidence, face position, eye distance and past decisions then tighten
//! that rule when the signal is noisy. Every refinement is ANDed with the
//! base rule, so smoothing can only suppress a look-away, never invent one.

use serde::{Deserialize, Serialize};

use crate::detection::domain::detection::{Detection, Point};
use crate::shared::rolling_history::RollingHistory;

pub const GAZE_HISTORY_LEN: usize = 5;
pub const POSITION_HISTORY_LEN: usize = 3;
pub const EYE_DISTANCE_HISTORY_LEN: usize = 3;
pub const CONFIDENCE_HISTORY_LEN: usize = 5;

/// Number of recent decisions the consistency score looks at.
pub const CONSISTENCY_WINDOW: usize = 3;

/// Eye distances at or below this are treated as a degenerate face.
const MIN_EYE_DISTANCE: f64 = 1e-6;

/// Empirical tuning constants. Deviations are in units of inter-eye
/// distance; speeds are in pixels per tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeThresholds {
    pub deviation_x: f64,
    pub deviation_y: f64,
    pub low_confidence: f64,
    pub low_confidence_deviation_y: f64,
    pub stable_head_speed: f64,
    pub fast_head_speed: f64,
    pub fast_head_deviation_x: f64,
    pub fast_head_deviation_y: f64,
    /// Fraction of the mean eye distance.
    pub eye_distance_variation: f64,
    pub min_consistency: f64,
    pub inconsistent_deviation_x: f64,
    pub inconsistent_deviation_y: f64,
    /// Consistency assumed before the decision history fills.
    pub short_history_consistency: f64,
}

impl Default for GazeThresholds {
    fn default() -> Self {
        Self {
            deviation_x: 0.8,
            deviation_y: 0.8,
            low_confidence: 0.7,
            low_confidence_deviation_y: 0.84,
            stable_head_speed: 10.0,
            fast_head_speed: 20.0,
            fast_head_deviation_x: 0.7,
            fast_head_deviation_y: 1.05,
            eye_distance_variation: 0.15,
            min_consistency: 0.6,
            inconsistent_deviation_x: 0.42,
            inconsistent_deviation_y: 0.98,
            short_history_consistency: 0.5,
        }
    }
}

/// Everything the estimator computed for one face on one tick.
#[derive(Clone, Debug, PartialEq)]
pub struct GazeAssessment {
    /// Normalized nose deviation; `None` for a degenerate eye distance.
    pub deviation: Option<(f64, f64)>,
    pub base_looking_away: bool,
    pub average_confidence: f64,
    pub head_speed: f64,
    pub head_stable: bool,
    pub eye_distance_stable: bool,
    pub consistency: f64,
    pub looking_away: bool,
}

pub struct GazeEstimator {
    thresholds: GazeThresholds,
    gaze: RollingHistory<bool>,
    positions: RollingHistory<Point>,
    eye_distances: RollingHistory<f64>,
    confidences: RollingHistory<f64>,
}

impl GazeEstimator {
    pub fn new(thresholds: GazeThresholds) -> Self {
        Self {
            thresholds,
            gaze: RollingHistory::new(GAZE_HISTORY_LEN),
            positions: RollingHistory::new(POSITION_HISTORY_LEN),
            eye_distances: RollingHistory::new(EYE_DISTANCE_HISTORY_LEN),
            confidences: RollingHistory::new(CONFIDENCE_HISTORY_LEN),
        }
    }

    /// Evaluates the single face visible on this tick.
    pub fn estimate(&mut self, detection: &Detection) -> GazeAssessment {
        let t = &self.thresholds;
        let kp = &detection.keypoints;
        let eye_distance = kp.eye_distance();

        let deviation = (eye_distance > MIN_EYE_DISTANCE).then(|| {
            let mid = kp.eye_midpoint();
            (
                (kp.nose_tip.x - mid.x) / eye_distance,
                (kp.nose_tip.y - mid.y) / eye_distance,
            )
        });
        let (dx, dy) = deviation.map_or((0.0, 0.0), |(x, y)| (x.abs(), y.abs()));
        let base = deviation.is_some() && (dx > t.deviation_x || dy > t.deviation_y);

        self.confidences.push(detection.confidence);
        self.positions.push(detection.bbox.center());
        self.eye_distances.push(eye_distance);

        let average_confidence = self.confidences.mean().unwrap_or(detection.confidence);
        let head_speed = self
            .positions
            .last_two()
            .map_or(0.0, |(prev, last)| prev.distance(last));
        let head_stable = head_speed < t.stable_head_speed;
        let eye_distance_stable = match (self.eye_distances.mean(), self.eye_distances.max_deviation())
        {
            (Some(mean), Some(dev)) if mean > MIN_EYE_DISTANCE => {
                dev < t.eye_distance_variation * mean
            }
            _ => true,
        };
        let consistency = self.consistency();

        let mut looking_away = base;
        if average_confidence < t.low_confidence {
            looking_away &= dx > t.deviation_x || dy > t.low_confidence_deviation_y;
        }
        if !head_stable && head_speed > t.fast_head_speed {
            looking_away &= dx > t.fast_head_deviation_x || dy > t.fast_head_deviation_y;
        }
        if consistency < t.min_consistency {
            looking_away &= dx > t.inconsistent_deviation_x || dy > t.inconsistent_deviation_y;
        }

        self.gaze.push(looking_away);

        GazeAssessment {
            deviation,
            base_looking_away: base,
            average_confidence,
            head_speed,
            head_stable,
            eye_distance_stable,
            consistency,
            looking_away,
        }
    }

    /// Fraction of the last few decisions agreeing with the latest one.
    fn consistency(&self) -> f64 {
        if self.gaze.len() < CONSISTENCY_WINDOW {
            return self.thresholds.short_history_consistency;
        }
        let Some(&latest) = self.gaze.latest() else {
            return self.thresholds.short_history_consistency;
        };
        let agreeing = self
            .gaze
            .recent(CONSISTENCY_WINDOW)
            .filter(|&&g| g == latest)
            .count();
        agreeing as f64 / CONSISTENCY_WINDOW as f64
    }
}

impl Default for GazeEstimator {
    fn default() -> Self {
        Self::new(GazeThresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detection::{BoundingBox, FaceKeypoints};
    use approx::assert_relative_eq;
    use rstest::rstest;

    const EYE_SPAN: f64 = 100.0;

    /// Face at `(cx, cy)` with eyes 100px apart and the nose displaced by
    /// `(nx, ny)` eye-distances from the eye midpoint.
    fn face_at(cx: f64, cy: f64, nx: f64, ny: f64, confidence: f64) -> Detection {
        let right_eye = Point::new(cx - EYE_SPAN / 2.0, cy);
        let left_eye = Point::new(cx + EYE_SPAN / 2.0, cy);
        let nose = Point::new(cx + nx * EYE_SPAN, cy + ny * EYE_SPAN);
        Detection::new(
            BoundingBox::new(cx - 100.0, cy - 100.0, 200.0, 200.0),
            FaceKeypoints::new(right_eye, left_eye, nose),
            confidence,
        )
    }

    fn face(nx: f64, ny: f64) -> Detection {
        face_at(300.0, 200.0, nx, ny, 0.9)
    }

    /// Fills the decision history with frontal faces.
    fn warmed_up() -> GazeEstimator {
        let mut est = GazeEstimator::default();
        for _ in 0..GAZE_HISTORY_LEN {
            est.estimate(&face(0.0, 0.0));
        }
        est
    }

    #[test]
    fn test_default_thresholds() {
        let t = GazeThresholds::default();
        assert_relative_eq!(t.deviation_x, 0.8);
        assert_relative_eq!(t.low_confidence_deviation_y, 0.84);
        assert_relative_eq!(t.fast_head_deviation_y, 1.05);
        assert_relative_eq!(t.inconsistent_deviation_x, 0.42);
        assert_relative_eq!(t.inconsistent_deviation_y, 0.98);
    }

    #[test]
    fn test_frontal_face_never_looks_away() {
        let mut est = GazeEstimator::default();
        for _ in 0..10 {
            let a = est.estimate(&face(0.0, 0.0));
            assert!(!a.looking_away);
        }
    }

    #[test]
    fn test_consistency_converges_to_one_for_stable_face() {
        let mut est = warmed_up();
        let a = est.estimate(&face(0.0, 0.0));
        assert_relative_eq!(a.consistency, 1.0);
    }

    #[test]
    fn test_short_history_uses_default_consistency() {
        let mut est = GazeEstimator::default();
        let a = est.estimate(&face(0.0, 0.0));
        assert_relative_eq!(a.consistency, 0.5);
    }

    #[test]
    fn test_deviation_is_scale_invariant() {
        let mut est = GazeEstimator::default();
        let mut det = face(0.5, 0.25);
        let a = est.estimate(&det).deviation.unwrap();

        let k = &mut det.keypoints;
        for p in [&mut k.right_eye, &mut k.left_eye, &mut k.nose_tip] {
            p.x *= 2.0;
            p.y *= 2.0;
        }
        let b = GazeEstimator::default().estimate(&det).deviation.unwrap();
        assert_relative_eq!(a.0, b.0, epsilon = 1e-9);
        assert_relative_eq!(a.1, b.1, epsilon = 1e-9);
    }

    #[rstest]
    #[case::right(0.85, 0.0, true)]
    #[case::left(-0.85, 0.0, true)]
    #[case::down(0.0, 0.9, true)]
    #[case::just_inside(0.79, 0.79, false)]
    fn test_base_rule_after_warmup(#[case] nx: f64, #[case] ny: f64, #[case] expected: bool) {
        let mut est = warmed_up();
        let a = est.estimate(&face(nx, ny));
        assert_eq!(a.base_looking_away, expected);
        assert_eq!(a.looking_away, expected);
    }

    #[test]
    fn test_low_confidence_requires_stricter_vertical_deviation() {
        let mut est = GazeEstimator::default();
        for _ in 0..GAZE_HISTORY_LEN {
            est.estimate(&face_at(300.0, 200.0, 0.0, 0.0, 0.5));
        }
        let a = est.estimate(&face_at(300.0, 200.0, 0.0, 0.82, 0.5));
        assert!(a.base_looking_away);
        assert!(a.average_confidence < 0.7);
        assert!(!a.looking_away);

        let b = est.estimate(&face_at(300.0, 200.0, 0.0, 0.9, 0.5));
        assert!(b.looking_away);
    }

    #[test]
    fn test_fast_head_movement_suppresses_moderate_vertical_look() {
        let mut est = warmed_up();
        // Jump 50px between ticks with a moderate downward nose offset.
        let a = est.estimate(&face_at(350.0, 200.0, 0.0, 0.9, 0.9));
        assert_relative_eq!(a.head_speed, 50.0);
        assert!(!a.head_stable);
        assert!(a.base_looking_away);
        assert!(!a.looking_away);
    }

    #[test]
    fn test_fast_head_movement_keeps_strong_horizontal_look() {
        let mut est = warmed_up();
        let a = est.estimate(&face_at(350.0, 200.0, 0.9, 0.0, 0.9));
        assert!(a.looking_away);
    }

    #[test]
    fn test_inconsistent_history_requires_stronger_vertical_deviation() {
        let mut est = warmed_up();
        est.estimate(&face(0.9, 0.0));
        est.estimate(&face(0.9, 0.0));
        est.estimate(&face(0.0, 0.0));
        // Last three decisions [true, true, false]: 1/3 agree with the latest.
        let a = est.estimate(&face(0.0, 0.9));
        assert_relative_eq!(a.consistency, 1.0 / 3.0);
        assert!(a.base_looking_away);
        assert!(!a.looking_away);
    }

    #[test]
    fn test_startup_consistency_suppresses_vertical_only_look() {
        let mut est = GazeEstimator::default();
        // Empty history: consistency 0.5 < 0.6, so |dy| must exceed 0.98.
        let a = est.estimate(&face(0.0, 0.9));
        assert!(a.base_looking_away);
        assert!(!a.looking_away);

        let mut est = GazeEstimator::default();
        assert!(est.estimate(&face(0.0, 1.0)).looking_away);
    }

    #[test]
    fn test_refinements_never_flag_beyond_base_rule() {
        let mut est = GazeEstimator::default();
        let mut x = 0.0;
        for i in 0..50 {
            let nx = if i % 3 == 0 { 0.6 } else { -0.3 };
            x += if i % 2 == 0 { 40.0 } else { -25.0 };
            let conf = if i % 4 == 0 { 0.4 } else { 0.95 };
            let a = est.estimate(&face_at(300.0 + x, 200.0, nx, 0.5, conf));
            assert!(!a.looking_away || a.base_looking_away);
        }
    }

    #[test]
    fn test_eye_distance_instability_detected() {
        let mut est = warmed_up();
        let mut det = face(0.0, 0.0);
        det.keypoints.right_eye.x -= 50.0;
        det.keypoints.left_eye.x += 50.0;
        let a = est.estimate(&det);
        assert!(!a.eye_distance_stable);
    }

    #[test]
    fn test_degenerate_eye_distance_is_not_looking_away() {
        let mut est = warmed_up();
        let mut det = face(2.0, 0.0);
        det.keypoints.left_eye = det.keypoints.right_eye;
        let a = est.estimate(&det);
        assert!(a.deviation.is_none());
        assert!(!a.looking_away);
    }

    #[test]
    fn test_single_spike_flags_only_its_own_tick() {
        let mut est = warmed_up();
        assert!(est.estimate(&face(0.85, 0.0)).looking_away);
        assert!(!est.estimate(&face(0.0, 0.0)).looking_away);
        assert!(!est.estimate(&face(0.0, 0.0)).looking_away);
    }}
