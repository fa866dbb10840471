use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    NoFace,
    MultipleFaces,
    LookingAway,
}

impl ViolationKind {
    pub const ALL: [ViolationKind; 3] = [
        ViolationKind::NoFace,
        ViolationKind::MultipleFaces,
        ViolationKind::LookingAway,
    ];

    pub fn description(self) -> &'static str {
        match self {
            ViolationKind::NoFace => "No face detected",
            ViolationKind::MultipleFaces => "Multiple faces detected",
            ViolationKind::LookingAway => "Looking away from screen",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Raised once when a condition goes from false to true.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub kind: ViolationKind,
    pub description: String,
    /// Tick on which the condition rose.
    pub tick: u64,
    /// Source timestamp of the frame that raised it.
    pub timestamp_ms: u64,
}

/// Per-kind rising-edge totals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationCounts {
    pub no_face: u64,
    pub multiple_faces: u64,
    pub looking_away: u64,
}

impl ViolationCounts {
    pub fn get(&self, kind: ViolationKind) -> u64 {
        match kind {
            ViolationKind::NoFace => self.no_face,
            ViolationKind::MultipleFaces => self.multiple_faces,
            ViolationKind::LookingAway => self.looking_away,
        }
    }

    fn increment(&mut self, kind: ViolationKind) {
        match kind {
            ViolationKind::NoFace => self.no_face += 1,
            ViolationKind::MultipleFaces => self.multiple_faces += 1,
            ViolationKind::LookingAway => self.looking_away += 1,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ViolationState {
    pub no_face: bool,
    pub multiple_faces: bool,
    pub looking_away: bool,
    /// Total rising edges since the last reset.
    pub violation_count: u64,
    pub suspicious_activity: bool,
    /// Per-kind totals. Not cleared by [`ViolationTracker::reset_violations`].
    pub counts: ViolationCounts,
}

impl ViolationState {
    fn condition(&self, kind: ViolationKind) -> bool {
        match kind {
            ViolationKind::NoFace => self.no_face,
            ViolationKind::MultipleFaces => self.multiple_faces,
            ViolationKind::LookingAway => self.looking_away,
        }
    }

    fn set_condition(&mut self, kind: ViolationKind, value: bool) {
        match kind {
            ViolationKind::NoFace => self.no_face = value,
            ViolationKind::MultipleFaces => self.multiple_faces = value,
            ViolationKind::LookingAway => self.looking_away = value,
        }
    }
}

/// Debounces the three conditions into discrete events.
///
/// A condition counts only on its rising edge; holding it costs nothing
/// more, and it re-arms once it clears.
#[derive(Debug, Default)]
pub struct ViolationTracker {
    state: ViolationState,
}

impl ViolationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ViolationState {
        &self.state
    }

    /// Applies one tick's observations. Events come back in
    /// no-face, multiple-faces, looking-away order.
    ///
    /// `looking_away` is ignored unless exactly one face is visible.
    pub fn update(
        &mut self,
        face_count: usize,
        looking_away: bool,
        tick: u64,
        timestamp_ms: u64,
    ) -> Vec<ViolationEvent> {
        let current = [
            (ViolationKind::NoFace, face_count == 0),
            (ViolationKind::MultipleFaces, face_count > 1),
            (ViolationKind::LookingAway, face_count == 1 && looking_away),
        ];

        let mut events = Vec::new();
        for (kind, now) in current {
            if now && !self.state.condition(kind) {
                self.state.violation_count += 1;
                self.state.suspicious_activity = true;
                self.state.counts.increment(kind);
                events.push(ViolationEvent {
                    kind,
                    description: kind.description().to_string(),
                    tick,
                    timestamp_ms,
                });
            }
            self.state.set_condition(kind, now);
        }
        events
    }

    /// Zeroes the running count and clears the activity flag. Current
    /// conditions are kept, so a held condition does not re-fire.
    pub fn reset_violations(&mut self) {
        self.state.violation_count = 0;
        self.state.suspicious_activity = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn kinds(events: &[ViolationEvent]) -> Vec<ViolationKind> {
        events.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_initial_state_is_clean() {
        let tracker = ViolationTracker::new();
        assert_eq!(tracker.state(), &ViolationState::default());
    }

    #[test]
    fn test_sustained_condition_counts_once() {
        let mut tracker = ViolationTracker::new();
        let mut total = Vec::new();
        for tick in 0..10 {
            total.extend(tracker.update(0, false, tick, tick * 1000));
        }
        assert_eq!(kinds(&total), vec![ViolationKind::NoFace]);
        assert_eq!(tracker.state().violation_count, 1);
        assert!(tracker.state().no_face);
    }

    #[test]
    fn test_condition_rearms_after_clearing() {
        let mut tracker = ViolationTracker::new();
        tracker.update(0, false, 0, 0);
        tracker.update(1, false, 1, 1000);
        let events = tracker.update(0, false, 2, 2000);
        assert_eq!(kinds(&events), vec![ViolationKind::NoFace]);
        assert_eq!(tracker.state().violation_count, 2);
    }

    #[test]
    fn test_face_count_sequence_counts_each_rising_edge() {
        let mut tracker = ViolationTracker::new();
        let a = tracker.update(1, false, 0, 0);
        let b = tracker.update(0, false, 1, 1000);
        let c = tracker.update(2, false, 2, 2000);
        assert!(a.is_empty());
        assert_eq!(kinds(&b), vec![ViolationKind::NoFace]);
        assert_eq!(kinds(&c), vec![ViolationKind::MultipleFaces]);
        assert_eq!(tracker.state().violation_count, 2);
        assert!(!tracker.state().no_face);
        assert!(tracker.state().multiple_faces);
    }

    #[rstest]
    #[case::none(0, true, false, false)]
    #[case::one_looking(1, true, false, true)]
    #[case::one_frontal(1, false, false, false)]
    #[case::two_looking(2, true, true, false)]
    fn test_conditions_follow_face_count(
        #[case] face_count: usize,
        #[case] looking_away: bool,
        #[case] multiple: bool,
        #[case] away: bool,
    ) {
        let mut tracker = ViolationTracker::new();
        tracker.update(face_count, looking_away, 0, 0);
        let s = tracker.state();
        assert_eq!(s.no_face, face_count == 0);
        assert_eq!(s.multiple_faces, multiple);
        assert_eq!(s.looking_away, away);
    }

    #[test]
    fn test_looking_away_clears_when_face_count_changes() {
        let mut tracker = ViolationTracker::new();
        tracker.update(1, true, 0, 0);
        tracker.update(2, true, 1, 1000);
        assert!(!tracker.state().looking_away);
        let events = tracker.update(1, true, 2, 2000);
        assert_eq!(kinds(&events), vec![ViolationKind::LookingAway]);
    }

    #[test]
    fn test_event_carries_tick_and_timestamp() {
        let mut tracker = ViolationTracker::new();
        let events = tracker.update(2, false, 7, 7040);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].tick, 7);
        assert_eq!(events[0].timestamp_ms, 7040);
        assert_eq!(events[0].description, "Multiple faces detected");
    }

    #[test]
    fn test_any_violation_marks_suspicious_activity() {
        let mut tracker = ViolationTracker::new();
        tracker.update(1, false, 0, 0);
        assert!(!tracker.state().suspicious_activity);
        tracker.update(1, true, 1, 1000);
        assert!(tracker.state().suspicious_activity);
    }

    #[test]
    fn test_reset_clears_count_and_activity_only() {
        let mut tracker = ViolationTracker::new();
        tracker.update(0, false, 0, 0);
        tracker.reset_violations();

        let s = tracker.state();
        assert_eq!(s.violation_count, 0);
        assert!(!s.suspicious_activity);
        assert!(s.no_face);
        assert_eq!(s.counts.no_face, 1);

        // Still no face: held condition does not re-fire after reset.
        assert!(tracker.update(0, false, 1, 1000).is_empty());
        assert_eq!(tracker.state().violation_count, 0);
    }

    #[test]
    fn test_counts_are_monotonic_between_resets() {
        let mut tracker = ViolationTracker::new();
        let mut last = 0;
        for (tick, faces) in [0usize, 1, 2, 2, 0, 1, 3, 0].into_iter().enumerate() {
            tracker.update(faces, tick % 2 == 0, tick as u64, 0);
            assert!(tracker.state().violation_count >= last);
            last = tracker.state().violation_count;
        }
        let c = tracker.state().counts;
        assert_eq!(
            last,
            ViolationKind::ALL.iter().map(|&k| c.get(k)).sum::<u64>()
        );
    }

    #[test]
    fn test_kind_serializes_as_snake_case() {
        let json = serde_json::to_string(&ViolationKind::MultipleFaces).unwrap();
        assert_eq!(json, "\"multiple_faces\"");
    }
}
