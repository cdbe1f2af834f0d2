//! Transition debouncer
//!
//! Platforms report the same crossing more than once when a device sits
//! near a boundary. The debouncer keeps the last accepted transition per
//! region and drops repeats.
//!
//! ## Policy
//!
//! A raw transition is accepted iff one of:
//! - it is the first transition seen for the region
//! - its kind differs from the last accepted kind
//! - strictly more than the dwell interval has elapsed since the last
//!   accepted transition (which then necessarily has the same kind)
//!
//! Transitions observed earlier than the last accepted one for the same
//! region are stale and always dropped, so accepted timestamps never go
//! backwards per region.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::trace;

use crate::model::TransitionKind;

/// Outcome of [`Debouncer::check`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Forward the transition
    Accepted,
    /// Same kind as the last accepted transition, inside the dwell window
    Repeated,
    /// Older than the last accepted transition for the region
    Stale,
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

#[derive(Debug, Clone, Copy)]
struct LastAccepted {
    kind: TransitionKind,
    at: Instant,
}

/// Per-region duplicate suppression
#[derive(Debug, Clone)]
pub struct Debouncer {
    dwell: Duration,
    last: HashMap<String, LastAccepted>,
}

impl Debouncer {
    /// Create a debouncer with the given minimum dwell interval
    pub fn new(dwell: Duration) -> Self {
        Self {
            dwell,
            last: HashMap::new(),
        }
    }

    /// The configured dwell interval
    pub fn dwell(&self) -> Duration {
        self.dwell
    }

    /// Decide whether to forward a transition, recording it when accepted
    pub fn check(&mut self, region_id: &str, kind: TransitionKind, observed_at: Instant) -> Verdict {
        let verdict = match self.last.get(region_id) {
            None => Verdict::Accepted,
            Some(last) if observed_at < last.at => Verdict::Stale,
            Some(last) if last.kind != kind => Verdict::Accepted,
            Some(last) if observed_at.duration_since(last.at) > self.dwell => Verdict::Accepted,
            Some(_) => Verdict::Repeated,
        };

        if verdict.is_accepted() {
            self.last
                .insert(region_id.to_string(), LastAccepted { kind, at: observed_at });
        }

        trace!(region_id, %kind, ?verdict, "Debounce decision");
        verdict
    }

    /// Convenience wrapper returning only the accept decision
    pub fn accept(&mut self, region_id: &str, kind: TransitionKind, observed_at: Instant) -> bool {
        self.check(region_id, kind, observed_at).is_accepted()
    }

    /// Forget every region
    pub fn reset(&mut self) {
        self.last.clear();
    }

    /// Forget one region
    pub fn forget(&mut self, region_id: &str) {
        self.last.remove(region_id);
    }

    /// Number of regions with recorded state
    pub fn tracked_regions(&self) -> usize {
        self.last.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use TransitionKind::{Enter, Exit};

    const DWELL: Duration = Duration::from_secs(30);

    #[test]
    fn forgotten_region_starts_fresh() {
        let mut debouncer = Debouncer::new(DWELL);
        let t0 = Instant::now();

        assert!(debouncer.accept("home", Enter, t0));
        assert!(debouncer.accept("work", Enter, t0));
        debouncer.forget("home");

        assert_eq!(debouncer.tracked_regions(), 1);
        assert!(debouncer.accept("home", Enter, t0 + Duration::from_secs(1)));
        assert!(!debouncer.accept("work", Enter, t0 + Duration::from_secs(1)));
    }

    #[test]
    fn repeated_enter_inside_window_forwards_once() {
        let mut debouncer = Debouncer::new(DWELL);
        let t0 = Instant::now();

        let forwarded = [0, 5, 10]
            .iter()
            .filter(|s| debouncer.accept("home", Enter, t0 + Duration::from_secs(**s)))
            .count();

        assert_eq!(forwarded, 1);
    }

    #[test]
    fn alternating_kinds_are_always_forwarded() {
        let mut debouncer = Debouncer::new(DWELL);
        let t0 = Instant::now();

        assert!(debouncer.accept("home", Enter, t0));
        assert!(debouncer.accept("home", Exit, t0));
        assert!(debouncer.accept("home", Enter, t0 + Duration::from_millis(1)));
    }

    #[test]
    fn same_kind_after_dwell_is_forwarded() {
        let mut debouncer = Debouncer::new(DWELL);
        let t0 = Instant::now();

        assert!(debouncer.accept("home", Enter, t0));
        assert_eq!(debouncer.check("home", Enter, t0 + DWELL), Verdict::Repeated);
        assert!(debouncer.accept("home", Enter, t0 + DWELL + Duration::from_millis(1)));
    }

    #[test]
    fn regions_are_debounced_independently() {
        let mut debouncer = Debouncer::new(DWELL);
        let t0 = Instant::now();

        assert!(debouncer.accept("home", Enter, t0));
        assert!(debouncer.accept("work", Enter, t0));
        assert_eq!(debouncer.tracked_regions(), 2);
    }

    #[test]
    fn stale_transition_is_dropped() {
        let mut debouncer = Debouncer::new(DWELL);
        let t0 = Instant::now();

        assert!(debouncer.accept("home", Enter, t0 + Duration::from_secs(10)));
        assert_eq!(debouncer.check("home", Exit, t0), Verdict::Stale);
    }

    #[test]
    fn reset_makes_next_transition_first() {
        let mut debouncer = Debouncer::new(DWELL);
        let t0 = Instant::now();

        assert!(debouncer.accept("home", Enter, t0));
        debouncer.reset();
        assert!(debouncer.accept("home", Enter, t0 + Duration::from_secs(1)));
    }

    #[test]
    fn zero_dwell_still_drops_simultaneous_repeats() {
        let mut debouncer = Debouncer::new(Duration::ZERO);
        let t0 = Instant::now();

        assert!(debouncer.accept("home", Enter, t0));
        assert!(!debouncer.accept("home", Enter, t0));
        assert!(debouncer.accept("home", Enter, t0 + Duration::from_millis(1)));
    }
}
