//! Proximity evaluation: turns one position fix into guidance events.

use tracing::debug;

use wf_core::{Coordinate, GuidanceConfig, PositionFix};

use crate::{
    ARRIVAL_ANNOUNCEMENT, AnnouncementKey, RouteProgress, SessionState, approach_announcement,
};

/// Great-circle distance in metres (haversine, R = 6 371 000 m).
///
/// Symmetric to the bit, and zero for identical points.
#[inline]
pub fn distance(a: Coordinate, b: Coordinate) -> f64 {
    a.distance_m(b)
}

/// Something the session should react to after a fix.
#[derive(Clone, Debug, PartialEq)]
pub enum GuidanceEvent {
    /// The current step changed by proximity; speak the new instruction.
    Advanced { from: usize, to: usize },
    /// The fix is near the start of `step`; speak `announcement`.
    Approaching { step: usize, announcement: String },
    /// The final step's end was reached.
    Arrived { announcement: String },
}

/// Stateless evaluator; all per-session state lives in [`RouteProgress`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ProximityEngine {
    /// A fix closer than this to the current step's end completes it.
    pub advance_threshold_m: f64,
    /// A fix closer than this to the next step's start announces it.
    pub announce_distance_m: f64,
}

impl Default for ProximityEngine {
    fn default() -> Self {
        Self { advance_threshold_m: 15.0, announce_distance_m: 20.0 }
    }
}

impl ProximityEngine {
    pub fn from_config(config: &GuidanceConfig) -> Self {
        Self {
            advance_threshold_m: config.advance_threshold_m,
            announce_distance_m: config.announce_distance_m,
        }
    }

    /// Evaluate one fix against an active session.
    ///
    /// At most one advance happens per fix, even when the fix would also
    /// satisfy later steps.  The approaching check runs against the index
    /// after any advance.  Arrival is only considered when the step that was
    /// current on entry is the last one.
    ///
    /// Returns nothing for a session that is not `Active`.
    pub fn evaluate(&self, progress: &mut RouteProgress, fix: &PositionFix) -> Vec<GuidanceEvent> {
        let mut events = Vec::new();
        if progress.state() != SessionState::Active {
            return events;
        }

        let here = fix.coordinate;
        let entry = progress.current_index();
        let last = progress.last_index();
        let to_end = distance(here, progress.current_step().end);

        debug!(step = entry, to_end_m = to_end, accuracy_m = fix.accuracy_m, "evaluating fix");

        // ── Advance ───────────────────────────────────────────────────────
        if to_end < self.advance_threshold_m
            && entry < last
            && progress.announced.should_fire(AnnouncementKey::advance(entry + 1))
        {
            progress.set_current(entry + 1);
            events.push(GuidanceEvent::Advanced { from: entry, to: entry + 1 });
        }

        // ── Approaching ───────────────────────────────────────────────────
        let current = progress.current_index();
        if current < last {
            let next = &progress.plan().steps()[current + 1];
            let to_next = distance(here, next.start);
            let announcement = approach_announcement(next);
            if to_next < self.announce_distance_m
                && progress.announced.should_fire(AnnouncementKey::approaching(current + 1))
            {
                events.push(GuidanceEvent::Approaching { step: current + 1, announcement });
            }
        }

        // ── Arrival ───────────────────────────────────────────────────────
        if entry == last && to_end < self.advance_threshold_m {
            progress.mark_arrived();
            events.push(GuidanceEvent::Arrived { announcement: ARRIVAL_ANNOUNCEMENT.to_string() });
        }

        events
    }
}
