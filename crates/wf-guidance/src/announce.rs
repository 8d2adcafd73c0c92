//! Announcement keys, the once-per-session gate, and announcement text.

use std::collections::HashSet;

use wf_core::{RoutePlan, Step};

/// Spoken when the final step's end is reached.
pub const ARRIVAL_ANNOUNCEMENT: &str = "You have arrived at your destination";

/// The category of a proximity trigger.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ThresholdKind {
    /// Nearing the start of a future step.
    Approaching,
    /// Completing the current step and moving onto the next.
    Advance,
}

/// Identifies one trigger: (step index, threshold kind).
///
/// Only ever presence-tested in a set; it carries no other meaning.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct AnnouncementKey {
    pub step: usize,
    pub kind: ThresholdKind,
}

impl AnnouncementKey {
    #[inline]
    pub fn approaching(step: usize) -> Self {
        Self { step, kind: ThresholdKind::Approaching }
    }

    #[inline]
    pub fn advance(step: usize) -> Self {
        Self { step, kind: ThresholdKind::Advance }
    }
}

/// Records which triggers have already fired this session.
///
/// The set only grows.  It has no `clear`: a new session gets a new
/// scheduler, and manual navigation never touches it.
#[derive(Debug, Default, Clone)]
pub struct AnnouncementScheduler {
    announced: HashSet<AnnouncementKey>,
}

impl AnnouncementScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` (and records `key`) the first time `key` is offered; `false`
    /// on every later call.
    #[inline]
    pub fn should_fire(&mut self, key: AnnouncementKey) -> bool {
        self.announced.insert(key)
    }

    #[inline]
    pub fn contains(&self, key: AnnouncementKey) -> bool {
        self.announced.contains(&key)
    }

    pub fn len(&self) -> usize {
        self.announced.len()
    }

    pub fn is_empty(&self) -> bool {
        self.announced.is_empty()
    }
}

// ── Announcement text ─────────────────────────────────────────────────────────

/// Combined destination + first instruction, spoken when navigation starts.
pub fn start_announcement(plan: &RoutePlan) -> String {
    match plan.step(0) {
        Some(first) => format!(
            "Starting navigation to {}. {}",
            plan.destination, first.instruction
        ),
        None => format!("Starting navigation to {}.", plan.destination),
    }
}

/// "In N meters, <instruction>" using the provider's distance for `step`.
pub fn approach_announcement(step: &Step) -> String {
    format!("In {} meters, {}", step.distance_m.round() as i64, step.instruction)
}
