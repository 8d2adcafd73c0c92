//! Per-session route state.

use wf_core::{RoutePlan, Step};

use crate::{AnnouncementScheduler, GuidanceError, GuidanceResult};

/// Lifecycle state of a route session.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub enum SessionState {
    /// No route loaded (initial and terminal).
    #[default]
    Idle,
    /// Following the route.
    Active,
    /// Final step completed; waiting out the grace delay before teardown.
    Arrived,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle    => "idle",
            SessionState::Active  => "active",
            SessionState::Arrived => "arrived",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a manual next/previous request.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ManualStep {
    /// The step at this index is now current and should be re-spoken.
    Current(usize),
    /// `next` on the last step: the session is now arrived.
    Arrived,
    /// Nothing to do (session not active).
    Ignored,
}

/// The mutable state of one route session: the plan, the current step,
/// the lifecycle state, and the announced set.
///
/// Invariants:
/// - `current < plan.len()` at all times (the plan is never empty).
/// - `announced` starts empty and only grows.
/// - `plan` is never mutated; a new route means a new `RouteProgress`.
#[derive(Debug, Clone)]
pub struct RouteProgress {
    plan:                 RoutePlan,
    current:              usize,
    state:                SessionState,
    pub(crate) announced: AnnouncementScheduler,
}

impl RouteProgress {
    /// Begin a session on `plan` at step 0 with an empty announced set.
    pub fn new(plan: RoutePlan) -> GuidanceResult<Self> {
        if plan.is_empty() {
            return Err(GuidanceError::NoSteps);
        }
        Ok(Self {
            plan,
            current:   0,
            state:     SessionState::Active,
            announced: AnnouncementScheduler::new(),
        })
    }

    #[inline]
    pub fn plan(&self) -> &RoutePlan {
        &self.plan
    }

    #[inline]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[inline]
    pub fn current_step(&self) -> &Step {
        &self.plan.steps()[self.current]
    }

    #[inline]
    pub fn last_index(&self) -> usize {
        self.plan.len() - 1
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[inline]
    pub fn announced(&self) -> &AnnouncementScheduler {
        &self.announced
    }

    /// Move to the next step, or arrive when already on the last one.
    pub fn next_step(&mut self) -> ManualStep {
        if self.state != SessionState::Active {
            return ManualStep::Ignored;
        }
        if self.current < self.last_index() {
            self.current += 1;
            ManualStep::Current(self.current)
        } else {
            self.state = SessionState::Arrived;
            ManualStep::Arrived
        }
    }

    /// Move to the previous step, clamping at step 0.
    pub fn previous_step(&mut self) -> ManualStep {
        if self.state != SessionState::Active {
            return ManualStep::Ignored;
        }
        self.current = self.current.saturating_sub(1);
        ManualStep::Current(self.current)
    }

    /// Overwrite the current index with an authoritative absolute value,
    /// clamped into range.
    pub fn set_current(&mut self, index: usize) {
        self.current = index.min(self.last_index());
    }

    pub fn mark_arrived(&mut self) {
        self.state = SessionState::Arrived;
    }
}
