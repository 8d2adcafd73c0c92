//! `TimerQueue` — pending one-shot timers keyed by due time.
//!
//! Every delayed action in a session (fix cadence, relay cadence, the
//! reconnect backoff, the arrival grace delay) is a one-shot entry here.
//! Repeating cadences re-arm themselves when they fire.  Each tick the
//! session drains everything due at or before `now`, oldest first.
//!
//! Session-scoped timers carry the epoch they were armed in; `stop` bumps
//! the epoch, so a timer that somehow outlived its session is ignored
//! instead of resurrecting it.

use std::collections::BTreeMap;

use wf_core::Millis;

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum TimerKind {
    /// Send the latest fix on the guidance channel.
    SendFix,
    /// Try to reopen the guidance channel.
    Reconnect,
    /// Arrival grace delay elapsed; tear the session down.
    ArrivalTeardown,
    /// Send the latest fix on the location-only relay.
    RelayFix,
}

impl TimerKind {
    /// Belongs to a route session (as opposed to background tracking).
    pub fn is_session_scoped(self) -> bool {
        !matches!(self, TimerKind::RelayFix)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Timer {
    pub kind:  TimerKind,
    pub epoch: u64,
}

#[derive(Default, Debug)]
pub struct TimerQueue {
    inner: BTreeMap<Millis, Vec<Timer>>,
    total: usize,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, due: Millis, timer: Timer) {
        self.inner.entry(due).or_default().push(timer);
        self.total += 1;
    }

    /// Remove and return every timer due at or before `now`, in due order
    /// (insertion order within the same instant).
    pub fn drain_due(&mut self, now: Millis) -> Vec<Timer> {
        let later = self.inner.split_off(&now.offset(1));
        let due = std::mem::replace(&mut self.inner, later);
        let timers: Vec<Timer> = due.into_values().flatten().collect();
        self.total -= timers.len();
        timers
    }

    /// Drop every pending timer of `kind`.
    pub fn cancel(&mut self, kind: TimerKind) {
        let mut removed = 0;
        self.inner.retain(|_, timers| {
            let before = timers.len();
            timers.retain(|t| t.kind != kind);
            removed += before - timers.len();
            !timers.is_empty()
        });
        self.total -= removed;
    }

    /// Drop every session-scoped timer.
    pub fn cancel_session(&mut self) {
        for kind in [TimerKind::SendFix, TimerKind::Reconnect, TimerKind::ArrivalTeardown] {
            self.cancel(kind);
        }
    }

    pub fn contains(&self, kind: TimerKind) -> bool {
        self.inner.values().flatten().any(|t| t.kind == kind)
    }

    /// Due time of the earliest pending `kind` timer.
    pub fn next_due_of(&self, kind: TimerKind) -> Option<Millis> {
        self.inner
            .iter()
            .find(|(_, timers)| timers.iter().any(|t| t.kind == kind))
            .map(|(&due, _)| due)
    }

    /// The earliest due time of any pending timer.
    pub fn next_due(&self) -> Option<Millis> {
        self.inner.keys().next().copied()
    }

    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}
