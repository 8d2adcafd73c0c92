//! The `PositionSource` trait — the seam between the engine and whatever
//! produces device fixes.

use wf_core::{Millis, PositionFix};

use crate::{PositionError, PositionResult};

/// Continuous device-location acquisition.
///
/// # Contract
///
/// - `start` begins acquisition.  It fails with
///   [`PositionError::PermissionDenied`] if location access is refused.
/// - `poll` returns the newest fix not yet delivered, if any.  When no fix
///   has arrived for longer than the acquisition bound it returns
///   [`PositionError::AcquisitionTimeout`] once and stops; the caller may
///   `start` again.
/// - `stop` cancels the subscription and is idempotent.
///
/// # Example
///
/// ```rust,ignore
/// source.start(now)?;
/// loop {
///     if let Some(fix) = source.poll(now)? {
///         session.on_fix(fix);
///     }
/// }
/// ```
pub trait PositionSource {
    fn start(&mut self, now: Millis) -> PositionResult<()>;

    fn poll(&mut self, now: Millis) -> PositionResult<Option<PositionFix>>;

    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

impl<S: PositionSource + ?Sized> PositionSource for Box<S> {
    fn start(&mut self, now: Millis) -> PositionResult<()> {
        (**self).start(now)
    }

    fn poll(&mut self, now: Millis) -> PositionResult<Option<PositionFix>> {
        (**self).poll(now)
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn is_running(&self) -> bool {
        (**self).is_running()
    }
}

// ── AcquisitionWatch ──────────────────────────────────────────────────────────

/// Tracks time since the last fix (or since `start`) against a bound.
#[derive(Clone, Debug)]
pub struct AcquisitionWatch {
    timeout_ms: u64,
    last_seen:  Millis,
}

impl AcquisitionWatch {
    pub fn new(timeout_ms: u64) -> Self {
        Self { timeout_ms, last_seen: Millis::ZERO }
    }

    /// Restart the bound at `now`.
    #[inline]
    pub fn reset(&mut self, now: Millis) {
        self.last_seen = now;
    }

    /// Record a delivered fix.
    #[inline]
    pub fn saw_fix(&mut self, now: Millis) {
        self.last_seen = now;
    }

    /// `Err(AcquisitionTimeout)` once `now` is past the bound.
    pub fn check(&self, now: Millis) -> PositionResult<()> {
        let waited_ms = now.since(self.last_seen);
        if waited_ms > self.timeout_ms {
            Err(PositionError::AcquisitionTimeout { waited_ms })
        } else {
            Ok(())
        }
    }

    #[inline]
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }
}
