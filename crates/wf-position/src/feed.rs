//! Host callback adapter.
//!
//! Platform location APIs deliver fixes through callbacks, possibly on their
//! own thread.  The callback pushes into a [`FixFeed`]; the session polls the
//! paired [`FeedSource`].  The feed is a single slot: a newer fix overwrites
//! an undelivered older one.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error};
use wf_core::{Millis, PositionFix};

use crate::{AcquisitionWatch, PositionError, PositionResult, PositionSource};

/// Cloneable producer handle for host callbacks.
#[derive(Clone, Default)]
pub struct FixFeed {
    slot: Arc<Mutex<Option<PositionFix>>>,
}

impl FixFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a fix.  Overwrites any fix not yet polled.
    pub fn push(&self, fix: PositionFix) {
        *self.lock() = Some(fix);
    }

    fn take(&self) -> Option<PositionFix> {
        self.lock().take()
    }

    fn lock(&self) -> MutexGuard<'_, Option<PositionFix>> {
        // A panicking producer cannot leave an `Option` half-written.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// [`PositionSource`] backed by a [`FixFeed`].
pub struct FeedSource {
    feed:    FixFeed,
    granted: bool,
    running: bool,
    watch:   AcquisitionWatch,
}

impl FeedSource {
    pub fn new(feed: FixFeed, acquisition_timeout_ms: u64) -> Self {
        Self {
            feed,
            granted: true,
            running: false,
            watch:   AcquisitionWatch::new(acquisition_timeout_ms),
        }
    }

    /// Record the platform's answer to the location permission prompt.
    pub fn set_permission(&mut self, granted: bool) {
        self.granted = granted;
        if !granted {
            self.stop();
        }
    }

    pub fn feed(&self) -> &FixFeed {
        &self.feed
    }
}

impl PositionSource for FeedSource {
    fn start(&mut self, now: Millis) -> PositionResult<()> {
        if !self.granted {
            error!("location permission denied; position feed disabled");
            return Err(PositionError::PermissionDenied);
        }
        // Anything pushed while unsubscribed is stale.
        self.feed.take();
        self.watch.reset(now);
        self.running = true;
        debug!(timeout_ms = self.watch.timeout_ms(), "position feed started");
        Ok(())
    }

    fn poll(&mut self, now: Millis) -> PositionResult<Option<PositionFix>> {
        if !self.running {
            return Ok(None);
        }
        match self.feed.take() {
            Some(fix) => {
                self.watch.saw_fix(now);
                Ok(Some(fix))
            }
            None => {
                if let Err(e) = self.watch.check(now) {
                    self.running = false;
                    return Err(e);
                }
                Ok(None)
            }
        }
    }

    fn stop(&mut self) {
        if self.running {
            debug!("position feed stopped");
        }
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}
