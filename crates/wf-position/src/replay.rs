//! Recorded-walk replay.
//!
//! # CSV format
//!
//! One row per fix, timestamps non-decreasing:
//!
//! ```csv
//! latitude,longitude,accuracy_m,timestamp_ms
//! 39.98000,-75.15500,5.0,1700000000000
//! 39.98005,-75.15500,4.0,1700000002000
//! ```
//!
//! During replay the gaps between timestamps are reproduced on the host
//! clock: the fix recorded `Δ` ms after the first one becomes available `Δ`
//! ms after `start`.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use wf_core::{Coordinate, Millis, PositionFix};

use crate::{AcquisitionWatch, PositionError, PositionResult, PositionSource};

// ── CSV record ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct FixRecord {
    latitude:     f64,
    longitude:    f64,
    accuracy_m:   f64,
    timestamp_ms: u64,
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load a recorded walk from a CSV file.
pub fn load_fixes_csv(path: &Path) -> PositionResult<Vec<PositionFix>> {
    let file = std::fs::File::open(path)?;
    load_fixes_reader(file)
}

/// Like [`load_fixes_csv`] but accepts any `Read` source.
pub fn load_fixes_reader<R: Read>(reader: R) -> PositionResult<Vec<PositionFix>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut fixes: Vec<PositionFix> = Vec::new();

    for (row, result) in csv_reader.deserialize::<FixRecord>().enumerate() {
        let r = result.map_err(|e| PositionError::Parse(e.to_string()))?;
        let coordinate = Coordinate::new(r.latitude, r.longitude);
        if !coordinate.is_valid() {
            return Err(PositionError::Parse(format!(
                "row {row}: coordinate {coordinate} out of range"
            )));
        }
        if let Some(prev) = fixes.last() {
            if r.timestamp_ms < prev.timestamp_ms {
                return Err(PositionError::Parse(format!(
                    "row {row}: timestamp {} earlier than previous {}",
                    r.timestamp_ms, prev.timestamp_ms
                )));
            }
        }
        fixes.push(PositionFix::new(coordinate, r.accuracy_m, r.timestamp_ms));
    }

    Ok(fixes)
}

// ── ReplaySource ──────────────────────────────────────────────────────────────

/// [`PositionSource`] that plays back a recorded walk on the host clock.
pub struct ReplaySource {
    fixes:     Vec<PositionFix>,
    /// Index of the next undelivered fix.
    cursor:    usize,
    started:   Millis,
    /// Recorded timestamp that maps to `started`.
    origin_ts: u64,
    running:   bool,
    watch:     AcquisitionWatch,
}

impl ReplaySource {
    pub fn new(fixes: Vec<PositionFix>, acquisition_timeout_ms: u64) -> Self {
        Self {
            fixes,
            cursor:    0,
            started:   Millis::ZERO,
            origin_ts: 0,
            running:   false,
            watch:     AcquisitionWatch::new(acquisition_timeout_ms),
        }
    }

    /// Number of fixes not yet delivered.
    pub fn remaining(&self) -> usize {
        self.fixes.len() - self.cursor
    }

    /// Restart playback from the first fix.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}

impl PositionSource for ReplaySource {
    fn start(&mut self, now: Millis) -> PositionResult<()> {
        // Resume the recorded timeline at the next undelivered fix.
        self.origin_ts = self.fixes.get(self.cursor).map_or(0, |f| f.timestamp_ms);
        self.started = now;
        self.watch.reset(now);
        self.running = true;
        debug!(remaining = self.remaining(), "replay started");
        Ok(())
    }

    fn poll(&mut self, now: Millis) -> PositionResult<Option<PositionFix>> {
        if !self.running {
            return Ok(None);
        }
        let elapsed = now.since(self.started);
        let due = self.fixes[self.cursor..]
            .iter()
            .take_while(|f| f.timestamp_ms.saturating_sub(self.origin_ts) <= elapsed)
            .count();

        if due == 0 {
            if let Err(e) = self.watch.check(now) {
                self.running = false;
                return Err(e);
            }
            return Ok(None);
        }

        // Deliver only the newest due fix; older ones are stale.
        let newest = self.cursor + due - 1;
        if due > 1 {
            debug!(skipped = due - 1, "replay dropped stale fixes");
        }
        self.cursor = newest + 1;
        self.watch.saw_fix(now);
        Ok(Some(self.fixes[newest]))
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}
