//! Device position fixes.

use crate::Coordinate;

/// A single timestamped device position estimate.
///
/// `accuracy_m` is carried through the engine but never used to gate
/// advancement or announcements.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PositionFix {
    pub coordinate: Coordinate,
    /// Reported horizontal accuracy radius, metres.
    pub accuracy_m: f64,
    /// Device timestamp, milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
}

impl PositionFix {
    #[inline]
    pub fn new(coordinate: Coordinate, accuracy_m: f64, timestamp_ms: u64) -> Self {
        Self { coordinate, accuracy_m, timestamp_ms }
    }

    /// Convenience constructor used heavily in tests and replays.
    #[inline]
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self::new(Coordinate::new(latitude, longitude), 0.0, 0)
    }
}
