//! Session observer trait for display, speech, and connection reporting.

use wf_core::{Millis, PositionFix};
use wf_guidance::{DisplayState, SessionState};
use wf_position::PositionError;

/// Guidance-channel lifecycle notifications.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ChannelEvent {
    Connected,
    /// Closed unexpectedly; a reconnect is due at `retry_at`.
    ReconnectScheduled { retry_at: Millis },
    /// Closed with no reconnect (user stop, or the route is finished).
    Closed,
}

/// Callbacks invoked by [`RouteSession`][crate::RouteSession] as it runs.
///
/// All methods have default no-op implementations so implementors only need
/// to override what they care about.
///
/// # Example — overlay printer
///
/// ```rust,ignore
/// struct Overlay;
///
/// impl GuidanceObserver for Overlay {
///     fn on_display(&mut self, d: &DisplayState) {
///         println!("{} {} ({}/{})", d.arrow.glyph(), d.street, d.step_number, d.total_steps);
///     }
/// }
/// ```
pub trait GuidanceObserver {
    fn on_state_change(&mut self, _from: SessionState, _to: SessionState) {}

    /// The visual overlay changed.
    fn on_display(&mut self, _display: &DisplayState) {}

    /// Text handed to the speech engine (reported even without one).
    fn on_announcement(&mut self, _text: &str) {}

    fn on_fix(&mut self, _fix: &PositionFix) {}

    /// Permission refusal or acquisition timeout.
    fn on_position_error(&mut self, _error: &PositionError) {}

    fn on_channel_event(&mut self, _event: ChannelEvent) {}

    /// The server sent an `error` update.
    fn on_remote_error(&mut self, _message: &str) {}

    /// A malformed update was dropped.
    fn on_discarded_update(&mut self, _reason: &str) {}
}

/// A [`GuidanceObserver`] that does nothing.
pub struct NoopObserver;

impl GuidanceObserver for NoopObserver {}
