//! `wf-session` — the route session orchestrator for the wayfinder engine.
//!
//! # Tick loop
//!
//! ```text
//! host calls session.tick(now, &mut observer):
//!   ① Position — poll the PositionSource; a fix is kept as the latest fix
//!                and, in local mode, evaluated by the ProximityEngine:
//!                  Advanced    → display + speak new instruction
//!                  Approaching → speak "In N meters, ..."
//!                  Arrived     → speak arrival, arm the grace timer
//!   ② Channel  — drain inbound NavigationUpdates (remote mode), applied as
//!                absolute state; duplicates and malformed ones are dropped.
//!                A close arms the single reconnect timer.
//!   ③ Timers   — fire everything due at or before `now`:
//!                  SendFix          → send latest fix, re-arm
//!                  Reconnect        → reopen the channel
//!                  ArrivalTeardown  → back to Idle
//!                  RelayFix         → relay latest fix, re-arm
//! ```
//!
//! Every entry point runs to completion on the caller's thread; the host's
//! event loop is the only serialization there is.
//!
//! # States
//!
//! ```text
//!   Idle ──start_navigation──▶ Active ──arrival / next on last──▶ Arrived
//!    ▲                          │                                  │
//!    └──────────── stop ────────┴────── stop / grace elapsed ──────┘
//! ```

pub mod builder;
pub mod error;
pub mod observer;
pub mod session;
pub mod timer;

#[cfg(test)]
mod tests;

pub use builder::RouteSessionBuilder;
pub use error::{SessionError, SessionResult};
pub use observer::{ChannelEvent, GuidanceObserver, NoopObserver};
pub use session::RouteSession;
pub use timer::{Timer, TimerKind, TimerQueue};
