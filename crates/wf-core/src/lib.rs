//! `wf-core` — foundational types for the `wayfinder` guidance engine.
//!
//! This crate is a dependency of every other `wf-*` crate.  It has no `wf-*`
//! dependencies and only a handful of external ones (`serde`, `serde_json`,
//! `toml`, `thiserror`, `tracing`).
//!
//! # What lives here
//!
//! | Module      | Contents                                                  |
//! |-------------|-----------------------------------------------------------|
//! | [`ids`]     | `SessionId`                                               |
//! | [`geo`]     | `Coordinate`, haversine distance                          |
//! | [`fix`]     | `PositionFix`                                             |
//! | [`route`]   | `Step`, `RoutePlan`, route-provider payload parsing       |
//! | [`time`]    | `Millis` host clock                                       |
//! | [`config`]  | `GuidanceConfig`, `SpeechProfile`, `ChannelConfig`        |
//! | [`error`]   | `NavError`, `NavResult`                                   |

pub mod config;
pub mod error;
pub mod fix;
pub mod geo;
pub mod ids;
pub mod route;
pub mod time;


// ── Re-exports ────────────────────────────────────────────────────────────────

pub use config::{ChannelConfig, GuidanceConfig, SpeechProfile};
pub use error::{NavError, NavResult};
pub use fix::PositionFix;
pub use geo::{Coordinate, EARTH_RADIUS_M};
pub use ids::SessionId;
pub use route::{RoutePlan, Step, clean_instruction_html};
pub use time::Millis;
