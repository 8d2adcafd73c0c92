//! `wf-position` — continuous position acquisition.
//!
//! # Crate layout
//!
//! | Module      | Contents                                                       |
//! |-------------|----------------------------------------------------------------|
//! | [`source`]  | `PositionSource` trait, `AcquisitionWatch` timeout tracker     |
//! | [`feed`]    | `FeedSource` + `FixFeed` — host callback adapter (latest wins) |
//! | [`replay`]  | `ReplaySource`, `load_fixes_csv`, `load_fixes_reader`          |
//! | [`jitter`]  | `JitterSource<S>` — seeded GPS noise around any source         |
//! | [`error`]   | `PositionError`, `PositionResult<T>`                           |
//!
//! # Delivery model
//!
//! Sources are polled by the session's tick loop.  Each poll returns at most
//! one fix, and a fix is delivered at most once.  Nothing is queued: if
//! several fixes became available since the last poll, only the newest is
//! returned.

pub mod error;
pub mod feed;
pub mod jitter;
pub mod replay;
pub mod source;


pub use error::{PositionError, PositionResult};
pub use feed::{FeedSource, FixFeed};
pub use jitter::JitterSource;
pub use replay::{ReplaySource, load_fixes_csv, load_fixes_reader};
pub use source::{AcquisitionWatch, PositionSource};
