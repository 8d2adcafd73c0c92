//! `wf-channel` — the real-time guidance transport.
//!
//! # Crate layout
//!
//! | Module        | Contents                                                        |
//! |---------------|-----------------------------------------------------------------|
//! | [`protocol`]  | `NavigationUpdate`, `SessionHello`, `LocationMessage`, relay messages |
//! | [`transport`] | `Transport` trait, `TcpTransport` (NDJSON over TCP), `MemoryTransport` |
//! | [`channel`]   | `GuidanceChannel` client, `Inbound`, `ReconnectPolicy`          |
//! | [`relay`]     | `LocationRelay` (location-only socket)                          |
//! | [`responder`] | `GuidanceResponder`, `LocationBook` (server side)               |
//! | [`error`]     | `ChannelError`, `ChannelResult<T>`                              |
//!
//! # Guidance socket
//!
//! ```text
//! client                                  server
//!   │── {"session_id": ...} ──────────────▶│
//!   │◀──────────── navigation_started ─────│
//!   │── {"latitude", "longitude"} ────────▶│   every update interval
//!   │◀─── navigating | step_completed ─────│
//!   │                 ...                  │
//!   │◀──────────────── arrived ────────────│   then the server closes
//! ```
//!
//! Updates carry absolute state, so duplicates and reordering are harmless.

pub mod channel;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod responder;
pub mod transport;

#[cfg(test)]
mod tests;

pub use channel::{GuidanceChannel, Inbound, ReconnectPolicy};
pub use error::{ChannelError, ChannelResult};
pub use protocol::{
    LocationMessage, NavigationUpdate, RelayAck, RelayMessage, SessionHello, UpdateStatus,
    to_line,
};
pub use relay::LocationRelay;
pub use responder::{GuidanceResponder, LocationBook, Reply};
pub use transport::{MemoryHandle, MemoryTransport, TcpTransport, Transport};
