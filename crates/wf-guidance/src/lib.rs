//! `wf-guidance` — the in-process half of turn-by-turn guidance.
//!
//! # Crate layout
//!
//! | Module        | Contents                                                       |
//! |---------------|----------------------------------------------------------------|
//! | [`announce`]  | `AnnouncementKey`, `AnnouncementScheduler`, announcement text  |
//! | [`progress`]  | `RouteProgress` (steps, index, state, announced set), `SessionState` |
//! | [`proximity`] | `distance`, `ProximityEngine`, `GuidanceEvent`                 |
//! | [`presenter`] | `Arrow`, `InstructionPresenter`, `DisplayState`                |
//! | [`voice`]     | `SpeechEngine` trait, single-flight `VoiceOutput<E>`           |
//! | [`error`]     | `GuidanceError`, `GuidanceResult<T>`                           |
//!
//! # Evaluation flow
//!
//! ```text
//! fix ─▶ ProximityEngine::evaluate(&mut RouteProgress, fix)
//!          │  advance / approach / arrive decisions,
//!          │  each gated once per session by AnnouncementScheduler
//!          ▼
//!        Vec<GuidanceEvent> ─▶ InstructionPresenter (display)
//!                           └▶ VoiceOutput (speech)
//! ```
//!
//! Nothing here performs I/O or reads a clock; the session crate drives it.

pub mod announce;
pub mod error;
pub mod presenter;
pub mod progress;
pub mod proximity;
pub mod voice;


pub use announce::{
    ARRIVAL_ANNOUNCEMENT, AnnouncementKey, AnnouncementScheduler, ThresholdKind,
    approach_announcement, start_announcement,
};
pub use error::{GuidanceError, GuidanceResult};
pub use presenter::{Arrow, DisplayState, InstructionPresenter};
pub use progress::{ManualStep, RouteProgress, SessionState};
pub use proximity::{GuidanceEvent, ProximityEngine, distance};
pub use voice::{RecordingSpeech, SpeechEngine, Utterance, VoiceInfo, VoiceOutput};
