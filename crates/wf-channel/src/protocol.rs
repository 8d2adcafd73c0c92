//! Wire messages.  One JSON object per message; see [`crate::transport`]
//! for framing.
//!
//! | Direction        | Message             | When                               |
//! |------------------|---------------------|------------------------------------|
//! | client → server  | [`SessionHello`]    | first message on a guidance socket |
//! | client → server  | [`LocationMessage`] | every update interval while active |
//! | server → client  | [`NavigationUpdate`]| handshake reply, then per location |
//! | client → relay   | [`RelayMessage`]    | every relay interval               |
//! | relay → client   | [`RelayAck`]        | per relay message                  |

use serde::{Deserialize, Serialize};

use wf_core::{PositionFix, SessionId};

use crate::{ChannelError, ChannelResult};

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    NavigationStarted,
    Navigating,
    StepCompleted,
    Arrived,
    Error,
}

/// Authoritative guidance state from the server.
///
/// `current_step` is 1-based and absolute: applying the same update twice,
/// or an older one after a newer one, simply overwrites the display.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NavigationUpdate {
    pub status:           UpdateStatus,
    #[serde(default)]
    pub current_step:     usize,
    #[serde(default)]
    pub total_steps:      usize,
    #[serde(default)]
    pub instruction:      String,
    #[serde(default)]
    pub distance_to_next: f64,
    #[serde(default)]
    pub should_announce:  bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub announcement:     Option<String>,
    /// Only present on `error` updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message:          Option<String>,
}

impl NavigationUpdate {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status:           UpdateStatus::Error,
            current_step:     0,
            total_steps:      0,
            instruction:      String::new(),
            distance_to_next: 0.0,
            should_announce:  false,
            announcement:     None,
            message:          Some(message.into()),
        }
    }

    /// Parse one wire message.  Unknown statuses and bad shapes are
    /// [`ChannelError::MalformedUpdate`].
    pub fn parse(line: &str) -> ChannelResult<Self> {
        serde_json::from_str(line).map_err(|e| ChannelError::MalformedUpdate(e.to_string()))
    }

    /// Check an update against the loaded route.  `error` updates carry no
    /// step state and always pass.
    pub fn validate(&self, total_steps: usize) -> ChannelResult<()> {
        if self.status == UpdateStatus::Error {
            return Ok(());
        }
        if self.total_steps != total_steps {
            return Err(ChannelError::MalformedUpdate(format!(
                "total_steps {} does not match the loaded route ({total_steps})",
                self.total_steps
            )));
        }
        if !(1..=total_steps).contains(&self.current_step) {
            return Err(ChannelError::MalformedUpdate(format!(
                "current_step {} outside 1..={total_steps}",
                self.current_step
            )));
        }
        if self.should_announce && self.announcement().is_none() {
            return Err(ChannelError::MalformedUpdate(
                "should_announce without announcement text".into(),
            ));
        }
        Ok(())
    }

    /// 0-based index of `current_step`.
    #[inline]
    pub fn step_index(&self) -> usize {
        self.current_step.saturating_sub(1)
    }

    /// The text to speak, if any and non-blank.
    pub fn announcement(&self) -> Option<&str> {
        self.announcement.as_deref().filter(|a| !a.trim().is_empty())
    }
}

/// First message on a guidance socket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionHello {
    pub session_id: SessionId,
}

/// Position sent on the guidance socket.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationMessage {
    pub latitude:  Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl From<&PositionFix> for LocationMessage {
    fn from(fix: &PositionFix) -> Self {
        Self {
            latitude:  Some(fix.coordinate.latitude),
            longitude: Some(fix.coordinate.longitude),
            timestamp: Some(fix.timestamp_ms),
        }
    }
}

/// Raw fix on the location-only relay socket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub session_id: Option<SessionId>,
    pub latitude:   Option<f64>,
    pub longitude:  Option<f64>,
    #[serde(default)]
    pub timestamp:  Option<u64>,
}

impl RelayMessage {
    pub fn new(session_id: &SessionId, fix: &PositionFix) -> Self {
        Self {
            session_id: Some(session_id.clone()),
            latitude:   Some(fix.coordinate.latitude),
            longitude:  Some(fix.coordinate.longitude),
            timestamp:  Some(fix.timestamp_ms),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelayAck {
    /// `"received"` or `"error"`.
    pub status:     String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message:    Option<String>,
}

impl RelayAck {
    pub fn received(session_id: SessionId) -> Self {
        Self { status: "received".into(), session_id: Some(session_id), message: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { status: "error".into(), session_id: None, message: Some(message.into()) }
    }

    pub fn is_received(&self) -> bool {
        self.status == "received"
    }
}

/// Serialize any wire message to a single line (no trailing newline).
pub fn to_line<T: Serialize>(message: &T) -> ChannelResult<String> {
    Ok(serde_json::to_string(message)?)
}
