//! Server side: the authoritative end of the guidance and relay sockets.
//!
//! Both types are sans-IO.  A connection loop feeds them inbound lines and
//! writes back whatever they return; see the `walk` demo's `serve` command.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, info, warn};

use wf_core::{Coordinate, PositionFix, RoutePlan, SessionId};
use wf_guidance::{
    ARRIVAL_ANNOUNCEMENT, GuidanceEvent, ProximityEngine, RouteProgress, SessionState, distance,
};

use crate::ChannelResult;
use crate::protocol::{LocationMessage, NavigationUpdate, RelayAck, RelayMessage, UpdateStatus};

/// Replies to one inbound message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reply {
    pub updates: Vec<NavigationUpdate>,
    /// Close the connection after sending `updates`.
    pub close:   bool,
}

impl Reply {
    fn one(update: NavigationUpdate) -> Self {
        Self { updates: vec![update], close: false }
    }

    fn closing(update: NavigationUpdate) -> Self {
        Self { updates: vec![update], close: true }
    }
}

#[derive(Deserialize)]
struct Hello {
    #[serde(default)]
    session_id: Option<SessionId>,
}

/// Authoritative guidance for any number of sessions.
pub struct GuidanceResponder {
    engine:   ProximityEngine,
    sessions: HashMap<SessionId, RouteProgress>,
}

impl GuidanceResponder {
    pub fn new(engine: ProximityEngine) -> Self {
        Self { engine, sessions: HashMap::new() }
    }

    /// Start (or restart) guidance for `session` on `plan`.
    pub fn start(&mut self, session: SessionId, plan: RoutePlan) -> ChannelResult<()> {
        let progress = RouteProgress::new(plan)?;
        info!(session = %session.short(), steps = progress.plan().len(), "navigation registered");
        self.sessions.insert(session, progress);
        Ok(())
    }

    pub fn stop(&mut self, session: &SessionId) {
        if self.sessions.remove(session).is_some() {
            info!(session = %session.short(), "navigation stopped");
        }
    }

    pub fn is_active(&self, session: &SessionId) -> bool {
        self.sessions.contains_key(session)
    }

    pub fn progress(&self, session: &SessionId) -> Option<&RouteProgress> {
        self.sessions.get(session)
    }

    /// Handle the first message of a connection.  On success returns the
    /// session the connection is bound to.
    pub fn handshake(&self, line: &str) -> (Option<SessionId>, Reply) {
        let session = serde_json::from_str::<Hello>(line)
            .ok()
            .and_then(|h| h.session_id)
            .filter(|id| !id.as_str().is_empty());
        let Some(session) = session else {
            return (None, Reply::closing(NavigationUpdate::error("session_id required in first message")));
        };
        let Some(progress) = self.sessions.get(&session) else {
            let message = format!("no active navigation for session {session}");
            return (None, Reply::closing(NavigationUpdate::error(message)));
        };

        let step = progress.current_step();
        let update = NavigationUpdate {
            status:           UpdateStatus::NavigationStarted,
            current_step:     step.index + 1,
            total_steps:      progress.plan().len(),
            instruction:      step.instruction.clone(),
            distance_to_next: step.distance_m,
            should_announce:  true,
            announcement:     Some(format!("Starting navigation. {}", step.instruction)),
            message:          None,
        };
        info!(session = %session.short(), step = update.current_step, "guidance connection bound");
        (Some(session), Reply::one(update))
    }

    /// Handle one location message for a bound connection.
    pub fn on_location(&mut self, session: &SessionId, line: &str) -> Reply {
        let Some(progress) = self.sessions.get_mut(session) else {
            return Reply::closing(NavigationUpdate::error("no active navigation for this session"));
        };

        let here = match serde_json::from_str::<LocationMessage>(line) {
            Ok(LocationMessage { latitude: Some(lat), longitude: Some(lon), .. }) => {
                Coordinate::new(lat, lon)
            }
            Ok(_) => return Reply::one(NavigationUpdate::error("missing latitude or longitude")),
            Err(e) => {
                debug!(error = %e, "unparseable location message");
                return Reply::one(NavigationUpdate::error("missing latitude or longitude"));
            }
        };

        let fix = PositionFix::new(here, 0.0, 0);
        let events = self.engine.evaluate(progress, &fix);
        let total = progress.plan().len();
        let mut reply = Reply::default();

        for event in events {
            match event {
                GuidanceEvent::Advanced { to, .. } => {
                    let step = &progress.plan().steps()[to];
                    reply.updates.push(NavigationUpdate {
                        status:           UpdateStatus::StepCompleted,
                        current_step:     to + 1,
                        total_steps:      total,
                        instruction:      step.instruction.clone(),
                        distance_to_next: step.distance_m,
                        should_announce:  true,
                        announcement:     Some(step.instruction.clone()),
                        message:          None,
                    });
                }
                GuidanceEvent::Approaching { step, announcement } => {
                    let current = progress.current_step();
                    reply.updates.push(NavigationUpdate {
                        status:           UpdateStatus::Navigating,
                        current_step:     current.index + 1,
                        total_steps:      total,
                        instruction:      current.instruction.clone(),
                        distance_to_next: distance(here, current.end),
                        should_announce:  true,
                        announcement:     Some(announcement),
                        message:          None,
                    });
                    debug!(session = %session.short(), step, "approach announced");
                }
                GuidanceEvent::Arrived { .. } => {
                    reply.updates.push(NavigationUpdate {
                        status:           UpdateStatus::Arrived,
                        current_step:     total,
                        total_steps:      total,
                        instruction:      "You have arrived".into(),
                        distance_to_next: 0.0,
                        should_announce:  true,
                        announcement:     Some(ARRIVAL_ANNOUNCEMENT.into()),
                        message:          None,
                    });
                    reply.close = true;
                }
            }
        }

        if reply.updates.is_empty() {
            let current = progress.current_step();
            reply.updates.push(NavigationUpdate {
                status:           UpdateStatus::Navigating,
                current_step:     current.index + 1,
                total_steps:      total,
                instruction:      current.instruction.clone(),
                distance_to_next: distance(here, current.end),
                should_announce:  false,
                announcement:     None,
                message:          None,
            });
        }

        if progress.state() == SessionState::Arrived {
            info!(session = %session.short(), "arrived at destination");
            self.sessions.remove(session);
        }
        reply
    }
}

// ── LocationBook ──────────────────────────────────────────────────────────────

/// Latest relayed fix per session.
#[derive(Debug, Default)]
pub struct LocationBook {
    latest: HashMap<SessionId, PositionFix>,
}

impl LocationBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle one relay message; the reply is always sent back.
    pub fn on_message(&mut self, line: &str) -> RelayAck {
        let msg = match serde_json::from_str::<RelayMessage>(line) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(error = %e, "unparseable relay message");
                return RelayAck::error("missing session_id or coordinates");
            }
        };
        let (Some(session), Some(lat), Some(lon)) = (msg.session_id, msg.latitude, msg.longitude)
        else {
            return RelayAck::error("missing session_id or coordinates");
        };
        let coordinate = Coordinate::new(lat, lon);
        if session.as_str().is_empty() || !coordinate.is_valid() {
            warn!(session = %session.short(), "rejecting relay fix");
            return RelayAck::error("missing session_id or coordinates");
        }

        debug!(session = %session.short(), %coordinate, "location updated");
        self.latest.insert(
            session.clone(),
            PositionFix::new(coordinate, 0.0, msg.timestamp.unwrap_or(0)),
        );
        RelayAck::received(session)
    }

    /// Most recent fix for `session`; a navigation request uses it as origin.
    pub fn latest(&self, session: &SessionId) -> Option<&PositionFix> {
        self.latest.get(session)
    }

    /// Forget `session` (its relay connection went away).
    pub fn remove(&mut self, session: &SessionId) {
        self.latest.remove(session);
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }
}
