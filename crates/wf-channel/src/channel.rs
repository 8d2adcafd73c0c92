//! Client side of the guidance socket.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use wf_core::{Millis, PositionFix, SessionId};

use crate::protocol::{LocationMessage, NavigationUpdate, SessionHello, UpdateStatus, to_line};
use crate::{ChannelError, ChannelResult, Transport};

/// What an inbound message means for the session.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// A new authoritative update to apply.  `should_announce` is cleared
    /// when the same announcement was already delivered this session.
    Apply(NavigationUpdate),
    /// Identical to the last applied update; nothing to do.
    Duplicate,
    /// The server reported an error; session state is unchanged.
    RemoteError(String),
    /// Failed parsing or validation; discarded.
    Malformed(String),
}

pub struct GuidanceChannel {
    transport:    Box<dyn Transport>,
    session:      SessionId,
    last_applied: Option<NavigationUpdate>,
    /// `(status, current_step, text)` of every announcement delivered.
    announced:    HashSet<(UpdateStatus, usize, String)>,
}

impl GuidanceChannel {
    pub fn new(transport: Box<dyn Transport>, session: SessionId) -> Self {
        Self { transport, session, last_applied: None, announced: HashSet::new() }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Connect and send the session identifier as the first message.
    pub fn open(&mut self) -> ChannelResult<()> {
        self.transport.connect()?;
        let hello = to_line(&SessionHello { session_id: self.session.clone() })?;
        if let Err(e) = self.transport.send(&hello) {
            self.transport.close();
            return Err(e);
        }
        info!(session = %self.session.short(), "guidance channel open");
        Ok(())
    }

    pub fn send_fix(&mut self, fix: &PositionFix) -> ChannelResult<()> {
        let line = to_line(&LocationMessage::from(fix))?;
        self.transport.send(&line)
    }

    /// Next inbound message, classified against a route of `total_steps`.
    ///
    /// `Err` only for transport failures ([`ChannelError::Closed`] on peer
    /// close); bad messages come back as [`Inbound::Malformed`] so one bad
    /// message never ends the loop.
    pub fn poll(&mut self, total_steps: usize) -> ChannelResult<Option<Inbound>> {
        let line = match self.transport.try_recv() {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(None),
            Err(ChannelError::MalformedUpdate(reason)) => {
                return Ok(Some(Inbound::Malformed(reason)));
            }
            Err(e) => return Err(e),
        };

        let mut update = match NavigationUpdate::parse(&line).and_then(|u| {
            u.validate(total_steps)?;
            Ok(u)
        }) {
            Ok(update) => update,
            Err(e) => {
                warn!(session = %self.session.short(), error = %e, "discarding update");
                return Ok(Some(Inbound::Malformed(e.to_string())));
            }
        };

        if update.status == UpdateStatus::Error {
            let message = update.message.unwrap_or_else(|| "unspecified error".into());
            warn!(session = %self.session.short(), %message, "server reported an error");
            return Ok(Some(Inbound::RemoteError(message)));
        }
        if self.last_applied.as_ref() == Some(&update) {
            debug!(session = %self.session.short(), step = update.current_step, "duplicate update");
            return Ok(Some(Inbound::Duplicate));
        }
        self.last_applied = Some(update.clone());

        // Retransmitted out of order: the state still applies, the speech does not.
        let key = update
            .announcement()
            .filter(|_| update.should_announce)
            .map(|text| (update.status, update.current_step, text.to_owned()));
        if let Some(key) = key {
            if !self.announced.insert(key) {
                debug!(session = %self.session.short(), step = update.current_step, "announcement already delivered");
                update.should_announce = false;
            }
        }
        Ok(Some(Inbound::Apply(update)))
    }

    pub fn close(&mut self) {
        self.transport.close();
    }

    /// Forget applied updates and delivered announcements, for a new
    /// route session.
    pub fn reset(&mut self) {
        self.last_applied = None;
        self.announced.clear();
    }
}

// ── ReconnectPolicy ───────────────────────────────────────────────────────────

/// Single fixed-backoff reconnect.
///
/// At most one attempt is pending at a time.  Once `cancel` is called
/// (user stop) nothing is scheduled until `reset`.
#[derive(Copy, Clone, Debug)]
pub struct ReconnectPolicy {
    backoff_ms: u64,
    pending:    bool,
    cancelled:  bool,
}

impl ReconnectPolicy {
    pub fn new(backoff_ms: u64) -> Self {
        Self { backoff_ms, pending: false, cancelled: false }
    }

    pub fn backoff_ms(&self) -> u64 {
        self.backoff_ms
    }

    /// The connection dropped unexpectedly at `now`.  Returns when to try
    /// again, or `None` if an attempt is already pending or the user stopped.
    pub fn on_close(&mut self, now: Millis) -> Option<Millis> {
        if self.cancelled || self.pending {
            return None;
        }
        self.pending = true;
        Some(now.offset(self.backoff_ms))
    }

    /// The pending attempt is being made now.  `false` if it was cancelled
    /// in the meantime.
    pub fn begin_attempt(&mut self) -> bool {
        let go = self.pending && !self.cancelled;
        self.pending = false;
        go
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.pending = false;
    }

    pub fn reset(&mut self) {
        self.cancelled = false;
        self.pending = false;
    }
}
