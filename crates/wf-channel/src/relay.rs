//! Location-only relay: raw fixes out, no structured reply contract.

use tracing::{debug, info, warn};

use wf_core::{PositionFix, SessionId};

use crate::protocol::{RelayAck, RelayMessage, to_line};
use crate::{ChannelError, ChannelResult, Transport};

pub struct LocationRelay {
    transport: Box<dyn Transport>,
    session:   SessionId,
    sent:      u64,
    acked:     u64,
}

impl LocationRelay {
    pub fn new(transport: Box<dyn Transport>, session: SessionId) -> Self {
        Self { transport, session, sent: 0, acked: 0 }
    }

    pub fn open(&mut self) -> ChannelResult<()> {
        self.transport.connect()?;
        info!(session = %self.session.short(), "location relay open");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Send one fix, then drain whatever acknowledgements have arrived.
    pub fn send_fix(&mut self, fix: &PositionFix) -> ChannelResult<()> {
        let line = to_line(&RelayMessage::new(&self.session, fix))?;
        self.transport.send(&line)?;
        self.sent += 1;
        self.drain()
    }

    /// Read and count pending replies.  Replies are informational only.
    pub fn drain(&mut self) -> ChannelResult<()> {
        loop {
            match self.transport.try_recv() {
                Ok(Some(line)) => match serde_json::from_str::<RelayAck>(&line) {
                    Ok(ack) if ack.is_received() => self.acked += 1,
                    Ok(ack) => warn!(
                        session = %self.session.short(),
                        message = ack.message.as_deref().unwrap_or(""),
                        "relay rejected a fix"
                    ),
                    Err(e) => debug!(error = %e, "ignoring unparseable relay reply"),
                },
                Ok(None) => return Ok(()),
                Err(ChannelError::MalformedUpdate(reason)) => {
                    debug!(%reason, "ignoring bad relay frame");
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn acked(&self) -> u64 {
        self.acked
    }

    pub fn close(&mut self) {
        self.transport.close();
    }
}
