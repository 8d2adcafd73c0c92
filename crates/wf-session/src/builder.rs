//! Fluent builder for constructing a [`RouteSession`].

use wf_channel::{GuidanceChannel, LocationRelay, ReconnectPolicy, Transport};
use wf_core::{GuidanceConfig, SessionId};
use wf_guidance::{InstructionPresenter, ProximityEngine, SpeechEngine, VoiceOutput};
use wf_position::PositionSource;

use crate::timer::TimerQueue;
use crate::{RouteSession, SessionError, SessionResult};

/// Fluent builder for [`RouteSession<S, E>`].
///
/// # Required inputs
///
/// - [`GuidanceConfig`] — thresholds, cadences, speech profile
/// - `S: PositionSource` — where fixes come from
///
/// # Optional inputs
///
/// | Method              | Default                                   |
/// |---------------------|-------------------------------------------|
/// | `.speech(e)`        | none: every announcement is a silent no-op |
/// | `.session_id(id)`   | none (required by `.channel` / `.relay`)  |
/// | `.channel(t)`       | none: local proximity evaluation          |
/// | `.relay(t)`         | none: `start_tracking` only keeps fixes   |
///
/// # Example
///
/// ```rust,ignore
/// let mut session = RouteSessionBuilder::new(config, source)
///     .speech(engine)
///     .session_id(SessionId::new("a1b2c3d4"))
///     .channel(Box::new(TcpTransport::new(addr, timeout)))
///     .build()?;
/// session.start_navigation(plan, now, &mut NoopObserver)?;
/// ```
pub struct RouteSessionBuilder<S: PositionSource, E: SpeechEngine> {
    config:     GuidanceConfig,
    source:     S,
    speech:     Option<E>,
    session_id: Option<SessionId>,
    channel:    Option<Box<dyn Transport>>,
    relay:      Option<Box<dyn Transport>>,
}

impl<S: PositionSource, E: SpeechEngine> RouteSessionBuilder<S, E> {
    pub fn new(config: GuidanceConfig, source: S) -> Self {
        Self {
            config,
            source,
            speech:     None,
            session_id: None,
            channel:    None,
            relay:      None,
        }
    }

    pub fn speech(mut self, engine: E) -> Self {
        self.speech = Some(engine);
        self
    }

    pub fn session_id(mut self, id: SessionId) -> Self {
        self.session_id = Some(id);
        self
    }

    /// Switch to remote mode over `transport`.
    pub fn channel(mut self, transport: Box<dyn Transport>) -> Self {
        self.channel = Some(transport);
        self
    }

    pub fn relay(mut self, transport: Box<dyn Transport>) -> Self {
        self.relay = Some(transport);
        self
    }

    /// Validate the configuration and return an idle session.
    pub fn build(self) -> SessionResult<RouteSession<S, E>> {
        self.config.validate()?;

        let needs_id = self.channel.is_some() || self.relay.is_some();
        let session_id = match (self.session_id, needs_id) {
            (Some(id), _) if id.as_str().is_empty() => {
                return Err(SessionError::Config("session id must not be empty".into()));
            }
            (None, true) => {
                return Err(SessionError::Config(
                    "a channel or relay requires a session id".into(),
                ));
            }
            (id, _) => id,
        };

        let channel = match (self.channel, &session_id) {
            (Some(t), Some(id)) => Some(GuidanceChannel::new(t, id.clone())),
            _ => None,
        };
        let relay = match (self.relay, &session_id) {
            (Some(t), Some(id)) => Some(LocationRelay::new(t, id.clone())),
            _ => None,
        };

        Ok(RouteSession {
            engine:           ProximityEngine::from_config(&self.config),
            presenter:        InstructionPresenter::new(),
            voice:            VoiceOutput::new(self.speech, self.config.speech.clone()),
            reconnect:        ReconnectPolicy::new(self.config.reconnect_backoff_ms),
            config:           self.config,
            source:           self.source,
            channel,
            relay,
            timers:           TimerQueue::new(),
            progress:         None,
            display:          None,
            latest_fix:       None,
            epoch:            0,
            position_enabled: false,
            tracking:         false,
        })
    }
}
