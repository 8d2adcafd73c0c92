use thiserror::Error;

use wf_channel::ChannelError;
use wf_core::NavError;
use wf_guidance::GuidanceError;
use wf_position::PositionError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot start navigation: route has no steps")]
    NoSteps,

    #[error("session configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Nav(#[from] NavError),

    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("position error: {0}")]
    Position(#[from] PositionError),
}

impl From<GuidanceError> for SessionError {
    fn from(e: GuidanceError) -> Self {
        match e {
            GuidanceError::NoSteps => SessionError::NoSteps,
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
