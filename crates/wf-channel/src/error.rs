use thiserror::Error;

use wf_guidance::GuidanceError;

#[derive(Debug, Error)]
pub enum ChannelError {
    /// The peer closed the connection, or it was never open.
    #[error("channel closed")]
    Closed,

    #[error("malformed update: {0}")]
    MalformedUpdate(String),

    #[error("could not connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source:  std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Guidance(#[from] GuidanceError),
}

pub type ChannelResult<T> = Result<T, ChannelError>;
