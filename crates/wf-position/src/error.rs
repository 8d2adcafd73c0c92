use thiserror::Error;

#[derive(Debug, Error)]
pub enum PositionError {
    /// Location access was refused.  Never retried automatically.
    #[error("location permission denied")]
    PermissionDenied,

    /// No fix arrived within the acquisition bound.  The caller may retry
    /// `start`.
    #[error("no position fix within {waited_ms} ms")]
    AcquisitionTimeout { waited_ms: u64 },

    #[error("fix replay parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PositionResult<T> = Result<T, PositionError>;
