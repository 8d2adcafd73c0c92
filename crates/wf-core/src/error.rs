//! Base error type.
//!
//! Sub-crates define their own error enums and wrap `NavError` as one
//! variant via `#[from]`.

use thiserror::Error;

/// Errors produced by `wf-core`: configuration and payload parsing.
#[derive(Debug, Error)]
pub enum NavError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for NavError {
    fn from(e: toml::de::Error) -> Self {
        NavError::Config(e.to_string())
    }
}

/// Shorthand result type for `wf-core`.
pub type NavResult<T> = Result<T, NavError>;
