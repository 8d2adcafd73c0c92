use thiserror::Error;

#[derive(Debug, Error)]
pub enum GuidanceError {
    #[error("route has no steps")]
    NoSteps,
}

pub type GuidanceResult<T> = Result<T, GuidanceError>;
