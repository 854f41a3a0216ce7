use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error("axis limits must be finite")]
    NonFiniteLimits,
    #[error("{axis} axis range is empty or inverted ({min} >= {max})")]
    InvertedRange { axis: char, min: f64, max: f64 },
    #[error("cluster count must be at least 1, got {0}")]
    InvalidClusterCount(u32),
    #[error("unknown initialization method '{0}'")]
    UnknownInitMethod(String),
}
