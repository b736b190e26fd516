use thiserror::Error;

/// Errors raised while validating a loaded configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A duration field that must be positive was set to zero.
    #[error("Invalid configuration: `{0}` must be greater than zero")]
    ZeroDuration(&'static str),

    /// The fixed retry delay exceeds the total retry budget, so no retry would ever happen.
    #[error("Invalid retry configuration for `{0}`: `delay_ms` must not exceed `max_elapsed_ms`")]
    DelayExceedsBudget(&'static str),

    /// General configuration validation error.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
