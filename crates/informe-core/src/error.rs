use thiserror::Error;

/// Core error type for the informe pipeline.
#[derive(Debug, Error)]
pub enum InformeError {
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("missing environment variable: {0}")]
    MissingSecret(String),
    #[error("topic must not be empty")]
    EmptyTopic,
    #[error("model call failed: {0}")]
    Model(#[from] async_openai::error::OpenAIError),
    #[error("pipeline failure: {0}")]
    Pipeline(String),
    #[error("research session timed out after {0} seconds")]
    TimedOut(u64),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl InformeError {
    /// True when the error is the bounded-timeout expiry rather than a
    /// downstream failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }
}
