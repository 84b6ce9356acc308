use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors crossing the aggregation core's boundaries.
///
/// Handler-side errors never propagate past the dispatcher; read-path errors
/// propagate to the caller as one of these variants.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Underlying storage temporarily unavailable. Handlers log and abandon
    /// the invocation; the next triggering event recomputes from scratch.
    #[error("store unavailable: {0}")]
    TransientStore(String),

    /// A record references a parent that does not exist, or stored derived
    /// state fails to decode. Reads degrade rather than fail where possible.
    #[error("data integrity: {0}")]
    DataIntegrity(String),

    /// Invalid scoring weights or similar. Fatal at load time, never raised
    /// per-event.
    #[error("configuration: {0}")]
    Configuration(String),

    /// A handler ran past its per-invocation time limit.
    #[error("handler timed out after {0} ms")]
    HandlerTimeout(u64),
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::TransientStore(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::DataIntegrity(err.to_string())
    }
}
