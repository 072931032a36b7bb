use cone::ConeError;
use thiserror::Error;

/// JetStream 事件源错误
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    #[error("source already started")]
    AlreadyStarted,

    #[error("source is not running")]
    NotStarted,

    #[error("failed to open message stream: {0}")]
    Messages(String),

    #[error("message stream failed: {0}")]
    Receive(String),

    #[error("message stream closed unexpectedly")]
    Closed,

    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl From<Error> for ConeError {
    fn from(err: Error) -> Self {
        ConeError::source_error(err.to_string())
    }
}
