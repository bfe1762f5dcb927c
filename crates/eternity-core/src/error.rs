use eternity_db::DbError;
use thiserror::Error;

/// Failure reported by an external directory source or notification sink.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct UpstreamError(pub String);

impl UpstreamError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("a poll titled '{0}' already exists")]
    DuplicateTitle(String),
    #[error("not found")]
    NotFound,
    #[error("poll has already started")]
    AlreadyStarted,
    #[error("already responded to this poll")]
    AlreadyResponded,
    #[error("poll is not accepting responses")]
    PollNotActive,
    #[error("choice {0} is out of range")]
    InvalidChoice(i64),
    #[error("unknown target '{0}'")]
    UnknownTarget(String),
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("poll has not finished yet")]
    NotFinished,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("database error: {0}")]
    Database(#[from] DbError),
}

impl From<UpstreamError> for CoreError {
    fn from(err: UpstreamError) -> Self {
        CoreError::UpstreamUnavailable(err.0)
    }
}
