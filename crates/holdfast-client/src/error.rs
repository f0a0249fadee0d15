use reqwest::StatusCode;
use thiserror::Error;

/// Everything that can go wrong while running a long-polling session.
///
/// `Clone` because a single failure may have to resolve a per-update reply
/// and ride the event stream at the same time.
#[derive(Error, Debug, Clone)]
pub enum SessionError {
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
    #[error("long polling already started")]
    AlreadyStarted,
    #[error("long polling has not been started")]
    NotStarted,
    #[error("session has been terminated")]
    SessionInvalid,
    #[error("unexpected http status {0}")]
    HttpStatus(StatusCode),
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("request could not be dispatched: {0}")]
    Dispatch(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("response for a terminated session")]
    StaleSession,
    #[error("request aborted")]
    Aborted,
}

// reqwest::Error is not Clone, so classify instead of wrapping.
impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SessionError::Timeout
        } else if err.is_builder() {
            SessionError::Dispatch(err.to_string())
        } else {
            SessionError::Network(err.to_string())
        }
    }
}
