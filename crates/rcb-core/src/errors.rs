use std::fmt;

/// Core error type for the remote-control bot.
///
/// Adapter crates map their specific errors into this type so the dispatcher
/// can turn any failure into either a log entry or user-facing text.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),

    /// Download-queue RPC failed at the transport/HTTP level (retries included).
    #[error("{0}")]
    Rpc(String),

    /// A collaborator answered with a payload we could not make sense of.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("send failed: {0}")]
    Send(SendFailure),

    #[error("deadline exceeded after {0:?}")]
    Timeout(std::time::Duration),

    #[error("store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why an outbound message could not be delivered.
///
/// Only used for log granularity; the dispatcher never retries on any of them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendFailure {
    Empty,
    TooLong,
    ChatNotFound,
    RateLimited,
    Other(String),
}

impl fmt::Display for SendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendFailure::Empty => f.write_str("message is empty"),
            SendFailure::TooLong => f.write_str("message is too long"),
            SendFailure::ChatNotFound => f.write_str("chat not found"),
            SendFailure::RateLimited => f.write_str("too many requests"),
            SendFailure::Other(s) => f.write_str(s),
        }
    }
}
