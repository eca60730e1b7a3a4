use crate::shell::ShellVariant;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the dispatch and translation layer.
///
/// Local execution failures never show up here: they are reported as a
/// failed [`ExecutionResult`](crate::shell::ExecutionResult) instead.
#[derive(Debug, Error)]
pub enum Error {
    /// A variant name outside the supported set was supplied.
    #[error("Unsupported system: {0}")]
    UnsupportedSystem(String),

    /// No live agent session exists for the platform.
    #[error("No agent available for platform: {0}")]
    NoAgent(ShellVariant),

    /// The remote reply did not arrive in time.
    #[error("Command timeout after {0}s")]
    DispatchTimeout(u64),

    /// A local command exceeded its execution budget.
    #[error("Command timed out after {0}s")]
    ExecutionTimeout(u64),

    #[error("connection closed by peer")]
    TransportClosed,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => Error::TransportClosed,
            other => Error::Transport(other.to_string()),
        }
    }
}

impl Error {
    /// A dispatch timeout for `budget`, in whole seconds rounded up
    #[must_use]
    pub fn dispatch_timeout(budget: Duration) -> Self {
        Error::DispatchTimeout(whole_seconds(budget))
    }

    /// A local execution timeout for `budget`, in whole seconds rounded up
    #[must_use]
    pub fn execution_timeout(budget: Duration) -> Self {
        Error::ExecutionTimeout(whole_seconds(budget))
    }
}

/// Seconds in `budget`, rounded up so sub-second budgets never read as 0
#[must_use]
pub fn whole_seconds(budget: Duration) -> u64 {
    budget.as_secs() + u64::from(budget.subsec_nanos() > 0)
}

pub type Result<T> = std::result::Result<T, Error>;
