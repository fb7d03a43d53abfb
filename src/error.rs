use std::{sync::Arc, time::Duration};

use crate::selector::SelectorError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error("Connection error: {0}")]
    Connection(Arc<str>),

    #[error("Could not connect to provider '{provider}' after {attempts} attempts")]
    ConnectRetriesExhausted { provider: Arc<str>, attempts: u32 },

    #[error("Couldn't publish message via '{provider}': {reason}")]
    Publish { provider: Arc<str>, reason: Arc<str> },

    #[error("No messaging provider named '{0}' is configured.")]
    UnknownProvider(Arc<str>),

    #[error("No matching message received within {0:?}")]
    WaitTimeout(Duration),

    #[error("Wait for message was cancelled")]
    Cancelled,

    #[error("Event router is not running")]
    RouterClosed,

    #[error("Invalid message property on line {line}: '{text}'")]
    InvalidProperty { line: usize, text: Arc<str> },

    #[error("Configuration error: {0}")]
    Config(Arc<str>),

    #[error("Couldn't start job '{job}': {reason}")]
    Launch { job: Arc<str>, reason: Arc<str> },

    #[error("Hub has already started.")]
    AlreadyStarted,

    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
}

impl Error {
    /// Connection failures are the only ones worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    pub(crate) fn connection(reason: impl ToString) -> Self {
        Error::Connection(reason.to_string().into())
    }

    pub(crate) fn publish(provider: &str, reason: impl ToString) -> Self {
        Error::Publish {
            provider: provider.into(),
            reason: reason.to_string().into(),
        }
    }

    pub(crate) fn config(reason: impl ToString) -> Self {
        Error::Config(reason.to_string().into())
    }
}
