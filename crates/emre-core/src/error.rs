use thiserror::Error;

use crate::api::RequestError;
use crate::lifecycle::TransitionError;

/// Errors surfaced by [`EmreClient`](crate::EmreClient).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Rejected locally; nothing was sent.
    #[error("Invalid transition: {0}")]
    InvalidTransition(#[from] TransitionError),

    #[error(transparent)]
    Request(#[from] RequestError),

    /// Cached data did not decode into the requested type.
    #[error("Failed to decode cached {what}: {message}")]
    Decode { what: &'static str, message: String },
}

impl Error {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Request(err) if err.is_unauthorized())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
