//! Crate-wide error type.
//!
//! Every fallible operation in this crate returns [`Error`]. Callers branch on
//! the variant rather than on message text: configuration problems and
//! missing sessions are fatal, wait timeouts are recoverable, and transport
//! failures are carried through unchanged.

use std::time::Duration;

use thiserror::Error;

use crate::store::StoreError;
use crate::transport::TransportError;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the automation core.
#[derive(Error, Debug)]
pub enum Error {
    /// A capability or tunable is missing or invalid.
    ///
    /// `missing` lists every absent key when the failure is a missing-key
    /// check, and is empty otherwise.
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        missing: Vec<String>,
    },

    /// A session was requested for a context that has none bound.
    #[error("Session not initialized for context '{context}'")]
    NotInitialized { context: String },

    /// An operation conflicts with the current state of a context.
    #[error("Illegal state for context '{context}': {message}")]
    IllegalState { context: String, message: String },

    /// A polled condition was not satisfied within its timeout.
    #[error("Timed out after {}ms waiting for {condition}", elapsed.as_millis())]
    WaitTimeout { condition: String, elapsed: Duration },

    /// Every attempt of a bounded retry came back empty or failed.
    #[error("No data found for {subject} after {attempts} attempts")]
    DataNotFound { attempts: u32, subject: String },

    /// The enclosing scenario was cancelled before the operation completed.
    #[error("Cancelled: {context}")]
    Cancelled { context: String },

    /// The session transport reported a failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The external data store reported a failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Error {
    /// Builds a configuration error with a free-form message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
            missing: Vec::new(),
        }
    }

    /// Builds a configuration error naming every missing key.
    pub fn missing_keys(what: &str, missing: Vec<String>) -> Self {
        Error::Configuration {
            message: format!("Missing required {}: {}", what, missing.join(", ")),
            missing,
        }
    }

    /// Returns `true` for [`Error::WaitTimeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::WaitTimeout { .. })
    }

    /// Returns true for store failures that no amount of retrying will fix,
    /// such as a dependent row or column that does not exist.
    ///
    /// Retry loops abort on these and count every other error as a failed
    /// attempt.
    pub fn is_structural(&self) -> bool {
        matches!(self, Error::Store(e) if !e.is_transient())
    }
}
