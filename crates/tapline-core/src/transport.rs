//! Session transport traits.
//!
//! The core never speaks a wire protocol itself. A [`DriverFactory`] turns a
//! capability set and an endpoint into a live [`SessionTransport`], and every
//! higher layer (waits, gestures, remote annotations) goes through that trait.
//! This keeps the registry and wait engine testable against in-memory
//! transports and lets a harness plug in whichever client it already uses.
//!
//! # Error kinds
//!
//! [`TransportError::kind`] projects an error onto a plain
//! [`TransportErrorKind`] so a [`WaitSpec`](crate::wait::WaitSpec) can name the
//! kinds it is willing to swallow while polling.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::capability::CapabilitySet;
use crate::element::{ElementSnapshot, Locator, Viewport};
use crate::gesture::PointerSequence;
use crate::session::Endpoint;

/// Errors reported by a session transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// A command was rejected by the backend.
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// No element matched the locator.
    #[error("No such element: {0}")]
    NoSuchElement(String),

    /// The element was found but detached before it could be read.
    #[error("Stale element reference: {0}")]
    StaleElement(String),

    /// The backend refused to start a session.
    #[error("Session not created: {0}")]
    SessionNotCreated(String),

    /// The transport is not connected.
    #[error("Not connected to automation backend")]
    NotConnected,

    /// The connection dropped mid-command.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The backend did not answer in time.
    #[error("Operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Payload-free discriminant of [`TransportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    CommandFailed,
    NoSuchElement,
    StaleElement,
    SessionNotCreated,
    NotConnected,
    ConnectionLost,
    Timeout,
    Io,
}

impl TransportError {
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            TransportError::CommandFailed(_) => TransportErrorKind::CommandFailed,
            TransportError::NoSuchElement(_) => TransportErrorKind::NoSuchElement,
            TransportError::StaleElement(_) => TransportErrorKind::StaleElement,
            TransportError::SessionNotCreated(_) => TransportErrorKind::SessionNotCreated,
            TransportError::NotConnected => TransportErrorKind::NotConnected,
            TransportError::ConnectionLost(_) => TransportErrorKind::ConnectionLost,
            TransportError::Timeout => TransportErrorKind::Timeout,
            TransportError::Io(_) => TransportErrorKind::Io,
        }
    }

    /// True when the element is absent or detached, as opposed to a
    /// transport-level failure.
    pub fn is_element_absent(&self) -> bool {
        matches!(
            self,
            TransportError::NoSuchElement(_) | TransportError::StaleElement(_)
        )
    }
}

/// A live automation session on one device.
///
/// Implementors must be safe to share across tasks; the registry hands out
/// clones of the same `Arc<dyn SessionTransport>` to every caller within a
/// context.
///
/// # Required Methods
///
/// [`find_element`](SessionTransport::find_element),
/// [`window_size`](SessionTransport::window_size),
/// [`perform_actions`](SessionTransport::perform_actions) and
/// [`quit`](SessionTransport::quit).
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Locate a single element.
    ///
    /// Returns [`TransportError::NoSuchElement`] when nothing matches.
    async fn find_element(&self, locator: &Locator) -> Result<ElementSnapshot, TransportError>;

    /// Current viewport size.
    async fn window_size(&self) -> Result<Viewport, TransportError>;

    /// Submit a pointer sequence as one atomic input action.
    async fn perform_actions(&self, sequence: &PointerSequence) -> Result<(), TransportError>;

    /// Run a backend script command (`mobile:` commands, provider hooks).
    ///
    /// Not every backend supports scripts. The default implementation returns
    /// an error.
    async fn execute_script(&self, script: &str, args: Value) -> Result<Value, TransportError> {
        let _ = args;
        Err(TransportError::CommandFailed(format!(
            "execute_script not supported by this transport: {script}"
        )))
    }

    /// Terminate the session on the backend.
    async fn quit(&self) -> Result<(), TransportError>;
}

/// Constructs session transports.
///
/// This is the only place a wire connection is opened.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn open(
        &self,
        capabilities: &CapabilitySet,
        endpoint: &Endpoint,
    ) -> Result<Arc<dyn SessionTransport>, TransportError>;
}
