//! Session handles and the identifiers around them.
//!
//! A [`SessionHandle`] is a cheap, clonable reference to one live automation
//! session: its id, the capabilities it was started with, the endpoint it
//! talks to, and the [`SessionTransport`] that carries commands. Handles are
//! bound to an [`ContextId`] by the [`SessionRegistry`](crate::registry::SessionRegistry).

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::capability::CapabilitySet;
use crate::error::{Error, Result};
use crate::transport::{SessionTransport, TransportError};

/// Identifies one execution context (one concurrently running scenario).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(String);

impl ContextId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// A fresh, unique context id.
    pub fn random() -> Self {
        Self(format!("ctx-{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContextId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ContextId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// URL of an automation server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint(String);

impl Endpoint {
    /// Validates that `url` is an `http` or `https` URL with a host.
    pub fn parse(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let trimmed = url.trim();
        let rest = trimmed
            .strip_prefix("http://")
            .or_else(|| trimmed.strip_prefix("https://"))
            .ok_or_else(|| {
                Error::configuration(format!("Endpoint must be an http(s) URL, got '{url}'"))
            })?;
        let host = rest.split(['/', ':']).next().unwrap_or_default();
        if host.is_empty() {
            return Err(Error::configuration(format!("Endpoint has no host: '{url}'")));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// `http://{host}:{port}` for a locally running server.
    pub fn local(host: &str, port: u16) -> Result<Self> {
        Self::parse(format!("http://{host}:{port}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Endpoint {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.0
    }
}

/// A live session. Clones share the same transport.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    created_at: DateTime<Utc>,
    capabilities: Arc<CapabilitySet>,
    endpoint: Endpoint,
    transport: Arc<dyn SessionTransport>,
}

impl SessionHandle {
    pub fn new(
        capabilities: CapabilitySet,
        endpoint: Endpoint,
        transport: Arc<dyn SessionTransport>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            capabilities: Arc::new(capabilities),
            endpoint,
            transport,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn transport(&self) -> &Arc<dyn SessionTransport> {
        &self.transport
    }

    /// Ask the backend to end the session.
    pub async fn terminate(&self) -> Result<(), TransportError> {
        self.transport.quit().await
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("capabilities", &self.capabilities.len())
            .field("endpoint", &self.endpoint)
            .field("transport", &"<dyn SessionTransport>")
            .finish()
    }
}
