//! Environment-driven session provisioning.
//!
//! `appium.server.env` selects where sessions run:
//!
//! | Value | Endpoint | Capabilities |
//! |---|---|---|
//! | `local` (any case) | `http://{appium.host}:{appium.port}` | device partition `device.type`/`device.name` merged with the global partition |
//! | `browserstack` | `appium.server.url` | `browserstack.*` credentials and device settings |
//!
//! A local session additionally requires a [`DeviceProbe`] to report an
//! attached device.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::capability::{CapabilityResolver, CapabilitySet, RemoteCredentials, RemoteDeviceSpec};
use crate::config::{CapabilitySource, ConfigSource};
use crate::error::{Error, Result};
use crate::probe::DeviceProbe;
use crate::registry::SessionRegistry;
use crate::session::{ContextId, Endpoint, SessionHandle};
use crate::transport::TransportError;

pub const SERVER_ENV: &str = "appium.server.env";
pub const SERVER_HOST: &str = "appium.host";
pub const SERVER_PORT: &str = "appium.port";
pub const SERVER_URL: &str = "appium.server.url";
pub const DEVICE_TYPE: &str = "device.type";
pub const DEVICE_NAME: &str = "device.name";

/// Where sessions are started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerEnvironment {
    Local,
    BrowserStack,
}

impl ServerEnvironment {
    /// `local` matches case-insensitively; `browserstack` must be lowercase.
    pub fn parse(raw: &str) -> Result<Self> {
        let value = raw.trim();
        if value == "browserstack" {
            Ok(ServerEnvironment::BrowserStack)
        } else if value.eq_ignore_ascii_case("local") {
            Ok(ServerEnvironment::Local)
        } else if value.is_empty() {
            Err(Error::missing_keys("setting", vec![SERVER_ENV.to_string()]))
        } else {
            Err(Error::configuration(format!(
                "Unsupported {SERVER_ENV} '{value}'; expected 'local' or 'browserstack'"
            )))
        }
    }

    pub fn from_config(config: &dyn ConfigSource) -> Result<Self> {
        Self::parse(&config.require(SERVER_ENV)?)
    }
}

impl fmt::Display for ServerEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerEnvironment::Local => f.write_str("local"),
            ServerEnvironment::BrowserStack => f.write_str("browserstack"),
        }
    }
}

/// A fully described session destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTarget {
    Local {
        endpoint: Endpoint,
        device_type: String,
        device_name: String,
    },
    Remote {
        endpoint: Endpoint,
        credentials: RemoteCredentials,
        spec: RemoteDeviceSpec,
    },
}

impl SessionTarget {
    pub fn from_config(config: &dyn ConfigSource) -> Result<Self> {
        match ServerEnvironment::from_config(config)? {
            ServerEnvironment::Local => {
                let host = config.require(SERVER_HOST)?;
                let raw_port = config.require(SERVER_PORT)?;
                let port = raw_port.trim().parse::<u16>().map_err(|_| {
                    Error::configuration(format!(
                        "{SERVER_PORT} must be a port number, got '{raw_port}'"
                    ))
                })?;
                Ok(SessionTarget::Local {
                    endpoint: Endpoint::local(host.trim(), port)?,
                    device_type: config.require(DEVICE_TYPE)?,
                    device_name: config.require(DEVICE_NAME)?,
                })
            }
            ServerEnvironment::BrowserStack => Ok(SessionTarget::Remote {
                endpoint: Endpoint::parse(config.require(SERVER_URL)?)?,
                credentials: RemoteCredentials::from_config(config)?,
                spec: RemoteDeviceSpec::from_config(config)?,
            }),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        match self {
            SessionTarget::Local { endpoint, .. } | SessionTarget::Remote { endpoint, .. } => {
                endpoint
            }
        }
    }

    pub fn environment(&self) -> ServerEnvironment {
        match self {
            SessionTarget::Local { .. } => ServerEnvironment::Local,
            SessionTarget::Remote { .. } => ServerEnvironment::BrowserStack,
        }
    }
}

/// Creates and binds a session for a context from configuration.
pub struct SessionProvisioner {
    config: Arc<dyn ConfigSource>,
    capabilities: Arc<dyn CapabilitySource>,
    registry: Arc<SessionRegistry>,
    probe: Arc<dyn DeviceProbe>,
}

impl SessionProvisioner {
    pub fn new(
        config: Arc<dyn ConfigSource>,
        capabilities: Arc<dyn CapabilitySource>,
        registry: Arc<SessionRegistry>,
        probe: Arc<dyn DeviceProbe>,
    ) -> Self {
        Self {
            config,
            capabilities,
            registry,
            probe,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Start a session for `ctx` and bind it.
    ///
    /// # Errors
    ///
    /// - [`Error::IllegalState`] if `ctx` already has a session. Nothing is
    ///   created in that case.
    /// - [`Error::Configuration`] for missing or invalid settings.
    /// - [`Error::Transport`] with [`TransportError::SessionNotCreated`] when
    ///   a local session is requested and no device is attached, or when the
    ///   backend refuses the session.
    pub async fn provision(&self, ctx: &ContextId) -> Result<SessionHandle> {
        if let Ok(existing) = self.registry.current(ctx) {
            return Err(Error::IllegalState {
                context: ctx.to_string(),
                message: format!("session {} is already bound; release it first", existing.id()),
            });
        }

        let target = SessionTarget::from_config(self.config.as_ref())?;
        info!(
            context = %ctx,
            environment = %target.environment(),
            endpoint = %target.endpoint(),
            "provisioning session"
        );

        let (capabilities, endpoint) = self.capabilities_for(target).await?;
        let handle = self.registry.create(capabilities, endpoint).await?;

        if let Err(e) = self.registry.bind(ctx, handle.clone()) {
            warn!(
                context = %ctx,
                session_id = %handle.id(),
                "bind lost a race; terminating new session"
            );
            if let Err(quit) = handle.terminate().await {
                warn!(
                    session_id = %handle.id(),
                    error = %quit,
                    "failed to terminate unbound session"
                );
            }
            return Err(e);
        }
        Ok(handle)
    }

    async fn capabilities_for(&self, target: SessionTarget) -> Result<(CapabilitySet, Endpoint)> {
        let resolver = CapabilityResolver::new(self.capabilities.as_ref());
        match target {
            SessionTarget::Local {
                endpoint,
                device_type,
                device_name,
            } => {
                if !self.probe.any_device_connected().await {
                    error!("no Android device connected; aborting session creation");
                    return Err(TransportError::SessionNotCreated(
                        "No Android device connected".to_string(),
                    )
                    .into());
                }
                let caps = resolver.resolve(&device_type, &device_name)?;
                Ok((caps, endpoint))
            }
            SessionTarget::Remote {
                endpoint,
                credentials,
                spec,
            } => {
                let caps = resolver.resolve_remote(&credentials, &spec)?;
                Ok((caps, endpoint))
            }
        }
    }
}

impl fmt::Debug for SessionProvisioner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionProvisioner")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
