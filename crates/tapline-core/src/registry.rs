//! Per-context session registry.
//!
//! The registry owns at most one [`SessionHandle`] per [`ContextId`]. Slots
//! live in a sharded [`DashMap`], so contexts bind and release independently;
//! no lock is held across an await.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tapline_core::capability::CapabilitySet;
//! use tapline_core::registry::SessionRegistry;
//! use tapline_core::session::{ContextId, Endpoint};
//! use tapline_core::transport::DriverFactory;
//!
//! # async fn example(factory: Arc<dyn DriverFactory>, caps: CapabilitySet) -> tapline_core::Result<()> {
//! let registry = SessionRegistry::new(factory);
//! let ctx = ContextId::new("worker-1");
//!
//! let handle = registry.create(caps, Endpoint::local("127.0.0.1", 4723)?).await?;
//! registry.bind(&ctx, handle)?;
//!
//! let session = registry.current(&ctx)?;
//! // ... drive the session ...
//! # let _ = session;
//!
//! registry.release(&ctx).await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, error, info, warn};

use crate::capability::CapabilitySet;
use crate::error::{Error, Result};
use crate::session::{ContextId, Endpoint, SessionHandle};
use crate::transport::DriverFactory;

/// Owns the session bound to each execution context.
pub struct SessionRegistry {
    factory: Arc<dyn DriverFactory>,
    slots: DashMap<ContextId, SessionHandle>,
}

impl SessionRegistry {
    pub fn new(factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            factory,
            slots: DashMap::new(),
        }
    }

    /// Start a new session through the driver factory.
    ///
    /// The handle is not bound to any context; pass it to [`bind`](Self::bind).
    pub async fn create(
        &self,
        capabilities: CapabilitySet,
        endpoint: Endpoint,
    ) -> Result<SessionHandle> {
        info!(%endpoint, capabilities = ?capabilities.redacted(), "creating session");
        let transport = self
            .factory
            .open(&capabilities, &endpoint)
            .await
            .map_err(|e| {
                error!(%endpoint, error = %e, "failed to create session");
                e
            })?;
        let handle = SessionHandle::new(capabilities, endpoint, transport);
        info!(session_id = %handle.id(), "session created");
        Ok(handle)
    }

    /// Associate `handle` with `ctx`.
    ///
    /// # Errors
    ///
    /// [`Error::IllegalState`] if `ctx` already has a handle. The existing
    /// binding is left untouched.
    pub fn bind(&self, ctx: &ContextId, handle: SessionHandle) -> Result<()> {
        match self.slots.entry(ctx.clone()) {
            Entry::Occupied(existing) => {
                let bound = existing.get().id();
                warn!(
                    context = %ctx,
                    bound = %bound,
                    rejected = %handle.id(),
                    "context already has a session"
                );
                Err(Error::IllegalState {
                    context: ctx.to_string(),
                    message: format!("session {bound} is already bound; release it first"),
                })
            }
            Entry::Vacant(slot) => {
                debug!(context = %ctx, session_id = %handle.id(), "session bound");
                slot.insert(handle);
                Ok(())
            }
        }
    }

    /// The handle bound to `ctx`.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] if nothing is bound.
    pub fn current(&self, ctx: &ContextId) -> Result<SessionHandle> {
        self.slots
            .get(ctx)
            .map(|slot| slot.value().clone())
            .ok_or_else(|| Error::NotInitialized {
                context: ctx.to_string(),
            })
    }

    pub fn is_bound(&self, ctx: &ContextId) -> bool {
        self.slots.contains_key(ctx)
    }

    /// Number of contexts with a bound session.
    pub fn active(&self) -> usize {
        self.slots.len()
    }

    /// Terminate and unbind the session for `ctx`, if any.
    ///
    /// Idempotent. Termination failures are logged and swallowed; the binding
    /// is cleared either way.
    pub async fn release(&self, ctx: &ContextId) {
        let Some((_, handle)) = self.slots.remove(ctx) else {
            debug!(context = %ctx, "release: no session bound");
            return;
        };

        match handle.terminate().await {
            Ok(()) => info!(context = %ctx, session_id = %handle.id(), "session terminated"),
            Err(e) => warn!(
                context = %ctx,
                session_id = %handle.id(),
                error = %e,
                "session termination failed; binding cleared anyway"
            ),
        }
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("factory", &"<dyn DriverFactory>")
            .field("active", &self.slots.len())
            .finish()
    }
}
