//! Scenario lifecycle: provision, run, always release.
//!
//! [`run_scenario`] brackets a scenario body the way before/after hooks do in
//! a test runner. The session is provisioned and bound to the context, the
//! body runs with the handle, and the context is released whether the body
//! succeeded, failed, hit its deadline or was cancelled.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tapline_core::gesture::Gestures;
//! use tapline_core::provision::SessionProvisioner;
//! use tapline_core::scenario::{run_scenario, ScenarioOptions};
//! use tapline_core::session::ContextId;
//!
//! # async fn example(provisioner: SessionProvisioner) -> tapline_core::Result<()> {
//! let ctx = ContextId::new("login-smoke");
//! let options = ScenarioOptions::default().with_deadline(Duration::from_secs(120));
//!
//! run_scenario(&provisioner, &ctx, options, |session| async move {
//!     Gestures::new(session).tap_center().await
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::error::{Error, Result};
use crate::provision::SessionProvisioner;
use crate::session::{ContextId, SessionHandle};

/// Limits applied to one scenario run.
#[derive(Debug, Clone, Default)]
pub struct ScenarioOptions {
    /// Upper bound on the body's running time.
    pub deadline: Option<Duration>,
    /// Stops the body early when cancelled.
    pub cancel: Option<CancellationToken>,
}

impl ScenarioOptions {
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Provision a session for `ctx`, run `body` with it, then release `ctx`.
///
/// A failed provision returns immediately; nothing was bound, so nothing is
/// released. Once bound, the context is released on every path out of the
/// body.
///
/// # Errors
///
/// - Any error from [`SessionProvisioner::provision`] or from `body`.
/// - [`Error::WaitTimeout`] with condition `scenario '<ctx>'` when the
///   deadline elapses.
/// - [`Error::Cancelled`] when the token fires.
pub async fn run_scenario<T, F, Fut>(
    provisioner: &SessionProvisioner,
    ctx: &ContextId,
    options: ScenarioOptions,
    body: F,
) -> Result<T>
where
    F: FnOnce(SessionHandle) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let span = info_span!("scenario", context = %ctx);
    async {
        info!("before scenario");
        let handle = provisioner.provision(ctx).await?;
        info!(session_id = %handle.id(), "session ready");

        let outcome = run_body(ctx, options, body(handle)).await;

        provisioner.registry().release(ctx).await;
        match &outcome {
            Ok(_) => info!("scenario finished"),
            Err(e) => warn!(error = %e, "scenario failed"),
        }
        outcome
    }
    .instrument(span)
    .await
}

async fn run_body<T>(
    ctx: &ContextId,
    options: ScenarioOptions,
    body: impl Future<Output = Result<T>>,
) -> Result<T> {
    let ScenarioOptions { deadline, cancel } = options;
    let limited = async {
        match deadline {
            Some(limit) => match tokio::time::timeout(limit, body).await {
                Ok(result) => result,
                Err(_) => Err(Error::WaitTimeout {
                    condition: format!("scenario '{ctx}'"),
                    elapsed: limit,
                }),
            },
            None => body.await,
        }
    };

    match cancel {
        Some(token) => tokio::select! {
            biased;
            _ = token.cancelled() => Err(Error::Cancelled { context: ctx.to_string() }),
            result = limited => result,
        },
        None => limited.await,
    }
}
