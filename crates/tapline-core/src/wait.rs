//! Condition polling against a live session.
//!
//! [`until`] is the engine: it evaluates a condition at a fixed cadence until
//! the condition reports [`Outcome::Ready`] or the timeout elapses.
//!
//! - Errors whose [`TransportErrorKind`] is listed in [`WaitSpec::ignored`]
//!   are treated as "not yet" (a node that is momentarily missing or detached).
//! - Any other error aborts the wait immediately.
//! - On timeout the wait fails with [`Error::WaitTimeout`]. The last
//!   evaluation happens at or after the deadline, so a failing wait returns
//!   within `[timeout, timeout + poll_interval)`.
//!
//! [`Waiter`] wraps the engine with the usual element conditions. Most of
//! them raise on timeout; the boolean queries (`is_visible`, `is_clickable`,
//! `wait_for_invisibility`, `wait_for_text`, `wait_for_attribute_contains`)
//! turn a timeout into `false`, and [`Waiter::first_visible`] turns it into
//! `None`.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tapline_core::element::Locator;
//! use tapline_core::session::SessionHandle;
//! use tapline_core::wait::{WaitSpec, Waiter};
//!
//! # async fn example(session: SessionHandle) -> tapline_core::Result<()> {
//! let waiter = Waiter::new(session, WaitSpec::default());
//!
//! let button = waiter.wait_for_clickable(&Locator::id("com.app:id/login"), None).await?;
//! println!("login button at {:?}", button.rect);
//!
//! let landed = waiter
//!     .first_visible(
//!         &[Locator::id("com.app:id/home"), Locator::id("com.app:id/onboarding")],
//!         Some(Duration::from_secs(20)),
//!     )
//!     .await?;
//! # let _ = landed;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, info_span, trace, warn, Instrument};

use crate::config::CoreSettings;
use crate::element::{ElementSnapshot, Locator};
use crate::error::{Error, Result};
use crate::session::SessionHandle;
use crate::transport::{TransportError, TransportErrorKind};

/// Result of one condition evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Ready(T),
    Pending,
}

impl<T> From<Option<T>> for Outcome<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Outcome::Ready(v),
            None => Outcome::Pending,
        }
    }
}

/// Timing and error tolerance for a wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitSpec {
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Error kinds treated as "not yet" instead of failing the wait.
    pub ignored: HashSet<TransportErrorKind>,
}

impl WaitSpec {
    /// Ignores missing and stale elements.
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
            ignored: HashSet::from([
                TransportErrorKind::NoSuchElement,
                TransportErrorKind::StaleElement,
            ]),
        }
    }

    pub fn from_settings(settings: &CoreSettings) -> Self {
        Self::new(settings.default_wait, settings.poll_interval)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn ignoring(mut self, kind: TransportErrorKind) -> Self {
        self.ignored.insert(kind);
        self
    }

    /// Propagate every error.
    pub fn strict(mut self) -> Self {
        self.ignored.clear();
        self
    }

    pub fn ignores(&self, error: &TransportError) -> bool {
        self.ignored.contains(&error.kind())
    }
}

impl Default for WaitSpec {
    fn default() -> Self {
        Self::from_settings(&CoreSettings::default())
    }
}

/// Poll `condition` against `session` until it is ready or `spec.timeout`
/// elapses.
///
/// `description` names the condition in logs and in [`Error::WaitTimeout`].
pub async fn until<T, F, Fut>(
    session: &SessionHandle,
    spec: &WaitSpec,
    description: &str,
    mut condition: F,
) -> Result<T>
where
    F: FnMut(SessionHandle) -> Fut,
    Fut: Future<Output = Result<Outcome<T>, TransportError>>,
{
    let span = info_span!(
        "wait",
        condition = description,
        timeout_ms = spec.timeout.as_millis() as u64
    );
    async {
        let start = Instant::now();
        let mut evaluations: u32 = 0;

        loop {
            evaluations += 1;
            match condition(session.clone()).await {
                Ok(Outcome::Ready(value)) => {
                    debug!(
                        evaluations,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "condition met"
                    );
                    return Ok(value);
                }
                Ok(Outcome::Pending) => {}
                Err(e) if spec.ignores(&e) => trace!(error = %e, "ignoring transient error"),
                Err(e) => {
                    warn!(error = %e, evaluations, "wait aborted");
                    return Err(e.into());
                }
            }

            let elapsed = start.elapsed();
            if elapsed >= spec.timeout {
                debug!(evaluations, elapsed_ms = elapsed.as_millis() as u64, "wait timed out");
                return Err(Error::WaitTimeout {
                    condition: description.to_string(),
                    elapsed,
                });
            }
            tokio::time::sleep(spec.poll_interval.min(spec.timeout - elapsed)).await;
        }
    }
    .instrument(span)
    .await
}

/// Converts a timeout into `Ok(false)` and success into `Ok(true)`.
fn timeout_as_false<T>(result: Result<T>) -> Result<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(e) if e.is_timeout() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Element-level waits for one session.
#[derive(Debug, Clone)]
pub struct Waiter {
    session: SessionHandle,
    spec: WaitSpec,
}

impl Waiter {
    pub fn new(session: SessionHandle, spec: WaitSpec) -> Self {
        Self { session, spec }
    }

    pub fn spec(&self) -> &WaitSpec {
        &self.spec
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    fn spec_for(&self, timeout: Option<Duration>) -> WaitSpec {
        match timeout {
            Some(t) => self.spec.clone().with_timeout(t),
            None => self.spec.clone(),
        }
    }

    /// Wait for a custom condition using this waiter's spec.
    pub async fn until<T, F, Fut>(
        &self,
        description: &str,
        timeout: Option<Duration>,
        condition: F,
    ) -> Result<T>
    where
        F: FnMut(SessionHandle) -> Fut,
        Fut: Future<Output = Result<Outcome<T>, TransportError>>,
    {
        until(&self.session, &self.spec_for(timeout), description, condition).await
    }

    /// Wait until `locator` matches an element, visible or not.
    pub async fn wait_for_present(
        &self,
        locator: &Locator,
        timeout: Option<Duration>,
    ) -> Result<ElementSnapshot> {
        let description = format!("presence of {locator}");
        let element = self
            .until(&description, timeout, |session| async move {
                let el = session.transport().find_element(locator).await?;
                Ok::<_, TransportError>(Outcome::Ready(el))
            })
            .await?;
        info!(%locator, "element present");
        Ok(element)
    }

    /// Wait until `locator` matches a displayed element.
    pub async fn wait_for_visible(
        &self,
        locator: &Locator,
        timeout: Option<Duration>,
    ) -> Result<ElementSnapshot> {
        let description = format!("visibility of {locator}");
        let element = self
            .until(&description, timeout, |session| async move {
                let el = session.transport().find_element(locator).await?;
                Ok::<_, TransportError>(if el.displayed {
                    Outcome::Ready(el)
                } else {
                    Outcome::Pending
                })
            })
            .await?;
        info!(%locator, "element visible");
        Ok(element)
    }

    /// Wait until `locator` matches a displayed, enabled element.
    pub async fn wait_for_clickable(
        &self,
        locator: &Locator,
        timeout: Option<Duration>,
    ) -> Result<ElementSnapshot> {
        let description = format!("clickability of {locator}");
        let element = self
            .until(&description, timeout, |session| async move {
                let el = session.transport().find_element(locator).await?;
                Ok::<_, TransportError>(if el.is_clickable() {
                    Outcome::Ready(el)
                } else {
                    Outcome::Pending
                })
            })
            .await?;
        info!(%locator, "element clickable");
        Ok(element)
    }

    /// `true` if `locator` becomes visible within the timeout.
    pub async fn is_visible(&self, locator: &Locator, timeout: Option<Duration>) -> Result<bool> {
        let visible = timeout_as_false(self.wait_for_visible(locator, timeout).await)?;
        if !visible {
            info!(%locator, "element not visible within timeout");
        }
        Ok(visible)
    }

    /// `true` if `locator` becomes clickable within the timeout.
    pub async fn is_clickable(&self, locator: &Locator, timeout: Option<Duration>) -> Result<bool> {
        let clickable = timeout_as_false(self.wait_for_clickable(locator, timeout).await)?;
        if !clickable {
            info!(%locator, "element not clickable within timeout");
        }
        Ok(clickable)
    }

    /// `true` once `locator` is absent, detached or hidden; `false` if it is
    /// still displayed when the timeout elapses.
    pub async fn wait_for_invisibility(
        &self,
        locator: &Locator,
        timeout: Option<Duration>,
    ) -> Result<bool> {
        let description = format!("invisibility of {locator}");
        let result = self
            .until(&description, timeout, |session| async move {
                match session.transport().find_element(locator).await {
                    Ok(el) if el.displayed => Ok(Outcome::Pending),
                    Ok(_) => Ok(Outcome::Ready(())),
                    Err(e) if e.is_element_absent() => Ok(Outcome::Ready(())),
                    Err(e) => Err(e),
                }
            })
            .await;
        let gone = timeout_as_false(result)?;
        if gone {
            info!(%locator, "element invisible");
        } else {
            info!(%locator, "element still visible after timeout");
        }
        Ok(gone)
    }

    /// `true` once the element's text equals `expected`.
    pub async fn wait_for_text(
        &self,
        locator: &Locator,
        expected: &str,
        timeout: Option<Duration>,
    ) -> Result<bool> {
        let description = format!("text '{expected}' in {locator}");
        let result = self
            .until(&description, timeout, |session| async move {
                let el = session.transport().find_element(locator).await?;
                Ok::<_, TransportError>(if el.text.as_deref() == Some(expected) {
                    Outcome::Ready(())
                } else {
                    Outcome::Pending
                })
            })
            .await;
        let matched = timeout_as_false(result)?;
        if !matched {
            warn!(%locator, expected, "text did not match within timeout");
        }
        Ok(matched)
    }

    /// `true` once attribute `name` contains `needle`.
    pub async fn wait_for_attribute_contains(
        &self,
        locator: &Locator,
        name: &str,
        needle: &str,
        timeout: Option<Duration>,
    ) -> Result<bool> {
        let description = format!("attribute '{name}' containing '{needle}' in {locator}");
        let result = self
            .until(&description, timeout, |session| async move {
                let el = session.transport().find_element(locator).await?;
                Ok::<_, TransportError>(match el.attribute(name) {
                    Some(value) if value.contains(needle) => Outcome::Ready(()),
                    _ => Outcome::Pending,
                })
            })
            .await;
        let matched = timeout_as_false(result)?;
        if !matched {
            warn!(%locator, attribute = name, needle, "attribute did not match within timeout");
        }
        Ok(matched)
    }

    /// The first of `locators`, in list order, that is visible.
    ///
    /// Every poll checks each locator in order, so the earliest-listed visible
    /// locator wins. Returns `Ok(None)` rather than an error when nothing
    /// becomes visible before the timeout.
    pub async fn first_visible(
        &self,
        locators: &[Locator],
        timeout: Option<Duration>,
    ) -> Result<Option<Locator>> {
        let spec = self.spec_for(timeout);
        let tolerance = &spec;
        let description = format!("any of {} locators", locators.len());
        let result = until(&self.session, &spec, &description, |session| async move {
            for locator in locators {
                match session.transport().find_element(locator).await {
                    Ok(el) if el.displayed => return Ok(Outcome::Ready(locator.clone())),
                    Ok(_) => {}
                    Err(e) if tolerance.ignores(&e) => {}
                    Err(e) => return Err(e),
                }
            }
            Ok::<_, TransportError>(Outcome::Pending)
        })
        .await;

        match result {
            Ok(locator) => {
                info!(%locator, "found visible element");
                Ok(Some(locator))
            }
            Err(e) if e.is_timeout() => {
                warn!(
                    count = locators.len(),
                    timeout_ms = spec.timeout.as_millis() as u64,
                    "none of the locators became visible"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
