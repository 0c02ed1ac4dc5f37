//! # tapline-core
//!
//! Execution core for mobile UI automation: resolve capabilities, own one
//! session per execution context, wait on element conditions, drive pointer
//! gestures, and fetch out-of-band test data with bounded retry.
//!
//! ## Architecture
//!
//! - [`capability`] - Merges device and global capability partitions and validates them
//! - [`registry`] - Binds at most one [`session::SessionHandle`] per [`session::ContextId`]
//! - [`wait`] - Polls conditions at a fixed cadence until ready or timed out
//! - [`gesture`] - Builds W3C pointer sequences (tap, swipe, scroll)
//! - [`retry`] - Bounded retry for lookups that may come back empty
//! - [`otp`] - OTP lookup and wallet setup on top of [`store`]
//! - [`provision`] - Creates sessions from `appium.server.env` configuration
//! - [`scenario`] - Provision, run, and always release
//! - [`transport`] - Traits a wire client implements
//!
//! Ambient pieces: [`config`] for settings, [`error`] for the crate error
//! type, [`logging`] for subscriber setup, [`probe`] for attached-device
//! detection and [`remote`] for cloud-provider session annotations.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tapline_core::element::Locator;
//! use tapline_core::gesture::Gestures;
//! use tapline_core::registry::SessionRegistry;
//! use tapline_core::session::ContextId;
//! use tapline_core::transport::DriverFactory;
//! use tapline_core::wait::{WaitSpec, Waiter};
//!
//! # async fn example(
//! #     factory: Arc<dyn DriverFactory>,
//! #     caps: tapline_core::capability::CapabilitySet,
//! # ) -> tapline_core::Result<()> {
//! let registry = SessionRegistry::new(factory);
//! let ctx = ContextId::random();
//! let handle = registry
//!     .create(caps, tapline_core::session::Endpoint::local("127.0.0.1", 4723)?)
//!     .await?;
//! registry.bind(&ctx, handle)?;
//!
//! let session = registry.current(&ctx)?;
//! let waiter = Waiter::new(session.clone(), WaitSpec::default());
//! waiter.wait_for_clickable(&Locator::id("com.app:id/continue"), None).await?;
//! Gestures::new(session).scroll_down(600).await?;
//!
//! registry.release(&ctx).await;
//! # Ok(())
//! # }
//! ```

pub mod capability;
pub mod config;
pub mod element;
pub mod error;
pub mod gesture;
pub mod logging;
pub mod otp;
pub mod probe;
pub mod provision;
pub mod registry;
pub mod remote;
pub mod retry;
pub mod scenario;
pub mod session;
pub mod store;
pub mod transport;
pub mod wait;

pub use error::{Error, Result};
