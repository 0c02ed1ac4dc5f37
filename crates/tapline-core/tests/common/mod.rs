//! Shared test helpers for tapline-core integration tests.
//!
//! Provides a scripted in-memory transport, a driver factory that records
//! every session it opens, a fixed device probe, and capability/config
//! fixtures for a fully specified local device.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use tapline_core::capability::CapabilitySet;
use tapline_core::config::{CapabilityPartition, MapConfig, StaticCapabilities};
use tapline_core::element::{ElementSnapshot, Locator, Viewport};
use tapline_core::gesture::PointerSequence;
use tapline_core::probe::DeviceProbe;
use tapline_core::session::{ContextId, Endpoint, SessionHandle};
use tapline_core::transport::{DriverFactory, SessionTransport, TransportError};

// ---------------------------------------------------------------------------
// Scripted transport
// ---------------------------------------------------------------------------

/// What a single `find_element` call for a locator returns.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// A displayed, enabled element.
    Visible,
    /// Present but not displayed.
    Hidden,
    /// Displayed but not enabled.
    Disabled,
    /// A specific snapshot.
    Element(ElementSnapshot),
    /// `NoSuchElement`.
    Absent,
    /// `StaleElement`.
    Stale,
    /// `ConnectionLost`, which waits do not ignore by default.
    ConnectionLost,
}

impl MockBehavior {
    fn respond(&self, locator: &Locator) -> Result<ElementSnapshot, TransportError> {
        let id = format!("el-{}", locator.value());
        match self {
            MockBehavior::Visible => Ok(ElementSnapshot::visible(id)),
            MockBehavior::Hidden => Ok(ElementSnapshot {
                displayed: false,
                ..ElementSnapshot::visible(id)
            }),
            MockBehavior::Disabled => Ok(ElementSnapshot {
                enabled: false,
                ..ElementSnapshot::visible(id)
            }),
            MockBehavior::Element(snapshot) => Ok(snapshot.clone()),
            MockBehavior::Absent => Err(TransportError::NoSuchElement(locator.to_string())),
            MockBehavior::Stale => Err(TransportError::StaleElement(locator.to_string())),
            MockBehavior::ConnectionLost => {
                Err(TransportError::ConnectionLost("socket closed".to_string()))
            }
        }
    }
}

/// In-memory [`SessionTransport`] whose element lookups are scripted per
/// locator.
///
/// Each locator has a queue of behaviors consumed one per lookup; the last
/// behavior repeats once the queue is down to one entry. Unscripted locators
/// are absent.
pub struct MockTransport {
    viewport: Viewport,
    scripts: Mutex<HashMap<Locator, VecDeque<MockBehavior>>>,
    lookups: Mutex<Vec<Locator>>,
    performed: Mutex<Vec<PointerSequence>>,
    executed: Mutex<Vec<String>>,
    perform_attempts: AtomicU32,
    failing_performs: AtomicU32,
    quit_calls: AtomicU32,
    quit_fails: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_viewport(Viewport::new(1080, 2400))
    }

    pub fn with_viewport(viewport: Viewport) -> Self {
        Self {
            viewport,
            scripts: Mutex::new(HashMap::new()),
            lookups: Mutex::new(Vec::new()),
            performed: Mutex::new(Vec::new()),
            executed: Mutex::new(Vec::new()),
            perform_attempts: AtomicU32::new(0),
            failing_performs: AtomicU32::new(0),
            quit_calls: AtomicU32::new(0),
            quit_fails: AtomicBool::new(false),
        }
    }

    pub fn script(&self, locator: &Locator, behaviors: Vec<MockBehavior>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(locator.clone(), behaviors.into_iter().collect());
    }

    /// Make the next `n` `perform_actions` calls fail.
    pub fn fail_next_performs(&self, n: u32) {
        self.failing_performs.store(n, Ordering::SeqCst);
    }

    pub fn set_quit_fails(&self, fails: bool) {
        self.quit_fails.store(fails, Ordering::SeqCst);
    }

    /// Number of lookups for `locator`.
    pub fn lookups_of(&self, locator: &Locator) -> usize {
        self.lookups
            .lock()
            .unwrap()
            .iter()
            .filter(|l| *l == locator)
            .count()
    }

    pub fn total_lookups(&self) -> usize {
        self.lookups.lock().unwrap().len()
    }

    /// Successfully submitted sequences, in order.
    pub fn performed(&self) -> Vec<PointerSequence> {
        self.performed.lock().unwrap().clone()
    }

    pub fn perform_attempts(&self) -> u32 {
        self.perform_attempts.load(Ordering::SeqCst)
    }

    pub fn executed_scripts(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn quit_calls(&self) -> u32 {
        self.quit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionTransport for MockTransport {
    async fn find_element(&self, locator: &Locator) -> Result<ElementSnapshot, TransportError> {
        self.lookups.lock().unwrap().push(locator.clone());
        let mut scripts = self.scripts.lock().unwrap();
        let behavior = match scripts.get_mut(locator) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        behavior
            .unwrap_or(MockBehavior::Absent)
            .respond(locator)
    }

    async fn window_size(&self) -> Result<Viewport, TransportError> {
        Ok(self.viewport)
    }

    async fn perform_actions(&self, sequence: &PointerSequence) -> Result<(), TransportError> {
        self.perform_attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_performs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(TransportError::CommandFailed("actions rejected".to_string()));
        }
        self.performed.lock().unwrap().push(sequence.clone());
        Ok(())
    }

    async fn execute_script(&self, script: &str, _args: Value) -> Result<Value, TransportError> {
        self.executed.lock().unwrap().push(script.to_string());
        Ok(Value::Null)
    }

    async fn quit(&self) -> Result<(), TransportError> {
        self.quit_calls.fetch_add(1, Ordering::SeqCst);
        if self.quit_fails.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionLost("session already gone".to_string()));
        }
        Ok(())
    }
}

/// A session handle over `transport`, outside any registry.
pub fn session_over(transport: Arc<MockTransport>) -> SessionHandle {
    SessionHandle::new(
        CapabilitySet::new(),
        Endpoint::local("127.0.0.1", 4723).unwrap(),
        transport,
    )
}

// ---------------------------------------------------------------------------
// Recording driver factory
// ---------------------------------------------------------------------------

/// A [`DriverFactory`] that hands out a fresh [`MockTransport`] per session
/// and remembers what it was asked for.
#[derive(Default)]
pub struct RecordingFactory {
    opened: Mutex<Vec<(CapabilitySet, Endpoint, Arc<MockTransport>)>>,
    refuse: AtomicBool,
}

impl RecordingFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every subsequent session with `SessionNotCreated`.
    pub fn refuse_sessions(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.opened.lock().unwrap().len()
    }

    pub fn last_capabilities(&self) -> Option<CapabilitySet> {
        self.opened.lock().unwrap().last().map(|(caps, _, _)| caps.clone())
    }

    pub fn last_endpoint(&self) -> Option<Endpoint> {
        self.opened.lock().unwrap().last().map(|(_, ep, _)| ep.clone())
    }

    pub fn last_transport(&self) -> Option<Arc<MockTransport>> {
        self.opened.lock().unwrap().last().map(|(_, _, t)| Arc::clone(t))
    }

    pub fn transports(&self) -> Vec<Arc<MockTransport>> {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, t)| Arc::clone(t))
            .collect()
    }
}

#[async_trait]
impl DriverFactory for RecordingFactory {
    async fn open(
        &self,
        capabilities: &CapabilitySet,
        endpoint: &Endpoint,
    ) -> Result<Arc<dyn SessionTransport>, TransportError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::SessionNotCreated(
                "device is busy".to_string(),
            ));
        }
        let transport = Arc::new(MockTransport::new());
        self.opened.lock().unwrap().push((
            capabilities.clone(),
            endpoint.clone(),
            Arc::clone(&transport),
        ));
        Ok(transport)
    }
}

// ---------------------------------------------------------------------------
// Probe and fixtures
// ---------------------------------------------------------------------------

/// A [`DeviceProbe`] with a fixed answer.
pub struct FixedProbe(pub bool);

#[async_trait]
impl DeviceProbe for FixedProbe {
    async fn any_device_connected(&self) -> bool {
        self.0
    }
}

/// Generate a unique context id for test isolation.
pub fn unique_context() -> ContextId {
    ContextId::new(format!(
        "test_{}",
        &uuid::Uuid::new_v4().simple().to_string()[..8]
    ))
}

pub fn partition(value: Value) -> CapabilityPartition {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Capabilities for `android`/`pixel7` plus a global partition that sets
/// `automationName`.
pub fn android_catalogue() -> StaticCapabilities {
    StaticCapabilities::new()
        .with_device(
            "android",
            "pixel7",
            partition(json!({
                "platformName": "Android",
                "deviceName": "Pixel 7",
                "platformVersion": "14",
                "udid": "emulator-5554",
                "automationName": "Espresso",
                "app": "/builds/app-debug.apk",
                "appPackage": "com.example.wallet",
                "appActivity": ".MainActivity",
            })),
        )
        .with_device(
            "android",
            "bare",
            partition(json!({
                "deviceName": "Bare Device",
            })),
        )
        .with_global(partition(json!({
            "automationName": "UiAutomator2",
            "newCommandTimeout": 300,
        })))
}

/// Settings for a local server at `127.0.0.1:4723` driving `device`.
pub fn local_config(device: &str) -> MapConfig {
    MapConfig::new()
        .with("appium.server.env", "local")
        .with("appium.host", "127.0.0.1")
        .with("appium.port", "4723")
        .with("device.type", "android")
        .with("device.name", device)
}

/// Settings for a BrowserStack session.
pub fn browserstack_config() -> MapConfig {
    MapConfig::new()
        .with("appium.server.env", "browserstack")
        .with("appium.server.url", "https://hub-cloud.browserstack.com/wd/hub")
        .with("browserstack.user", "qa-bot")
        .with("browserstack.key", "k3y")
        .with("browserstack.device.name", "Samsung Galaxy S23")
        .with("browserstack.platform.version", "13.0")
        .with("browserstack.app.url", "bs://f00d")
        .with("browserstack.build", "nightly-42")
}
