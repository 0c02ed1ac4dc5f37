//! Shared element and viewport types.
//!
//! These are snapshots of what a transport reports about the UI at the moment
//! of a query. They carry no live reference to the device; the wait engine
//! re-queries on every poll.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Strategy plus value used to locate an element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "using", content = "value", rename_all = "snake_case")]
pub enum Locator {
    /// Resource id (`com.example:id/login`).
    Id(String),
    /// Accessibility id / content description.
    AccessibilityId(String),
    /// XPath expression over the UI hierarchy.
    XPath(String),
    /// Widget class name (`android.widget.Button`).
    ClassName(String),
    /// UiAutomator selector expression.
    UiAutomator(String),
}

impl Locator {
    pub fn id(value: impl Into<String>) -> Self {
        Locator::Id(value.into())
    }

    pub fn accessibility_id(value: impl Into<String>) -> Self {
        Locator::AccessibilityId(value.into())
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Locator::XPath(value.into())
    }

    /// Short strategy name, as used in W3C `using` fields.
    pub fn strategy(&self) -> &'static str {
        match self {
            Locator::Id(_) => "id",
            Locator::AccessibilityId(_) => "accessibility id",
            Locator::XPath(_) => "xpath",
            Locator::ClassName(_) => "class name",
            Locator::UiAutomator(_) => "-android uiautomator",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Locator::Id(v)
            | Locator::AccessibilityId(v)
            | Locator::XPath(v)
            | Locator::ClassName(v)
            | Locator::UiAutomator(v) => v,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy(), self.value())
    }
}

/// State of a located element at query time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementSnapshot {
    /// Transport-assigned element reference.
    pub element_id: String,
    /// Whether the element is rendered and on screen.
    pub displayed: bool,
    /// Whether the element accepts input.
    pub enabled: bool,
    /// Visible text, if any.
    #[serde(default)]
    pub text: Option<String>,
    /// Raw attributes as reported by the backend.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    /// Bounds in viewport coordinates.
    #[serde(default)]
    pub rect: Option<ElementRect>,
}

impl ElementSnapshot {
    /// A displayed, enabled element with the given reference.
    pub fn visible(element_id: impl Into<String>) -> Self {
        Self {
            element_id: element_id.into(),
            displayed: true,
            enabled: true,
            ..Default::default()
        }
    }

    /// Visible and enabled.
    pub fn is_clickable(&self) -> bool {
        self.displayed && self.enabled
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// Element bounds in viewport pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Size of the device viewport in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: i32,
    pub height: i32,
}

impl Viewport {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Centre point, using integer division.
    pub fn center(&self) -> (i32, i32) {
        (self.width / 2, self.height / 2)
    }

    /// Vertical coordinate at `fraction` of the height, truncated toward zero.
    pub fn y_at(&self, fraction: f64) -> i32 {
        (f64::from(self.height) * fraction) as i32
    }
}
