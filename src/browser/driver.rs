//! Browser driver boundary
//!
//! The core never talks a wire protocol itself. It needs the capability surface below: navigation,
//! element lookup, element-level reads and interactions, and low-level pointer sequences. Native
//! failures are reported through the small [`DriverError`] category set, which the element layer
//! translates into [`BrowserError`](crate::BrowserError)s.

use crate::browser::config::Config;
use crate::dom::geometry::{Point, Rect};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Opaque reference to a live element.
///
/// Only valid until the document changes; never keep one across operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef(pub u32);

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Where a connection-level failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Establishing the connection
    Open,
    /// Waiting for a response
    Read,
}

impl ConnectionPhase {
    /// Name of the [`Config`] field that bounds this phase
    pub fn config_knob(&self) -> &'static str {
        match self {
            ConnectionPhase::Open => "connect_timeout_ms",
            ConnectionPhase::Read => "read_timeout_ms",
        }
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionPhase::Open => write!(f, "open"),
            ConnectionPhase::Read => write!(f, "read"),
        }
    }
}

/// Native failure categories raised by drivers
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DriverError {
    /// The referenced node no longer exists
    #[error("unknown object: {0}")]
    UnknownObject(String),

    /// A click would land on a different element
    #[error("{0}")]
    ElementObscured(String),

    /// A command (including a page load) did not finish in time
    #[error("command timed out: {0}")]
    CommandTimeout(String),

    /// A page script did not settle within `script_timeout_ms`
    #[error("script timed out: {0}")]
    ScriptTimeout(String),

    /// The browser process could not be started
    #[error("{0}")]
    LaunchFailed(String),

    /// The driver could not be reached at all
    #[error("driver unreachable ({phase}): {message}")]
    Connection { phase: ConnectionPhase, message: String },

    #[error("not supported by this driver: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Other(String),
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

/// One step of a low-level pointer sequence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PointerAction {
    /// Move to the point and press the left button
    PressAndHold(Point),
    /// Move relative to the current pointer position
    MoveBy { dx: f64, dy: f64 },
    MoveTo(Point),
    /// Release the left button at the current position
    Release,
}

/// Tag name and attributes of a live element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub tag_name: String,

    #[serde(default)]
    pub attributes: IndexMap<String, String>,

    /// Whether the element is editable through `contenteditable`
    #[serde(default)]
    pub content_editable: bool,
}

impl NodeInfo {
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self { tag_name: tag_name.into(), attributes: IndexMap::new(), content_editable: false }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// An `<option>` of a choice control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub text: String,
    #[serde(default)]
    pub selected: bool,
}

/// Capability surface of a browser automation backend.
///
/// `scope: None` searches the whole document. Methods taking a [`NodeRef`] report
/// [`DriverError::UnknownObject`] when the node has gone away.
pub trait Driver {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Whether this backend may report a page-load timeout for a page that did load
    fn reports_spurious_load_timeouts(&self) -> bool {
        false
    }

    fn navigate(&self, url: &str) -> DriverResult<()>;
    fn current_url(&self) -> DriverResult<String>;
    fn reload(&self) -> DriverResult<()>;

    /// All elements under `scope` matching the CSS selector, in document order
    fn find_elements(&self, scope: Option<NodeRef>, css: &str) -> DriverResult<Vec<NodeRef>>;

    fn find_element(&self, scope: Option<NodeRef>, css: &str) -> DriverResult<Option<NodeRef>> {
        Ok(self.find_elements(scope, css)?.into_iter().next())
    }

    fn describe(&self, node: NodeRef) -> DriverResult<NodeInfo>;
    fn is_displayed(&self, node: NodeRef) -> DriverResult<bool>;
    fn text(&self, node: NodeRef) -> DriverResult<String>;
    fn html(&self, node: NodeRef) -> DriverResult<String>;
    fn attribute(&self, node: NodeRef, name: &str) -> DriverResult<Option<String>>;
    fn value(&self, node: NodeRef) -> DriverResult<String>;
    fn is_enabled(&self, node: NodeRef) -> DriverResult<bool>;
    fn is_focused(&self, node: NodeRef) -> DriverResult<bool>;
    fn rect(&self, node: NodeRef) -> DriverResult<Rect>;

    fn click(&self, node: NodeRef, button: MouseButton, click_count: u32) -> DriverResult<()>;
    fn hover(&self, node: NodeRef) -> DriverResult<()>;
    fn send_keys(&self, node: NodeRef, keys: &str) -> DriverResult<()>;
    /// Press a named key (`"Enter"`, `"Tab"`, ...) with focus on the node
    fn press_key(&self, node: NodeRef, key: &str) -> DriverResult<()>;
    fn clear(&self, node: NodeRef) -> DriverResult<()>;
    fn set_checked(&self, node: NodeRef, checked: bool) -> DriverResult<()>;
    /// Select the option whose value or visible text equals `option`
    fn select_option(&self, node: NodeRef, option: &str) -> DriverResult<()>;
    fn options(&self, node: NodeRef) -> DriverResult<Vec<SelectOption>>;
    fn scroll_into_view(&self, node: NodeRef) -> DriverResult<()>;

    /// Call a JavaScript function declaration with `this` bound to the node
    fn call_function(&self, node: NodeRef, function: &str, args: &[serde_json::Value]) -> DriverResult<serde_json::Value>;

    /// Run a pointer sequence
    fn perform(&self, actions: &[PointerAction]) -> DriverResult<()>;

    fn quit(&self) -> DriverResult<()>;
}

/// Creates the driver of a session on first use
pub trait Connector {
    fn connect(&self, config: &Config) -> DriverResult<Box<dyn Driver>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_phase_knobs() {
        assert_eq!(ConnectionPhase::Open.config_knob(), "connect_timeout_ms");
        assert_eq!(ConnectionPhase::Read.config_knob(), "read_timeout_ms");
    }

    #[test]
    fn test_node_info_deserialize() {
        let json = serde_json::json!({
            "tag_name": "div",
            "attributes": { "id": "editor", "contenteditable": "true" },
            "content_editable": true
        });

        let info: NodeInfo = serde_json::from_value(json).unwrap();
        assert_eq!(info.tag_name, "div");
        assert_eq!(info.attribute("id"), Some("editor"));
        assert!(info.content_editable);
    }

    #[test]
    fn test_obscured_error_displays_native_message() {
        let err = DriverError::ElementObscured("Other element would receive the click".into());
        assert_eq!(err.to_string(), "Other element would receive the click");
    }
}
