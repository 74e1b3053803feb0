use crate::browser::driver::{ConnectionPhase, DriverError};
use crate::browser::session::SessionId;
use crate::dom::kind::ElementKind;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Errors raised by pages, elements and sessions
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Failed to connect to browser: {0}")]
    ConnectionFailed(String),

    /// The targeted element does not exist, disappeared, or is covered by another element
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// A page transition did not complete as expected
    #[error("Navigation failed: {0}")]
    Navigation(#[from] NavigationFailure),

    /// The driver reported a load timeout and the destination did not validate on its own
    #[error("Gave up waiting for page to load {url} (try tweaking page_load_timeout_ms)")]
    PageLoadTimeout { url: String },

    /// The driver itself could not be reached
    #[error("Gave up waiting for driver to respond: {0}")]
    Automation(String),

    /// A single driver command did not answer in time
    #[error("Gave up waiting for driver to respond: {0} (try tweaking read_timeout_ms)")]
    CommandTimeout(String),

    /// A wait was started from inside the predicate of another wait on the same node
    #[error("Nested wait on {node}: a wait predicate must not wait on the node it is polling")]
    NestedWait { node: String },

    #[error("Invalid URL template `{template}`: {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("Invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("No page matching `{0}` is registered")]
    UnknownPage(String),

    #[error("{operation} is not supported on {kind} elements")]
    UnsupportedOperation { operation: &'static str, kind: ElementKind },

    #[error("Session {0} has been closed")]
    SessionClosed(SessionId),

    #[error("Script evaluation failed: {0}")]
    EvaluationFailed(String),

    /// Native driver error with no more specific translation
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Which stage of a page transition failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationFailure {
    #[error("Redirect failure, current page {page} is still loaded")]
    StillLoaded { page: String },

    #[error("Redirect failure, no page matches destination {path}")]
    NoPageMatches { path: String },

    #[error("{page} load validation failed at {path}")]
    ValidationFailed { page: String, path: String },

    #[error("Failed to load {page}, current URL {path} does not match {template}")]
    UrlMismatch { page: String, path: String, template: String },

    #[error("{page} did not finish loading after refresh")]
    RefreshFailed { page: String },
}

/// Result type alias for browser operations
pub type Result<T> = std::result::Result<T, BrowserError>;

static OBSCURED_CLICK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(Element <.*> is not clickable at point \(\d+, \d+\)\. Other element would receive the click: <.*>)$")
        .expect("obscured click pattern is a valid regex")
});

/// Pull the "other element would receive the click" sentence out of a native driver message
pub fn obscured_click_description(message: &str) -> Option<&str> {
    OBSCURED_CLICK
        .captures(message.trim_end())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

impl BrowserError {
    /// Translate a native driver failure raised while interacting with a node
    pub fn from_interaction(err: DriverError) -> Self {
        match err {
            DriverError::UnknownObject(message) => BrowserError::ElementNotFound(message),
            DriverError::ElementObscured(message) => {
                let description = obscured_click_description(&message).unwrap_or(&message);
                BrowserError::ElementNotFound(description.to_string())
            }
            DriverError::Other(message) => match obscured_click_description(&message) {
                Some(description) => BrowserError::ElementNotFound(description.to_string()),
                None => BrowserError::Driver(DriverError::Other(message)),
            },
            DriverError::CommandTimeout(message) => BrowserError::CommandTimeout(message),
            DriverError::ScriptTimeout(message) => {
                BrowserError::Automation(format!("{} (try tweaking script_timeout_ms)", message))
            }
            DriverError::LaunchFailed(message) => BrowserError::LaunchFailed(message),
            DriverError::Connection { phase, message } => BrowserError::from_connection(phase, &message),
            other => BrowserError::Driver(other),
        }
    }

    /// Translate a failure to reach the driver at all
    pub fn from_connection(phase: ConnectionPhase, message: &str) -> Self {
        BrowserError::Automation(format!("{} (try tweaking {})", message, phase.config_knob()))
    }

    /// Whether this is a missing-element error
    pub fn is_element_not_found(&self) -> bool {
        matches!(self, BrowserError::ElementNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_MESSAGE: &str = "unknown error: Element <button id=\"save\">...</button> is not clickable at point (120, 48). Other element would receive the click: <div class=\"modal-backdrop\"></div>";

    #[test]
    fn test_obscured_description_extracted() {
        let description = obscured_click_description(CHROME_MESSAGE).unwrap();
        assert!(description.starts_with("Element <button"));
        assert!(description.ends_with("<div class=\"modal-backdrop\"></div>"));
        assert!(!description.contains("unknown error"));
    }

    #[test]
    fn test_obscured_falls_back_to_raw_message() {
        let err = BrowserError::from_interaction(DriverError::ElementObscured("covered by something".into()));
        match err {
            BrowserError::ElementNotFound(message) => assert_eq!(message, "covered by something"),
            other => panic!("Expected ElementNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_unrecognized_error_passes_through() {
        let err = BrowserError::from_interaction(DriverError::Other("stale session".into()));
        assert!(matches!(err, BrowserError::Driver(DriverError::Other(ref m)) if m == "stale session"));
    }

    #[test]
    fn test_generic_error_with_obscured_text_is_translated() {
        let err = BrowserError::from_interaction(DriverError::Other(CHROME_MESSAGE.into()));
        assert!(err.is_element_not_found());
        assert!(err.to_string().contains("modal-backdrop"));
    }

    #[test]
    fn test_connection_hint_names_knob() {
        let err = BrowserError::from_interaction(DriverError::Connection {
            phase: ConnectionPhase::Read,
            message: "socket read timed out".into(),
        });
        assert!(err.to_string().contains("read_timeout_ms"));
    }

    #[test]
    fn test_command_timeout_hint_names_knob() {
        let err = BrowserError::from_interaction(DriverError::CommandTimeout("DOM.querySelectorAll".into()));
        assert!(matches!(err, BrowserError::CommandTimeout(_)));
        assert_eq!(
            err.to_string(),
            "Gave up waiting for driver to respond: DOM.querySelectorAll (try tweaking read_timeout_ms)"
        );
    }

    #[test]
    fn test_script_timeout_hint_names_knob() {
        let err = BrowserError::from_interaction(DriverError::ScriptTimeout("no result after 50ms".into()));
        assert!(matches!(err, BrowserError::Automation(ref m) if m == "no result after 50ms (try tweaking script_timeout_ms)"));
    }

    #[test]
    fn test_navigation_messages_distinguish_cases() {
        let still = NavigationFailure::StillLoaded { page: "LoginPage".into() };
        let none = NavigationFailure::NoPageMatches { path: "/nowhere".into() };
        assert!(still.to_string().contains("still loaded"));
        assert!(none.to_string().contains("no page matches destination /nowhere"));
    }
}
