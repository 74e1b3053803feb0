//! Lazy node handles and the resolution protocol
//!
//! A [`NodeHandle`] is a path from a page root through a chain of [`Locator`]s. It holds no live
//! browser reference: every read walks the chain again, so a handle keeps working after the page
//! re-renders.

use crate::browser::driver::{Driver, DriverError, DriverResult, NodeRef};
use crate::browser::session::Session;
use crate::dom::collection::ElementCollection;
use crate::dom::element::{Element, ElementHandle};
use crate::dom::locator::Locator;
use crate::error::{BrowserError, Result};
use crate::page::navigation::{Navigator, RedirectOptions};
use crate::page::{AnyPage, LoadCheck, PageHandle};
use crate::routing::PageKind;
use crate::wait::{self, WaitError};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// The page a node tree hangs off
pub(crate) struct PageContext {
    pub(crate) session: Session,
    pub(crate) kind: PageKind,
    pub(crate) last_check: Cell<Option<LoadCheck>>,
}

/// Where a search for child elements starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    Document,
    Node(NodeRef),
    /// Some link of the chain does not exist right now
    Missing,
}

impl Scope {
    pub(crate) fn search_root(&self) -> Option<Option<NodeRef>> {
        match self {
            Scope::Document => Some(None),
            Scope::Node(node) => Some(Some(*node)),
            Scope::Missing => None,
        }
    }
}

/// Find the element `locator` designates under `scope`
pub(crate) fn match_one(driver: &dyn Driver, scope: Option<NodeRef>, locator: &Locator) -> DriverResult<Option<NodeRef>> {
    let index = locator.index().unwrap_or(0);
    match locator.text() {
        None => Ok(driver.find_elements(scope, &locator.to_css())?.get(index).copied()),
        Some(_) => Ok(match_all(driver, scope, locator)?.get(index).copied()),
    }
}

/// All elements under `scope` matching `locator`, ignoring its index
pub(crate) fn match_all(driver: &dyn Driver, scope: Option<NodeRef>, locator: &Locator) -> DriverResult<Vec<NodeRef>> {
    let candidates = driver.find_elements(scope, &locator.to_css())?;
    let Some(text) = locator.text() else {
        return Ok(candidates);
    };

    let mut matched = Vec::new();
    for candidate in candidates {
        match driver.text(candidate) {
            Ok(actual) if actual.trim() == text => matched.push(candidate),
            Ok(_) | Err(DriverError::UnknownObject(_)) => {}
            Err(err) => return Err(err),
        }
    }
    Ok(matched)
}

/// Lazy reference to a page root or to an element below it
#[derive(Clone)]
pub struct NodeHandle {
    page: Rc<PageContext>,
    chain: Vec<Locator>,
}

impl NodeHandle {
    pub(crate) fn root(session: Session, kind: PageKind) -> Self {
        Self { page: Rc::new(PageContext { session, kind, last_check: Cell::new(None) }), chain: Vec::new() }
    }

    /// Handle for the element `locator` designates under this node. No driver round-trip.
    pub fn child(&self, locator: Locator) -> NodeHandle {
        let mut chain = self.chain.clone();
        chain.push(locator);
        Self { page: Rc::clone(&self.page), chain }
    }

    /// Handle for the owner of this node, `None` for a page root
    pub fn parent(&self) -> Option<NodeHandle> {
        let (_, ancestors) = self.chain.split_last()?;
        Some(Self { page: Rc::clone(&self.page), chain: ancestors.to_vec() })
    }

    pub fn session(&self) -> &Session {
        &self.page.session
    }

    /// Kind of the page this node belongs to
    pub fn page_kind(&self) -> &PageKind {
        &self.page.kind
    }

    pub(crate) fn page_context(&self) -> &PageContext {
        &self.page
    }

    /// Locator of this node under its parent, `None` for a page root
    pub fn locator(&self) -> Option<&Locator> {
        self.chain.last()
    }

    pub fn is_root(&self) -> bool {
        self.chain.is_empty()
    }

    /// The page this node belongs to
    pub fn page(&self) -> PageHandle {
        PageHandle::from_node(Self { page: Rc::clone(&self.page), chain: Vec::new() })
    }

    /// Stable description of this node, used in error messages and to detect nested waits
    pub fn key(&self) -> String {
        let mut key = format!("page:{}", self.page.kind);
        for locator in &self.chain {
            key.push_str(" > ");
            key.push_str(&locator.to_string());
        }
        key
    }

    /// Walk the chain from the document down to this node
    pub(crate) fn scope(&self, driver: &dyn Driver) -> Result<Scope> {
        let mut scope = None;
        for locator in &self.chain {
            match match_one(driver, scope, locator) {
                Ok(Some(node)) => scope = Some(node),
                Ok(None) | Err(DriverError::UnknownObject(_)) => return Ok(Scope::Missing),
                Err(err) => return Err(BrowserError::from_interaction(err)),
            }
        }
        Ok(scope.map_or(Scope::Document, Scope::Node))
    }

    pub(crate) fn resolve_with(&self, driver: &dyn Driver) -> Result<Option<NodeRef>> {
        match self.scope(driver)? {
            Scope::Node(node) => Ok(Some(node)),
            Scope::Missing => Ok(None),
            Scope::Document => driver.find_element(None, "html").map_err(BrowserError::from_interaction),
        }
    }

    /// Current live node, re-fetched on every call. `None` when it does not exist right now.
    pub fn resolve(&self) -> Result<Option<NodeRef>> {
        let driver = self.session().driver()?;
        self.resolve_with(&*driver)
    }

    pub(crate) fn ensure_with(&self, driver: &dyn Driver) -> Result<NodeRef> {
        self.resolve_with(driver)?.ok_or_else(|| BrowserError::ElementNotFound(self.key()))
    }

    /// Resolve the node, failing with [`BrowserError::ElementNotFound`] when it does not exist
    pub fn ensure(&self) -> Result<NodeRef> {
        let driver = self.session().driver()?;
        self.ensure_with(&*driver)
    }

    pub(crate) fn translate(&self, err: DriverError) -> BrowserError {
        match err {
            DriverError::UnknownObject(message) => {
                BrowserError::ElementNotFound(format!("{} ({})", self.key(), message))
            }
            other => BrowserError::from_interaction(other),
        }
    }

    /// Run a driver call against the ensured node, translating native failures
    pub fn gracefully<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&dyn Driver, NodeRef) -> DriverResult<T>,
    {
        let driver = self.session().driver()?;
        let node = self.ensure_with(&*driver)?;
        op(&*driver, node).map_err(|err| self.translate(err))
    }

    /// Single existence check, never waits
    pub fn exists(&self) -> Result<bool> {
        Ok(self.resolve()?.is_some())
    }

    pub fn html(&self) -> Result<String> {
        self.gracefully(|driver, node| driver.html(node))
    }

    pub fn text(&self) -> Result<String> {
        self.gracefully(|driver, node| driver.text(node))
    }

    /// Call a JavaScript function with `this` bound to the node
    pub fn execute_script(&self, function: &str, args: &[serde_json::Value]) -> Result<serde_json::Value> {
        self.gracefully(|driver, node| driver.call_function(node, function, args)).map_err(|err| match err {
            BrowserError::Driver(DriverError::Other(message)) => BrowserError::EvaluationFailed(message),
            other => other,
        })
    }

    fn timeout_or_default(&self, timeout: Option<Duration>) -> Duration {
        timeout.unwrap_or_else(|| self.session().config().default_timeout())
    }

    pub(crate) fn poll_until<F>(&self, timeout: Option<Duration>, predicate: F) -> std::result::Result<(), WaitError>
    where
        F: FnMut() -> Result<bool>,
    {
        let timeout = self.timeout_or_default(timeout);
        self.session().waiter().poll_until(&self.key(), timeout, predicate)
    }

    pub(crate) fn poll_while<F>(&self, timeout: Option<Duration>, predicate: F) -> std::result::Result<(), WaitError>
    where
        F: FnMut() -> Result<bool>,
    {
        let timeout = self.timeout_or_default(timeout);
        self.session().waiter().poll_while(&self.key(), timeout, predicate)
    }

    /// Block until `predicate` holds. Returns false on timeout; `None` uses the default timeout.
    pub fn wait_until<F>(&self, timeout: Option<Duration>, predicate: F) -> Result<bool>
    where
        F: FnMut() -> Result<bool>,
    {
        wait::succeeded(self.poll_until(timeout, predicate))
    }

    /// Block while `predicate` holds. Returns false on timeout; `None` uses the default timeout.
    pub fn wait_while<F>(&self, timeout: Option<Duration>, predicate: F) -> Result<bool>
    where
        F: FnMut() -> Result<bool>,
    {
        wait::succeeded(self.poll_while(timeout, predicate))
    }

    /// Wait for an action on this node to move the browser away from its page and onto one of
    /// `candidates`
    pub fn wait_until_redirection(&self, candidates: &[PageKind], options: RedirectOptions) -> Result<Option<AnyPage>> {
        Navigator::new(self.session()).wait_until_redirection(&self.page(), candidates, options)
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle").field("key", &self.key()).field("session", &self.page.session.id()).finish()
    }
}

/// Anything that owns a node: pages and elements
pub trait Node {
    fn node(&self) -> &NodeHandle;

    /// Single child element
    fn element(&self, locator: impl Into<Locator>) -> ElementHandle {
        ElementHandle::new(self.node().child(locator.into()), None)
    }

    /// Single child element wrapped in a custom element type
    fn element_as<E: Element>(&self, locator: impl Into<Locator>) -> E {
        E::from_handle(ElementHandle::new(self.node().child(locator.into()), E::declared_kind()))
    }

    /// All child elements matching `locator`
    fn elements(&self, locator: impl Into<Locator>) -> ElementCollection {
        ElementCollection::new(self.node().clone(), locator.into())
    }

    fn elements_as<E: Element>(&self, locator: impl Into<Locator>) -> ElementCollection<E> {
        ElementCollection::new(self.node().clone(), locator.into())
    }

    fn html(&self) -> Result<String> {
        self.node().html()
    }

    fn text(&self) -> Result<String> {
        self.node().text()
    }
}

impl Node for NodeHandle {
    fn node(&self) -> &NodeHandle {
        self
    }
}
