//! Page objects
//!
//! A page is a URL-addressable screen: a URL template, a load-validation predicate, and the root
//! of a tree of lazy element handles. Implement [`Page`] for a struct holding a [`PageHandle`]:
//!
//! ```rust,no_run
//! use browser_pages::{ElementHandle, Node, Page, PageHandle, Result};
//!
//! struct UserPage {
//!     root: PageHandle,
//! }
//!
//! impl UserPage {
//!     fn name(&self) -> ElementHandle {
//!         self.element("h1.user-name")
//!     }
//! }
//!
//! impl Page for UserPage {
//!     const URL_TEMPLATE: &'static str = "/users/{id}";
//!
//!     fn from_root(root: PageHandle) -> Self {
//!         Self { root }
//!     }
//!
//!     fn root(&self) -> &PageHandle {
//!         &self.root
//!     }
//!
//!     fn validate_loading(&self) -> Result<bool> {
//!         self.name().exists()
//!     }
//! }
//! ```

pub mod navigation;

pub use navigation::{Navigator, RedirectOptions};

use crate::browser::driver::DriverError;
use crate::browser::session::Session;
use crate::dom::node::{Node, NodeHandle};
use crate::error::{BrowserError, NavigationFailure, Result};
use crate::routing::{PageKind, UriVars, VarCodec};
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

/// Both halves of a load check, kept for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadCheck {
    /// The current URL matched the page template and the expected variables
    pub url_matches: bool,
    /// The page's load validation passed. Only evaluated when the URL matched.
    pub validation_passed: bool,
}

impl LoadCheck {
    pub fn is_loaded(&self) -> bool {
        self.url_matches && self.validation_passed
    }

    /// The URL matched but load validation did not pass
    pub fn validation_failed(&self) -> bool {
        self.url_matches && !self.validation_passed
    }
}

/// Root node of a page, bound to one session
#[derive(Clone)]
pub struct PageHandle {
    node: NodeHandle,
}

impl PageHandle {
    pub fn new(session: Session, kind: PageKind) -> Self {
        Self { node: NodeHandle::root(session, kind) }
    }

    pub(crate) fn from_node(node: NodeHandle) -> Self {
        Self { node }
    }

    pub fn session(&self) -> &Session {
        self.node.session()
    }

    pub fn kind(&self) -> &PageKind {
        self.node.page_kind()
    }

    /// Template expansion for this page
    pub fn uri(&self, vars: &UriVars) -> String {
        self.kind().uri(vars)
    }

    /// Single load check, recording both signals
    pub fn check_loaded(&self, vars: &UriVars) -> Result<LoadCheck> {
        let session = self.session();
        let driver = session.driver()?;

        let check = match driver.current_url() {
            Ok(url) => {
                let path = session.normalize(&url);
                let url_matches = self.kind().extract_vars(&path).is_some_and(|found| found.satisfies(vars));
                let validation_passed = url_matches && self.validate()?;
                LoadCheck { url_matches, validation_passed }
            }
            Err(DriverError::CommandTimeout(message)) => {
                log::debug!("{} counted as not loaded, driver timed out: {}", self.kind(), message);
                LoadCheck::default()
            }
            Err(err) => return Err(BrowserError::from_interaction(err)),
        };

        log::trace!("{} load check: {:?}", self.kind(), check);
        self.node.page_context().last_check.set(Some(check));
        Ok(check)
    }

    /// Run the page's own load validation. A driver timeout counts as not validated.
    fn validate(&self) -> Result<bool> {
        match self.kind().validate(self) {
            Err(BrowserError::CommandTimeout(message)) => {
                log::debug!("{} validation counted as failed, driver timed out: {}", self.kind(), message);
                Ok(false)
            }
            outcome => outcome,
        }
    }

    /// Outcome of the most recent load check on this page
    pub fn last_check(&self) -> Option<LoadCheck> {
        self.node.page_context().last_check.get()
    }

    /// Whether the most recent load check failed on validation rather than on the URL
    pub fn validation_failed(&self) -> bool {
        self.last_check().is_some_and(|check| check.validation_failed())
    }

    /// Loaded right now, without waiting
    pub fn is_loaded(&self, vars: &UriVars) -> Result<bool> {
        Ok(self.check_loaded(vars)?.is_loaded())
    }

    /// Wait until the page is loaded. Returns false on timeout.
    pub fn loaded(&self, timeout: Option<Duration>, vars: &UriVars) -> Result<bool> {
        self.node.wait_until(timeout, || self.is_loaded(vars))
    }

    /// Wait until the page is no longer loaded. Returns false on timeout.
    pub fn not_loaded(&self, timeout: Option<Duration>, vars: &UriVars) -> Result<bool> {
        self.node.wait_while(timeout, || self.is_loaded(vars))
    }

    /// Wait until loaded, failing with the reason it did not load
    pub fn ensure_loaded(&self, timeout: Option<Duration>, vars: &UriVars) -> Result<()> {
        if self.loaded(timeout, vars)? {
            return Ok(());
        }

        let page = self.kind().name().to_string();
        let path = self.session().current_path()?;
        let failure = if self.validation_failed() {
            NavigationFailure::ValidationFailed { page, path }
        } else {
            NavigationFailure::UrlMismatch { page, path, template: self.kind().template().to_string() }
        };
        Err(failure.into())
    }

    pub fn refresh(&self) -> Result<()> {
        log::debug!("refreshing {}", self.kind());
        self.session().driver()?.reload().map_err(BrowserError::from_interaction)
    }

    /// Refresh and wait for the page to load again
    pub fn refresh_and_wait(&self, timeout: Option<Duration>) -> Result<()> {
        self.refresh()?;
        if self.loaded(timeout, &UriVars::new())? {
            Ok(())
        } else {
            Err(NavigationFailure::RefreshFailed { page: self.kind().name().to_string() }.into())
        }
    }

    /// Wait for the browser to leave this page and land on one of `candidates`
    pub fn wait_until_redirection(&self, candidates: &[PageKind], options: RedirectOptions) -> Result<Option<AnyPage>> {
        Navigator::new(self.session()).wait_until_redirection(self, candidates, options)
    }

    /// Wait for a redirection to `Q`, validating that it loaded
    pub fn redirect_to<Q: Page>(&self, timeout: Option<Duration>) -> Result<Q> {
        let kind = self.session().kind_of::<Q>()?;
        let options = RedirectOptions { timeout, validate_load: true };
        let landed = self.wait_until_redirection(std::slice::from_ref(&kind), options)?;

        match landed.map(AnyPage::downcast::<Q>) {
            Some(Ok(page)) => Ok(page),
            _ => Err(NavigationFailure::NoPageMatches { path: self.session().current_path()? }.into()),
        }
    }
}

impl Node for PageHandle {
    fn node(&self) -> &NodeHandle {
        &self.node
    }
}

impl fmt::Debug for PageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageHandle")
            .field("kind", self.kind())
            .field("session", &self.session().id())
            .field("last_check", &self.last_check())
            .finish()
    }
}

/// A page object type.
///
/// Required: the URL template and the wrapping of a [`PageHandle`]. Everything else has a default
/// built on the page kind and the root handle.
pub trait Page: Sized + 'static {
    /// URL template, e.g. `/users/{id}` or `/search{?q,page}`
    const URL_TEMPLATE: &'static str;

    fn from_root(root: PageHandle) -> Self;

    fn root(&self) -> &PageHandle;

    /// Custom codecs for template variables
    fn url_codecs() -> Vec<(&'static str, Arc<dyn VarCodec>)> {
        Vec::new()
    }

    /// Extra check that the page finished loading, run once the URL matches
    fn validate_loading(&self) -> Result<bool> {
        Ok(true)
    }

    fn kind() -> Result<PageKind> {
        PageKind::of::<Self>()
    }

    fn uri(vars: &UriVars) -> Result<String> {
        Ok(Self::kind()?.uri(vars))
    }

    fn extract_vars(url: &str) -> Result<Option<UriVars>> {
        Ok(Self::kind()?.extract_vars(url))
    }

    /// Whether `url` is a URL of this page
    fn loads(url: &str) -> Result<bool> {
        Ok(Self::kind()?.loads(url))
    }

    fn session(&self) -> &Session {
        self.root().session()
    }

    fn loaded(&self, timeout: Option<Duration>, vars: &UriVars) -> Result<bool> {
        self.root().loaded(timeout, vars)
    }

    fn is_loaded(&self) -> Result<bool> {
        self.root().is_loaded(&UriVars::new())
    }

    fn not_loaded(&self, timeout: Option<Duration>) -> Result<bool> {
        self.root().not_loaded(timeout, &UriVars::new())
    }

    fn refresh(&self) -> Result<()> {
        self.root().refresh()
    }

    fn refresh_and_wait(&self, timeout: Option<Duration>) -> Result<()> {
        self.root().refresh_and_wait(timeout)
    }

    fn wait_until_redirection(&self, candidates: &[PageKind], options: RedirectOptions) -> Result<Option<AnyPage>> {
        self.root().wait_until_redirection(candidates, options)
    }

    fn redirect_to<Q: Page>(&self, timeout: Option<Duration>) -> Result<Q> {
        self.root().redirect_to::<Q>(timeout)
    }
}

impl<P: Page> Node for P {
    fn node(&self) -> &NodeHandle {
        self.root().node()
    }
}

/// A page whose type is only known at runtime
#[derive(Clone, Debug)]
pub struct AnyPage {
    root: PageHandle,
}

impl AnyPage {
    pub fn new(root: PageHandle) -> Self {
        Self { root }
    }

    /// Whether this is a page of type `P`
    pub fn is<P: Page>(&self) -> bool {
        self.root.kind().is::<P>()
    }

    /// Convert into the typed page `P`, or give the page back when it is another kind
    pub fn downcast<P: Page>(self) -> std::result::Result<P, AnyPage> {
        if self.is::<P>() { Ok(P::from_root(self.root)) } else { Err(self) }
    }

    pub fn into_root(self) -> PageHandle {
        self.root
    }
}

impl Deref for AnyPage {
    type Target = PageHandle;

    fn deref(&self) -> &PageHandle {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::config::Config;
    use crate::browser::stub::{StubDriver, StubNode};
    use crate::dom::element::ElementHandle;
    use crate::routing::RoutingTable;

    struct Dashboard {
        root: PageHandle,
    }

    impl Dashboard {
        fn banner(&self) -> ElementHandle {
            self.element("#banner")
        }
    }

    impl Page for Dashboard {
        const URL_TEMPLATE: &'static str = "/teams/{team}/dashboard";

        fn from_root(root: PageHandle) -> Self {
            Self { root }
        }

        fn root(&self) -> &PageHandle {
            &self.root
        }

        fn validate_loading(&self) -> Result<bool> {
            self.banner().exists()
        }
    }

    fn session(stub: &StubDriver) -> Session {
        let routes = RoutingTable::new().with::<Dashboard>().unwrap();
        let config = Config::new().app_host("http://app.test").default_timeout_ms(150).poll_interval_ms(10);
        Session::with_driver(config, routes, stub.clone()).unwrap()
    }

    #[test]
    fn test_load_check_keeps_both_signals() {
        let stub = StubDriver::new();
        stub.set_url("http://app.test/teams/core/dashboard");
        let page = session(&stub).page::<Dashboard>().unwrap();

        let check = page.root().check_loaded(&UriVars::new()).unwrap();
        assert_eq!(check, LoadCheck { url_matches: true, validation_passed: false });
        assert!(page.root().validation_failed());

        stub.append(None, StubNode::new("div").id("banner"));
        assert!(page.is_loaded().unwrap());
    }

    #[test]
    fn test_expected_vars_must_match() {
        let stub = StubDriver::new();
        stub.set_url("http://app.test/teams/core/dashboard");
        stub.append(None, StubNode::new("div").id("banner"));
        let page = session(&stub).page::<Dashboard>().unwrap();

        assert!(page.root().is_loaded(&UriVars::from([("team", "core")])).unwrap());
        assert!(!page.root().is_loaded(&UriVars::from([("team", "web")])).unwrap());
    }

    #[test]
    fn test_ensure_loaded_reports_validation_failure() {
        let stub = StubDriver::new();
        stub.set_url("http://app.test/teams/core/dashboard");
        let page = session(&stub).page::<Dashboard>().unwrap();

        let err = page.root().ensure_loaded(Some(Duration::ZERO), &UriVars::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Navigation failed: Dashboard load validation failed at /teams/core/dashboard"
        );
    }

    #[test]
    fn test_ensure_loaded_reports_url_mismatch() {
        let stub = StubDriver::new();
        stub.set_url("http://app.test/login");
        let page = session(&stub).page::<Dashboard>().unwrap();

        let err = page.root().ensure_loaded(Some(Duration::ZERO), &UriVars::new()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Navigation failed: Failed to load Dashboard, current URL /login does not match /teams/{team}/dashboard"
        );
    }

    #[test]
    fn test_refresh_and_wait() {
        let stub = StubDriver::new();
        stub.set_url("http://app.test/teams/core/dashboard");
        stub.append(None, StubNode::new("div").id("banner"));
        let page = session(&stub).page::<Dashboard>().unwrap();

        page.refresh_and_wait(None).unwrap();
        assert!(stub.events().contains(&"reload".to_string()));
    }

    #[test]
    fn test_any_page_downcast() {
        let stub = StubDriver::new();
        stub.set_url("http://app.test/teams/core/dashboard");
        let session = session(&stub);

        let current = session.current_page().unwrap();
        assert!(current.is::<Dashboard>());
        assert_eq!(current.kind().name(), "Dashboard");

        let dashboard: Dashboard = current.downcast().unwrap();
        assert_eq!(dashboard.root().kind().name(), "Dashboard");
    }
}
