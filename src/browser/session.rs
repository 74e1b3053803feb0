use crate::browser::chrome::ChromeConnector;
use crate::browser::config::Config;
use crate::browser::driver::{Connector, Driver, DriverError};
use crate::browser::pool;
use crate::error::{BrowserError, Result};
use crate::page::navigation::Navigator;
use crate::page::{AnyPage, Page, PageHandle};
use crate::routing::{PageKind, RoutingTable, UriVars};
use crate::wait::Waiter;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use url::{Position, Url};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

pub(crate) struct SessionInner {
    pub(crate) id: SessionId,
    config: Config,
    routes: Arc<RoutingTable>,
    connector: Box<dyn Connector>,
    driver: RefCell<Option<Rc<dyn Driver>>>,
    waiter: Waiter,
    app_host: Option<Url>,
    closed: Cell<bool>,
}

impl SessionInner {
    fn shutdown(&self) -> Result<()> {
        self.closed.set(true);
        pool::deregister(self.id);

        let driver = self.driver.borrow_mut().take();
        if let Some(driver) = driver {
            log::debug!("{} quitting {} driver", self.id, driver.name());
            driver.quit().map_err(BrowserError::from_interaction)?;
        }
        Ok(())
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if !self.closed.get() {
            if let Err(err) = self.shutdown() {
                log::warn!("failed to quit {} on drop: {}", self.id, err);
            }
        }
    }
}

/// One browser under test.
///
/// Cheap to clone; clones share the driver. The driver is created on first use and released by
/// [`quit`](Self::quit) or when the last clone is dropped. A session is driven by one thread.
#[derive(Clone)]
pub struct Session {
    inner: Rc<SessionInner>,
}

impl Session {
    /// Session driving Chrome, launched (or connected to) on first use
    pub fn new(config: Config, routes: impl Into<Arc<RoutingTable>>) -> Result<Self> {
        Self::with_connector(config, routes, ChromeConnector)
    }

    /// Session whose driver is created by `connector` on first use
    pub fn with_connector(
        config: Config,
        routes: impl Into<Arc<RoutingTable>>,
        connector: impl Connector + 'static,
    ) -> Result<Self> {
        Self::build(config, routes.into(), Box::new(connector), None)
    }

    /// Session over an already connected driver
    pub fn with_driver(config: Config, routes: impl Into<Arc<RoutingTable>>, driver: impl Driver + 'static) -> Result<Self> {
        let driver: Rc<dyn Driver> = Rc::new(driver);
        Self::build(config, routes.into(), Box::new(ChromeConnector), Some(driver))
    }

    fn build(
        config: Config,
        routes: Arc<RoutingTable>,
        connector: Box<dyn Connector>,
        driver: Option<Rc<dyn Driver>>,
    ) -> Result<Self> {
        let app_host = config
            .app_host
            .as_deref()
            .map(|host| Url::parse(host).map_err(|e| BrowserError::InvalidUrl { url: host.to_string(), reason: e.to_string() }))
            .transpose()?;

        let inner = Rc::new(SessionInner {
            id: SessionId::next(),
            waiter: Waiter::new(config.poll_interval()),
            config,
            routes,
            connector,
            driver: RefCell::new(driver),
            app_host,
            closed: Cell::new(false),
        });
        pool::register(&inner);
        log::debug!("created {}", inner.id);

        Ok(Self { inner })
    }

    pub(crate) fn from_inner(inner: Rc<SessionInner>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.inner.routes
    }

    pub fn app_host(&self) -> Option<&Url> {
        self.inner.app_host.as_ref()
    }

    pub(crate) fn waiter(&self) -> &Waiter {
        &self.inner.waiter
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }

    /// The session's driver, connecting on first use
    pub fn driver(&self) -> Result<Rc<dyn Driver>> {
        if self.inner.closed.get() {
            return Err(BrowserError::SessionClosed(self.inner.id));
        }
        if let Some(driver) = self.inner.driver.borrow().as_ref() {
            return Ok(Rc::clone(driver));
        }

        let driver: Rc<dyn Driver> = self.inner.connector.connect(&self.inner.config).map_err(|err| match err {
            DriverError::Connection { phase, message } => BrowserError::from_connection(phase, &message),
            DriverError::LaunchFailed(message) => BrowserError::LaunchFailed(message),
            other => BrowserError::ConnectionFailed(other.to_string()),
        })?.into();
        log::debug!("{} connected to {} driver", self.inner.id, driver.name());

        *self.inner.driver.borrow_mut() = Some(Rc::clone(&driver));
        Ok(driver)
    }

    /// Join a relative URL to the app host. Absolute URLs and sessions without a host pass through.
    pub fn resolve_url(&self, uri: &str) -> Result<String> {
        match &self.inner.app_host {
            Some(host) => host
                .join(uri)
                .map(String::from)
                .map_err(|e| BrowserError::InvalidUrl { url: uri.to_string(), reason: e.to_string() }),
            None => Ok(uri.to_string()),
        }
    }

    pub fn current_url(&self) -> Result<String> {
        self.driver()?.current_url().map_err(BrowserError::from_interaction)
    }

    /// Current URL without scheme and authority when it is on the app host
    pub fn current_path(&self) -> Result<String> {
        Ok(self.normalize(&self.current_url()?))
    }

    pub(crate) fn normalize(&self, url: &str) -> String {
        let Some(host) = &self.inner.app_host else {
            return url.to_string();
        };
        match Url::parse(url) {
            Ok(parsed)
                if parsed.host_str() == host.host_str()
                    && parsed.port_or_known_default() == host.port_or_known_default() =>
            {
                parsed[Position::BeforePath..].to_string()
            }
            _ => url.to_string(),
        }
    }

    /// Page kind registered for `P`, or a fresh one when `P` is not in the routing table
    pub fn kind_of<P: Page>(&self) -> Result<PageKind> {
        match self.inner.routes.iter().find(|kind| kind.is::<P>()) {
            Some(kind) => Ok(kind.clone()),
            None => PageKind::of::<P>(),
        }
    }

    /// Page object for `P` bound to this session, without navigating
    pub fn page<P: Page>(&self) -> Result<P> {
        Ok(P::from_root(PageHandle::new(self.clone(), self.kind_of::<P>()?)))
    }

    /// Navigate to `P` and return it. Load is only checked to tolerate spurious driver timeouts.
    pub fn visit<P: Page>(&self, vars: &UriVars) -> Result<P> {
        let page = self.page::<P>()?;
        Navigator::new(self).visit(page.root(), vars)?;
        Ok(page)
    }

    /// Navigate to `P` and wait for it to be loaded
    pub fn load<P: Page>(&self, vars: &UriVars) -> Result<P> {
        let page = self.page::<P>()?;
        Navigator::new(self).load(page.root(), vars)?;
        Ok(page)
    }

    /// Navigate to an untyped page kind
    pub fn visit_kind(&self, kind: &PageKind, vars: &UriVars) -> Result<AnyPage> {
        let page = AnyPage::new(PageHandle::new(self.clone(), kind.clone()));
        Navigator::new(self).visit(&page, vars)?;
        Ok(page)
    }

    /// Page kind the routing table assigns to `url`
    pub fn page_for(&self, url: &str) -> Result<PageKind> {
        self.inner.routes.page_for(&self.normalize(url)).cloned()
    }

    /// Untyped page for the browser's current URL
    pub fn current_page(&self) -> Result<AnyPage> {
        let path = self.current_path()?;
        let kind = self.inner.routes.page_for(&path)?;
        Ok(AnyPage::new(PageHandle::new(self.clone(), kind.clone())))
    }

    /// Release the driver and leave the pool. Calling it again does nothing.
    pub fn quit(&self) -> Result<()> {
        if self.inner.closed.get() {
            return Ok(());
        }
        self.inner.shutdown()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("app_host", &self.inner.app_host.as_ref().map(Url::as_str))
            .field("closed", &self.inner.closed.get())
            .finish()
    }
}
