//! Page transitions: visiting, loading and waiting for redirections

use crate::browser::driver::DriverError;
use crate::browser::session::Session;
use crate::dom::node::Node;
use crate::error::{BrowserError, NavigationFailure, Result};
use crate::page::{AnyPage, PageHandle};
use crate::routing::{PageKind, UriVars};
use crate::wait::WaitError;
use std::time::Duration;

/// How to wait for a redirection
#[derive(Debug, Clone, Copy)]
pub struct RedirectOptions {
    /// Budget for each phase; `None` uses the session's default timeout
    pub timeout: Option<Duration>,
    /// Wait for the destination to pass its load validation too
    pub validate_load: bool,
}

impl Default for RedirectOptions {
    fn default() -> Self {
        Self { timeout: None, validate_load: true }
    }
}

impl RedirectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the per-phase timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builder method: skip load validation of the destination
    pub fn skip_validation(mut self) -> Self {
        self.validate_load = false;
        self
    }
}

/// Drives page transitions for one session
pub struct Navigator<'a> {
    session: &'a Session,
}

impl<'a> Navigator<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Point the browser at `page`, expanded with `vars`.
    ///
    /// Some drivers time out on navigations that did complete; such a timeout is ignored when the
    /// page turns out to be loaded anyway.
    pub fn visit(&self, page: &PageHandle, vars: &UriVars) -> Result<()> {
        let url = self.session.resolve_url(&page.uri(vars))?;
        let driver = self.session.driver()?;
        log::debug!("{} visiting {} at {}", self.session.id(), page.kind(), url);

        match driver.navigate(&url) {
            Ok(()) => Ok(()),
            Err(DriverError::CommandTimeout(message)) => {
                if driver.reports_spurious_load_timeouts() && page.is_loaded(vars)? {
                    log::warn!("ignoring load timeout from {} driver, {} is loaded: {}", driver.name(), page.kind(), message);
                    Ok(())
                } else {
                    Err(BrowserError::PageLoadTimeout { url })
                }
            }
            Err(DriverError::Connection { phase, message }) => Err(BrowserError::from_connection(phase, &message)),
            Err(err) => Err(BrowserError::Driver(err)),
        }
    }

    /// Visit `page` and wait until it is loaded
    pub fn load(&self, page: &PageHandle, vars: &UriVars) -> Result<()> {
        self.visit(page, vars)?;
        page.ensure_loaded(None, vars)
    }

    /// Wait for the browser to leave `from`, then for one of `candidates` to load.
    ///
    /// Each phase gets the full timeout. With no candidates only the first phase runs and the
    /// result is `None`.
    pub fn wait_until_redirection(
        &self,
        from: &PageHandle,
        candidates: &[PageKind],
        options: RedirectOptions,
    ) -> Result<Option<AnyPage>> {
        let left = from.node().poll_while(options.timeout, || from.is_loaded(&UriVars::new()));
        match left {
            Ok(()) => {}
            Err(WaitError::Timeout(timeout)) => {
                log::debug!("{}", timeout);
                return Err(NavigationFailure::StillLoaded { page: from.kind().name().to_string() }.into());
            }
            Err(WaitError::Failed(err)) => return Err(err),
        }

        if candidates.is_empty() {
            log::debug!("left {}, no destination expected", from.kind());
            return Ok(None);
        }

        let mut path = String::new();
        let mut landed = None;
        let arrived = from.node().poll_until(options.timeout, || {
            path = self.session.current_path()?;
            landed = candidates.iter().find(|kind| kind.loads(&path)).cloned();
            Ok(landed.is_some())
        });
        match arrived {
            Ok(()) => {}
            Err(WaitError::Timeout(timeout)) => {
                log::debug!("{}", timeout);
                return Err(NavigationFailure::NoPageMatches { path }.into());
            }
            Err(WaitError::Failed(err)) => return Err(err),
        }

        let Some(kind) = landed else {
            return Err(NavigationFailure::NoPageMatches { path }.into());
        };
        log::debug!("redirected from {} to {} at {}", from.kind(), kind, path);

        let page = AnyPage::new(PageHandle::new(self.session.clone(), kind));
        if options.validate_load {
            page.ensure_loaded(options.timeout, &UriVars::new())?;
        }
        Ok(Some(page))
    }
}
