//! # browser-pages
//!
//! A page-object-model layer for browser automation over the Chrome DevTools Protocol (CDP).
//!
//! ## Features
//!
//! - **Page Objects**: Declare pages with a URL template and a load-validation predicate
//! - **Lazy Elements**: Element handles re-resolve against the live DOM on every access
//! - **Routing**: Map observed URLs back to the declared page, first registered match wins
//! - **Navigation**: Visit, load and wait for redirections with typed failures
//! - **Deterministic Waits**: Blocking poll loops with explicit deadlines
//!
//! ## Declaring Pages
//!
//! ```rust,no_run
//! use browser_pages::{Config, ElementHandle, Node, Page, PageHandle, Result, RoutingTable, Session, UriVars};
//!
//! struct LoginPage {
//!     root: PageHandle,
//! }
//!
//! impl LoginPage {
//!     fn email(&self) -> ElementHandle {
//!         self.element("input[name=\"email\"]")
//!     }
//!
//!     fn submit(&self) -> ElementHandle {
//!         self.element("button[type=\"submit\"]")
//!     }
//! }
//!
//! impl Page for LoginPage {
//!     const URL_TEMPLATE: &'static str = "/login";
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
//!         self.submit().exists()
//!     }
//! }
//!
//! struct Dashboard {
//!     root: PageHandle,
//! }
//!
//! impl Page for Dashboard {
//!     const URL_TEMPLATE: &'static str = "/dashboard";
//!
//!     fn from_root(root: PageHandle) -> Self {
//!         Self { root }
//!     }
//!
//!     fn root(&self) -> &PageHandle {
//!         &self.root
//!     }
//! }
//!
//! # fn main() -> browser_pages::Result<()> {
//! let routes = RoutingTable::new().with::<LoginPage>()?.with::<Dashboard>()?;
//! let session = Session::new(Config::new().app_host("http://localhost:3000"), routes)?;
//!
//! let login: LoginPage = session.load(&UriVars::new())?;
//! login.email().set("me@example.com")?;
//! login.submit().click()?;
//!
//! let dashboard: Dashboard = login.redirect_to(None)?;
//! assert!(dashboard.is_loaded()?);
//! session.quit()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing Without a Browser
//!
//! [`StubDriver`] keeps an in-memory document and implements the same [`Driver`] trait as
//! [`ChromeDriver`]:
//!
//! ```rust
//! use browser_pages::{Config, Node, RoutingTable, Session, StubDriver, StubNode};
//! use browser_pages::routing::{PageKind, UrlTemplate};
//! use browser_pages::page::PageHandle;
//!
//! # fn main() -> browser_pages::Result<()> {
//! let stub = StubDriver::new();
//! stub.append(None, StubNode::new("h1").text("Welcome"));
//!
//! let session = Session::with_driver(Config::new(), RoutingTable::new(), stub.clone())?;
//! let page = PageHandle::new(session, PageKind::new("Home", UrlTemplate::parse("/")?));
//! assert_eq!(page.element("h1").text()?, "Welcome");
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`page`]: Page objects, load checks and navigation
//! - [`dom`]: Lazy node handles, elements, collections and locators
//! - [`routing`]: URL templates and the routing table
//! - [`browser`]: Sessions, configuration and the driver boundary
//! - [`wait`]: The polling wait primitive
//! - [`error`]: Error types and result aliases

pub mod browser;
pub mod dom;
pub mod error;
pub mod page;
pub mod routing;
pub mod wait;

pub use browser::{
    ChromeConnector, ChromeDriver, Config, ConnectionOptions, Connector, Driver, DriverError, LaunchOptions, NodeRef,
    Session, SessionId, StubDriver, StubNode,
};
pub use dom::{DragAndDrop, Element, ElementCollection, ElementHandle, ElementKind, Locator, Node, NodeHandle, Point, Rect, Size};
pub use error::{BrowserError, NavigationFailure, Result};
pub use page::{AnyPage, LoadCheck, Navigator, Page, PageHandle, RedirectOptions};
pub use routing::{PageKind, RoutingTable, UriVars, UrlTemplate, VarCodec};
pub use wait::{WaitError, Waiter};
