//! Browser sessions and the driver boundary
//!
//! A [`Session`] owns one driver, created lazily through a [`Connector`]. [`ChromeConnector`]
//! launches (or connects to) Chrome; [`StubDriver`] keeps an in-memory document for tests.

pub mod chrome;
pub mod config;
pub mod driver;
pub mod pool;
pub mod session;
pub mod stub;

pub use chrome::{ChromeConnector, ChromeDriver};
pub use config::{Config, ConnectionOptions, LaunchOptions};
pub use driver::{Connector, Driver, DriverError, NodeRef, PointerAction};
pub use session::{Session, SessionId};
pub use stub::{StubDriver, StubNode};
