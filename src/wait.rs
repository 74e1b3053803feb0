//! Polling wait primitive
//!
//! Every "is this true yet" check in the crate goes through [`Waiter`]. A wait evaluates its
//! predicate immediately, then once per poll interval until the predicate reaches the desired
//! value or the deadline passes. Waits block the calling thread; nothing else suspends.
//!
//! A predicate may not start another wait on the node it is polling. The waiter keeps a stack of
//! the nodes currently being waited on and rejects such a nested wait with
//! [`BrowserError::NestedWait`] instead of corrupting the outer deadline.

use crate::error::{BrowserError, Result};
use std::cell::RefCell;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default polling interval (100ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Which predicate value ends a wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// Wait until the predicate holds
    Until,
    /// Wait while the predicate holds
    While,
}

impl WaitMode {
    fn satisfied_by(self, observed: bool) -> bool {
        match self {
            WaitMode::Until => observed,
            WaitMode::While => !observed,
        }
    }
}

impl fmt::Display for WaitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitMode::Until => write!(f, "until"),
            WaitMode::While => write!(f, "while"),
        }
    }
}

/// A wait ran out of time.
///
/// Internal signal: public operations turn it into a boolean or a typed [`BrowserError`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("timed out after {timeout:?} waiting {mode} on {node} ({attempts} checks, last observed {last_observed})")]
pub struct ExplicitTimeout {
    /// Key of the node that was polled
    pub node: String,
    pub mode: WaitMode,
    pub timeout: Duration,
    /// Number of predicate evaluations
    pub attempts: u32,
    /// Predicate value at the final check
    pub last_observed: bool,
}

/// Outcome of a failed wait
#[derive(Debug, Error)]
pub enum WaitError {
    #[error(transparent)]
    Timeout(ExplicitTimeout),

    /// The predicate itself failed, or the wait was nested
    #[error(transparent)]
    Failed(#[from] BrowserError),
}

/// Map a wait outcome to `Ok(true)` on success and `Ok(false)` on timeout
pub fn succeeded(outcome: std::result::Result<(), WaitError>) -> Result<bool> {
    match outcome {
        Ok(()) => Ok(true),
        Err(WaitError::Timeout(timeout)) => {
            log::debug!("{}", timeout);
            Ok(false)
        }
        Err(WaitError::Failed(err)) => Err(err),
    }
}

/// Blocking poller shared by all nodes of one session
#[derive(Debug)]
pub struct Waiter {
    poll_interval: Duration,
    active: RefCell<Vec<String>>,
}

/// Pops the node key pushed by a running wait, including on early return
struct ActiveWait<'a> {
    waiter: &'a Waiter,
}

impl Drop for ActiveWait<'_> {
    fn drop(&mut self) {
        self.waiter.active.borrow_mut().pop();
    }
}

impl Default for Waiter {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS))
    }
}

impl Waiter {
    /// Create a waiter polling at the given interval
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval, active: RefCell::new(Vec::new()) }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Whether a wait on `node` is currently running
    pub fn is_waiting_on(&self, node: &str) -> bool {
        self.active.borrow().iter().any(|key| key == node)
    }

    /// Block until `predicate` returns true or `timeout` elapses
    pub fn poll_until<F>(&self, node: &str, timeout: Duration, predicate: F) -> std::result::Result<(), WaitError>
    where
        F: FnMut() -> Result<bool>,
    {
        self.poll(node, WaitMode::Until, timeout, predicate)
    }

    /// Block while `predicate` returns true, until `timeout` elapses
    pub fn poll_while<F>(&self, node: &str, timeout: Duration, predicate: F) -> std::result::Result<(), WaitError>
    where
        F: FnMut() -> Result<bool>,
    {
        self.poll(node, WaitMode::While, timeout, predicate)
    }

    fn poll<F>(&self, node: &str, mode: WaitMode, timeout: Duration, mut predicate: F) -> std::result::Result<(), WaitError>
    where
        F: FnMut() -> Result<bool>,
    {
        let _guard = self.enter(node)?;
        // A timeout past the clock's range never expires
        let deadline = Instant::now().checked_add(timeout);
        let mut attempts = 0;

        loop {
            let observed = predicate()?;
            attempts += 1;
            log::trace!("wait {} on {}: attempt {} observed {}", mode, node, attempts, observed);

            if mode.satisfied_by(observed) {
                return Ok(());
            }

            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(WaitError::Timeout(ExplicitTimeout {
                            node: node.to_string(),
                            mode,
                            timeout,
                            attempts,
                            last_observed: observed,
                        }));
                    }
                    self.poll_interval.min(deadline - now)
                }
                None => self.poll_interval,
            };

            thread::sleep(pause);
        }
    }

    fn enter(&self, node: &str) -> Result<ActiveWait<'_>> {
        if self.is_waiting_on(node) {
            return Err(BrowserError::NestedWait { node: node.to_string() });
        }
        self.active.borrow_mut().push(node.to_string());
        Ok(ActiveWait { waiter: self })
    }
}
