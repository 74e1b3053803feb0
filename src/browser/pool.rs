//! Registry of live sessions
//!
//! Every [`Session`] registers on creation and deregisters on `quit` or drop. Ids are tracked
//! process-wide; the handles themselves are per thread because a session is driven by exactly one
//! thread.

use crate::browser::session::{Session, SessionId, SessionInner};
use crate::error::Result;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::{LazyLock, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

static REGISTRY: LazyLock<Mutex<IndexMap<SessionId, ThreadId>>> = LazyLock::new(|| Mutex::new(IndexMap::new()));

thread_local! {
    static LIVE: RefCell<Vec<Weak<SessionInner>>> = const { RefCell::new(Vec::new()) };
}

fn registry() -> MutexGuard<'static, IndexMap<SessionId, ThreadId>> {
    REGISTRY.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn register(session: &Rc<SessionInner>) {
    registry().insert(session.id, thread::current().id());
    LIVE.with(|live| {
        let mut live = live.borrow_mut();
        live.retain(|weak| weak.strong_count() > 0);
        live.push(Rc::downgrade(session));
    });
}

pub(crate) fn deregister(id: SessionId) {
    registry().shift_remove(&id);
}

/// Ids of all sessions not yet quit, across threads, in creation order
pub fn active_sessions() -> Vec<SessionId> {
    registry().keys().copied().collect()
}

/// Whether the session is still registered
pub fn is_active(id: SessionId) -> bool {
    registry().contains_key(&id)
}

/// Quit every live session created on the calling thread.
///
/// All sessions are quit even if some fail; the first failure is returned.
pub fn quit_all() -> Result<()> {
    let sessions: Vec<Session> =
        LIVE.with(|live| live.borrow_mut().drain(..).filter_map(|weak| weak.upgrade()).map(Session::from_inner).collect());

    let mut first_error = None;
    for session in sessions {
        if let Err(err) = session.quit() {
            log::warn!("failed to quit {}: {}", session.id(), err);
            first_error.get_or_insert(err);
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
