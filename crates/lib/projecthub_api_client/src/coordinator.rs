//! Single-flight token refresh.
//!
//! At most one refresh runs at a time. The first caller to `begin` while no
//! refresh is in flight becomes the leader and performs it; later callers are
//! queued as waiters and receive the leader's outcome. The in-flight flag is
//! cleared when the leader settles or is dropped, so a panicking or cancelled
//! leader rejects its waiters instead of wedging the queue.
//!
//! The last successfully refreshed token is remembered under the same lock.
//! A caller whose rejected token is already superseded gets that token back
//! instead of starting another refresh, even if the flight it raced with
//! settled a moment earlier.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::RefreshError;

/// Outcome handed to every waiter: the new access token or why there is none.
pub type RefreshOutcome = Result<String, RefreshError>;

#[derive(Default)]
struct State {
    refreshing: bool,
    /// Bumped on every settle/reset so a stale leader cannot clear a newer flight.
    generation: u64,
    waiters: VecDeque<oneshot::Sender<RefreshOutcome>>,
    last_token: Option<String>,
}

/// Shared refresh state. Clones share the same queue.
#[derive(Clone, Default)]
pub struct RefreshCoordinator {
    state: Arc<Mutex<State>>,
}

/// What `begin` handed the caller.
pub enum Ticket {
    /// Perform the refresh, then `settle` the guard.
    Leader(LeaderGuard),
    /// Await the leader's outcome.
    Waiter(Waiter),
    /// A refresh already replaced the token the caller sent; use this one.
    Ready(String),
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the in-flight refresh or start a new one. `sent` is the access
    /// token the server just rejected.
    pub fn begin(&self, sent: Option<&str>) -> Ticket {
        let mut state = self.lock();
        if !state.refreshing
            && let Some(last) = &state.last_token
            && Some(last.as_str()) != sent
        {
            debug!("rejected token already superseded");
            return Ticket::Ready(last.clone());
        }
        if state.refreshing {
            state.waiters.retain(|w| !w.is_closed());
            let (tx, rx) = oneshot::channel();
            state.waiters.push_back(tx);
            debug!(waiters = state.waiters.len(), "queued behind in-flight refresh");
            Ticket::Waiter(Waiter { rx })
        } else {
            state.refreshing = true;
            Ticket::Leader(LeaderGuard {
                coordinator: self.clone(),
                generation: state.generation,
                settled: false,
            })
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock().refreshing
    }

    /// Number of queued waiters whose callers are still listening.
    pub fn waiting(&self) -> usize {
        self.lock().waiters.iter().filter(|w| !w.is_closed()).count()
    }

    /// Drop the remembered token, e.g. when the session ends.
    pub fn forget_token(&self) {
        self.lock().last_token = None;
    }

    /// Abandon any in-flight refresh: waiters are rejected with `Aborted`
    /// and the next `begin` starts fresh.
    pub fn reset(&self) {
        let waiters = {
            let mut state = self.lock();
            state.refreshing = false;
            state.generation += 1;
            state.last_token = None;
            std::mem::take(&mut state.waiters)
        };
        for w in waiters {
            let _ = w.send(Err(RefreshError::Aborted));
        }
    }

    fn settle(&self, generation: u64, outcome: RefreshOutcome) {
        let waiters = {
            let mut state = self.lock();
            if state.generation != generation {
                return;
            }
            state.refreshing = false;
            state.generation += 1;
            state.last_token = outcome.as_ref().ok().cloned();
            std::mem::take(&mut state.waiters)
        };
        debug!(
            waiters = waiters.len(),
            ok = outcome.is_ok(),
            "refresh settled"
        );
        for w in waiters {
            // A closed receiver means that caller went away.
            let _ = w.send(outcome.clone());
        }
    }
}

/// Held by the refresh leader. Dropping it unsettled rejects all waiters.
pub struct LeaderGuard {
    coordinator: RefreshCoordinator,
    generation: u64,
    settled: bool,
}

impl LeaderGuard {
    /// Publish the outcome to every waiter and clear the in-flight flag.
    pub fn settle(mut self, outcome: RefreshOutcome) {
        self.settled = true;
        self.coordinator.settle(self.generation, outcome);
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.coordinator
                .settle(self.generation, Err(RefreshError::Aborted));
        }
    }
}

/// A queued caller.
pub struct Waiter {
    rx: oneshot::Receiver<RefreshOutcome>,
}

impl Waiter {
    pub async fn wait(self) -> RefreshOutcome {
        self.rx.await.unwrap_or(Err(RefreshError::Aborted))
    }
}
