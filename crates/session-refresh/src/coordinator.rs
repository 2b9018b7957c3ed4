//! Single-flight refresh coordinator
//!
//! Holds the refresh state machine and the waiter queue for one client
//! session. Every caller that needs a new access token calls
//! [`RefreshCoordinator::fresh_token`]; at most one refresh call is in
//! flight at a time and every caller receives that call's outcome.
//!
//! State machine:
//! - Idle → Refreshing: first caller with an expired session. The flip and
//!   the caller's enqueue happen under one lock, before anything awaits, so
//!   no second caller can observe Idle and start its own refresh.
//! - Refreshing → Refreshing: later callers are appended to the queue.
//! - Refreshing → Idle: the refresh settled. The queue is drained in FIFO
//!   order, each waiter receiving the same token or the same error.
//!
//! The refresh itself runs in a spawned task. A caller whose future is
//! dropped mid-wait just loses its place; the cycle still settles for
//! everyone else.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use common::Secret;
use session_auth::{Refresher, SessionCredentials};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::terminator::SessionTerminator;

/// Refresh state of a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

impl RefreshState {
    /// Status label for health/logging.
    pub fn label(&self) -> &'static str {
        match self {
            RefreshState::Idle => "idle",
            RefreshState::Refreshing => "refreshing",
        }
    }
}

type Waiter = oneshot::Sender<Result<Secret<String>>>;

struct Cycle {
    state: RefreshState,
    waiters: VecDeque<Waiter>,
}

struct Inner {
    cycle: Mutex<Cycle>,
    credentials: SessionCredentials,
    refresher: Arc<dyn Refresher>,
    terminator: Arc<dyn SessionTerminator>,
}

/// Coordinates token refreshes for one session.
///
/// Cheap to clone; clones share the same state and queue. Construct one per
/// session and hand clones to everything that sends requests for it.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        credentials: SessionCredentials,
        refresher: Arc<dyn Refresher>,
        terminator: Arc<dyn SessionTerminator>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cycle: Mutex::new(Cycle {
                    state: RefreshState::Idle,
                    waiters: VecDeque::new(),
                }),
                credentials,
                refresher,
                terminator,
            }),
        }
    }

    /// Current refresh state.
    pub fn state(&self) -> RefreshState {
        self.inner.lock_cycle().state
    }

    /// Number of callers waiting on the in-flight refresh.
    pub fn waiting(&self) -> usize {
        self.inner.lock_cycle().waiters.len()
    }

    /// Wait for a new access token.
    ///
    /// Starts a refresh cycle if none is in flight, otherwise joins the
    /// current one. Returns the new access token, or the cycle's refresh
    /// error. On error the stored tokens are already cleared and the
    /// session terminator has run.
    ///
    /// No timeout is applied: a refresh call that never completes holds
    /// every waiter.
    pub async fn fresh_token(&self) -> Result<Secret<String>> {
        let receiver = self.join();
        receiver.await.unwrap_or(Err(Error::RefreshAborted))
    }

    /// Enqueue the caller and start a cycle if idle. Never awaits.
    fn join(&self) -> oneshot::Receiver<Result<Secret<String>>> {
        let (sender, receiver) = oneshot::channel();
        let (start, position) = {
            let mut cycle = self.inner.lock_cycle();
            cycle.waiters.push_back(sender);
            let start = cycle.state == RefreshState::Idle;
            cycle.state = RefreshState::Refreshing;
            (start, cycle.waiters.len())
        };

        if start {
            info!("session expired, starting token refresh");
            tokio::spawn(run_cycle(self.inner.clone()));
        } else {
            debug!(position, "refresh in flight, waiting for result");
            metrics::counter!("session_refresh_waiters_total").increment(1);
        }
        receiver
    }
}

impl Inner {
    fn lock_cycle(&self) -> MutexGuard<'_, Cycle> {
        self.cycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refresh with the stored refresh token and persist the new pair.
    async fn refresh(&self) -> session_auth::Result<Secret<String>> {
        let refresh = self
            .credentials
            .refresh_token()
            .await
            .ok_or(session_auth::Error::MissingRefreshToken)?;

        let response = self.refresher.refresh(refresh.expose()).await?;
        let pair = response.into_pair(&refresh);

        if let Err(e) = self.credentials.store(&pair).await {
            warn!(error = %e, "failed to persist refreshed tokens");
        }
        Ok(pair.access)
    }

    /// Mark the cycle settled and release every waiter, oldest first.
    fn settle(&self, outcome: Result<Secret<String>>) -> usize {
        let waiters = {
            let mut cycle = self.lock_cycle();
            cycle.state = RefreshState::Idle;
            std::mem::take(&mut cycle.waiters)
        };

        let released = waiters.len();
        for waiter in waiters {
            // The caller may have gone away; nothing to deliver to then
            let _ = waiter.send(outcome.clone());
        }
        released
    }
}

/// One refresh cycle, from the refresh call to releasing the queue.
async fn run_cycle(inner: Arc<Inner>) {
    match inner.refresh().await {
        Ok(access) => {
            let released = inner.settle(Ok(access));
            metrics::counter!("session_refresh_cycles_total", "outcome" => "success").increment(1);
            info!(released, "token refresh succeeded");
        }
        Err(e) => {
            let outcome = if e.is_rejection() {
                "rejected"
            } else {
                "failure"
            };
            warn!(error = %e, outcome, "token refresh failed, ending session");
            if let Err(clear_err) = inner.credentials.clear().await {
                warn!(error = %clear_err, "failed to clear stored tokens");
            }
            inner.terminator.terminate().await;
            metrics::counter!("session_terminations_total").increment(1);

            let released = inner.settle(Err(Error::RefreshFailed(e)));
            metrics::counter!("session_refresh_cycles_total", "outcome" => outcome).increment(1);
            info!(released, "rejected waiting requests");
        }
    }
}
