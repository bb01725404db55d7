//! Single-flight refresh of the access token.
//!
//! The first request rejected with 401 while the coordinator is idle becomes the
//! leader: it flips the state to `Refreshing` and performs the one refresh call.
//! Every request rejected while that call is in flight is parked in a FIFO queue
//! and resumed (or failed) with the leader's outcome.
//!
//! State and queue live behind a blocking mutex that is never held across an
//! `.await`; each transition (persist or clear, drain, reset to idle) completes
//! under one lock acquisition.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::observability::metrics::get_metrics;
use crate::refresh::endpoint::{RefreshEndpoint, TokenPair};
use crate::refresh::error::RefreshError;
use crate::store::credential_store::CredentialStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

/// A request suspended until the in-flight refresh settles.
#[derive(Debug)]
pub struct PendingRequest {
    resume: oneshot::Sender<Result<String, RefreshError>>,
}

impl PendingRequest {
    fn new() -> (Self, oneshot::Receiver<Result<String, RefreshError>>) {
        let (resume, rx) = oneshot::channel();
        (Self { resume }, rx)
    }

    fn deliver(self, outcome: Result<String, RefreshError>) {
        // the waiting caller may have gone away; nothing to resume then
        let _ = self.resume.send(outcome);
    }
}

struct Inner {
    state: RefreshState,
    queue: VecDeque<PendingRequest>,
}

enum Role {
    Leader { refresh_token: String },
    Follower(oneshot::Receiver<Result<String, RefreshError>>),
    Settled(Result<String, RefreshError>),
}

pub struct RefreshCoordinator<R> {
    endpoint: R,
    store: CredentialStore,
    inner: Mutex<Inner>,
}

impl<R: RefreshEndpoint> RefreshCoordinator<R> {
    pub fn new(endpoint: R, store: CredentialStore) -> Self {
        Self {
            endpoint,
            store,
            inner: Mutex::new(Inner {
                state: RefreshState::Idle,
                queue: VecDeque::new(),
            }),
        }
    }

    pub fn state(&self) -> RefreshState {
        self.inner.lock().state
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Called when a request sent with `rejected_access` came back 401.
    ///
    /// Resolves to the access token to replay with, or to the error every
    /// request blocked by this refresh fails with.
    pub async fn on_unauthorized(&self, rejected_access: &str) -> Result<String, RefreshError> {
        let metrics = get_metrics().await;
        match self.enter(rejected_access) {
            Role::Settled(outcome) => {
                if let Err(err) = &outcome {
                    metrics.refresh_failures.with_label_values(&[err.reason()]).inc();
                    metrics.session_clears.inc();
                }
                outcome
            }
            Role::Follower(rx) => {
                metrics.pending_requests.inc();
                let outcome = rx.await.unwrap_or(Err(RefreshError::Abandoned));
                metrics.pending_requests.dec();
                outcome
            }
            Role::Leader { refresh_token } => {
                metrics.refresh_attempts.inc();
                let outcome = self.lead(&refresh_token).await;
                if let Err(err) = &outcome {
                    metrics.refresh_failures.with_label_values(&[err.reason()]).inc();
                    metrics.session_clears.inc();
                }
                outcome
            }
        }
    }

    fn enter(&self, rejected_access: &str) -> Role {
        let mut inner = self.inner.lock();
        match inner.state {
            RefreshState::Refreshing => {
                let (pending, rx) = PendingRequest::new();
                inner.queue.push_back(pending);
                debug!("refresh in flight, request queued at position {}", inner.queue.len());
                Role::Follower(rx)
            }
            RefreshState::Idle => {
                let current = self.store.get_access();
                if !current.is_empty() && current != rejected_access {
                    debug!("access token already rotated, replaying without refresh");
                    return Role::Settled(Ok(current));
                }

                let refresh_token = self.store.get_refresh();
                if refresh_token.is_empty() {
                    warn!("401 without a stored refresh token, clearing session");
                    self.store.clear();
                    return Role::Settled(Err(RefreshError::MissingRefreshToken));
                }

                inner.state = RefreshState::Refreshing;
                info!("access token rejected, refreshing");
                Role::Leader { refresh_token }
            }
        }
    }

    async fn lead(&self, refresh_token: &str) -> Result<String, RefreshError> {
        let mut flight = InFlight {
            coordinator: self,
            settled: false,
        };
        let outcome = self.endpoint.refresh(refresh_token).await;
        flight.settled = true;
        self.settle(outcome, refresh_token)
    }

    /// Runs the store write under the coordinator lock. With a file medium that
    /// is blocking I/O, so concurrent `enter` calls wait on this thread until it ends.
    fn settle(
        &self,
        outcome: Result<TokenPair, RefreshError>,
        prior_refresh: &str,
    ) -> Result<String, RefreshError> {
        let mut inner = self.inner.lock();
        let delivered = match outcome {
            Ok(pair) => {
                let refresh_token = pair.refresh_token.as_deref().unwrap_or(prior_refresh);
                self.store.set(&pair.access_token, refresh_token);
                Ok(pair.access_token)
            }
            Err(err) => {
                error!("refresh failed, clearing session: {}", err);
                self.store.clear();
                Err(err)
            }
        };

        let drained = inner.queue.len();
        for pending in inner.queue.drain(..) {
            pending.deliver(delivered.clone());
        }
        inner.state = RefreshState::Idle;
        info!("refresh settled, {} queued request(s) released", drained);
        delivered
    }

    /// The leader went away mid-refresh: release the queue without touching the session.
    fn abandon(&self) {
        let mut inner = self.inner.lock();
        warn!("refresh abandoned, failing {} queued request(s)", inner.queue.len());
        for pending in inner.queue.drain(..) {
            pending.deliver(Err(RefreshError::Abandoned));
        }
        inner.state = RefreshState::Idle;
    }
}

/// Resets the coordinator if the leader's future is dropped before the refresh settles.
struct InFlight<'a, R: RefreshEndpoint> {
    coordinator: &'a RefreshCoordinator<R>,
    settled: bool,
}

impl<R: RefreshEndpoint> Drop for InFlight<'_, R> {
    fn drop(&mut self) {
        if !self.settled {
            self.coordinator.abandon();
        }
    }
}
