// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight access-token refresh.
//!
//! The first caller to need a new token becomes the leader and runs the
//! refresh-token exchange. Callers arriving while that exchange is in flight
//! are queued and settled, in arrival order, with the leader's outcome. The
//! in-flight flag and the queue are released together by a drop guard, so
//! a failed, panicking, or cancelled leader never strands the queue.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::events::{LogoutReason, SessionEvent, SessionEvents};
use crate::identity::IdentityClient;
use crate::token::TokenStore;

type Waiter = oneshot::Sender<Result<String, ApiError>>;

#[derive(Default)]
struct FlightState {
    refreshing: bool,
    queue: VecDeque<Waiter>,
    exchanges: u64,
}

/// Owner of the refresh-in-flight flag and the pending-request queue.
pub struct RefreshCoordinator {
    identity: Arc<IdentityClient>,
    store: Arc<TokenStore>,
    events: SessionEvents,
    state: Mutex<FlightState>,
}

impl RefreshCoordinator {
    pub fn new(
        identity: Arc<IdentityClient>,
        store: Arc<TokenStore>,
        events: SessionEvents,
    ) -> Self {
        Self { identity, store, events, state: Mutex::new(FlightState::default()) }
    }

    /// Obtain a fresh access token, sharing any exchange already in flight.
    ///
    /// On failure the session has been terminated (tokens cleared,
    /// `LoggedOut { SessionExpired }` published) before this returns, unless
    /// it was already replaced by a logout or a new login. A result that
    /// arrives after such a change is discarded as [`ApiError::Cancelled`].
    pub async fn refresh(&self) -> Result<String, ApiError> {
        let waiter = {
            let mut state = self.state.lock();
            if state.refreshing {
                let (tx, rx) = oneshot::channel();
                state.queue.push_back(tx);
                debug!(queued = state.queue.len(), "refresh in flight, waiting");
                Some(rx)
            } else {
                state.refreshing = true;
                state.exchanges += 1;
                None
            }
        };

        if let Some(rx) = waiter {
            return rx.await.unwrap_or(Err(ApiError::Cancelled));
        }

        let flight = Flight { coordinator: self, outcome: None };
        let outcome = self.exchange().await;
        flight.complete(outcome.clone());
        outcome
    }

    /// Recover from a 401 on a request that carried `rejected` (or no token).
    ///
    /// If the stored access token already differs from the rejected one, a
    /// refresh settled after the request went out; reuse its token instead
    /// of starting another exchange.
    pub async fn recover(&self, rejected: Option<&str>) -> Result<String, ApiError> {
        if let Some(current) = self.store.access() {
            if rejected != Some(current.as_str()) {
                debug!("token changed since request was sent, replaying");
                return Ok(current);
            }
        }
        self.refresh().await
    }

    /// Terminate the session after an unrecoverable authentication failure.
    pub fn force_logout(&self) {
        warn!("authentication could not be recovered, ending session");
        self.identity.logout(LogoutReason::SessionExpired);
    }

    pub fn is_refreshing(&self) -> bool {
        self.state.lock().refreshing
    }

    /// Callers currently waiting on the in-flight exchange.
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Exchanges started since construction.
    pub fn exchanges(&self) -> u64 {
        self.state.lock().exchanges
    }

    /// Run one exchange and apply its outcome to the session it started
    /// from. Failures end that session before returning.
    async fn exchange(&self) -> Result<String, ApiError> {
        let Some(refresh_token) = self.store.refresh() else {
            warn!("no refresh token stored");
            self.force_logout();
            return Err(ApiError::RefreshFailed("no refresh token".to_owned()));
        };

        match self.identity.refresh_grant(&refresh_token).await {
            Ok(pair) => {
                let access = pair.access_token.clone();
                if !self.store.replace_if(&refresh_token, pair) {
                    info!("session changed during refresh, discarding new tokens");
                    return Err(ApiError::Cancelled);
                }
                info!("access token refreshed");
                self.events.publish(SessionEvent::Refreshed);
                Ok(access)
            }
            Err(e) => {
                warn!(err = %e, "refresh exchange failed");
                if self.store.clear_if(&refresh_token) {
                    self.force_logout();
                } else {
                    debug!("session changed during refresh, leaving it in place");
                }
                Err(e)
            }
        }
    }
}

/// Leader's hold on the in-flight flag.
///
/// Dropping it (normally via [`Flight::complete`]) clears the flag and
/// settles every queued waiter in one critical section.
struct Flight<'a> {
    coordinator: &'a RefreshCoordinator,
    outcome: Option<Result<String, ApiError>>,
}

impl Flight<'_> {
    fn complete(mut self, outcome: Result<String, ApiError>) {
        self.outcome = Some(outcome);
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        let waiters = {
            let mut state = self.coordinator.state.lock();
            state.refreshing = false;
            std::mem::take(&mut state.queue)
        };
        let outcome = self.outcome.take().unwrap_or(Err(ApiError::Cancelled));
        if !waiters.is_empty() {
            debug!(waiters = waiters.len(), ok = outcome.is_ok(), "settling queued callers");
        }
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
