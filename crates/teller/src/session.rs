// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Application-level authentication state.
//!
//! [`SessionController`] is the only writer of [`SessionState`]. The routing
//! layer reads it through [`SessionController::subscribe`] to choose between
//! the signed-in and signed-out flows.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::events::{LogoutReason, SessionEvent, SessionEvents};
use crate::identity::IdentityClient;
use crate::refresh::RefreshCoordinator;
use crate::token::TokenStore;

/// Message shown after a forced logout.
pub const SESSION_EXPIRED_MESSAGE: &str = "session expired, please sign in again";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub is_authenticated: bool,
    pub loading: bool,
    pub error: Option<String>,
}

impl SessionState {
    fn authenticated() -> Self {
        Self { is_authenticated: true, loading: false, error: None }
    }

    fn unauthenticated(error: Option<String>) -> Self {
        Self { is_authenticated: false, loading: false, error }
    }
}

pub struct SessionController {
    identity: Arc<IdentityClient>,
    coordinator: Arc<RefreshCoordinator>,
    store: Arc<TokenStore>,
    events: SessionEvents,
    state: watch::Sender<SessionState>,
}

impl SessionController {
    pub fn new(
        identity: Arc<IdentityClient>,
        coordinator: Arc<RefreshCoordinator>,
        store: Arc<TokenStore>,
        events: SessionEvents,
    ) -> Self {
        let (state, _rx) = watch::channel(SessionState::default());
        Self { identity, coordinator, store, events, state }
    }

    /// Current state snapshot.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn set(&self, next: SessionState) -> SessionState {
        self.state.send_replace(next.clone());
        next
    }

    fn set_loading(&self) {
        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });
    }

    /// Decide whether the stored tokens still constitute a session.
    ///
    /// Run at startup and whenever the app returns to the foreground. An
    /// expired (or undecodable) access token is refreshed pre-emptively.
    pub async fn check_auth_state(&self) -> SessionState {
        self.set_loading();
        let Some(access) = self.store.access() else {
            debug!("no stored access token");
            return self.set(SessionState::unauthenticated(None));
        };
        if !self.store.is_expired(&access) {
            return self.set(SessionState::authenticated());
        }

        debug!("stored access token expired, refreshing");
        match self.refresh_token().await {
            Ok(_) => self.set(SessionState::authenticated()),
            Err(e) => self.set(SessionState::unauthenticated(Some(e.to_string()))),
        }
    }

    /// Sign in with username and password.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        self.set_loading();
        match self.identity.password_grant(username, password).await {
            Ok(pair) => {
                self.store.save(pair);
                self.set(SessionState::authenticated());
                self.events.publish(SessionEvent::LoggedIn);
                Ok(())
            }
            Err(e) => {
                info!(username, err = %e, "login failed");
                self.set(SessionState::unauthenticated(Some(e.to_string())));
                Err(e)
            }
        }
    }

    /// Sign out. The state ends unauthenticated regardless of storage errors.
    pub fn logout(&self) {
        self.identity.logout(LogoutReason::UserInitiated);
        self.set(SessionState::unauthenticated(None));
    }

    /// Refresh the access token through the shared single flight.
    pub async fn refresh_token(&self) -> Result<String, ApiError> {
        self.coordinator.refresh().await
    }

    /// Apply a lifecycle event published elsewhere (e.g. a forced logout
    /// from the refresh coordinator).
    pub fn apply(&self, event: &SessionEvent) {
        let next = match event {
            SessionEvent::LoggedIn | SessionEvent::Refreshed => SessionState::authenticated(),
            SessionEvent::LoggedOut { reason: LogoutReason::UserInitiated } => {
                SessionState::unauthenticated(None)
            }
            SessionEvent::LoggedOut { reason: LogoutReason::SessionExpired } => {
                SessionState::unauthenticated(Some(SESSION_EXPIRED_MESSAGE.to_owned()))
            }
        };
        self.set(next);
    }

    /// Follow session events until `shutdown` fires or the hub is dropped.
    pub fn spawn_listener(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let mut rx = self.events.subscribe();
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = rx.recv() => match event {
                        Ok(e) => controller.apply(&e),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            debug!(skipped = n, "session listener lagged");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
