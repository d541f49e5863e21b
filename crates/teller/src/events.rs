// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle events.
//!
//! The identity client and refresh coordinator publish here; the session
//! controller (and anything else that cares, e.g. a UI router) subscribes.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
    /// The user asked to sign out.
    UserInitiated,
    /// Tokens could not be renewed; the user must sign in again.
    SessionExpired,
}

/// Events emitted over the lifetime of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A password grant succeeded and tokens were stored.
    LoggedIn,
    /// A refresh-token exchange succeeded and tokens were replaced.
    Refreshed,
    /// Stored tokens were cleared.
    LoggedOut { reason: LogoutReason },
}

/// Broadcast hub for [`SessionEvent`]s.
#[derive(Debug, Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: SessionEvent) {
        tracing::debug!(?event, subscribers = self.tx.receiver_count(), "session event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new(64)
    }
}
