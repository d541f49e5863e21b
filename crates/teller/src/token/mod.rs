// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token storage: the access/refresh pair and its persistence.
//!
//! The pair is held in memory behind a lock and written through to a
//! [`KeyValueStore`]. Readers always see both tokens from the same grant or
//! neither.

pub mod claims;
pub mod persist;

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

pub use persist::{FileStore, KeyValueStore, MemoryStore};

/// Storage key for the access token.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
/// Storage key for the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Bearer tokens issued together by one grant.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self { access_token: access_token.into(), refresh_token: refresh_token.into() }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// The process-wide token store.
pub struct TokenStore {
    pair: RwLock<Option<TokenPair>>,
    backend: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    /// Open the store, loading any pair already persisted in `backend`.
    ///
    /// A read failure or a half-present pair is logged and treated as no
    /// session.
    pub fn open(backend: Arc<dyn KeyValueStore>) -> Self {
        let pair = match (backend.get(ACCESS_TOKEN_KEY), backend.get(REFRESH_TOKEN_KEY)) {
            (Ok(Some(access)), Ok(Some(refresh))) => Some(TokenPair::new(access, refresh)),
            (Ok(None), Ok(None)) => None,
            (Ok(_), Ok(_)) => {
                tracing::warn!("persisted token pair is incomplete, ignoring");
                None
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(err = %e, "failed to load persisted tokens");
                None
            }
        };
        tracing::debug!(present = pair.is_some(), "token store opened");
        Self { pair: RwLock::new(pair), backend }
    }

    /// A store backed by process memory only.
    pub fn in_memory() -> Self {
        Self::open(Arc::new(MemoryStore::new()))
    }

    /// Replace both tokens.
    ///
    /// Persistence errors are logged, not returned: the in-memory pair is
    /// still updated and the next successful grant rewrites the backend.
    pub fn save(&self, pair: TokenPair) {
        let mut guard = self.pair.write();
        self.persist(&pair);
        *guard = Some(pair);
    }

    /// Replace the pair only while the stored refresh token is still
    /// `expected_refresh`. Returns whether the swap happened.
    pub fn replace_if(&self, expected_refresh: &str, pair: TokenPair) -> bool {
        let mut guard = self.pair.write();
        if !holds_refresh(&guard, expected_refresh) {
            return false;
        }
        self.persist(&pair);
        *guard = Some(pair);
        true
    }

    /// Remove both tokens.
    pub fn clear(&self) {
        let mut guard = self.pair.write();
        *guard = None;
        self.unpersist();
    }

    /// Remove both tokens only while the stored refresh token is still
    /// `expected_refresh`. Returns whether anything was removed.
    pub fn clear_if(&self, expected_refresh: &str) -> bool {
        let mut guard = self.pair.write();
        if !holds_refresh(&guard, expected_refresh) {
            return false;
        }
        *guard = None;
        self.unpersist();
        true
    }

    fn persist(&self, pair: &TokenPair) {
        if let Err(e) = self.backend.set_many(&[
            (ACCESS_TOKEN_KEY, pair.access_token.as_str()),
            (REFRESH_TOKEN_KEY, pair.refresh_token.as_str()),
        ]) {
            tracing::warn!(err = %e, "failed to persist tokens");
        }
    }

    fn unpersist(&self) {
        if let Err(e) = self.backend.remove_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY]) {
            tracing::warn!(err = %e, "failed to remove persisted tokens");
        }
    }

    pub fn access(&self) -> Option<String> {
        self.pair.read().as_ref().map(|p| p.access_token.clone())
    }

    pub fn refresh(&self) -> Option<String> {
        self.pair.read().as_ref().map(|p| p.refresh_token.clone())
    }

    pub fn pair(&self) -> Option<TokenPair> {
        self.pair.read().clone()
    }

    /// Fail-closed expiry check; see [`claims::is_expired`].
    pub fn is_expired(&self, token: &str) -> bool {
        claims::is_expired(token)
    }
}

fn holds_refresh(pair: &Option<TokenPair>, refresh: &str) -> bool {
    pair.as_ref().is_some_and(|p| p.refresh_token == refresh)
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore").field("present", &self.pair.read().is_some()).finish()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
