// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Teller: banking API client with transparent access-token refresh.

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod refresh;
pub mod session;
pub mod token;


use std::sync::{Arc, Once};
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::{ApiClient, ApiRequest};
use crate::config::{Cli, ClientConfig, Command};
use crate::events::SessionEvents;
use crate::identity::{IdentityClient, Registration};
use crate::refresh::RefreshCoordinator;
use crate::session::SessionController;
use crate::token::{claims, FileStore, KeyValueStore, TokenStore};

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Safe to call multiple times; only the first call has effect.
pub fn ensure_crypto_provider() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Shared `reqwest` client construction.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    ensure_crypto_provider();
    reqwest::Client::builder().timeout(timeout).build().unwrap_or_default()
}

/// Fully wired client: token store, identity client, refresh coordinator,
/// API client, and session controller sharing one event hub.
pub struct Teller {
    pub store: Arc<TokenStore>,
    pub events: SessionEvents,
    pub identity: Arc<IdentityClient>,
    pub coordinator: Arc<RefreshCoordinator>,
    pub api: ApiClient,
    pub session: Arc<SessionController>,
    shutdown: CancellationToken,
}

impl Teller {
    /// Wire all components over `backend` and start the session listener.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn connect(config: &ClientConfig, backend: Arc<dyn KeyValueStore>) -> Self {
        let store = Arc::new(TokenStore::open(backend));
        let events = SessionEvents::default();
        let identity = Arc::new(IdentityClient::new(config, Arc::clone(&store), events.clone()));
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::clone(&identity),
            Arc::clone(&store),
            events.clone(),
        ));
        let api = ApiClient::new(config, Arc::clone(&store), Arc::clone(&coordinator));
        let session = Arc::new(SessionController::new(
            Arc::clone(&identity),
            Arc::clone(&coordinator),
            Arc::clone(&store),
            events.clone(),
        ));
        let shutdown = CancellationToken::new();
        session.spawn_listener(shutdown.clone());
        Self { store, events, identity, coordinator, api, session, shutdown }
    }

    /// Stop the session listener.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for Teller {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Execute one CLI command.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let token_file = cli.client.token_file();
    let teller = Teller::connect(&cli.client, Arc::new(FileStore::new(&token_file)));

    match cli.command {
        Command::Login { username, password } => {
            teller.session.login(&username, &password).await?;
            info!(file = %token_file.display(), "session stored");
            println!("logged in as {username}");
        }
        Command::Logout => {
            teller.session.logout();
            println!("logged out");
        }
        Command::Status => {
            let state = teller.session.check_auth_state().await;
            let expires = teller
                .store
                .access()
                .and_then(|t| claims::expires_at(&t))
                .and_then(|at| at.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs());
            let status = serde_json::json!({
                "authenticated": state.is_authenticated,
                "error": state.error,
                "access_expires_at": expires,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Get { path } => {
            let result: serde_json::Value = teller.api.get_json(&path).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Post { path, data } => {
            let mut req = ApiRequest::post(&path);
            if let Some(data) = data {
                let body: serde_json::Value =
                    serde_json::from_str(&data).context("--data is not valid JSON")?;
                req = req.json(body);
            }
            let result: serde_json::Value = teller.api.send(req).await?.result()?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Register { profile } => {
            let contents = std::fs::read_to_string(&profile)
                .with_context(|| format!("read {}", profile.display()))?;
            let registration: Registration =
                serde_json::from_str(&contents).context("parse registration profile")?;
            if teller.identity.register(&registration).await? {
                println!("registered {}", registration.username);
            } else {
                anyhow::bail!("registration was refused");
            }
        }
    }

    teller.shutdown();
    Ok(())
}
