// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

/// Connection settings for the identity provider and the banking API.
#[derive(Debug, Clone, clap::Args)]
pub struct ClientConfig {
    /// Identity provider base URL (e.g. `https://sso.example.com`).
    #[arg(long, default_value = "http://127.0.0.1:8080", env = "TELLER_ISSUER")]
    pub issuer: String,

    /// Identity provider realm.
    #[arg(long, default_value = "banking", env = "TELLER_REALM")]
    pub realm: String,

    /// OAuth client ID registered with the identity provider.
    #[arg(long, default_value = "mobile-app", env = "TELLER_CLIENT_ID")]
    pub client_id: String,

    /// OAuth client secret.
    #[arg(long, default_value = "", env = "TELLER_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    /// Scope requested with the password grant.
    #[arg(long, default_value = "openid", env = "TELLER_SCOPE")]
    pub scope: String,

    /// Banking API base URL, including the version prefix.
    #[arg(long, default_value = "http://127.0.0.1:8000/api/v1", env = "TELLER_API_BASE")]
    pub api_base: String,

    /// Default request timeout in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "TELLER_TIMEOUT_MS")]
    pub timeout_ms: u64,

    /// Timeout in milliseconds for uploads and other long transfers.
    #[arg(long, default_value_t = 30_000, env = "TELLER_UPLOAD_TIMEOUT_MS")]
    pub upload_timeout_ms: u64,

    /// Where the access/refresh token pair is persisted.
    #[arg(long, env = "TELLER_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,
}

impl ClientConfig {
    /// Token endpoint: `{issuer}/realms/{realm}/protocol/openid-connect/token`.
    pub fn token_url(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.issuer.trim_end_matches('/'),
            self.realm
        )
    }

    /// API base without a trailing slash.
    pub fn api_base(&self) -> &str {
        self.api_base.trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }

    /// Resolve the token file, falling back to the state directory.
    pub fn token_file(&self) -> PathBuf {
        self.token_file.clone().unwrap_or_else(|| state_dir().join("tokens.json"))
    }
}

/// Resolve the state directory for persisted client data.
///
/// Checks `TELLER_STATE_DIR`, then `$XDG_STATE_HOME/teller`,
/// then `$HOME/.local/state/teller`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TELLER_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("teller");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/teller");
    }
    PathBuf::from(".teller")
}

/// Command-line client for the banking API.
#[derive(Debug, Parser)]
#[command(name = "teller", version, about)]
pub struct Cli {
    /// Log filter (tracing `EnvFilter` syntax).
    #[arg(long, global = true, default_value = "info", env = "TELLER_LOG")]
    pub log_level: String,

    /// Log output format: `text` or `json`.
    #[arg(long, global = true, default_value = "text", env = "TELLER_LOG_FORMAT")]
    pub log_format: String,

    #[command(flatten)]
    pub client: ClientConfig,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Sign in with username and password and persist the token pair.
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "TELLER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored tokens.
    Logout,
    /// Show whether a session is stored and when the access token expires.
    Status,
    /// GET an API path and print the envelope `result`.
    Get { path: String },
    /// POST JSON to an API path and print the envelope `result`.
    Post {
        path: String,
        /// JSON request body.
        #[arg(long)]
        data: Option<String>,
    },
    /// Create a customer account from a JSON profile file.
    Register { profile: PathBuf },
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
