// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Smoke tests that run the real `teller` binary against the mock backend.

use std::path::Path;
use std::process::Output;

use tokio::process::Command;

use teller_specs::{teller_binary, MockBackend, PASSWORD, REALM, USERNAME};

async fn teller(backend: &MockBackend, token_file: &Path, args: &[&str]) -> anyhow::Result<Output> {
    let binary = teller_binary();
    anyhow::ensure!(binary.exists(), "teller binary not found at {}", binary.display());

    let output = Command::new(&binary)
        .args(["--log-level", "warn", "--log-format", "json"])
        .args(args)
        .env("TELLER_ISSUER", format!("http://{}", backend.addr()))
        .env("TELLER_REALM", REALM)
        .env("TELLER_API_BASE", format!("http://{}/api/v1", backend.addr()))
        .env("TELLER_TOKEN_FILE", token_file)
        .env_remove("TELLER_PASSWORD")
        .output()
        .await?;
    Ok(output)
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[tokio::test]
async fn login_status_get_logout() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let dir = tempfile::tempdir()?;
    let tokens = dir.path().join("tokens.json");

    let out = teller(&backend, &tokens, &["login", "--username", USERNAME, "--password", PASSWORD])
        .await?;
    assert!(out.status.success(), "login failed: {}", String::from_utf8_lossy(&out.stderr));
    assert!(stdout(&out).contains(USERNAME));
    assert!(tokens.exists());

    let out = teller(&backend, &tokens, &["status"]).await?;
    assert!(out.status.success());
    let status: serde_json::Value = serde_json::from_str(&stdout(&out))?;
    assert_eq!(status["authenticated"], true);
    assert!(status["access_expires_at"].is_number());

    // A fresh process with a server-side-expired token still succeeds.
    backend.expire_access_tokens();
    let out = teller(&backend, &tokens, &["get", "/accounts"]).await?;
    assert!(out.status.success(), "get failed: {}", String::from_utf8_lossy(&out.stderr));
    let accounts: serde_json::Value = serde_json::from_str(&stdout(&out))?;
    assert_eq!(accounts[0]["number"], "0001");
    assert_eq!(backend.refresh_calls(), 1);

    let out = teller(&backend, &tokens, &["logout"]).await?;
    assert!(out.status.success());
    let out = teller(&backend, &tokens, &["status"]).await?;
    let status: serde_json::Value = serde_json::from_str(&stdout(&out))?;
    assert_eq!(status["authenticated"], false);
    Ok(())
}

#[tokio::test]
async fn bad_credentials_exit_nonzero() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let dir = tempfile::tempdir()?;
    let tokens = dir.path().join("tokens.json");

    let out =
        teller(&backend, &tokens, &["login", "--username", USERNAME, "--password", "nope"]).await?;

    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("invalid credentials"));
    assert!(!tokens.exists());
    Ok(())
}

#[tokio::test]
async fn post_rejected_by_backend_exits_nonzero() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let dir = tempfile::tempdir()?;
    let tokens = dir.path().join("tokens.json");
    let out = teller(&backend, &tokens, &["login", "--username", USERNAME, "--password", PASSWORD])
        .await?;
    assert!(out.status.success());

    let out =
        teller(&backend, &tokens, &["post", "/transfers", "--data", r#"{"amount":99999}"#]).await?;

    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("insufficient funds"));
    Ok(())
}
