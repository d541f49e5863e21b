// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end scenarios: the wired client against a fake identity provider
//! and banking API.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;

use teller::api::ApiRequest;
use teller::error::ApiError;
use teller::events::{LogoutReason, SessionEvent};
use teller::identity::{Address, IdentityDocument, Registration};
use teller::session::{SessionState, SESSION_EXPIRED_MESSAGE};
use teller::token::{FileStore, MemoryStore, TokenPair};
use teller::Teller;
use teller_specs::{mint_jwt, MockBackend, PASSWORD, USERNAME};

const TIMEOUT: Duration = Duration::from_secs(10);

async fn connect(backend: &MockBackend) -> Teller {
    Teller::connect(&backend.config(), Arc::new(MemoryStore::new()))
}

async fn logged_in(backend: &MockBackend) -> anyhow::Result<Teller> {
    let teller = connect(backend).await;
    teller.session.login(USERNAME, PASSWORD).await?;
    Ok(teller)
}

async fn wait_for_state(
    teller: &Teller,
    pred: impl FnMut(&SessionState) -> bool,
) -> anyhow::Result<SessionState> {
    let mut rx = teller.session.subscribe();
    let state = tokio::time::timeout(TIMEOUT, rx.wait_for(pred)).await??.clone();
    Ok(state)
}

#[tokio::test]
async fn login_then_fetch_accounts() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let teller = logged_in(&backend).await?;

    assert!(teller.session.is_authenticated());
    let accounts: serde_json::Value = teller.api.get_json("/accounts").await?;

    assert_eq!(accounts[0]["balance"], 1250);
    assert_eq!(backend.password_calls(), 1);
    assert_eq!(backend.refresh_calls(), 0);
    assert_eq!(backend.unauthorized(), 0);
    Ok(())
}

#[tokio::test]
async fn wrong_password_leaves_session_empty() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let teller = connect(&backend).await;

    let err = teller.session.login(USERNAME, "wrong").await.expect_err("should fail");

    assert!(matches!(err, ApiError::InvalidCredentials(_)), "got {err:?}");
    let state = teller.session.state();
    assert!(!state.is_authenticated);
    assert!(state.error.is_some());
    assert_eq!(teller.store.pair(), None);
    Ok(())
}

#[tokio::test]
async fn expired_access_token_is_refreshed_transparently() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let teller = logged_in(&backend).await?;
    let before = teller.store.pair();
    backend.expire_access_tokens();

    let accounts: serde_json::Value = teller.api.get_json("/accounts").await?;

    assert_eq!(accounts[0]["id"], 1);
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(backend.unauthorized(), 1);
    let after = teller.store.pair();
    assert_ne!(before, after);
    let access = teller.store.access().unwrap_or_default();
    assert!(backend.is_access_valid(&access));
    assert!(teller.session.is_authenticated());
    Ok(())
}

#[tokio::test]
async fn concurrent_401s_cause_one_refresh() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let teller = logged_in(&backend).await?;
    backend.expire_access_tokens();
    backend.set_refresh_delay(Duration::from_millis(200));

    let results = join_all((0..6).map(|_| teller.api.send(ApiRequest::get("/accounts")))).await;

    for result in results {
        assert_eq!(result?.status, 200);
    }
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(teller.coordinator.exchanges(), 1);
    assert_eq!(backend.unauthorized(), 6);
    assert_eq!(backend.api_calls(), 12);
    assert!(!teller.coordinator.is_refreshing());
    Ok(())
}

#[tokio::test]
async fn revoked_refresh_token_ends_session_for_every_caller() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let teller = logged_in(&backend).await?;
    let mut events = teller.events.subscribe();
    backend.expire_access_tokens();
    backend.revoke_refresh_tokens();
    backend.set_refresh_delay(Duration::from_millis(100));

    let results = join_all((0..3).map(|_| teller.api.send(ApiRequest::get("/accounts")))).await;

    for result in results {
        let err = result.expect_err("should fail");
        assert!(err.is_session_terminal(), "got {err:?}");
    }
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(teller.store.pair(), None);
    assert_eq!(
        events.recv().await?,
        SessionEvent::LoggedOut { reason: LogoutReason::SessionExpired }
    );

    let state = wait_for_state(&teller, |s| !s.is_authenticated).await?;
    assert_eq!(state.error.as_deref(), Some(SESSION_EXPIRED_MESSAGE));

    // With no tokens left, the next 401 fails without touching the IdP.
    let err = teller.api.send(ApiRequest::get("/accounts")).await.expect_err("should fail");
    assert!(matches!(err, ApiError::RefreshFailed(_)), "got {err:?}");
    assert_eq!(backend.refresh_calls(), 1);
    Ok(())
}

#[tokio::test]
async fn replayed_request_rejected_again_logs_out() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let teller = logged_in(&backend).await?;

    let err = teller.api.send(ApiRequest::get("/always-401")).await.expect_err("should fail");

    assert_eq!(err, ApiError::SessionExpired);
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(backend.api_calls(), 2);
    assert_eq!(teller.store.pair(), None);
    let state = wait_for_state(&teller, |s| !s.is_authenticated).await?;
    assert_eq!(state.error.as_deref(), Some(SESSION_EXPIRED_MESSAGE));
    Ok(())
}

#[tokio::test]
async fn business_rejection_is_not_an_auth_failure() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let teller = logged_in(&backend).await?;

    let err = teller
        .api
        .post_json::<_, serde_json::Value>("/transfers", &serde_json::json!({ "amount": 99_999 }))
        .await
        .expect_err("should be rejected");
    assert_eq!(err, ApiError::Rejected { code: 2001, message: "insufficient funds".into() });

    let ok: serde_json::Value = teller
        .api
        .post_json("/transfers", &serde_json::json!({ "amount": 10 }))
        .await?;
    assert_eq!(ok["reference"], "TX-1");
    assert_eq!(backend.refresh_calls(), 0);
    assert!(teller.session.is_authenticated());
    Ok(())
}

#[tokio::test]
async fn session_survives_restart_through_token_file() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("tokens.json");

    let pair = {
        let teller = Teller::connect(&backend.config(), Arc::new(FileStore::new(&path)));
        teller.session.login(USERNAME, PASSWORD).await?;
        teller.store.pair()
    };
    assert!(path.exists());

    let teller = Teller::connect(&backend.config(), Arc::new(FileStore::new(&path)));
    assert_eq!(teller.store.pair(), pair);
    let state = teller.session.check_auth_state().await;

    assert_eq!(state, SessionState { is_authenticated: true, loading: false, error: None });
    assert_eq!(backend.refresh_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn startup_with_expired_token_refreshes_first() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let (_, refresh) = backend.issue();
    let teller = connect(&backend).await;
    teller.store.save(TokenPair::new(mint_jwt(-60, 900), refresh));

    let state = teller.session.check_auth_state().await;

    assert!(state.is_authenticated);
    assert_eq!(backend.refresh_calls(), 1);
    let accounts: serde_json::Value = teller.api.get_json("/accounts").await?;
    assert!(accounts.is_array());
    assert_eq!(backend.unauthorized(), 0);
    Ok(())
}

#[tokio::test]
async fn logout_then_requests_are_anonymous() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let teller = logged_in(&backend).await?;

    teller.session.logout();

    assert_eq!(teller.session.state(), SessionState::default());
    let err = teller.api.send(ApiRequest::get("/accounts")).await.expect_err("should fail");
    assert!(matches!(err, ApiError::RefreshFailed(_)), "got {err:?}");
    assert_eq!(backend.refresh_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn register_new_and_taken_usernames() -> anyhow::Result<()> {
    let backend = MockBackend::start().await?;
    let teller = connect(&backend).await;
    let mut profile = Registration {
        username: "grace".into(),
        password: "pw".into(),
        first_name: "Grace".into(),
        last_name: "Hopper".into(),
        email: "grace@example.com".into(),
        phone_number: "0987654321".into(),
        identity_document: IdentityDocument { number: "001".into(), ..Default::default() },
        address: Address { street: "2 Side St".into(), city: "Hue".into(), ..Default::default() },
        ..Default::default()
    };

    assert!(teller.identity.register(&profile).await?);

    profile.username = USERNAME.into();
    assert!(!teller.identity.register(&profile).await?);
    assert_eq!(teller.store.pair(), None);
    Ok(())
}
