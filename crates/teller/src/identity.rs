// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity-provider client: password and refresh-token grants against the
//! realm's OpenID Connect token endpoint, plus local logout and account
//! registration.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::Envelope;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::events::{LogoutReason, SessionEvent, SessionEvents};
use crate::token::{TokenPair, TokenStore};

/// OAuth2 token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Access-token lifetime in seconds.
    #[serde(default)]
    expires_in: Option<u64>,
}

/// OAuth2 error response.
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Which grant a token request carried; decides the error variant.
#[derive(Debug, Clone, Copy)]
enum Grant {
    Password,
    RefreshToken,
}

impl Grant {
    fn as_str(self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::RefreshToken => "refresh_token",
        }
    }

    fn rejected(self, msg: String) -> ApiError {
        match self {
            Self::Password => ApiError::InvalidCredentials(msg),
            Self::RefreshToken => ApiError::RefreshFailed(msg),
        }
    }
}

/// Client for the identity provider and the account-creation endpoint.
pub struct IdentityClient {
    http: reqwest::Client,
    token_url: String,
    api_base: String,
    client_id: String,
    client_secret: String,
    scope: String,
    store: Arc<TokenStore>,
    events: SessionEvents,
}

impl IdentityClient {
    pub fn new(config: &ClientConfig, store: Arc<TokenStore>, events: SessionEvents) -> Self {
        Self {
            http: crate::http_client(config.request_timeout()),
            token_url: config.token_url(),
            api_base: config.api_base().to_owned(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scope: config.scope.clone(),
            store,
            events,
        }
    }

    /// Exchange username + password for a token pair.
    ///
    /// Does not touch the token store; the caller decides what to keep.
    pub async fn password_grant(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenPair, ApiError> {
        let form = [
            ("grant_type", Grant::Password.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("username", username),
            ("password", password),
            ("scope", self.scope.as_str()),
        ];
        let token = self.token_request(Grant::Password, &form).await?;
        // A password grant without a refresh token would leave the session
        // unable to recover from its first 401.
        let refresh_token = token.refresh_token.ok_or_else(|| {
            ApiError::InvalidCredentials("response missing refresh_token".to_owned())
        })?;
        info!(username, "password grant succeeded");
        Ok(TokenPair { access_token: token.access_token, refresh_token })
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// If the provider does not rotate the refresh token, the presented one
    /// is carried into the returned pair.
    pub async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        let form = [
            ("grant_type", Grant::RefreshToken.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];
        let token = self.token_request(Grant::RefreshToken, &form).await?;
        debug!(rotated = token.refresh_token.is_some(), "refresh grant succeeded");
        Ok(TokenPair {
            access_token: token.access_token,
            refresh_token: token.refresh_token.unwrap_or_else(|| refresh_token.to_owned()),
        })
    }

    /// Clear local tokens and announce the logout.
    ///
    /// Local only: the identity provider is not asked to revoke anything.
    pub fn logout(&self, reason: LogoutReason) {
        self.store.clear();
        info!(?reason, "logged out");
        self.events.publish(SessionEvent::LoggedOut { reason });
    }

    /// Create a customer account. Unauthenticated, one-shot.
    ///
    /// Returns `Ok(false)` when the backend answers with a non-success
    /// envelope code.
    pub async fn register(&self, profile: &Registration) -> Result<bool, ApiError> {
        let url = format!("{}/customers", self.api_base);
        let resp = self
            .http
            .post(&url)
            .json(profile)
            .send()
            .await
            .map_err(|e| ApiError::from_transport(&e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| ApiError::from_transport(&e))?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "registration rejected");
            return Err(ApiError::HttpStatus { status: status.as_u16(), body });
        }
        if body.trim().is_empty() {
            return Ok(true);
        }
        let envelope: Envelope<serde_json::Value> =
            serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))?;
        if !envelope.is_success() {
            warn!(code = envelope.code, message = %envelope.message, "registration refused");
        }
        Ok(envelope.is_success())
    }

    async fn token_request(
        &self,
        grant: Grant,
        form: &[(&str, &str)],
    ) -> Result<ValidToken, ApiError> {
        let resp = self
            .http
            .post(&self.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| ApiError::from_transport(&e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| ApiError::from_transport(&e))?;

        if status != reqwest::StatusCode::OK {
            let msg = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(desc) => format!("{} ({}): {desc}", err.error, status.as_u16()),
                    None => format!("{} ({})", err.error, status.as_u16()),
                },
                Err(_) => format!("HTTP {}", status.as_u16()),
            };
            warn!(grant = grant.as_str(), status = status.as_u16(), "token request rejected");
            return Err(grant.rejected(msg));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| grant.rejected(format!("malformed token response: {e}")))?;
        let access_token = token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| grant.rejected("response missing access_token".to_owned()))?;
        debug!(grant = grant.as_str(), expires_in = ?token.expires_in, "token issued");
        Ok(ValidToken { access_token, refresh_token: token.refresh_token })
    }
}

/// A token response that carried an access token.
struct ValidToken {
    access_token: String,
    refresh_token: Option<String>,
}

/// New-customer profile submitted to `POST /customers`.
///
/// Photos are uploaded beforehand; only their URLs are sent here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    pub identity_document: IdentityDocument,
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portrait_url: Option<String>,
}

/// National ID card details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityDocument {
    pub number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_place: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub front_photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back_photo_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ward: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
