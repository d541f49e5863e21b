// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated client for the banking API.
//!
//! Every request passes through the same pipeline: the interceptor attaches
//! the stored access token, and a 401 is recovered once through the
//! [`RefreshCoordinator`] before being replayed with the new token. Other
//! failures are returned as they are.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use reqwest::Method;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::refresh::RefreshCoordinator;
use crate::token::TokenStore;

/// Envelope `code` values the backend uses for success.
pub const SUCCESS_CODES: &[i64] = &[0, 200, 1000];

/// Response envelope shared by all API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub result: Option<T>,
}

impl<T> Envelope<T> {
    pub fn is_success(&self) -> bool {
        SUCCESS_CODES.contains(&self.code)
    }
}

/// Request body variants.
#[derive(Debug, Clone)]
pub enum Body {
    Json(serde_json::Value),
    Bytes { data: Vec<u8>, content_type: String },
}

/// A replayable API request.
///
/// Kept as plain data so the pipeline can re-issue it after a refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Body>,
    pub timeout: Option<Duration>,
    /// Use the upload timeout instead of the default one.
    pub upload: bool,
    /// Set once the request has been replayed after a refresh.
    pub retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            timeout: None,
            upload: false,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(Body::Json(body));
        self
    }

    pub fn bytes(mut self, data: Vec<u8>, content_type: impl Into<String>) -> Self {
        self.body = Some(Body::Bytes { data, content_type: content_type.into() });
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Mark as a long transfer (file upload/download).
    pub fn upload(mut self) -> Self {
        self.upload = true;
        self
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    /// Decode the raw body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Decode the envelope and return its `result`.
    ///
    /// A non-success envelope code is [`ApiError::Rejected`]. A missing
    /// `result` decodes as JSON `null`, which suits `()`/`Option<T>` callers.
    pub fn result<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let envelope: Envelope<serde_json::Value> = self.json()?;
        if !envelope.is_success() {
            return Err(ApiError::Rejected { code: envelope.code, message: envelope.message });
        }
        serde_json::from_value(envelope.result.unwrap_or(serde_json::Value::Null))
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// HTTP client for the banking API.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    upload_timeout: Duration,
    store: Arc<TokenStore>,
    coordinator: Arc<RefreshCoordinator>,
}

impl ApiClient {
    pub fn new(
        config: &ClientConfig,
        store: Arc<TokenStore>,
        coordinator: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            http: crate::http_client(config.request_timeout()),
            base_url: config.api_base().to_owned(),
            upload_timeout: config.upload_timeout(),
            store,
            coordinator,
        }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Request interceptor: the bearer token to attach, read from the store.
    fn intercept(&self) -> Option<String> {
        self.store.access()
    }

    /// Send a request through the auth pipeline.
    pub async fn send(&self, mut req: ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut token = self.intercept();
        loop {
            let (status, body) = self.dispatch(&req, token.as_deref()).await?;
            match status {
                200..=299 => return Ok(ApiResponse { status, body }),
                401 if req.retried => {
                    warn!(method = %req.method, path = %req.path, "replayed request rejected");
                    self.coordinator.force_logout();
                    return Err(ApiError::SessionExpired);
                }
                401 => {
                    debug!(method = %req.method, path = %req.path, "401, recovering token");
                    let fresh = self.coordinator.recover(token.as_deref()).await?;
                    req.retried = true;
                    token = Some(fresh);
                }
                _ => return Err(ApiError::HttpStatus { status, body }),
            }
        }
    }

    async fn dispatch(
        &self,
        req: &ApiRequest,
        token: Option<&str>,
    ) -> Result<(u16, String), ApiError> {
        let mut builder = self.http.request(req.method.clone(), self.url(&req.path));
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        match &req.body {
            Some(Body::Json(value)) => builder = builder.json(value),
            Some(Body::Bytes { data, content_type }) => {
                builder = builder
                    .header(reqwest::header::CONTENT_TYPE, content_type.as_str())
                    .body(data.clone());
            }
            None => {}
        }
        if let Some(timeout) = req.timeout {
            builder = builder.timeout(timeout);
        } else if req.upload {
            builder = builder.timeout(self.upload_timeout);
        }

        let resp = builder.send().await.map_err(|e| {
            debug!(path = %req.path, err = %e, "request failed");
            ApiError::from_transport(&e)
        })?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| ApiError::from_transport(&e))?;
        Ok((status, body))
    }

    /// GET `path` and decode the envelope `result`.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::get(path)).await?.result()
    }

    /// POST `body` as JSON and decode the envelope `result`.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let value = to_value(body)?;
        self.send(ApiRequest::post(path).json(value)).await?.result()
    }

    /// PUT `body` as JSON and decode the envelope `result`.
    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let value = to_value(body)?;
        self.send(ApiRequest::put(path).json(value)).await?.result()
    }

    /// DELETE `path` and decode the envelope `result`.
    pub async fn delete_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::delete(path)).await?.result()
    }

    /// Upload raw bytes with the long-transfer timeout and return the
    /// envelope `result` (typically the stored file's URL).
    pub async fn upload<T: DeserializeOwned>(
        &self,
        path: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<T, ApiError> {
        self.send(ApiRequest::post(path).bytes(data, content_type).upload()).await?.result()
    }
}

fn to_value<B: Serialize + ?Sized>(body: &B) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::Decode(e.to_string()))
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
