// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure of an API or identity-provider call.
///
/// `Clone` so a single refresh failure can be handed to every caller that
/// was queued behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// No response was received (connect error, timeout, TLS).
    Network(String),
    /// The server answered with a non-success status.
    HttpStatus { status: u16, body: String },
    /// The response body could not be decoded.
    Decode(String),
    /// A 2xx response whose envelope `code` signals a business failure.
    Rejected { code: i64, message: String },
    /// The password grant was rejected.
    InvalidCredentials(String),
    /// A replayed request was rejected again; the session was terminated.
    SessionExpired,
    /// The refresh-token exchange failed; the session was terminated.
    RefreshFailed(String),
    /// The refresh attempt this call was waiting on was abandoned.
    Cancelled,
}

impl ApiError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Network(_) => ErrorCode::Network,
            Self::HttpStatus { status: 401, .. } => ErrorCode::Unauthorized,
            Self::HttpStatus { .. } => ErrorCode::HttpStatus,
            Self::Decode(_) => ErrorCode::Decode,
            Self::Rejected { .. } => ErrorCode::Rejected,
            Self::InvalidCredentials(_) => ErrorCode::InvalidCredentials,
            Self::SessionExpired => ErrorCode::SessionExpired,
            Self::RefreshFailed(_) => ErrorCode::RefreshFailed,
            Self::Cancelled => ErrorCode::Cancelled,
        }
    }

    /// HTTP status of the failed response, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this error ended the user's session.
    pub fn is_session_terminal(&self) -> bool {
        matches!(self, Self::SessionExpired | Self::RefreshFailed(_))
    }

    /// Classify a transport-level `reqwest` failure.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "network error: {msg}"),
            Self::HttpStatus { status, body } if body.is_empty() => write!(f, "HTTP {status}"),
            Self::HttpStatus { status, body } => write!(f, "HTTP {status}: {body}"),
            Self::Decode(msg) => write!(f, "decode error: {msg}"),
            Self::Rejected { code, message } => write!(f, "rejected ({code}): {message}"),
            Self::InvalidCredentials(msg) => write!(f, "invalid credentials: {msg}"),
            Self::SessionExpired => f.write_str("session expired"),
            Self::RefreshFailed(msg) => write!(f, "token refresh failed: {msg}"),
            Self::Cancelled => f.write_str("token refresh was cancelled"),
        }
    }
}

impl std::error::Error for ApiError {}

/// Stable machine-readable code for each [`ApiError`] kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Network,
    HttpStatus,
    Unauthorized,
    Decode,
    Rejected,
    InvalidCredentials,
    SessionExpired,
    RefreshFailed,
    Cancelled,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "NETWORK",
            Self::HttpStatus => "HTTP_STATUS",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Decode => "DECODE",
            Self::Rejected => "REJECTED",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::RefreshFailed => "REFRESH_FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
