// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JWT payload inspection. Only `exp` is read; signatures are not checked.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde::Deserialize;

/// base64url that accepts payloads with or without `=` padding.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Access-token claims the client cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    /// Expiry, seconds since the Unix epoch.
    pub exp: u64,
}

/// Decode the payload segment of a `header.payload.signature` token.
pub fn decode(token: &str) -> Option<Claims> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_sig), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    let bytes = URL_SAFE_LENIENT.decode(payload).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Expiry instant of a token, if it decodes.
pub fn expires_at(token: &str) -> Option<SystemTime> {
    decode(token).map(|c| UNIX_EPOCH + Duration::from_secs(c.exp))
}

/// Whether `token` is expired at `now_ms` (milliseconds since epoch).
///
/// Anything that does not decode counts as expired.
pub fn is_expired_at(token: &str, now_ms: u64) -> bool {
    match decode(token) {
        Some(claims) => claims.exp.saturating_mul(1000) <= now_ms,
        None => true,
    }
}

/// Whether `token` is expired now.
pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, epoch_ms())
}

pub(crate) fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[cfg(test)]
#[path = "claims_tests.rs"]
mod tests;
