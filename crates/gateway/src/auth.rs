// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pluggable request authentication. `authMode` selects an implementation;
//! all of them resolve an incoming request to a `userId` or reject it.

use std::sync::Arc;

use axum::http::HeaderMap;
use base64::Engine;

use crate::config::Config;
use crate::error::ErrorCode;

/// Constant-time string comparison to avoid a timing side-channel on
/// credential checks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Resolves an HTTP request's headers to an authenticated `userId`.
///
/// A trait rather than an enum so a real Cloudflare Access JWT verifier
/// (checked against `issuer`/`audience` via a JWKS fetch) can be dropped in
/// without touching the session runtime; the bundled `CloudflareAuthenticator`
/// trusts the header as already verified by the upstream proxy.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, headers: &HeaderMap) -> Result<String, ErrorCode>;
}

/// Single-operator mode: every request is attributed to a fixed `userId`.
pub struct NoneAuthenticator {
    pub user_id: String,
}

impl Authenticator for NoneAuthenticator {
    fn authenticate(&self, _headers: &HeaderMap) -> Result<String, ErrorCode> {
        Ok(self.user_id.clone())
    }
}

/// HTTP Basic auth against a single configured username/password.
pub struct BasicAuthenticator {
    pub username: String,
    pub password: String,
}

impl Authenticator for BasicAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> Result<String, ErrorCode> {
        let header = headers.get("authorization").and_then(|v| v.to_str().ok()).ok_or(ErrorCode::AuthError)?;
        let encoded = header.strip_prefix("Basic ").ok_or(ErrorCode::AuthError)?;
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| ErrorCode::AuthError)?;
        let decoded = String::from_utf8(decoded).map_err(|_| ErrorCode::AuthError)?;
        let (user, pass) = decoded.split_once(':').ok_or(ErrorCode::AuthError)?;

        if constant_time_eq(user, &self.username) && constant_time_eq(pass, &self.password) {
            Ok(user.to_owned())
        } else {
            Err(ErrorCode::AuthError)
        }
    }
}

/// Trusts an identity header set by a Cloudflare Access reverse proxy. Does
/// NOT itself verify the Cloudflare Access JWT against `issuer`/`audience` —
/// that verification is the documented boundary a real deployment plugs a
/// JWKS-backed `Authenticator` into; this reads only the already-verified
/// identity the proxy attaches.
pub struct CloudflareAuthenticator {
    pub issuer: String,
    pub audience: String,
}

const CF_IDENTITY_HEADER: &str = "cf-access-authenticated-user-email";

impl Authenticator for CloudflareAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> Result<String, ErrorCode> {
        let email = headers.get(CF_IDENTITY_HEADER).and_then(|v| v.to_str().ok()).ok_or(ErrorCode::AuthError)?;
        if email.is_empty() {
            return Err(ErrorCode::AuthError);
        }
        Ok(email.to_owned())
    }
}

impl CloudflareAuthenticator {
    /// Issuer/audience this authenticator expects a real JWKS verifier to
    /// have checked. Exposed for that verifier to consult, not used here.
    pub fn expected_issuer(&self) -> &str {
        &self.issuer
    }

    pub fn expected_audience(&self) -> &str {
        &self.audience
    }
}

/// Build the configured [`Authenticator`] from `authMode` and its companion
/// fields. `Config::validate` has already checked the mode-specific fields
/// are present, so the `expect`s here are unreachable in practice.
pub fn build_authenticator(config: &Config) -> anyhow::Result<Arc<dyn Authenticator>> {
    use crate::config::AuthMode;

    Ok(match config.auth_mode_enum()? {
        AuthMode::None => Arc::new(NoneAuthenticator { user_id: "default".to_owned() }),
        AuthMode::Basic => Arc::new(BasicAuthenticator {
            username: config.basic_user.clone().expect("validated: basic-auth username present"),
            password: config.basic_pass.clone().expect("validated: basic-auth password present"),
        }),
        AuthMode::Cloudflare => Arc::new(CloudflareAuthenticator {
            issuer: config.cf_issuer.clone().expect("validated: cloudflare issuer present"),
            audience: config.cf_audience.clone().expect("validated: cloudflare audience present"),
        }),
    })
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
