// SPDX-FileCopyrightText: 2026 Taskpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JWT bearer authentication for the gateway.
//!
//! Verifies HS256-signed tokens (`Authorization: Bearer <jwt>`), checks
//! expiry, and attaches the `sub` claim to the request as [`Identity`].
//! When no signing secret is configured, all requests are rejected
//! (fail-closed).

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Authenticated caller identity, inserted into request extensions by
/// [`auth_middleware`]. Handlers trust this value and nothing else.
#[derive(Debug, Clone)]
pub struct Identity(pub String);

/// Authentication configuration for the gateway.
#[derive(Clone)]
pub struct AuthState {
    /// HS256 signing secret. If `None`, every request is rejected.
    pub jwt_secret: Option<String>,
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// Middleware validating the bearer JWT and attaching [`Identity`].
pub async fn auth_middleware(
    State(auth): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(ref secret) = auth.jwt_secret else {
        tracing::error!("gateway has no JWT secret configured, rejecting request");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = token else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    match verify_token(secret.as_bytes(), token, chrono::Utc::now().timestamp()) {
        Ok(subject) => {
            request.extensions_mut().insert(Identity(subject));
            Ok(next.run(request).await)
        }
        Err(reason) => {
            tracing::debug!(reason, "JWT rejected");
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Verify an HS256 JWT against `secret` and return its `sub` claim.
///
/// `now` is seconds since the Unix epoch; a present `exp` claim at or
/// before `now` fails verification.
pub fn verify_token(secret: &[u8], token: &str, now: i64) -> Result<String, &'static str> {
    let mut parts = token.split('.');
    let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err("malformed token");
    };

    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| "bad signature encoding")?;

    // Constant-time verification over the signing input.
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| "bad secret")?;
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(payload_b64.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| "signature mismatch")?;

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|_| "bad header encoding")?;
    let header: serde_json::Value =
        serde_json::from_slice(&header_bytes).map_err(|_| "bad header json")?;
    if header.get("alg").and_then(|v| v.as_str()) != Some("HS256") {
        return Err("unsupported algorithm");
    }

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| "bad payload encoding")?;
    let claims: serde_json::Value =
        serde_json::from_slice(&payload_bytes).map_err(|_| "bad payload json")?;

    if let Some(exp) = claims.get("exp").and_then(|v| v.as_i64())
        && exp <= now
    {
        return Err("token expired");
    }

    let subject = claims
        .get("sub")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or("missing sub claim")?;
    Ok(subject.to_string())
}

/// Mint an HS256 JWT with the given subject and expiry. Used by the token
/// CLI and by tests.
pub fn encode_token(secret: &[u8], subject: &str, expires_at: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = serde_json::json!({ "sub": subject, "exp": expires_at });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());

    let mut mac =
        HmacSha256::new_from_slice(secret).expect("hmac accepts keys of any length");
    mac.update(header.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    format!("{header}.{payload}.{signature}")
}
