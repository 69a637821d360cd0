// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! EVE SSO login routes.

use axum::{
    extract::{Query, State},
    http::Uri,
    response::Redirect,
    routing::get,
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::middleware::auth::{create_session_token, SESSION_COOKIE};
use crate::models::Scope;
use crate::services::sso::SSO_AUTHORIZE_URL;
use crate::services::sso_verifier::SsoVerifyError;
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

/// How long a signed login state stays valid (15 minutes).
const STATE_MAX_AGE_MS: i64 = 15 * 60 * 1000;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/login", get(auth_start))
        .route("/auth/callback", get(auth_callback))
        .route("/auth/logout", get(logout))
}

/// Query parameters for starting the login flow.
#[derive(Deserialize)]
pub struct AuthStartParams {
    /// Frontend URL to return to after login. Defaults to FRONTEND_URL.
    #[serde(default)]
    redirect_uri: Option<String>,
}

/// Start login: redirect to the SSO authorize page requesting every
/// supported scope.
async fn auth_start(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthStartParams>,
) -> Result<Redirect> {
    let frontend_url = match params.redirect_uri {
        Some(uri)
            if is_allowed_frontend(
                &uri,
                &state.config.frontend_url,
                state.config.is_local(),
            ) =>
        {
            uri
        }
        Some(uri) => {
            tracing::warn!(redirect_uri = %uri, "Ignoring untrusted redirect_uri");
            state.config.frontend_url.clone()
        }
        None => state.config.frontend_url.clone(),
    };

    let oauth_state = sign_state(
        &frontend_url,
        Utc::now().timestamp_millis(),
        &state.config.oauth_state_key,
    )?;

    let auth_url = format!(
        "{}?response_type=code&redirect_uri={}&client_id={}&scope={}&state={}",
        SSO_AUTHORIZE_URL,
        urlencoding::encode(&state.config.callback_url()),
        urlencoding::encode(&state.config.esi_client_id),
        urlencoding::encode(&Scope::requested_scope_param()),
        oauth_state
    );

    tracing::info!(
        client_id = %state.config.esi_client_id,
        frontend_url = %frontend_url,
        "Starting SSO login"
    );

    Ok(Redirect::temporary(&auth_url))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    state: String,
    #[serde(default)]
    error: Option<String>,
}

/// SSO callback: exchange the code, verify the token, store the member,
/// queue the first sync and start a session.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<(CookieJar, Redirect)> {
    let frontend_url = verify_and_decode_state(
        &params.state,
        &state.config.oauth_state_key,
        Utc::now().timestamp_millis(),
    )
    .ok_or_else(|| {
        tracing::warn!("Invalid, expired or tampered login state");
        AppError::BadRequest("invalid state".to_string())
    })?;

    if let Some(error) = params.error {
        tracing::warn!(error = %error, "SSO returned an error");
        let redirect = format!("{}?error={}", frontend_url, urlencoding::encode(&error));
        return Ok((jar, Redirect::temporary(&redirect)));
    }

    let code = params
        .code
        .ok_or_else(|| AppError::BadRequest("missing code".to_string()))?;

    tracing::info!("Exchanging authorization code for tokens");
    let tokens = state.sso.exchange_code(&code).await?;

    let identity = state
        .sso_verifier
        .verify(&tokens.access_token)
        .await
        .map_err(|e| match e {
            SsoVerifyError::Forbidden(reason) => {
                tracing::warn!(reason = %reason, "SSO access token rejected");
                AppError::InvalidToken
            }
            SsoVerifyError::Transient(reason) => AppError::EsiApi(reason),
        })?;

    let member = state
        .member_service
        .upsert_from_login(&identity, &tokens)
        .await?;

    if let Err(e) = state.member_service.enqueue(member.id).await {
        tracing::warn!(member_id = member.id, error = %e, "Failed to queue initial sync");
    }

    let jwt = create_session_token(member.id, &state.config.jwt_signing_key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))?;

    tracing::info!(member_id = member.id, name = %member.name, "Login complete");

    let cookie = Cookie::build((SESSION_COOKIE, jwt.clone()))
        .path("/")
        .http_only(true)
        .secure(!state.config.is_local())
        .same_site(SameSite::Lax);

    let redirect_url = format!("{}/callback?token={}", frontend_url, jwt);
    Ok((jar.add(cookie), Redirect::temporary(&redirect_url)))
}

/// Logout: expire the session cookie and return to the frontend.
async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, Redirect) {
    let mut expired = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .secure(!state.config.is_local())
        .same_site(SameSite::Lax)
        .build();
    expired.make_removal();
    (jar.add(expired), Redirect::temporary(&state.config.frontend_url))
}

/// Scheme, lowercased host and effective port of an absolute http(s) URL.
fn origin(url: &str) -> Option<(String, String, u16)> {
    let uri: Uri = url.parse().ok()?;
    let scheme = uri.scheme_str()?.to_ascii_lowercase();
    let default_port = match scheme.as_str() {
        "http" => 80,
        "https" => 443,
        _ => return None,
    };
    let authority = uri.authority()?;
    let host = authority.host();
    // Anything besides `host[:port]` (userinfo, a non-numeric port) is refused.
    let port = match authority.as_str().strip_prefix(host)? {
        "" => default_port,
        rest => rest.strip_prefix(':')?.parse().ok()?,
    };
    Some((scheme, host.to_ascii_lowercase(), port))
}

/// Frontend URLs we are willing to redirect back to: the configured
/// frontend's origin, plus loopback hosts when running locally.
fn is_allowed_frontend(uri: &str, frontend_url: &str, allow_loopback: bool) -> bool {
    let Some(candidate) = origin(uri) else {
        return false;
    };
    if origin(frontend_url).as_ref() == Some(&candidate) {
        return true;
    }
    allow_loopback && matches!(candidate.1.as_str(), "localhost" | "127.0.0.1" | "[::1]")
}

/// Sign `frontend_url|timestamp_hex` and base64url-encode it with the
/// hex signature appended.
fn sign_state(frontend_url: &str, now_ms: i64, secret: &[u8]) -> Result<String> {
    let payload = format!("{}|{:x}", frontend_url, now_ms);

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    Ok(URL_SAFE_NO_PAD.encode(format!("{}|{}", payload, signature)))
}

/// Verify a login state and return the frontend URL it carries.
fn verify_and_decode_state(state: &str, secret: &[u8], now_ms: i64) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(state).ok()?;
    let state_str = String::from_utf8(bytes).ok()?;

    // The frontend URL may not contain '|', so split from the right.
    let mut parts = state_str.rsplitn(3, '|');
    let signature_hex = parts.next()?;
    let timestamp_hex = parts.next()?;
    let frontend_url = parts.next()?;

    let payload = format!("{}|{}", frontend_url, timestamp_hex);
    let signature = hex::decode(signature_hex).ok()?;

    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload.as_bytes());
    if mac.verify_slice(&signature).is_err() {
        tracing::error!("Login state signature mismatch");
        return None;
    }

    let issued_ms = i64::from_str_radix(timestamp_hex, 16).ok()?;
    if now_ms.saturating_sub(issued_ms) > STATE_MAX_AGE_MS {
        tracing::warn!(issued_ms, "Login state expired");
        return None;
    }

    Some(frontend_url.to_string())
}
