// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! EVE SSO OAuth client: code exchange and token refresh.

use crate::error::AppError;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// SSO token endpoint.
pub const SSO_TOKEN_URL: &str = "https://login.eveonline.com/v2/oauth/token";

/// SSO authorization endpoint (browser redirect target).
pub const SSO_AUTHORIZE_URL: &str = "https://login.eveonline.com/v2/oauth/authorize";

/// SSO OAuth client.
#[derive(Clone)]
pub struct SsoClient {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl SsoClient {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_url: SSO_TOKEN_URL.to_string(),
            client_id,
            client_secret,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<SsoTokenResponse, AppError> {
        self.token_request(&[("grant_type", "authorization_code"), ("code", code)])
            .await
    }

    /// Use a refresh token to obtain a new access token.
    ///
    /// SSO may rotate the refresh token; callers must store the returned one.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<SsoTokenResponse, AppError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<SsoTokenResponse, AppError> {
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()
            .await
            .map_err(|e| AppError::EsiApi(format!("SSO token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_token_error(status.as_u16(), &body));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::EsiApi(format!("Failed to parse SSO token response: {}", e)))
    }
}

fn classify_token_error(status: u16, body: &str) -> AppError {
    if body.contains("invalid_grant") {
        tracing::warn!(status, "SSO rejected refresh token (invalid_grant)");
        return AppError::TokenRevoked(body.to_string());
    }
    tracing::error!(status, body = %body, "SSO token request failed");
    AppError::EsiApi(format!("SSO token request failed with status {}", status))
}

/// Token response from the SSO token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SsoTokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime of the access token in seconds
    pub expires_in: i64,
}

impl SsoTokenResponse {
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::seconds(self.expires_in)
    }
}
