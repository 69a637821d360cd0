// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! ESI API client for conditional GETs.
//!
//! Handles:
//! - `If-None-Match` / 304 handling with the stored validator
//! - `Expires`-based cache lifetimes
//! - Error-limit tracking (`X-ESI-Error-Limit-*` headers)
//! - Throttling and token error classification

use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderMap, ETAG, EXPIRES, IF_NONE_MATCH};
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};

/// Request timeout for every ESI call.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Lifetime assumed when ESI sends no usable `Expires` header.
const DEFAULT_CACHE_SECS: i64 = 5 * 60;

/// Remaining error budget below which requests wait for the reset window.
const ERROR_LIMIT_FLOOR: i64 = 10;

/// ESI's error budget per window.
const ERROR_LIMIT_MAX: i64 = 100;

/// Result of a conditional GET.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchResult<T> {
    /// 304: the stored copy is still current.
    NotModified { cached_until: DateTime<Utc> },
    /// 200 with a fresh body.
    Fetched {
        data: T,
        /// Validator for the next request (empty if none was sent)
        etag: String,
        cached_until: DateTime<Utc>,
    },
}

impl<T> FetchResult<T> {
    pub fn cached_until(&self) -> DateTime<Utc> {
        match self {
            FetchResult::NotModified { cached_until } => *cached_until,
            FetchResult::Fetched { cached_until, .. } => *cached_until,
        }
    }

    pub fn is_not_modified(&self) -> bool {
        matches!(self, FetchResult::NotModified { .. })
    }
}

/// Upstream API consumed by the resolvers.
#[async_trait]
pub trait EsiApi: Send + Sync {
    /// GET `path` (relative to the ESI base URL). `access_token` is omitted
    /// for public endpoints; `prior_etag` is sent as `If-None-Match`.
    async fn fetch(
        &self,
        path: &str,
        access_token: Option<&str>,
        prior_etag: Option<&str>,
    ) -> Result<FetchResult<Value>, AppError>;
}

/// reqwest-backed ESI client.
pub struct EsiClient {
    http: reqwest::Client,
    base_url: String,
    /// Errors left in the current window
    error_limit_remain: AtomicI64,
    /// Unix time at which the error window resets
    error_limit_reset_at: AtomicI64,
}

impl EsiClient {
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            error_limit_remain: AtomicI64::new(ERROR_LIMIT_MAX),
            error_limit_reset_at: AtomicI64::new(0),
        })
    }

    /// Errors remaining in the current window, as last reported by ESI.
    pub fn error_limit_remain(&self) -> i64 {
        self.error_limit_remain.load(Ordering::Relaxed)
    }

    /// Sleep out the error window if the budget is nearly spent.
    async fn wait_for_error_budget(&self) {
        if self.error_limit_remain.load(Ordering::Relaxed) >= ERROR_LIMIT_FLOOR {
            return;
        }

        let reset_at = self.error_limit_reset_at.load(Ordering::Relaxed);
        let wait = reset_at - Utc::now().timestamp();
        if wait > 0 {
            tracing::warn!(
                remain = self.error_limit_remain.load(Ordering::Relaxed),
                wait_secs = wait,
                "ESI error budget low, waiting for reset"
            );
            tokio::time::sleep(std::time::Duration::from_secs(wait as u64)).await;
        }
        self.error_limit_remain
            .store(ERROR_LIMIT_MAX, Ordering::Relaxed);
    }

    fn record_error_limit(&self, headers: &HeaderMap) {
        if let Some(remain) = header_i64(headers, "x-esi-error-limit-remain") {
            self.error_limit_remain.store(remain, Ordering::Relaxed);
        }
        if let Some(reset) = header_i64(headers, "x-esi-error-limit-reset") {
            self.error_limit_reset_at
                .store(Utc::now().timestamp() + reset, Ordering::Relaxed);
        }
    }
}

#[async_trait]
impl EsiApi for EsiClient {
    async fn fetch(
        &self,
        path: &str,
        access_token: Option<&str>,
        prior_etag: Option<&str>,
    ) -> Result<FetchResult<Value>, AppError> {
        self.wait_for_error_budget().await;

        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.get(&url);
        if let Some(token) = access_token {
            request = request.bearer_auth(token);
        }
        if let Some(etag) = prior_etag {
            request = request.header(IF_NONE_MATCH, etag);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::EsiApi(format!("GET {} failed: {}", path, e)))?;

        let status = response.status();
        let headers = response.headers().clone();
        self.record_error_limit(&headers);
        let cached_until = cached_until_from_headers(&headers, Utc::now());

        if status == StatusCode::NOT_MODIFIED {
            return Ok(FetchResult::NotModified { cached_until });
        }

        let body = check_status(path, status, response.text().await.ok())?;
        let data = body
            .and_then(|text| serde_json::from_str(&text).ok())
            .ok_or_else(|| AppError::EsiApi(format!("GET {}: invalid JSON body", path)))?;
        let etag = headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        Ok(FetchResult::Fetched {
            data,
            etag,
            cached_until,
        })
    }
}

/// Map a non-success status to an error; pass the body through otherwise.
fn check_status(
    path: &str,
    status: StatusCode,
    body: Option<String>,
) -> Result<Option<String>, AppError> {
    if status.is_success() {
        return Ok(body);
    }

    match status.as_u16() {
        // 420 is ESI's error-limited status
        420 | 429 => {
            tracing::warn!(path, status = status.as_u16(), "ESI throttled request");
            Err(AppError::EsiApi(AppError::ESI_ERROR_LIMITED.to_string()))
        }
        401 => Err(AppError::EsiApi(AppError::ESI_TOKEN_ERROR.to_string())),
        403 => Err(AppError::EsiApi(AppError::ESI_FORBIDDEN.to_string())),
        _ => Err(AppError::EsiApi(format!(
            "GET {}: HTTP {}: {}",
            path,
            status,
            body.unwrap_or_default()
        ))),
    }
}

/// Expiry from the `Expires` header, or the default lifetime from `now`.
fn cached_until_from_headers(headers: &HeaderMap, now: DateTime<Utc>) -> DateTime<Utc> {
    headers
        .get(EXPIRES)
        .and_then(|v| v.to_str().ok())
        .and_then(crate::time_utils::parse_http_date)
        .unwrap_or_else(|| now + Duration::seconds(DEFAULT_CACHE_SECS))
}

fn header_i64(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
