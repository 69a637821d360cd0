// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! EVE SSO access token verification.
//!
//! SSO access tokens are RS256 JWTs signed with keys published at the SSO
//! JWKS endpoint. The character ID comes from `sub`
//! (`CHARACTER:EVE:<id>`) and the granted scopes from `scp`.

use crate::models::Scope;
use anyhow::Context;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::header::CACHE_CONTROL;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

const JWKS_URL: &str = "https://login.eveonline.com/oauth/jwks";
const ISSUERS: &[&str] = &["login.eveonline.com", "https://login.eveonline.com"];
const AUDIENCE: &str = "EVE Online";
const SUBJECT_PREFIX: &str = "CHARACTER:EVE:";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const CLOCK_SKEW_SECS: u64 = 60;

/// Character identity extracted from a verified SSO token.
#[derive(Debug, Clone, PartialEq)]
pub struct SsoIdentity {
    pub character_id: u64,
    pub name: String,
    pub owner_hash: String,
    pub scopes: Vec<Scope>,
}

/// Verification error categories.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SsoVerifyError {
    /// The token is invalid or its claims do not match expectations.
    #[error("SSO token rejected: {0}")]
    Forbidden(String),
    /// Key retrieval failed; the token may be fine.
    #[error("SSO verification unavailable: {0}")]
    Transient(String),
}

#[derive(Clone)]
enum VerifierMode {
    Jwks,
    StaticKey {
        kid: String,
        algorithm: Algorithm,
        decoding_key: Arc<DecodingKey>,
    },
}

#[derive(Clone)]
struct JwksCacheEntry {
    keys_by_kid: HashMap<String, Arc<DecodingKey>>,
    expires_at: Instant,
}

/// Verifier for SSO-issued access tokens.
pub struct SsoVerifier {
    http_client: reqwest::Client,
    client_id: String,
    mode: VerifierMode,
    jwks_cache: RwLock<Option<JwksCacheEntry>>,
    refresh_lock: Mutex<()>,
}

impl SsoVerifier {
    /// Production verifier that fetches and caches the SSO JWKS.
    pub fn new(client_id: &str) -> anyhow::Result<Self> {
        Self::with_mode(client_id, VerifierMode::Jwks)
    }

    /// Verifier with a single fixed key, for local and integration tests.
    pub fn new_with_static_key(
        client_id: &str,
        kid: impl Into<String>,
        algorithm: Algorithm,
        decoding_key: DecodingKey,
    ) -> anyhow::Result<Self> {
        let kid = kid.into();
        if kid.trim().is_empty() {
            anyhow::bail!("static SSO kid must not be empty");
        }

        Self::with_mode(
            client_id,
            VerifierMode::StaticKey {
                kid,
                algorithm,
                decoding_key: Arc::new(decoding_key),
            },
        )
    }

    fn with_mode(client_id: &str, mode: VerifierMode) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .context("failed building SSO HTTP client")?;

        Ok(Self {
            http_client,
            client_id: client_id.to_string(),
            mode,
            jwks_cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        })
    }

    /// Verify an SSO access token and extract the character identity.
    pub async fn verify(&self, token: &str) -> Result<SsoIdentity, SsoVerifyError> {
        let header = decode_header(token)
            .map_err(|e| SsoVerifyError::Forbidden(format!("invalid JWT header: {e}")))?;

        let expected_alg = match &self.mode {
            VerifierMode::Jwks => Algorithm::RS256,
            VerifierMode::StaticKey { algorithm, .. } => *algorithm,
        };
        if header.alg != expected_alg {
            return Err(SsoVerifyError::Forbidden(format!(
                "unexpected JWT alg: {:?}",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| SsoVerifyError::Forbidden("missing JWT kid".to_string()))?;

        let decoding_key = self.decoding_key_for_kid(&kid).await?;

        let mut validation = Validation::new(expected_alg);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.set_issuer(ISSUERS);
        validation.set_audience(&[AUDIENCE]);
        validation.leeway = CLOCK_SKEW_SECS;

        let claims = decode::<SsoClaims>(token, decoding_key.as_ref(), &validation)
            .map_err(|e| SsoVerifyError::Forbidden(format!("JWT validation failed: {e}")))?
            .claims;

        if let Some(azp) = &claims.azp {
            if azp != &self.client_id {
                return Err(SsoVerifyError::Forbidden(format!(
                    "token issued to another client: {azp}"
                )));
            }
        }

        let character_id = parse_subject(&claims.sub)?;

        tracing::debug!(
            character_id,
            name = %claims.name,
            scopes = claims.scp.len(),
            "Verified SSO token"
        );

        Ok(SsoIdentity {
            character_id,
            name: claims.name,
            owner_hash: claims.owner,
            scopes: claims.scp.into_scopes(),
        })
    }

    async fn decoding_key_for_kid(&self, kid: &str) -> Result<Arc<DecodingKey>, SsoVerifyError> {
        if let VerifierMode::StaticKey {
            kid: static_kid,
            decoding_key,
            ..
        } = &self.mode
        {
            if kid == static_kid {
                return Ok(decoding_key.clone());
            }
            return Err(SsoVerifyError::Forbidden(format!(
                "unknown JWT kid for static verifier: {kid}"
            )));
        }

        if let Some(key) = self.lookup_cached_key(kid).await {
            return Ok(key);
        }

        // SSO rotates keys; a miss forces one refetch.
        for force_refresh in [false, true] {
            self.refresh_jwks(force_refresh).await?;
            if let Some(key) = self.lookup_cached_key(kid).await {
                return Ok(key);
            }
        }

        Err(SsoVerifyError::Forbidden(format!(
            "JWT kid not found in JWKS after refresh: {kid}"
        )))
    }

    async fn lookup_cached_key(&self, kid: &str) -> Option<Arc<DecodingKey>> {
        let cache = self.jwks_cache.read().await;
        let now = Instant::now();
        cache
            .as_ref()
            .filter(|entry| entry.expires_at > now)
            .and_then(|entry| entry.keys_by_kid.get(kid))
            .cloned()
    }

    async fn refresh_jwks(&self, force_refresh: bool) -> Result<(), SsoVerifyError> {
        let _guard = self.refresh_lock.lock().await;

        if !force_refresh {
            let cache = self.jwks_cache.read().await;
            if cache
                .as_ref()
                .is_some_and(|entry| entry.expires_at > Instant::now())
            {
                return Ok(());
            }
        }

        tracing::debug!(jwks_uri = JWKS_URL, "Refreshing SSO JWKS cache");

        let response = self
            .http_client
            .get(JWKS_URL)
            .send()
            .await
            .map_err(|e| SsoVerifyError::Transient(format!("JWKS request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(SsoVerifyError::Transient(format!(
                "JWKS request returned status {}",
                response.status()
            )));
        }

        let ttl = cache_ttl_from_headers(response.headers(), DEFAULT_CACHE_TTL);

        let jwks: Jwks = response
            .json()
            .await
            .map_err(|e| SsoVerifyError::Transient(format!("invalid JWKS JSON: {e}")))?;

        let keys_by_kid = usable_rsa_keys(jwks);
        if keys_by_kid.is_empty() {
            return Err(SsoVerifyError::Transient(
                "JWKS response did not include any usable RSA keys".to_string(),
            ));
        }

        *self.jwks_cache.write().await = Some(JwksCacheEntry {
            keys_by_kid,
            expires_at: Instant::now() + ttl,
        });

        tracing::debug!(ttl_secs = ttl.as_secs(), "SSO JWKS cache refreshed");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

/// SSO publishes an ES256 key next to the RS256 one, so RSA fields are optional.
#[derive(Debug, Deserialize)]
struct Jwk {
    #[serde(default)]
    kid: String,
    kty: String,
    alg: Option<String>,
    n: Option<String>,
    e: Option<String>,
    #[serde(rename = "use")]
    use_: Option<String>,
}

fn usable_rsa_keys(jwks: Jwks) -> HashMap<String, Arc<DecodingKey>> {
    let mut keys_by_kid = HashMap::new();

    for jwk in jwks.keys {
        if jwk.kty != "RSA" || jwk.kid.trim().is_empty() {
            continue;
        }
        if jwk.alg.as_deref().is_some_and(|alg| alg != "RS256") {
            continue;
        }
        if jwk.use_.as_deref().is_some_and(|u| u != "sig") {
            continue;
        }
        let (Some(n), Some(e)) = (&jwk.n, &jwk.e) else {
            continue;
        };

        match DecodingKey::from_rsa_components(n, e) {
            Ok(key) => {
                keys_by_kid.insert(jwk.kid, Arc::new(key));
            }
            Err(e) => {
                tracing::warn!(error = %e, kid = %jwk.kid, "Skipping invalid RSA JWKS key");
            }
        }
    }

    keys_by_kid
}

/// `scp` is a bare string when a single scope was granted.
#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum ScopeClaim {
    #[default]
    None,
    One(String),
    Many(Vec<String>),
}

impl ScopeClaim {
    fn len(&self) -> usize {
        match self {
            ScopeClaim::None => 0,
            ScopeClaim::One(_) => 1,
            ScopeClaim::Many(v) => v.len(),
        }
    }

    fn into_scopes(self) -> Vec<Scope> {
        match self {
            ScopeClaim::None => Vec::new(),
            ScopeClaim::One(s) => vec![Scope::from(s)],
            ScopeClaim::Many(v) => v.into_iter().map(Scope::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SsoClaims {
    sub: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    owner: String,
    azp: Option<String>,
    #[serde(default)]
    scp: ScopeClaim,
}

fn parse_subject(sub: &str) -> Result<u64, SsoVerifyError> {
    sub.strip_prefix(SUBJECT_PREFIX)
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| SsoVerifyError::Forbidden(format!("unexpected subject: {sub}")))
}

fn cache_ttl_from_headers(headers: &reqwest::header::HeaderMap, fallback: Duration) -> Duration {
    headers
        .get(CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_cache_control_max_age)
        .map(Duration::from_secs)
        .unwrap_or(fallback)
}

fn parse_cache_control_max_age(value: &str) -> Option<u64> {
    value.split(',').find_map(|directive| {
        directive
            .trim()
            .strip_prefix("max-age=")
            .and_then(|raw| raw.trim_matches('"').parse().ok())
    })
}
