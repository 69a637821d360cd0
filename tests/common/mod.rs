// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

#![allow(dead_code)]

use async_trait::async_trait;
use capsuleer_sync::cache::{Cache, MemoryCache};
use capsuleer_sync::config::Config;
use capsuleer_sync::db::{FirestoreDb, MemoryStore, Query, Repository, Store};
use capsuleer_sync::error::AppError;
use capsuleer_sync::models::{Etag, Member, MemberScope, Scope};
use capsuleer_sync::routes::create_router;
use capsuleer_sync::services::{
    EsiApi, FetchResult, KmsService, MemberService, ScopeResolver, SsoClient, SsoVerifier,
    SyncContext, TokenGrant, TokenProvider,
};
use capsuleer_sync::AppState;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Check if emulator is available via environment variable.
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Unique member ID for test isolation against a shared emulator.
pub fn unique_member_id() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64
}

// ─── Fakes ───────────────────────────────────────────────────

/// Scripted reply for one ESI path.
#[derive(Clone)]
pub enum Reply {
    Fetched {
        data: Value,
        etag: String,
        cached_until: DateTime<Utc>,
    },
    NotModified {
        cached_until: DateTime<Utc>,
    },
    Forbidden,
    Fail(String),
}

/// One recorded ESI request.
#[derive(Debug, Clone, PartialEq)]
pub struct EsiRequest {
    pub path: String,
    pub access_token: Option<String>,
    pub prior_etag: Option<String>,
}

/// In-memory [`EsiApi`] returning scripted replies by path.
#[derive(Default)]
pub struct FakeEsi {
    replies: Mutex<HashMap<String, Reply>>,
    requests: Mutex<Vec<EsiRequest>>,
}

impl FakeEsi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, path: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(path.to_string(), reply);
    }

    /// Script a 200 valid for `ttl`.
    pub fn fetched(&self, path: &str, data: Value, etag: &str, ttl: Duration) {
        self.reply(
            path,
            Reply::Fetched {
                data,
                etag: etag.to_string(),
                cached_until: Utc::now() + ttl,
            },
        );
    }

    pub fn requests(&self) -> Vec<EsiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .count()
    }
}

#[async_trait]
impl EsiApi for FakeEsi {
    async fn fetch(
        &self,
        path: &str,
        access_token: Option<&str>,
        prior_etag: Option<&str>,
    ) -> Result<FetchResult<Value>, AppError> {
        self.requests.lock().unwrap().push(EsiRequest {
            path: path.to_string(),
            access_token: access_token.map(str::to_string),
            prior_etag: prior_etag.map(str::to_string),
        });

        let reply = self.replies.lock().unwrap().get(path).cloned();
        match reply {
            Some(Reply::Fetched {
                data,
                etag,
                cached_until,
            }) => Ok(FetchResult::Fetched {
                data,
                etag,
                cached_until,
            }),
            Some(Reply::NotModified { cached_until }) => {
                Ok(FetchResult::NotModified { cached_until })
            }
            Some(Reply::Forbidden) => Err(AppError::EsiApi(AppError::ESI_FORBIDDEN.to_string())),
            Some(Reply::Fail(msg)) => Err(AppError::EsiApi(msg)),
            None => Err(AppError::EsiApi(format!("unscripted path {}", path))),
        }
    }
}

/// Token provider that never talks to SSO.
#[derive(Default)]
pub struct FakeTokenProvider {
    revoked: AtomicBool,
    calls: AtomicUsize,
}

impl FakeTokenProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every call fails as if SSO answered `invalid_grant`.
    pub fn revoke(&self) {
        self.revoked.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for FakeTokenProvider {
    async fn validate_or_refresh(&self, member: &mut Member) -> Result<TokenGrant, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.revoked.load(Ordering::SeqCst) {
            return Err(AppError::TokenRevoked("invalid_grant".to_string()));
        }
        Ok(TokenGrant {
            access_token: format!("access-{}", member.id),
            refreshed: false,
        })
    }
}

/// Resolver that counts invocations and reports a fixed validity.
pub struct CountingResolver {
    name: &'static str,
    ttl: Duration,
    calls: AtomicUsize,
    members: Mutex<Vec<u64>>,
    last_expiry: Mutex<Option<DateTime<Utc>>>,
}

impl CountingResolver {
    pub fn new(name: &'static str, ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            ttl,
            calls: AtomicUsize::new(0),
            members: Mutex::new(Vec::new()),
            last_expiry: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn members(&self) -> Vec<u64> {
        self.members.lock().unwrap().clone()
    }

    /// Expiry handed out by the most recent call.
    pub fn last_expiry(&self) -> Option<DateTime<Utc>> {
        *self.last_expiry.lock().unwrap()
    }
}

#[async_trait]
impl ScopeResolver for CountingResolver {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn resolve(&self, member: &Member, _token: &str) -> Result<Option<Etag>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.members.lock().unwrap().push(member.id);

        let cached_until = Utc::now() + self.ttl;
        *self.last_expiry.lock().unwrap() = Some(cached_until);
        Ok(Some(Etag {
            key: format!("{}:{}", self.name, member.id),
            etag: "\"v1\"".to_string(),
            cached_until,
        }))
    }
}

/// Resolver that always fails.
#[derive(Default)]
pub struct ErrorResolver {
    calls: AtomicUsize,
}

impl ErrorResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScopeResolver for ErrorResolver {
    fn name(&self) -> &'static str {
        "AlwaysFails"
    }

    async fn resolve(&self, _member: &Member, _token: &str) -> Result<Option<Etag>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AppError::EsiApi("HTTP 500".to_string()))
    }
}

/// Resolver that holds each call open and records peak concurrency.
pub struct SlowResolver {
    delay: std::time::Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl SlowResolver {
    pub fn new(delay: std::time::Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScopeResolver for SlowResolver {
    fn name(&self) -> &'static str {
        "Slow"
    }

    async fn resolve(&self, _member: &Member, _token: &str) -> Result<Option<Etag>, AppError> {
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }
}

/// Cache whose work-queue reads fail a fixed number of times before
/// delegating to a [`MemoryCache`].
pub struct FlakyQueueCache {
    inner: MemoryCache,
    failures_left: AtomicUsize,
    failed: AtomicUsize,
}

impl FlakyQueueCache {
    pub fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryCache::new(),
            failures_left: AtomicUsize::new(failures),
            failed: AtomicUsize::new(0),
        })
    }

    /// Queue reads that returned an error so far.
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> Result<(), AppError> {
        let remaining = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if remaining.is_ok() {
            self.failed.fetch_add(1, Ordering::SeqCst);
            return Err(AppError::Cache("connection reset".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Cache for FlakyQueueCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        self.inner.get(key).await
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: std::time::Duration,
    ) -> Result<(), AppError> {
        self.inner.set(key, value, ttl).await
    }

    async fn expire(&self, key: &str, ttl: std::time::Duration) -> Result<bool, AppError> {
        self.inner.expire(key, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.inner.delete(key).await
    }

    async fn queue_push(&self, member_id: u64, score: i64) -> Result<(), AppError> {
        self.inner.queue_push(member_id, score).await
    }

    async fn queue_pop_min(&self, count: usize) -> Result<Vec<u64>, AppError> {
        self.take_failure()?;
        self.inner.queue_pop_min(count).await
    }

    async fn queue_count(&self) -> Result<usize, AppError> {
        self.take_failure()?;
        self.inner.queue_count().await
    }
}

/// [`MemoryStore`] whose updates can be switched to fail.
#[derive(Default)]
pub struct RejectingUpdateStore {
    inner: MemoryStore,
    reject: AtomicBool,
}

impl RejectingUpdateStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reject_updates(&self) {
        self.reject.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for RejectingUpdateStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, AppError> {
        self.inner.get(collection, id).await
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Value>, AppError> {
        self.inner.find(collection, query).await
    }

    async fn create(&self, collection: &str, id: &str, doc: Value) -> Result<Value, AppError> {
        self.inner.create(collection, id, doc).await
    }

    async fn update(&self, collection: &str, id: &str, doc: Value) -> Result<Value, AppError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(AppError::Database("deadline exceeded".to_string()));
        }
        self.inner.update(collection, id, doc).await
    }
}

// ─── Builders ────────────────────────────────────────────────

/// Member with the given scopes and placeholder tokens.
pub fn test_member(id: u64, scopes: Vec<MemberScope>) -> Member {
    let now = Utc::now();
    Member {
        id,
        name: format!("Pilot {}", id),
        owner_hash: "owner-hash".to_string(),
        access_token_encrypted: String::new(),
        refresh_token_encrypted: String::new(),
        expires_at: now + Duration::minutes(20),
        scopes,
        disabled: false,
        disabled_reason: None,
        disabled_at: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn scope_with_expiry(scope: Scope, expiry: Option<DateTime<Utc>>) -> MemberScope {
    MemberScope { scope, expiry }
}

/// In-memory backends plus a member service over them.
pub struct Harness {
    pub config: Config,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryCache>,
    pub tokens: Arc<FakeTokenProvider>,
    pub members: MemberService,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let tokens = FakeTokenProvider::new();
        let members = MemberService::new(
            store.clone(),
            cache.clone(),
            tokens.clone(),
            KmsService::new_mock(),
        );

        Self {
            config: Config::test_default(),
            store,
            cache,
            tokens,
            members,
        }
    }

    pub fn store_dyn(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub fn cache_dyn(&self) -> Arc<dyn Cache> {
        self.cache.clone()
    }

    pub fn sync_context(&self, esi: Arc<FakeEsi>) -> SyncContext {
        SyncContext::new(self.store_dyn(), self.cache_dyn(), esi)
    }

    /// Store a member directly.
    pub async fn insert_member(&self, member: &Member) {
        Repository::<Member>::new(self.store_dyn())
            .create(member)
            .await
            .expect("insert member");
    }

    pub async fn stored_member(&self, id: u64) -> Member {
        self.members
            .get(id)
            .await
            .expect("member lookup")
            .expect("member exists")
    }
}

pub const SSO_TEST_KID: &str = "test-kid";
pub const SSO_TEST_SECRET: &[u8] = b"sso-test-secret";

/// Create a test app over in-memory backends.
/// Returns the router and the harness sharing its store and cache.
pub fn create_test_app() -> (axum::Router, Arc<AppState>, Harness) {
    let harness = Harness::new();
    let config = harness.config.clone();

    let sso = SsoClient::new(
        config.esi_client_id.clone(),
        config.esi_client_secret.clone(),
    );
    let sso_verifier = Arc::new(
        SsoVerifier::new_with_static_key(
            &config.esi_client_id,
            SSO_TEST_KID,
            Algorithm::HS256,
            DecodingKey::from_secret(SSO_TEST_SECRET),
        )
        .unwrap(),
    );

    let state = Arc::new(AppState {
        config,
        store: harness.store_dyn(),
        cache: harness.cache_dyn(),
        member_service: harness.members.clone(),
        sso,
        sso_verifier,
    });

    (create_router(state.clone()), state, harness)
}
