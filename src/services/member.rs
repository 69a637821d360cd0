// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Member lookup, token lifecycle and scope bookkeeping.

use crate::cache::Cache;
use crate::db::{Operator, Query, Repository, Store};
use crate::error::AppError;
use crate::models::{Member, Scope};
use crate::services::kms::{encrypt_tokens, KmsService};
use crate::services::resolvers::ScopeMap;
use crate::services::sso::{SsoClient, SsoTokenResponse};
use crate::services::sso_verifier::SsoIdentity;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Margin before token expiration when we proactively refresh (5 minutes).
const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// A usable access token for one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// True if the member's stored tokens were rotated and must be persisted.
    pub refreshed: bool,
}

/// Validates a member's access token, refreshing it through SSO if needed.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// On refresh, the member's encrypted token fields are updated in place.
    async fn validate_or_refresh(&self, member: &mut Member) -> Result<TokenGrant, AppError>;

    /// Drop any cached access token for this member.
    fn forget(&self, _member_id: u64) {}
}

/// Cached access token with expiry information.
#[derive(Clone)]
pub struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// Shared token cache type.
pub type TokenCache = Arc<DashMap<u64, CachedToken>>;

/// Shared refresh locks type.
pub type RefreshLocks = Arc<DashMap<u64, Arc<Mutex<()>>>>;

/// Encrypted refresh tokens SSO has rejected, by member.
pub type RejectedTokens = Arc<DashMap<u64, String>>;

/// [`TokenProvider`] backed by EVE SSO and KMS-encrypted tokens.
///
/// Decrypted access tokens are cached in memory; a per-member lock keeps
/// concurrent passes from refreshing the same token twice. A refresh token
/// SSO rejected is not offered again until the member logs in.
#[derive(Clone)]
pub struct SsoTokenProvider {
    sso: SsoClient,
    kms: KmsService,
    token_cache: TokenCache,
    refresh_locks: RefreshLocks,
    rejected: RejectedTokens,
}

impl SsoTokenProvider {
    pub fn new(sso: SsoClient, kms: KmsService) -> Self {
        Self {
            sso,
            kms,
            token_cache: Arc::new(DashMap::new()),
            refresh_locks: Arc::new(DashMap::new()),
            rejected: Arc::new(DashMap::new()),
        }
    }

    fn was_rejected(&self, member: &Member) -> bool {
        self.rejected
            .get(&member.id)
            .is_some_and(|token| *token == member.refresh_token_encrypted)
    }

    fn cached(&self, member_id: u64, now: DateTime<Utc>) -> Option<String> {
        let margin = Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);
        self.token_cache
            .get(&member_id)
            .filter(|cached| now + margin < cached.expires_at)
            .map(|cached| cached.access_token.clone())
    }

    fn remember(&self, member_id: u64, access_token: &str, expires_at: DateTime<Utc>) {
        self.token_cache.insert(
            member_id,
            CachedToken {
                access_token: access_token.to_string(),
                expires_at,
            },
        );
    }
}

#[async_trait]
impl TokenProvider for SsoTokenProvider {
    async fn validate_or_refresh(&self, member: &mut Member) -> Result<TokenGrant, AppError> {
        let member_id = member.id;
        let now = Utc::now();
        let margin = Duration::seconds(TOKEN_REFRESH_MARGIN_SECS);

        if let Some(access_token) = self.cached(member_id, now) {
            return Ok(TokenGrant {
                access_token,
                refreshed: false,
            });
        }

        let lock = self
            .refresh_locks
            .entry(member_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another pass may have refreshed while we waited.
        if let Some(access_token) = self.cached(member_id, now) {
            return Ok(TokenGrant {
                access_token,
                refreshed: false,
            });
        }

        let aad = member_id.to_string();

        if now + margin < member.expires_at {
            let access_token = self
                .kms
                .decrypt(&member.access_token_encrypted, aad.as_bytes())
                .await?;
            self.remember(member_id, &access_token, member.expires_at);
            return Ok(TokenGrant {
                access_token,
                refreshed: false,
            });
        }

        if self.was_rejected(member) {
            return Err(AppError::TokenRevoked(
                "refresh token previously rejected".to_string(),
            ));
        }

        tracing::info!(member_id, "Access token expired, refreshing");

        let refresh_token = self
            .kms
            .decrypt(&member.refresh_token_encrypted, aad.as_bytes())
            .await?;
        let new_tokens = match self.sso.refresh_token(&refresh_token).await {
            Ok(tokens) => tokens,
            Err(e @ AppError::TokenRevoked(_)) => {
                self.rejected
                    .insert(member_id, member.refresh_token_encrypted.clone());
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let (enc_access, enc_refresh) = encrypt_tokens(
            &self.kms,
            &new_tokens.access_token,
            &new_tokens.refresh_token,
            member_id,
        )
        .await?;

        let refreshed_at = Utc::now();
        member.access_token_encrypted = enc_access;
        member.refresh_token_encrypted = enc_refresh;
        member.expires_at = new_tokens.expires_at(refreshed_at);
        member.updated_at = refreshed_at;

        self.remember(member_id, &new_tokens.access_token, member.expires_at);

        tracing::info!(member_id, "Token refreshed and cached");
        Ok(TokenGrant {
            access_token: new_tokens.access_token,
            refreshed: true,
        })
    }

    fn forget(&self, member_id: u64) {
        self.token_cache.remove(&member_id);
        self.rejected.remove(&member_id);
    }
}

/// Member record operations used by the API and the processor.
#[derive(Clone)]
pub struct MemberService {
    members: Repository<Member>,
    cache: Arc<dyn Cache>,
    tokens: Arc<dyn TokenProvider>,
    kms: KmsService,
}

impl MemberService {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn Cache>,
        tokens: Arc<dyn TokenProvider>,
        kms: KmsService,
    ) -> Self {
        Self {
            members: Repository::new(store),
            cache,
            tokens,
            kms,
        }
    }

    pub async fn get(&self, member_id: u64) -> Result<Option<Member>, AppError> {
        self.members.get(&member_id.to_string()).await
    }

    /// Create or refresh a member after a successful SSO login.
    ///
    /// Scopes still granted keep their expiry. If the character changed
    /// owners, all mirrored state is considered stale.
    pub async fn upsert_from_login(
        &self,
        identity: &SsoIdentity,
        tokens: &SsoTokenResponse,
    ) -> Result<Member, AppError> {
        let now = Utc::now();
        let (enc_access, enc_refresh) = encrypt_tokens(
            &self.kms,
            &tokens.access_token,
            &tokens.refresh_token,
            identity.character_id,
        )
        .await?;

        let existing = self.get(identity.character_id).await?;
        let existed = existing.is_some();

        let mut member = match existing {
            Some(mut member) => {
                if member.owner_hash != identity.owner_hash {
                    tracing::info!(
                        member_id = member.id,
                        "Character owner changed, resetting scope state"
                    );
                    member.scopes.clear();
                    member.owner_hash = identity.owner_hash.clone();
                }
                if member.disabled {
                    tracing::info!(member_id = member.id, "Re-enabling member after login");
                    member.enable(now);
                }
                member
            }
            None => Member {
                id: identity.character_id,
                name: identity.name.clone(),
                owner_hash: identity.owner_hash.clone(),
                access_token_encrypted: String::new(),
                refresh_token_encrypted: String::new(),
                expires_at: now,
                scopes: Vec::new(),
                disabled: false,
                disabled_reason: None,
                disabled_at: None,
                created_at: now,
                updated_at: now,
            },
        };

        member.name = identity.name.clone();
        member.access_token_encrypted = enc_access;
        member.refresh_token_encrypted = enc_refresh;
        member.expires_at = tokens.expires_at(now);
        member.set_granted_scopes(identity.scopes.iter().cloned());
        member.updated_at = now;

        let member = self.members.upsert(&member, existed).await?;
        self.tokens.forget(member.id);

        tracing::info!(
            member_id = member.id,
            name = %member.name,
            scopes = member.scopes.len(),
            created = !existed,
            "Member stored after login"
        );
        Ok(member)
    }

    /// Return a usable access token, refreshing if needed.
    ///
    /// Rotated tokens are persisted immediately so a later failure in the
    /// pass cannot lose them. Any failure leaves the stored record as is.
    pub async fn validate_token(&self, member: &mut Member) -> Result<String, AppError> {
        let mut retried = false;
        loop {
            match self.tokens.validate_or_refresh(member).await {
                Ok(grant) => {
                    if grant.refreshed {
                        self.persist_tokens(member).await?;
                    }
                    return Ok(grant.access_token);
                }
                Err(AppError::TokenRevoked(reason)) => {
                    // Another instance may have rotated the token first.
                    if !retried {
                        if let Some(stored) = self.get(member.id).await? {
                            if stored.refresh_token_encrypted != member.refresh_token_encrypted {
                                tracing::info!(
                                    member_id = member.id,
                                    "Refresh token race detected, retrying with stored tokens"
                                );
                                *member = stored;
                                retried = true;
                                continue;
                            }
                        }
                    }

                    tracing::warn!(
                        member_id = member.id,
                        reason = %reason,
                        "Refresh token rejected, skipping member until next login"
                    );
                    return Err(AppError::TokenRevoked(reason));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Write the token fields of `member` onto the stored record.
    async fn persist_tokens(&self, member: &Member) -> Result<(), AppError> {
        let mut stored = self
            .get(member.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("member {}", member.id)))?;
        stored.access_token_encrypted = member.access_token_encrypted.clone();
        stored.refresh_token_encrypted = member.refresh_token_encrypted.clone();
        stored.expires_at = member.expires_at;
        stored.updated_at = member.updated_at;
        self.members.update(&stored).await?;
        Ok(())
    }

    pub async fn update(&self, member: &Member) -> Result<Member, AppError> {
        self.members.update(member).await
    }

    /// Persist per-scope expiries from `member`.
    ///
    /// The stored record is re-read and only expiries of scopes present in
    /// both are copied, so scope list changes from a concurrent login win.
    pub async fn persist_scopes(&self, member: &Member) -> Result<Member, AppError> {
        let mut stored = self
            .get(member.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("member {}", member.id)))?;

        stored.copy_scope_expiries_from(member);
        stored.updated_at = Utc::now();
        self.members.update(&stored).await
    }

    /// Queue a member for synchronization, scored by enqueue time.
    pub async fn enqueue(&self, member_id: u64) -> Result<(), AppError> {
        self.cache
            .queue_push(member_id, Utc::now().timestamp_millis())
            .await
    }

    /// Queue every enabled member with at least one due scope that has a
    /// resolver in `scope_map`. Returns the number of members pushed.
    pub async fn enqueue_due(
        &self,
        now: DateTime<Utc>,
        scope_map: &ScopeMap,
    ) -> Result<usize, AppError> {
        let members = self
            .members
            .find(&Query::new().filter(Operator::eq("disabled", false)))
            .await?;

        let resolvable = |scope: &Scope| scope_map.get(scope).is_some();
        let mut pushed = 0;
        for member in members.iter().filter(|m| m.has_due_scope(now, resolvable)) {
            self.cache
                .queue_push(member.id, now.timestamp_millis())
                .await?;
            pushed += 1;
        }
        Ok(pushed)
    }
}
