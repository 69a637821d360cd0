// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Member model: one linked EVE character and its OAuth grant.

use crate::db::{collections, Entity};
use crate::models::Scope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A granted scope and the time its mirrored data stays valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberScope {
    pub scope: Scope,
    /// `None` means never synchronized (or forced to re-run).
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl MemberScope {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            expiry: None,
        }
    }

    /// True if the data for this scope is still valid at `now`.
    pub fn is_cached(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| expiry > now)
    }
}

/// Member record stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    /// EVE character ID (also used as document ID)
    pub id: u64,
    pub name: String,
    /// SSO owner hash; changes when the character is transferred
    pub owner_hash: String,
    /// Encrypted access token (base64)
    pub access_token_encrypted: String,
    /// Encrypted refresh token (base64)
    pub refresh_token_encrypted: String,
    /// When the access token expires
    pub expires_at: DateTime<Utc>,
    /// Granted scopes, at most one entry per scope
    #[serde(default)]
    pub scopes: Vec<MemberScope>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub disabled_reason: Option<String>,
    #[serde(default)]
    pub disabled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Member {
    const COLLECTION: &'static str = collections::MEMBERS;

    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Member {
    /// Replace the granted scope list. Duplicates are dropped; scopes that
    /// remain granted keep their expiry.
    pub fn set_granted_scopes<I>(&mut self, granted: I)
    where
        I: IntoIterator<Item = Scope>,
    {
        let mut seen = HashSet::new();
        let previous = std::mem::take(&mut self.scopes);

        for scope in granted {
            if !seen.insert(scope.clone()) {
                continue;
            }
            let expiry = previous
                .iter()
                .find(|s| s.scope == scope)
                .and_then(|s| s.expiry);
            self.scopes.push(MemberScope { scope, expiry });
        }
    }

    /// True if any granted scope accepted by `resolvable` is due at `now`.
    ///
    /// Scopes nothing can resolve never get an expiry, so callers pass a
    /// filter to leave them out.
    pub fn has_due_scope(&self, now: DateTime<Utc>, resolvable: impl Fn(&Scope) -> bool) -> bool {
        self.scopes
            .iter()
            .any(|s| resolvable(&s.scope) && !s.is_cached(now))
    }

    /// Force every scope to re-run on the next pass.
    pub fn clear_scope_expiries(&mut self) {
        for scope in &mut self.scopes {
            scope.expiry = None;
        }
    }

    /// Copy per-scope expiries from `other` for scopes present in both.
    /// Returns true if anything changed.
    pub fn copy_scope_expiries_from(&mut self, other: &Member) -> bool {
        let mut changed = false;
        for scope in &mut self.scopes {
            if let Some(source) = other.scopes.iter().find(|s| s.scope == scope.scope) {
                if scope.expiry != source.expiry {
                    scope.expiry = source.expiry;
                    changed = true;
                }
            }
        }
        changed
    }

    pub fn disable(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.disabled = true;
        self.disabled_reason = Some(reason.into());
        self.disabled_at = Some(now);
        self.updated_at = now;
    }

    pub fn enable(&mut self, now: DateTime<Utc>) {
        self.disabled = false;
        self.disabled_reason = None;
        self.disabled_at = None;
        self.updated_at = now;
    }
}

/// Member summary returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MemberSummary {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub id: u64,
    pub name: String,
    pub disabled: bool,
    pub disabled_reason: Option<String>,
    pub scopes: Vec<ScopeStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ScopeStatus {
    pub scope: String,
    /// RFC 3339; absent until first successful sync
    pub expiry: Option<String>,
}

impl From<&Member> for MemberSummary {
    fn from(member: &Member) -> Self {
        Self {
            id: member.id,
            name: member.name.clone(),
            disabled: member.disabled,
            disabled_reason: member.disabled_reason.clone(),
            scopes: member
                .scopes
                .iter()
                .map(|s| ScopeStatus {
                    scope: s.scope.to_string(),
                    expiry: s.expiry.map(crate::time_utils::format_utc_rfc3339),
                })
                .collect(),
        }
    }
}
