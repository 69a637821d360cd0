// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Read-through synchronization of one mirrored entity.
//!
//! Lookup order is cache, then store. A stored copy whose [`Etag`] is still
//! fresh is returned as-is. Otherwise ESI is asked with the stored validator;
//! a 304 only extends the expiry, a 200 is assembled into a record, written
//! with create-or-update and put back in the cache.

use crate::cache::{self, Cache};
use crate::db::{Entity, Repository, Store};
use crate::error::AppError;
use crate::models::Etag;
use crate::services::esi::{EsiApi, FetchResult};
use chrono::Utc;
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Builds a record from a fresh ESI body, resolving secondary references.
pub type Assemble<T> = Box<dyn FnOnce(Value) -> BoxFuture<'static, Result<T, AppError>> + Send>;

/// Outcome of [`SyncContext::sync_entity`].
#[derive(Debug, Clone)]
pub struct Synced<T> {
    pub record: T,
    /// New cache-control record; `None` when the stored copy was still fresh.
    pub etag: Option<Etag>,
}

/// Shared collaborators for every resolver.
#[derive(Clone)]
pub struct SyncContext {
    pub store: Arc<dyn Store>,
    pub cache: Arc<dyn Cache>,
    pub esi: Arc<dyn EsiApi>,
}

impl SyncContext {
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn Cache>, esi: Arc<dyn EsiApi>) -> Self {
        Self { store, cache, esi }
    }

    pub fn cache_key<T: Entity>(key: &str) -> String {
        format!("entity:{}:{}", T::COLLECTION, key)
    }

    /// Synchronize the entity `key` of type `T` from ESI `path`.
    pub async fn sync_entity<T: Entity>(
        &self,
        key: &str,
        path: &str,
        access_token: Option<&str>,
        assemble: Assemble<T>,
    ) -> Result<Synced<T>, AppError> {
        let records: Repository<T> = Repository::new(Arc::clone(&self.store));
        let etags: Repository<Etag> = Repository::new(Arc::clone(&self.store));
        let cache_key = Self::cache_key::<T>(key);
        let etag_key = Etag::key_for(T::COLLECTION, key);

        let cached = cache::get_json::<T>(self.cache.as_ref(), &cache_key).await?;
        let from_cache = cached.is_some();
        let existing = match cached {
            Some(record) => Some(record),
            None => records.get(key).await?,
        };
        let prior = etags.get(&etag_key).await?;
        let now = Utc::now();

        if let (Some(record), Some(etag)) = (&existing, &prior) {
            if etag.is_fresh(now) {
                if !from_cache {
                    self.cache_record(&cache_key, record, etag).await;
                }
                return Ok(Synced {
                    record: record.clone(),
                    etag: None,
                });
            }
        }

        // Only send a validator when there is a stored copy to fall back on.
        let validator = existing
            .as_ref()
            .and(prior.as_ref())
            .and_then(|etag| etag.validator());

        let result = self.esi.fetch(path, access_token, validator).await?;
        let (record, etag) = match result {
            FetchResult::NotModified { cached_until } => {
                let record = existing.ok_or_else(|| {
                    AppError::EsiApi(format!("GET {}: 304 without a stored copy", path))
                })?;
                let etag = Etag {
                    key: etag_key,
                    etag: prior
                        .as_ref()
                        .map(|e| e.etag.clone())
                        .unwrap_or_default(),
                    cached_until,
                };
                tracing::debug!(path, "Not modified");
                (record, etag)
            }
            FetchResult::Fetched {
                data,
                etag,
                cached_until,
            } => {
                let record = assemble(data).await?;
                let record = records.upsert(&record, existing.is_some()).await?;
                tracing::debug!(path, collection = T::COLLECTION, key, "Stored fresh copy");
                (
                    record,
                    Etag {
                        key: etag_key,
                        etag,
                        cached_until,
                    },
                )
            }
        };

        etags.upsert(&etag, prior.is_some()).await?;
        self.cache_record(&cache_key, &record, &etag).await;

        Ok(Synced {
            record,
            etag: Some(etag),
        })
    }

    /// Cache `record` for the rest of its validity. Failures are logged only;
    /// the store stays authoritative.
    async fn cache_record<T: Entity>(&self, cache_key: &str, record: &T, etag: &Etag) {
        let Ok(ttl) = (etag.cached_until - Utc::now()).to_std() else {
            return;
        };
        if ttl.is_zero() {
            return;
        }
        if let Err(e) = cache::set_json(self.cache.as_ref(), cache_key, record, ttl).await {
            tracing::warn!(key = cache_key, error = %e, "Failed to cache record");
        }
    }
}

/// Decode an ESI body into `T`.
pub fn decode_body<T: DeserializeOwned>(path: &str, data: Value) -> Result<T, AppError> {
    serde_json::from_value(data)
        .map_err(|e| AppError::EsiApi(format!("GET {}: unexpected body: {}", path, e)))
}
