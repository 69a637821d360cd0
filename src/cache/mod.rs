// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Key/value cache with per-key expiry plus the member work queue.

pub mod memory;

pub use memory::MemoryCache;

use crate::error::AppError;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

/// Cache and priority-queue primitives shared by the API and the processor.
///
/// The queue is a score-ordered set of member IDs: `queue_pop_min` returns
/// the lowest scores first. Callers use the enqueue timestamp as score, which
/// makes the queue FIFO.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), AppError>;

    /// Reset the remaining lifetime of an existing key. Returns false if absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, AppError>;

    async fn delete(&self, key: &str) -> Result<(), AppError>;

    /// Add a member ID with the given score. An ID already queued keeps its score.
    async fn queue_push(&self, member_id: u64, score: i64) -> Result<(), AppError>;

    /// Remove and return up to `count` IDs with the lowest scores.
    async fn queue_pop_min(&self, count: usize) -> Result<Vec<u64>, AppError>;

    async fn queue_count(&self) -> Result<usize, AppError>;
}

/// Read a JSON value from the cache. Undecodable entries are treated as misses.
pub async fn get_json<T: DeserializeOwned>(
    cache: &dyn Cache,
    key: &str,
) -> Result<Option<T>, AppError> {
    let Some(bytes) = cache.get(key).await? else {
        return Ok(None);
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!(key, error = %e, "Dropping undecodable cache entry");
            Ok(None)
        }
    }
}

/// Write a JSON value to the cache.
pub async fn set_json<T: Serialize>(
    cache: &dyn Cache,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), AppError> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| AppError::Cache(format!("Failed to encode {}: {}", key, e)))?;
    cache.set(key, bytes, ttl).await
}
