// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process cache and work queue.

use crate::cache::Cache;
use crate::error::AppError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// Score-ordered set; `(score, id)` pairs sort by score, then by ID.
#[derive(Default)]
struct WorkQueue {
    ordered: BTreeSet<(i64, u64)>,
    scores: HashMap<u64, i64>,
}

/// Cache backed by a concurrent map with lazy expiry, plus a mutex-guarded
/// priority queue.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    queue: Mutex<WorkQueue>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_queue(&self) -> Result<std::sync::MutexGuard<'_, WorkQueue>, AppError> {
        self.queue
            .lock()
            .map_err(|_| AppError::Cache("Work queue lock poisoned".to_string()))
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.value.clone()));
            }
        } else {
            return Ok(None);
        }

        // Expired: evict lazily.
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), AppError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, AppError> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.expires_at > now => {
                entry.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn queue_push(&self, member_id: u64, score: i64) -> Result<(), AppError> {
        let mut queue = self.lock_queue()?;
        if queue.scores.contains_key(&member_id) {
            return Ok(());
        }
        queue.scores.insert(member_id, score);
        queue.ordered.insert((score, member_id));
        Ok(())
    }

    async fn queue_pop_min(&self, count: usize) -> Result<Vec<u64>, AppError> {
        let mut queue = self.lock_queue()?;
        let mut popped = Vec::with_capacity(count.min(queue.ordered.len()));
        while popped.len() < count {
            let Some((_, member_id)) = queue.ordered.pop_first() else {
                break;
            };
            queue.scores.remove(&member_id);
            popped.push(member_id);
        }
        Ok(popped)
    }

    async fn queue_count(&self) -> Result<usize, AppError> {
        Ok(self.lock_queue()?.ordered.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expired_entries_are_invisible() {
        let cache = MemoryCache::new();
        cache
            .set("short", b"v".to_vec(), Duration::from_millis(0))
            .await
            .unwrap();
        cache
            .set("long", b"v".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.get("short").await.unwrap(), None);
        assert_eq!(cache.get("long").await.unwrap(), Some(b"v".to_vec()));
        assert!(!cache.expire("short", Duration::from_secs(5)).await.unwrap());
        assert!(cache.expire("long", Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache = MemoryCache::new();
        cache
            .set("k", b"v".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn repush_keeps_original_score() {
        let cache = MemoryCache::new();
        cache.queue_push(1, 100).await.unwrap();
        cache.queue_push(2, 200).await.unwrap();
        cache.queue_push(1, 300).await.unwrap();

        assert_eq!(cache.queue_count().await.unwrap(), 2);
        assert_eq!(cache.queue_pop_min(1).await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn equal_scores_break_ties_by_id() {
        let cache = MemoryCache::new();
        cache.queue_push(9, 5).await.unwrap();
        cache.queue_push(3, 5).await.unwrap();
        assert_eq!(cache.queue_pop_min(10).await.unwrap(), vec![3, 9]);
        assert_eq!(cache.queue_count().await.unwrap(), 0);
    }
}
