// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process document store for local development and tests.

use crate::db::{Query, Store};
use crate::error::AppError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Document store backed by concurrent maps.
///
/// Each collection is a `BTreeMap` so unordered queries return documents in
/// ID order, which keeps test output deterministic.
#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<String, BTreeMap<String, Value>>,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful create/update calls since construction.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map(|c| c.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, AppError> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|c| c.get(id).cloned()))
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Value>, AppError> {
        let docs: Vec<Value> = self
            .collections
            .get(collection)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default();
        Ok(query.apply(docs))
    }

    async fn create(&self, collection: &str, id: &str, doc: Value) -> Result<Value, AppError> {
        let mut docs = self.collections.entry(collection.to_string()).or_default();
        if docs.contains_key(id) {
            return Err(AppError::Database(format!(
                "Document {}/{} already exists",
                collection, id
            )));
        }
        docs.insert(id.to_string(), doc.clone());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(doc)
    }

    async fn update(&self, collection: &str, id: &str, doc: Value) -> Result<Value, AppError> {
        let mut docs = self.collections.entry(collection.to_string()).or_default();
        match docs.get_mut(id) {
            Some(existing) => {
                *existing = doc.clone();
                self.writes.fetch_add(1, Ordering::Relaxed);
                Ok(doc)
            }
            None => Err(AppError::NotFound(format!("{}/{}", collection, id))),
        }
    }
}
