// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! Backends implement the JSON-level [`Store`] trait; typed access goes
//! through [`Repository`].

pub mod filter;
pub mod firestore;
pub mod memory;

pub use filter::{Direction, Operator, Query};
pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::AppError;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

/// Collection names as constants.
pub mod collections {
    pub const MEMBERS: &str = "members";
    /// Cache-control records keyed by entity key
    pub const ETAGS: &str = "etags";
    pub const MEMBER_LOCATIONS: &str = "member_locations";
    pub const MEMBER_SHIPS: &str = "member_ships";
    pub const MEMBER_CLONES: &str = "member_clones";
    pub const MEMBER_IMPLANTS: &str = "member_implants";
    pub const MEMBER_SKILLS: &str = "member_skills";
    pub const MEMBER_ATTRIBUTES: &str = "member_attributes";
    pub const MEMBER_SKILL_QUEUES: &str = "member_skill_queues";
    pub const MEMBER_WALLET_BALANCES: &str = "member_wallet_balances";
    pub const MEMBER_CONTACTS: &str = "member_contacts";
    /// Reference data shared by all members
    pub const UNIVERSE_SYSTEMS: &str = "universe_systems";
    pub const UNIVERSE_STATIONS: &str = "universe_stations";
    pub const UNIVERSE_STRUCTURES: &str = "universe_structures";
}

/// Durable document storage keyed by (collection, id).
#[async_trait]
pub trait Store: Send + Sync {
    /// Get a document by ID.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, AppError>;

    /// Find documents matching a query.
    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Value>, AppError>;

    /// Insert a new document. Fails if the ID is already taken.
    async fn create(&self, collection: &str, id: &str, doc: Value) -> Result<Value, AppError>;

    /// Replace an existing document. Fails with `NotFound` if absent.
    async fn update(&self, collection: &str, id: &str, doc: Value) -> Result<Value, AppError>;
}

/// A record type stored in its own collection.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: &'static str;

    /// Document ID for this record.
    fn key(&self) -> String;
}

/// Typed access to one collection of a [`Store`].
pub struct Repository<T> {
    store: Arc<dyn Store>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _marker: PhantomData,
        }
    }
}

impl<T: Entity> Repository<T> {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<T>, AppError> {
        self.store
            .get(T::COLLECTION, key)
            .await?
            .map(decode)
            .transpose()
    }

    pub async fn find(&self, query: &Query) -> Result<Vec<T>, AppError> {
        self.store
            .find(T::COLLECTION, query)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    pub async fn find_one(&self, query: &Query) -> Result<Option<T>, AppError> {
        let query = query.clone().limit(1);
        Ok(self.find(&query).await?.into_iter().next())
    }

    pub async fn create(&self, record: &T) -> Result<T, AppError> {
        let doc = self
            .store
            .create(T::COLLECTION, &record.key(), encode(record)?)
            .await?;
        decode(doc)
    }

    pub async fn update(&self, record: &T) -> Result<T, AppError> {
        let doc = self
            .store
            .update(T::COLLECTION, &record.key(), encode(record)?)
            .await?;
        decode(doc)
    }

    /// Create or update, chosen by whether a prior record existed.
    pub async fn upsert(&self, record: &T, existed: bool) -> Result<T, AppError> {
        if existed {
            self.update(record).await
        } else {
            self.create(record).await
        }
    }
}

fn encode<T: Serialize>(record: &T) -> Result<Value, AppError> {
    serde_json::to_value(record)
        .map_err(|e| AppError::Database(format!("Failed to encode document: {}", e)))
}

fn decode<T: DeserializeOwned>(doc: Value) -> Result<T, AppError> {
    serde_json::from_value(doc)
        .map_err(|e| AppError::Database(format!("Failed to decode document: {}", e)))
}
