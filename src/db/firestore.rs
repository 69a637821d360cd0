// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper implementing the [`Store`] trait.
//!
//! Every collection holds plain JSON-shaped documents keyed by the entity
//! key. Queries built from [`Operator`] trees are translated into Firestore
//! structured queries; note that Firestore's `is_null` only matches explicit
//! nulls, so `Exists(field, false)` does not match documents lacking the
//! field entirely.

use crate::db::{Direction, Operator, Query, Store};
use crate::error::AppError;
use async_trait::async_trait;
use firestore::errors::FirestoreError;
use firestore::select_filter_builder::FirestoreQueryFilterBuilder;
use firestore::{FirestoreQueryDirection, FirestoreQueryFilter, FirestoreWritePrecondition};
use serde_json::Value;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // The emulator takes an unauthenticated connection; skip credential lookup.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }
}

#[async_trait]
impl Store for FirestoreDb {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Value>, AppError> {
        let mut select = self.get_client()?.fluent().select().from(collection);

        if !query.filters.is_empty() {
            let filters = query.filters.clone();
            select = select.filter(move |q| q.for_all(filters.iter().map(|op| translate(&q, op))));
        }

        if !query.order.is_empty() {
            select = select.order_by(
                query
                    .order
                    .iter()
                    .map(|(field, direction)| (field.as_str(), to_firestore_direction(*direction))),
            );
        }

        if let Some(skip) = query.skip {
            select = select.offset(skip);
        }

        if let Some(limit) = query.limit {
            select = select.limit(limit);
        }

        select
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn create(&self, collection: &str, id: &str, doc: Value) -> Result<Value, AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .insert()
            .into(collection)
            .document_id(id)
            .object(&doc)
            .execute()
            .await
            .map_err(|e| AppError::Database(format!("Insert {}/{} failed: {}", collection, id, e)))?;
        Ok(doc)
    }

    async fn update(&self, collection: &str, id: &str, doc: Value) -> Result<Value, AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collection)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(id)
            .object(&doc)
            .execute()
            .await
            .map_err(|e| match e {
                FirestoreError::DataNotFoundError(_) => {
                    AppError::NotFound(format!("{}/{}", collection, id))
                }
                other => AppError::Database(other.to_string()),
            })?;
        Ok(doc)
    }
}

/// Translate one predicate into a Firestore filter.
fn translate(q: &FirestoreQueryFilterBuilder, op: &Operator) -> Option<FirestoreQueryFilter> {
    match op {
        Operator::Equal(field, value) => q.field(field.as_str()).eq(value.clone()),
        Operator::NotEqual(field, value) => q.field(field.as_str()).neq(value.clone()),
        Operator::GreaterThan(field, value) => {
            q.field(field.as_str()).greater_than(value.clone())
        }
        Operator::GreaterThanOrEqual(field, value) => {
            q.field(field.as_str()).greater_than_or_equal(value.clone())
        }
        Operator::LessThan(field, value) => q.field(field.as_str()).less_than(value.clone()),
        Operator::LessThanOrEqual(field, value) => {
            q.field(field.as_str()).less_than_or_equal(value.clone())
        }
        Operator::In(field, values) => q.field(field.as_str()).is_in(values.clone()),
        Operator::Exists(field, true) => q.field(field.as_str()).is_not_null(),
        Operator::Exists(field, false) => q.field(field.as_str()).is_null(),
        Operator::And(operators) => q.for_all(operators.iter().map(|o| translate(q, o))),
        Operator::Or(operators) => q.for_any(operators.iter().map(|o| translate(q, o))),
    }
}

fn to_firestore_direction(direction: Direction) -> FirestoreQueryDirection {
    match direction {
        Direction::Ascending => FirestoreQueryDirection::Ascending,
        Direction::Descending => FirestoreQueryDirection::Descending,
    }
}
