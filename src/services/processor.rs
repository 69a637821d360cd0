// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Background synchronization processor.
//!
//! A single control loop polls the work queue and hands popped member IDs
//! to a semaphore-bounded set of tasks. Each task walks the member's granted
//! scopes in list order and runs the resolvers bound to every due scope.

use crate::cache::Cache;
use crate::config::ProcessorConfig;
use crate::error::AppError;
use crate::services::member::MemberService;
use crate::services::resolvers::ScopeMap;
use chrono::Utc;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::Instrument;

/// Fatal processor configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("No scope resolvers installed")]
    EmptyScopeMap,

    #[error("Scope map already installed")]
    ScopeMapAlreadySet,

    #[error("Worker limiter closed")]
    LimiterClosed,
}

/// Outcome of one member pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    /// Resolver invocations that succeeded
    pub resolved: usize,
    /// Scopes whose data was still cached
    pub skipped: usize,
    /// Scopes with no bound resolver
    pub unsupported: usize,
    /// Resolver invocations that failed
    pub failed: usize,
    /// Whether updated scope expiries were written back
    pub persisted: bool,
}

struct Inner {
    config: ProcessorConfig,
    cache: Arc<dyn Cache>,
    members: MemberService,
    scope_map: OnceLock<Arc<ScopeMap>>,
}

/// Work-queue drainer. Cheap to clone.
#[derive(Clone)]
pub struct Processor {
    inner: Arc<Inner>,
}

impl Processor {
    pub fn new(config: ProcessorConfig, cache: Arc<dyn Cache>, members: MemberService) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                cache,
                members,
                scope_map: OnceLock::new(),
            }),
        }
    }

    /// Install the scope bindings. May only be called once.
    pub fn set_scope_map(&self, map: impl Into<Arc<ScopeMap>>) -> Result<(), ProcessorError> {
        self.inner
            .scope_map
            .set(map.into())
            .map_err(|_| ProcessorError::ScopeMapAlreadySet)
    }

    /// Fail unless a non-empty scope map is installed.
    pub fn ensure_ready(&self) -> Result<(), ProcessorError> {
        self.scope_map().map(|_| ())
    }

    fn scope_map(&self) -> Result<Arc<ScopeMap>, ProcessorError> {
        match self.inner.scope_map.get() {
            Some(map) if !map.is_empty() => Ok(Arc::clone(map)),
            _ => Err(ProcessorError::EmptyScopeMap),
        }
    }

    /// Drain the work queue until `shutdown` turns true (or its sender is
    /// dropped), then wait for in-flight passes to finish.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), ProcessorError> {
        self.scope_map()?;

        let config = &self.inner.config;
        let limiter = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        let mut in_flight = JoinSet::new();

        tracing::info!(
            batch_size = config.batch_size,
            max_concurrent = config.max_concurrent,
            "Sync processor started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            while let Some(joined) = in_flight.try_join_next() {
                log_join_result(joined);
            }

            let count = match self.inner.cache.queue_count().await {
                Ok(count) => count,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read work queue size");
                    if pause(config.error_backoff, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            if count == 0 {
                if pause(config.idle_backoff, &mut shutdown).await {
                    break;
                }
                continue;
            }

            let member_ids = match self.inner.cache.queue_pop_min(config.batch_size).await {
                Ok(ids) => ids,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to pop from work queue");
                    if pause(config.error_backoff, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            tracing::debug!(count = member_ids.len(), pending = count, "Dispatching members");

            for member_id in member_ids {
                let permit = Arc::clone(&limiter)
                    .acquire_owned()
                    .await
                    .map_err(|_| ProcessorError::LimiterClosed)?;
                let processor = self.clone();

                in_flight.spawn(
                    async move {
                        let _permit = permit;
                        processor.run_pass(member_id).await;
                    }
                    .instrument(tracing::info_span!("member_pass", member_id)),
                );
            }
        }

        tracing::info!(in_flight = in_flight.len(), "Sync processor draining");
        while let Some(joined) = in_flight.join_next().await {
            log_join_result(joined);
        }
        tracing::info!("Sync processor stopped");
        Ok(())
    }

    /// Run one pass and log its outcome. Errors end only this member's pass.
    async fn run_pass(&self, member_id: u64) {
        match self.process_member(member_id).await {
            Ok(summary) => tracing::info!(
                member_id,
                resolved = summary.resolved,
                skipped = summary.skipped,
                unsupported = summary.unsupported,
                failed = summary.failed,
                persisted = summary.persisted,
                "Member pass complete"
            ),
            Err(e) => tracing::warn!(member_id, error = %e, "Member pass aborted"),
        }
    }

    /// Refresh every due scope of one member and persist the new expiries.
    ///
    /// Member lookup and token failures abort the pass. Resolver failures
    /// are logged and the walk continues.
    pub async fn process_member(&self, member_id: u64) -> Result<PassSummary, AppError> {
        let scope_map = self
            .scope_map()
            .map_err(|e| AppError::Internal(anyhow::Error::from(e)))?;
        let members = &self.inner.members;

        let mut member = members
            .get(member_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("member {}", member_id)))?;

        let mut summary = PassSummary::default();
        if member.disabled {
            tracing::info!(
                member_id,
                reason = member.disabled_reason.as_deref().unwrap_or("unknown"),
                "Skipping disabled member"
            );
            return Ok(summary);
        }

        let access_token = members.validate_token(&mut member).await?;

        let now = Utc::now();
        let mut changed = false;

        for index in 0..member.scopes.len() {
            let scope = member.scopes[index].scope.clone();

            if member.scopes[index].is_cached(now) {
                tracing::debug!(member_id, scope = %scope, "Scope still cached");
                summary.skipped += 1;
                self.pace().await;
                continue;
            }

            let Some(bindings) = scope_map.get(&scope) else {
                tracing::debug!(member_id, scope = %scope, "No resolver for scope");
                summary.unsupported += 1;
                self.pace().await;
                continue;
            };

            for binding in bindings {
                match binding.resolver.resolve(&member, &access_token).await {
                    Ok(Some(etag)) => {
                        summary.resolved += 1;
                        if member.scopes[index].expiry != Some(etag.cached_until) {
                            member.scopes[index].expiry = Some(etag.cached_until);
                            changed = true;
                        }
                    }
                    Ok(None) => summary.resolved += 1,
                    Err(e) => {
                        summary.failed += 1;
                        tracing::warn!(
                            member_id,
                            scope = %scope,
                            resolver = %binding.name,
                            error = %e,
                            "Resolver failed"
                        );
                    }
                }
                self.pace().await;
            }
        }

        if changed {
            match members.persist_scopes(&member).await {
                Ok(_) => summary.persisted = true,
                Err(e) => {
                    tracing::error!(member_id, error = %e, "Failed to persist scope expiries");
                }
            }
        }

        Ok(summary)
    }

    async fn pace(&self) {
        let pacing = self.inner.config.scope_pacing;
        if !pacing.is_zero() {
            tokio::time::sleep(pacing).await;
        }
    }
}

/// Sleep for `duration`. Returns true if shutdown was requested meanwhile.
async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

fn log_join_result(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Member pass task panicked");
    }
}
