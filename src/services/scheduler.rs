// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Periodic sweep that re-enqueues members whose data has expired.

use crate::services::member::MemberService;
use crate::services::resolvers::ScopeMap;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Re-enqueues enabled members with at least one due scope that `scope_map`
/// can resolve.
///
/// The work queue lives in the cache, so this sweep also rebuilds it after
/// a restart.
pub struct RefreshScheduler {
    members: MemberService,
    scope_map: Arc<ScopeMap>,
    interval: Duration,
}

impl RefreshScheduler {
    pub fn new(members: MemberService, scope_map: Arc<ScopeMap>, interval: Duration) -> Self {
        Self {
            members,
            scope_map,
            interval,
        }
    }

    /// Run one sweep. Returns the number of members enqueued.
    pub async fn sweep(&self) -> usize {
        match self.members.enqueue_due(Utc::now(), &self.scope_map).await {
            Ok(pushed) => {
                if pushed > 0 {
                    tracing::info!(pushed, "Refresh sweep enqueued members");
                }
                pushed
            }
            Err(e) => {
                tracing::error!(error = %e, "Refresh sweep failed");
                0
            }
        }
    }

    /// Sweep every interval until `shutdown` turns true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Refresh scheduler stopped");
    }
}
