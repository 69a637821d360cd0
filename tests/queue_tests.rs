// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Work queue ordering and refresh sweep.

use capsuleer_sync::cache::{Cache, MemoryCache};
use capsuleer_sync::models::Scope;
use capsuleer_sync::services::{RefreshScheduler, ScopeMap};
use chrono::{Duration, Utc};
use std::sync::Arc;

mod common;
use common::{scope_with_expiry, test_member, CountingResolver, Harness};

/// Scheduler whose map only binds the location scope.
fn location_scheduler(h: &Harness) -> RefreshScheduler {
    let map = ScopeMap::builder()
        .bind(
            Scope::ReadLocation,
            CountingResolver::new("Location", Duration::minutes(5)),
        )
        .build();
    RefreshScheduler::new(
        h.members.clone(),
        Arc::new(map),
        std::time::Duration::from_secs(60),
    )
}

#[tokio::test]
async fn pops_lowest_scores_regardless_of_push_order() {
    let cache = MemoryCache::new();
    cache.queue_push(3, 3_000).await.unwrap();
    cache.queue_push(1, 1_000).await.unwrap();
    cache.queue_push(2, 2_000).await.unwrap();

    assert_eq!(cache.queue_pop_min(2).await.unwrap(), vec![1, 2]);
    assert_eq!(cache.queue_count().await.unwrap(), 1);
    assert_eq!(cache.queue_pop_min(10).await.unwrap(), vec![3]);
    assert!(cache.queue_pop_min(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn requeue_keeps_original_place_in_line() {
    let cache = MemoryCache::new();
    cache.queue_push(1, 1_000).await.unwrap();
    cache.queue_push(2, 2_000).await.unwrap();
    cache.queue_push(1, 5_000).await.unwrap();

    assert_eq!(cache.queue_count().await.unwrap(), 2);
    assert_eq!(cache.queue_pop_min(1).await.unwrap(), vec![1]);
}

#[tokio::test]
async fn equal_scores_pop_by_member_id() {
    let cache = MemoryCache::new();
    cache.queue_push(9, 1_000).await.unwrap();
    cache.queue_push(4, 1_000).await.unwrap();

    assert_eq!(cache.queue_pop_min(2).await.unwrap(), vec![4, 9]);
}

#[tokio::test]
async fn sweep_enqueues_only_enabled_members_with_due_scopes() {
    let h = Harness::new();
    let now = Utc::now();

    // Due
    h.insert_member(&test_member(
        1,
        vec![scope_with_expiry(
            Scope::ReadLocation,
            Some(now - Duration::minutes(1)),
        )],
    ))
    .await;
    // Everything still cached
    h.insert_member(&test_member(
        2,
        vec![scope_with_expiry(
            Scope::ReadLocation,
            Some(now + Duration::hours(1)),
        )],
    ))
    .await;
    // Due but disabled
    let mut disabled = test_member(3, vec![scope_with_expiry(Scope::ReadLocation, None)]);
    disabled.disable("suspended by operator", now);
    h.insert_member(&disabled).await;

    let scheduler = location_scheduler(&h);
    assert_eq!(scheduler.sweep().await, 1);
    assert_eq!(h.cache.queue_pop_min(10).await.unwrap(), vec![1]);
}

#[tokio::test]
async fn scopes_without_a_resolver_never_make_a_member_due() {
    let h = Harness::new();
    let now = Utc::now();

    h.insert_member(&test_member(
        5,
        vec![
            scope_with_expiry(Scope::ReadLocation, Some(now + Duration::hours(1))),
            scope_with_expiry(Scope::ReadStructures, None),
            scope_with_expiry(Scope::from("esi-mail.read_mail.v1"), None),
        ],
    ))
    .await;

    let scheduler = location_scheduler(&h);
    for _ in 0..3 {
        assert_eq!(scheduler.sweep().await, 0);
        assert!(h.cache.queue_pop_min(10).await.unwrap().is_empty());
    }
}
