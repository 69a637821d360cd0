// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync processor behavior: scope walk, failure isolation, concurrency and
//! shutdown.

use capsuleer_sync::config::ProcessorConfig;
use capsuleer_sync::db::Repository;
use capsuleer_sync::error::AppError;
use capsuleer_sync::models::{Member, Scope};
use capsuleer_sync::services::{KmsService, MemberService, Processor, ScopeMap};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::watch;

mod common;
use common::{
    scope_with_expiry, test_member, CountingResolver, ErrorResolver, FlakyQueueCache, Harness,
    RejectingUpdateStore, SlowResolver,
};

fn processor(h: &Harness, config: ProcessorConfig, map: ScopeMap) -> Processor {
    let processor = Processor::new(config, h.cache_dyn(), h.members.clone());
    processor.set_scope_map(map).unwrap();
    processor
}

/// Poll `cond` until it holds, failing the test after 5 seconds.
async fn wait_until(cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn cached_scopes_cause_no_writes_and_no_calls() {
    let h = Harness::new();
    let resolver = CountingResolver::new("R", Duration::minutes(10));
    let later = Utc::now() + Duration::hours(1);

    h.insert_member(&test_member(
        7,
        vec![
            scope_with_expiry(Scope::ReadLocation, Some(later)),
            scope_with_expiry(Scope::ReadClones, Some(later)),
        ],
    ))
    .await;

    let map = ScopeMap::builder()
        .bind(Scope::ReadLocation, resolver.clone())
        .bind(Scope::ReadClones, resolver.clone())
        .build();
    let p = processor(&h, h.config.processor.clone(), map);

    let writes_before = h.store.write_count();
    for _ in 0..2 {
        let summary = p.process_member(7).await.unwrap();
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.resolved, 0);
        assert!(!summary.persisted);
    }

    assert_eq!(resolver.calls(), 0);
    assert_eq!(h.store.write_count(), writes_before);
}

#[tokio::test]
async fn failing_resolver_does_not_block_other_scopes() {
    let h = Harness::new();
    let first = CountingResolver::new("First", Duration::minutes(5));
    let broken = ErrorResolver::new();
    let third = CountingResolver::new("Third", Duration::minutes(15));

    h.insert_member(&test_member(
        8,
        vec![
            scope_with_expiry(Scope::ReadLocation, None),
            scope_with_expiry(Scope::ReadClones, None),
            scope_with_expiry(Scope::ReadWallet, None),
        ],
    ))
    .await;

    let map = ScopeMap::builder()
        .bind(Scope::ReadLocation, first.clone())
        .bind(Scope::ReadClones, broken.clone())
        .bind(Scope::ReadWallet, third.clone())
        .build();
    let p = processor(&h, h.config.processor.clone(), map);

    let summary = p.process_member(8).await.unwrap();
    assert_eq!(summary.resolved, 2);
    assert_eq!(summary.failed, 1);
    assert!(summary.persisted);
    assert_eq!((first.calls(), broken.calls(), third.calls()), (1, 1, 1));

    let stored = h.stored_member(8).await;
    assert_eq!(stored.scopes[0].expiry, first.last_expiry());
    assert_eq!(stored.scopes[1].expiry, None);
    assert_eq!(stored.scopes[2].expiry, third.last_expiry());
}

#[tokio::test]
async fn only_due_scopes_reach_their_resolver() {
    let h = Harness::new();
    let fresh = CountingResolver::new("Fresh", Duration::minutes(5));
    let expired = CountingResolver::new("Expired", Duration::minutes(5));
    let unset = CountingResolver::new("Unset", Duration::minutes(5));
    let now = Utc::now();

    h.insert_member(&test_member(
        9,
        vec![
            scope_with_expiry(Scope::ReadLocation, Some(now + Duration::hours(1))),
            scope_with_expiry(Scope::ReadClones, Some(now - Duration::hours(1))),
            scope_with_expiry(Scope::ReadWallet, None),
        ],
    ))
    .await;

    let map = ScopeMap::builder()
        .bind(Scope::ReadLocation, fresh.clone())
        .bind(Scope::ReadClones, expired.clone())
        .bind(Scope::ReadWallet, unset.clone())
        .build();
    let p = processor(&h, h.config.processor.clone(), map);

    let summary = p.process_member(9).await.unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(fresh.calls(), 0);
    assert_eq!(expired.calls(), 1);
    assert_eq!(unset.calls(), 1);
}

#[tokio::test]
async fn resolvers_for_one_scope_run_in_binding_order() {
    let h = Harness::new();
    let short = CountingResolver::new("Short", Duration::minutes(1));
    let long = CountingResolver::new("Long", Duration::minutes(30));

    h.insert_member(&test_member(
        10,
        vec![scope_with_expiry(Scope::ReadSkills, None)],
    ))
    .await;

    let map = ScopeMap::builder()
        .bind(Scope::ReadSkills, short.clone())
        .bind(Scope::ReadSkills, long.clone())
        .build();
    let p = processor(&h, h.config.processor.clone(), map);

    let summary = p.process_member(10).await.unwrap();
    assert_eq!(summary.resolved, 2);

    // The last binding's expiry wins.
    let stored = h.stored_member(10).await;
    assert_eq!(stored.scopes[0].expiry, long.last_expiry());
}

#[tokio::test]
async fn unsupported_scopes_are_skipped() {
    let h = Harness::new();
    let resolver = CountingResolver::new("R", Duration::minutes(5));

    h.insert_member(&test_member(
        11,
        vec![
            scope_with_expiry(Scope::from("esi-mail.read_mail.v1"), None),
            scope_with_expiry(Scope::ReadLocation, None),
        ],
    ))
    .await;

    let map = ScopeMap::builder()
        .bind(Scope::ReadLocation, resolver.clone())
        .build();
    let p = processor(&h, h.config.processor.clone(), map);

    let summary = p.process_member(11).await.unwrap();
    assert_eq!(summary.unsupported, 1);
    assert_eq!(summary.resolved, 1);

    let stored = h.stored_member(11).await;
    assert_eq!(stored.scopes[0].expiry, None);
    assert!(stored.scopes[1].expiry.is_some());
}

#[tokio::test]
async fn missing_and_disabled_members_abort_the_pass() {
    let h = Harness::new();
    let resolver = CountingResolver::new("R", Duration::minutes(5));

    let mut disabled = test_member(12, vec![scope_with_expiry(Scope::ReadLocation, None)]);
    disabled.disable("suspended by operator", Utc::now());
    h.insert_member(&disabled).await;

    let map = ScopeMap::builder()
        .bind(Scope::ReadLocation, resolver.clone())
        .build();
    let p = processor(&h, h.config.processor.clone(), map);

    assert!(matches!(
        p.process_member(999).await,
        Err(AppError::NotFound(_))
    ));

    let summary = p.process_member(12).await.unwrap();
    assert_eq!(summary.resolved, 0);
    assert_eq!(resolver.calls(), 0);
    assert_eq!(h.tokens.calls(), 0);
}

#[tokio::test]
async fn token_failure_aborts_before_any_resolver() {
    let h = Harness::new();
    let resolver = CountingResolver::new("R", Duration::minutes(5));
    h.insert_member(&test_member(
        13,
        vec![scope_with_expiry(Scope::ReadLocation, None)],
    ))
    .await;
    h.tokens.revoke();

    let map = ScopeMap::builder()
        .bind(Scope::ReadLocation, resolver.clone())
        .build();
    let p = processor(&h, h.config.processor.clone(), map);

    let writes_before = h.store.write_count();
    assert!(matches!(
        p.process_member(13).await,
        Err(AppError::TokenRevoked(_))
    ));
    assert_eq!(resolver.calls(), 0);
    assert_eq!(h.store.write_count(), writes_before);

    let stored = h.stored_member(13).await;
    assert_eq!(stored.scopes[0].expiry, None);
    assert!(!stored.disabled);
}

#[tokio::test]
async fn pacing_applies_to_skips_and_resolver_calls() {
    let h = Harness::new();
    let resolver = CountingResolver::new("R", Duration::minutes(5));
    let later = Utc::now() + Duration::hours(1);

    h.insert_member(&test_member(
        14,
        vec![
            scope_with_expiry(Scope::ReadLocation, Some(later)),
            scope_with_expiry(Scope::from("esi-mail.read_mail.v1"), None),
            scope_with_expiry(Scope::ReadClones, None),
        ],
    ))
    .await;

    let map = ScopeMap::builder()
        .bind(Scope::ReadClones, resolver.clone())
        .build();
    let config = ProcessorConfig {
        scope_pacing: std::time::Duration::from_millis(20),
        ..h.config.processor.clone()
    };
    let p = processor(&h, config, map);

    let started = std::time::Instant::now();
    p.process_member(14).await.unwrap();
    assert!(started.elapsed() >= std::time::Duration::from_millis(60));
}

#[tokio::test]
async fn example_pass_for_member_42() {
    let h = Harness::new();
    let r1 = CountingResolver::new("R1", Duration::minutes(10));
    let r2 = CountingResolver::new("R2", Duration::minutes(10));
    let now = Utc::now();
    let b_expiry = now + Duration::hours(1);

    h.insert_member(&test_member(
        42,
        vec![
            scope_with_expiry(Scope::ReadLocation, Some(now - Duration::minutes(1))),
            scope_with_expiry(Scope::ReadClones, Some(b_expiry)),
        ],
    ))
    .await;
    h.members.enqueue(42).await.unwrap();

    let map = ScopeMap::builder()
        .bind(Scope::ReadLocation, r1.clone())
        .bind(Scope::ReadClones, r2.clone())
        .build();
    let p = processor(&h, h.config.processor.clone(), map);
    let writes_before = h.store.write_count();

    let (tx, rx) = watch::channel(false);
    let run = tokio::spawn({
        let p = p.clone();
        async move { p.run(rx).await }
    });

    let watched = r1.clone();
    wait_until(move || watched.calls() == 1).await;
    tx.send(true).unwrap();
    run.await.unwrap().unwrap();

    assert_eq!(r1.calls(), 1);
    assert_eq!(r2.calls(), 0);
    assert_eq!(h.store.write_count(), writes_before + 1);

    let stored = h.stored_member(42).await;
    assert_eq!(stored.scopes.len(), 2);
    assert_eq!(stored.scopes[0].scope, Scope::ReadLocation);
    assert_eq!(stored.scopes[0].expiry, r1.last_expiry());
    assert_eq!(stored.scopes[1].expiry, Some(b_expiry));
}

#[tokio::test]
async fn in_flight_passes_never_exceed_the_limit() {
    let h = Harness::new();
    let slow = SlowResolver::new(std::time::Duration::from_millis(50));

    for id in 100..106 {
        h.insert_member(&test_member(
            id,
            vec![scope_with_expiry(Scope::ReadLocation, None)],
        ))
        .await;
        h.members.enqueue(id).await.unwrap();
    }

    let map = ScopeMap::builder()
        .bind(Scope::ReadLocation, slow.clone())
        .build();
    let config = ProcessorConfig {
        max_concurrent: 2,
        batch_size: 10,
        ..h.config.processor.clone()
    };
    let p = processor(&h, config, map);

    let (tx, rx) = watch::channel(false);
    let run = tokio::spawn({
        let p = p.clone();
        async move { p.run(rx).await }
    });

    let watched = slow.clone();
    wait_until(move || watched.calls() == 6).await;
    tx.send(true).unwrap();
    run.await.unwrap().unwrap();

    assert!(slow.peak() <= 2, "peak concurrency was {}", slow.peak());
    assert!(slow.peak() >= 1);
}

#[tokio::test]
async fn shutdown_waits_for_in_flight_passes() {
    let h = Harness::new();
    let slow = SlowResolver::new(std::time::Duration::from_millis(200));

    h.insert_member(&test_member(
        200,
        vec![scope_with_expiry(Scope::ReadLocation, None)],
    ))
    .await;
    h.members.enqueue(200).await.unwrap();

    let map = ScopeMap::builder()
        .bind(Scope::ReadLocation, slow.clone())
        .build();
    let p = processor(&h, h.config.processor.clone(), map);

    let (tx, rx) = watch::channel(false);
    let run = tokio::spawn({
        let p = p.clone();
        async move { p.run(rx).await }
    });

    let watched = slow.clone();
    wait_until(move || watched.peak() == 1).await;
    tx.send(true).unwrap();
    run.await.unwrap().unwrap();

    assert_eq!(slow.calls(), 1);
}

#[tokio::test]
async fn dropping_the_shutdown_sender_stops_an_idle_processor() {
    let h = Harness::new();
    let resolver = CountingResolver::new("R", Duration::minutes(5));
    let map = ScopeMap::builder()
        .bind(Scope::ReadLocation, resolver)
        .build();
    let p = Arc::new(processor(&h, h.config.processor.clone(), map));

    let (tx, rx) = watch::channel(false);
    let run = tokio::spawn({
        let p = Arc::clone(&p);
        async move { p.run(rx).await }
    });

    drop(tx);
    tokio::time::timeout(std::time::Duration::from_secs(5), run)
        .await
        .expect("processor did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn queue_errors_back_off_and_the_loop_keeps_going() {
    let h = Harness::new();
    let cache = FlakyQueueCache::new(3);
    let resolver = CountingResolver::new("R", Duration::minutes(5));

    h.insert_member(&test_member(
        300,
        vec![scope_with_expiry(Scope::ReadLocation, None)],
    ))
    .await;
    let members = MemberService::new(
        h.store_dyn(),
        cache.clone(),
        h.tokens.clone(),
        KmsService::new_mock(),
    );
    members.enqueue(300).await.unwrap();

    let p = Processor::new(h.config.processor.clone(), cache.clone(), members);
    p.set_scope_map(
        ScopeMap::builder()
            .bind(Scope::ReadLocation, resolver.clone())
            .build(),
    )
    .unwrap();

    let (tx, rx) = watch::channel(false);
    let run = tokio::spawn({
        let p = p.clone();
        async move { p.run(rx).await }
    });

    let watched = resolver.clone();
    wait_until(move || watched.calls() == 1).await;
    assert_eq!(cache.failed(), 3);

    tx.send(true).unwrap();
    run.await.unwrap().unwrap();
    assert_eq!(resolver.members(), vec![300]);
}

#[tokio::test]
async fn failed_final_persist_still_completes_the_pass() {
    let h = Harness::new();
    let store = RejectingUpdateStore::new();
    let resolver = CountingResolver::new("R", Duration::minutes(5));

    Repository::<Member>::new(store.clone())
        .create(&test_member(
            301,
            vec![scope_with_expiry(Scope::ReadLocation, None)],
        ))
        .await
        .unwrap();
    store.reject_updates();

    let members = MemberService::new(
        store.clone(),
        h.cache_dyn(),
        h.tokens.clone(),
        KmsService::new_mock(),
    );
    let p = Processor::new(h.config.processor.clone(), h.cache_dyn(), members.clone());
    p.set_scope_map(
        ScopeMap::builder()
            .bind(Scope::ReadLocation, resolver.clone())
            .build(),
    )
    .unwrap();

    let summary = p.process_member(301).await.unwrap();
    assert_eq!(summary.resolved, 1);
    assert_eq!(summary.failed, 0);
    assert!(!summary.persisted);
    assert_eq!(resolver.calls(), 1);

    let stored = members.get(301).await.unwrap().unwrap();
    assert_eq!(stored.scopes[0].expiry, None);
}
