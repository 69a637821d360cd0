// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Capsuleer Sync API server and background sync processor.

use capsuleer_sync::{
    cache::{Cache, MemoryCache},
    config::Config,
    db::{FirestoreDb, MemoryStore, Store},
    error::AppError,
    services::{
        default_scope_map, EsiApi, EsiClient, KmsService, MemberService, Processor,
        RefreshScheduler, SsoClient, SsoTokenProvider, SsoVerifier, SyncContext,
    },
    AppState,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(
        port = config.port,
        local = config.is_local(),
        "Starting Capsuleer Sync"
    );

    let (store, kms) = init_backends(&config)
        .await
        .expect("Failed to initialize storage backends");
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());

    let sso = SsoClient::new(
        config.esi_client_id.clone(),
        config.esi_client_secret.clone(),
    );
    let sso_verifier =
        Arc::new(SsoVerifier::new(&config.esi_client_id).expect("Failed to build SSO verifier"));

    let tokens = Arc::new(SsoTokenProvider::new(sso.clone(), kms.clone()));
    let member_service = MemberService::new(
        Arc::clone(&store),
        Arc::clone(&cache),
        tokens,
        kms,
    );

    let esi: Arc<dyn EsiApi> = Arc::new(
        EsiClient::new(&config.esi_base_url, &config.esi_user_agent)
            .expect("Failed to build ESI client"),
    );
    let sync_ctx = SyncContext::new(Arc::clone(&store), Arc::clone(&cache), esi);
    let scope_map = Arc::new(default_scope_map(sync_ctx));
    tracing::info!(scopes = scope_map.len(), "Scope resolvers registered");

    let processor = Processor::new(
        config.processor.clone(),
        Arc::clone(&cache),
        member_service.clone(),
    );
    processor
        .set_scope_map(Arc::clone(&scope_map))
        .expect("Scope map installed twice");
    if let Err(e) = processor.ensure_ready() {
        tracing::error!(error = %e, "Sync processor misconfigured");
        return Err(e.into());
    }

    let scheduler = RefreshScheduler::new(
        member_service.clone(),
        scope_map,
        config.processor.sweep_interval,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let processor_task = {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = processor.run(shutdown).await {
                tracing::error!(error = %e, "Sync processor failed");
            }
        })
    };
    let scheduler_task = {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { scheduler.run(shutdown).await })
    };

    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        cache,
        member_service,
        sso,
        sso_verifier,
    });

    let app = capsuleer_sync::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped, waiting for background tasks");
    // Receivers treat a dropped sender as shutdown as well.
    let _ = shutdown_tx.send(true);
    if let Err(e) = processor_task.await {
        tracing::error!(error = %e, "Sync processor task panicked");
    }
    if let Err(e) = scheduler_task.await {
        tracing::error!(error = %e, "Refresh scheduler task panicked");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Pick the document store and token encryption for this environment.
async fn init_backends(config: &Config) -> Result<(Arc<dyn Store>, KmsService), AppError> {
    if config.is_local() {
        tracing::warn!("Local mode: in-memory store, tokens are NOT encrypted");
        return Ok((Arc::new(MemoryStore::new()), local_kms()?));
    }

    let db = FirestoreDb::new(&config.gcp_project_id).await?;
    let kms = KmsService::new(
        &config.gcp_project_id,
        &config.gcp_region,
        KmsService::TOKEN_KEY_NAME,
    )
    .await?;
    tracing::info!(project = %config.gcp_project_id, "Firestore and KMS initialized");

    Ok((Arc::new(db), kms))
}

#[cfg(debug_assertions)]
fn local_kms() -> Result<KmsService, AppError> {
    Ok(KmsService::new_mock())
}

#[cfg(not(debug_assertions))]
fn local_kms() -> Result<KmsService, AppError> {
    Err(AppError::Internal(anyhow::anyhow!(
        "local mode requires a debug build; set GCP_PROJECT_ID"
    )))
}

/// Resolve on Ctrl-C or SIGTERM (Cloud Run sends SIGTERM before stopping).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("capsuleer_sync=debug".parse().expect("valid directive"))
                .add_directive("info".parse().expect("valid directive")),
        )
        .with(format)
        .init();
}
