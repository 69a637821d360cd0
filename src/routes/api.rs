// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated members.

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::middleware::auth::AuthMember;
use crate::models::{MemberLocation, MemberSummary};
use crate::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// API routes (require a session token).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/me/sync", post(request_sync))
        .route("/api/me/location", get(get_location))
}

/// Current member with per-scope sync state.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthMember>,
) -> Result<Json<MemberSummary>> {
    let member = state
        .member_service
        .get(auth.member_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Member {} not found", auth.member_id)))?;

    Ok(Json(MemberSummary::from(&member)))
}

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SyncResponse {
    pub queued: bool,
}

/// Queue the member for an immediate sync pass.
async fn request_sync(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthMember>,
) -> Result<(StatusCode, Json<SyncResponse>)> {
    let member = state
        .member_service
        .get(auth.member_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Member {} not found", auth.member_id)))?;

    if member.disabled {
        return Err(AppError::BadRequest(
            "member is disabled, log in again to re-enable".to_string(),
        ));
    }

    state.member_service.enqueue(member.id).await?;
    tracing::info!(member_id = member.id, "Sync requested");

    Ok((StatusCode::ACCEPTED, Json(SyncResponse { queued: true })))
}

/// Last mirrored location of the member.
async fn get_location(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthMember>,
) -> Result<Json<MemberLocation>> {
    let locations: Repository<MemberLocation> = Repository::new(Arc::clone(&state.store));

    let location = locations
        .get(&auth.member_id.to_string())
        .await?
        .ok_or_else(|| AppError::NotFound("location not synced yet".to_string()))?;

    Ok(Json(location))
}
