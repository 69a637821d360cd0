// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Capsuleer Sync: mirror EVE Online character data from ESI
//!
//! Members log in through EVE SSO. A background processor drains a work
//! queue of member IDs and, for every granted scope whose cached data has
//! expired, runs the resolvers that pull that data from ESI into the store.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use cache::Cache;
use config::Config;
use db::Store;
use services::{MemberService, SsoClient, SsoVerifier};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub cache: Arc<dyn Cache>,
    pub member_service: MemberService,
    pub sso: SsoClient,
    pub sso_verifier: Arc<SsoVerifier>,
}
