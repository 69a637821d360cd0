// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod esi;
pub mod kms;
pub mod member;
pub mod processor;
pub mod resolvers;
pub mod scheduler;
pub mod sso;
pub mod sso_verifier;

pub use esi::{EsiApi, EsiClient, FetchResult};
pub use kms::KmsService;
pub use member::{MemberService, SsoTokenProvider, TokenGrant, TokenProvider};
pub use processor::{PassSummary, Processor, ProcessorError};
pub use resolvers::{default_scope_map, ScopeMap, ScopeResolver, SyncContext};
pub use scheduler::RefreshScheduler;
pub use sso::{SsoClient, SsoTokenResponse};
pub use sso_verifier::{SsoIdentity, SsoVerifier, SsoVerifyError};
