// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Scope resolvers and the scope registry.
//!
//! A [`ScopeMap`] binds each ESI scope to the resolvers it authorizes. It is
//! built once at startup and shared read-only by all workers.

pub mod character;
pub mod location;
pub mod skills;
pub mod sync;
pub mod universe;

pub use character::{
    MemberClonesResolver, MemberContactsResolver, MemberImplantsResolver,
    MemberWalletBalanceResolver,
};
pub use location::{MemberLocationResolver, MemberShipResolver};
pub use skills::{MemberAttributesResolver, MemberSkillQueueResolver, MemberSkillsResolver};
pub use sync::{SyncContext, Synced};

use crate::error::AppError;
use crate::models::{Etag, Member, Scope};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// One unit of synchronization work for one member.
#[async_trait]
pub trait ScopeResolver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Synchronize this resolver's entity. Returns the new cache-control
    /// record, or `None` if the stored copy was still valid.
    async fn resolve(&self, member: &Member, access_token: &str)
        -> Result<Option<Etag>, AppError>;
}

/// A named resolver bound to a scope.
#[derive(Clone)]
pub struct ScopeResolverBinding {
    pub name: String,
    pub resolver: Arc<dyn ScopeResolver>,
}

/// Scope to ordered resolver bindings.
#[derive(Clone, Default)]
pub struct ScopeMap {
    bindings: HashMap<Scope, Vec<ScopeResolverBinding>>,
}

impl ScopeMap {
    pub fn builder() -> ScopeMapBuilder {
        ScopeMapBuilder::default()
    }

    /// Bindings for `scope` in binding order, or `None` if unsupported.
    pub fn get(&self, scope: &Scope) -> Option<&[ScopeResolverBinding]> {
        self.bindings.get(scope).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Number of scopes with at least one binding.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }
}

#[derive(Default)]
pub struct ScopeMapBuilder {
    bindings: HashMap<Scope, Vec<ScopeResolverBinding>>,
}

impl ScopeMapBuilder {
    /// Append a resolver to `scope`, named after the resolver.
    pub fn bind(self, scope: Scope, resolver: Arc<dyn ScopeResolver>) -> Self {
        let name = resolver.name().to_string();
        self.bind_named(scope, name, resolver)
    }

    pub fn bind_named(
        mut self,
        scope: Scope,
        name: impl Into<String>,
        resolver: Arc<dyn ScopeResolver>,
    ) -> Self {
        self.bindings
            .entry(scope)
            .or_default()
            .push(ScopeResolverBinding {
                name: name.into(),
                resolver,
            });
        self
    }

    pub fn build(self) -> ScopeMap {
        ScopeMap {
            bindings: self.bindings,
        }
    }
}

/// Bindings for every resolver shipped with the service.
pub fn default_scope_map(ctx: SyncContext) -> ScopeMap {
    ScopeMap::builder()
        .bind(
            Scope::ReadLocation,
            Arc::new(MemberLocationResolver::new(ctx.clone())),
        )
        .bind(
            Scope::ReadShipType,
            Arc::new(MemberShipResolver::new(ctx.clone())),
        )
        .bind(
            Scope::ReadClones,
            Arc::new(MemberClonesResolver::new(ctx.clone())),
        )
        .bind(
            Scope::ReadImplants,
            Arc::new(MemberImplantsResolver::new(ctx.clone())),
        )
        .bind(
            Scope::ReadSkills,
            Arc::new(MemberSkillsResolver::new(ctx.clone())),
        )
        .bind(
            Scope::ReadSkills,
            Arc::new(MemberAttributesResolver::new(ctx.clone())),
        )
        .bind(
            Scope::ReadSkillQueue,
            Arc::new(MemberSkillQueueResolver::new(ctx.clone())),
        )
        .bind(
            Scope::ReadWallet,
            Arc::new(MemberWalletBalanceResolver::new(ctx.clone())),
        )
        .bind(
            Scope::ReadContacts,
            Arc::new(MemberContactsResolver::new(ctx)),
        )
        .build()
}
