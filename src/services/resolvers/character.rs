// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Clone, implant, wallet and contact resolvers.

use super::sync::{decode_body, SyncContext};
use super::ScopeResolver;
use crate::error::AppError;
use crate::models::{
    Contact, Etag, Member, MemberClones, MemberContacts, MemberImplants, MemberWalletBalance,
};
use async_trait::async_trait;

pub struct MemberClonesResolver {
    ctx: SyncContext,
}

impl MemberClonesResolver {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ScopeResolver for MemberClonesResolver {
    fn name(&self) -> &'static str {
        "MemberClones"
    }

    async fn resolve(
        &self,
        member: &Member,
        access_token: &str,
    ) -> Result<Option<Etag>, AppError> {
        let member_id = member.id;
        let path = format!("/characters/{}/clones/", member_id);
        let decode_path = path.clone();

        let synced = self
            .ctx
            .sync_entity::<MemberClones>(
                &member_id.to_string(),
                &path,
                Some(access_token),
                Box::new(move |data| {
                    Box::pin(async move {
                        let mut clones: MemberClones = decode_body(&decode_path, data)?;
                        clones.member_id = member_id;
                        Ok(clones)
                    })
                }),
            )
            .await?;

        Ok(synced.etag)
    }
}

pub struct MemberImplantsResolver {
    ctx: SyncContext,
}

impl MemberImplantsResolver {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ScopeResolver for MemberImplantsResolver {
    fn name(&self) -> &'static str {
        "MemberImplants"
    }

    async fn resolve(
        &self,
        member: &Member,
        access_token: &str,
    ) -> Result<Option<Etag>, AppError> {
        let member_id = member.id;
        let path = format!("/characters/{}/implants/", member_id);
        let decode_path = path.clone();

        let synced = self
            .ctx
            .sync_entity::<MemberImplants>(
                &member_id.to_string(),
                &path,
                Some(access_token),
                Box::new(move |data| {
                    Box::pin(async move {
                        Ok(MemberImplants {
                            member_id,
                            implant_type_ids: decode_body(&decode_path, data)?,
                        })
                    })
                }),
            )
            .await?;

        Ok(synced.etag)
    }
}

pub struct MemberWalletBalanceResolver {
    ctx: SyncContext,
}

impl MemberWalletBalanceResolver {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ScopeResolver for MemberWalletBalanceResolver {
    fn name(&self) -> &'static str {
        "MemberWalletBalance"
    }

    async fn resolve(
        &self,
        member: &Member,
        access_token: &str,
    ) -> Result<Option<Etag>, AppError> {
        let member_id = member.id;
        let path = format!("/characters/{}/wallet/", member_id);
        let decode_path = path.clone();

        let synced = self
            .ctx
            .sync_entity::<MemberWalletBalance>(
                &member_id.to_string(),
                &path,
                Some(access_token),
                Box::new(move |data| {
                    Box::pin(async move {
                        Ok(MemberWalletBalance {
                            member_id,
                            balance: decode_body(&decode_path, data)?,
                        })
                    })
                }),
            )
            .await?;

        Ok(synced.etag)
    }
}

/// Mirrors the first page of `/characters/{id}/contacts/`.
pub struct MemberContactsResolver {
    ctx: SyncContext,
}

impl MemberContactsResolver {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ScopeResolver for MemberContactsResolver {
    fn name(&self) -> &'static str {
        "MemberContacts"
    }

    async fn resolve(
        &self,
        member: &Member,
        access_token: &str,
    ) -> Result<Option<Etag>, AppError> {
        let member_id = member.id;
        let path = format!("/characters/{}/contacts/", member_id);
        let decode_path = path.clone();

        let synced = self
            .ctx
            .sync_entity::<MemberContacts>(
                &member_id.to_string(),
                &path,
                Some(access_token),
                Box::new(move |data| {
                    Box::pin(async move {
                        let contacts: Vec<Contact> = decode_body(&decode_path, data)?;
                        Ok(MemberContacts {
                            member_id,
                            contacts,
                        })
                    })
                }),
            )
            .await?;

        Ok(synced.etag)
    }
}
