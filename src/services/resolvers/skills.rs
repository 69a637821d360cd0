// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Skill, attribute and skill queue resolvers.

use super::sync::{decode_body, SyncContext};
use super::ScopeResolver;
use crate::error::AppError;
use crate::models::{Etag, Member, MemberAttributes, MemberSkillQueue, MemberSkills};
use async_trait::async_trait;

pub struct MemberSkillsResolver {
    ctx: SyncContext,
}

impl MemberSkillsResolver {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ScopeResolver for MemberSkillsResolver {
    fn name(&self) -> &'static str {
        "MemberSkills"
    }

    async fn resolve(
        &self,
        member: &Member,
        access_token: &str,
    ) -> Result<Option<Etag>, AppError> {
        let member_id = member.id;
        let path = format!("/characters/{}/skills/", member_id);
        let decode_path = path.clone();

        let synced = self
            .ctx
            .sync_entity::<MemberSkills>(
                &member_id.to_string(),
                &path,
                Some(access_token),
                Box::new(move |data| {
                    Box::pin(async move {
                        let mut skills: MemberSkills = decode_body(&decode_path, data)?;
                        skills.member_id = member_id;
                        Ok(skills)
                    })
                }),
            )
            .await?;

        Ok(synced.etag)
    }
}

pub struct MemberAttributesResolver {
    ctx: SyncContext,
}

impl MemberAttributesResolver {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ScopeResolver for MemberAttributesResolver {
    fn name(&self) -> &'static str {
        "MemberAttributes"
    }

    async fn resolve(
        &self,
        member: &Member,
        access_token: &str,
    ) -> Result<Option<Etag>, AppError> {
        let member_id = member.id;
        let path = format!("/characters/{}/attributes/", member_id);
        let decode_path = path.clone();

        let synced = self
            .ctx
            .sync_entity::<MemberAttributes>(
                &member_id.to_string(),
                &path,
                Some(access_token),
                Box::new(move |data| {
                    Box::pin(async move {
                        let mut attributes: MemberAttributes = decode_body(&decode_path, data)?;
                        attributes.member_id = member_id;
                        Ok(attributes)
                    })
                }),
            )
            .await?;

        Ok(synced.etag)
    }
}

pub struct MemberSkillQueueResolver {
    ctx: SyncContext,
}

impl MemberSkillQueueResolver {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ScopeResolver for MemberSkillQueueResolver {
    fn name(&self) -> &'static str {
        "MemberSkillQueue"
    }

    async fn resolve(
        &self,
        member: &Member,
        access_token: &str,
    ) -> Result<Option<Etag>, AppError> {
        let member_id = member.id;
        let path = format!("/characters/{}/skillqueue/", member_id);
        let decode_path = path.clone();

        let synced = self
            .ctx
            .sync_entity::<MemberSkillQueue>(
                &member_id.to_string(),
                &path,
                Some(access_token),
                Box::new(move |data| {
                    Box::pin(async move {
                        Ok(MemberSkillQueue {
                            member_id,
                            items: decode_body(&decode_path, data)?,
                        })
                    })
                }),
            )
            .await?;

        Ok(synced.etag)
    }
}
