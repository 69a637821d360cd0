// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Location and ship resolvers.

use super::sync::{decode_body, SyncContext};
use super::ScopeResolver;
use crate::error::AppError;
use crate::models::{Etag, Member, MemberLocation, MemberShip};
use async_trait::async_trait;

/// Mirrors `/characters/{id}/location/` and names the system and dock.
pub struct MemberLocationResolver {
    ctx: SyncContext,
}

impl MemberLocationResolver {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ScopeResolver for MemberLocationResolver {
    fn name(&self) -> &'static str {
        "MemberLocation"
    }

    async fn resolve(
        &self,
        member: &Member,
        access_token: &str,
    ) -> Result<Option<Etag>, AppError> {
        let member_id = member.id;
        let path = format!("/characters/{}/location/", member_id);
        let decode_path = path.clone();
        let ctx = self.ctx.clone();
        let token = access_token.to_string();

        let synced = self
            .ctx
            .sync_entity::<MemberLocation>(
                &member_id.to_string(),
                &path,
                Some(access_token),
                Box::new(move |data| {
                    Box::pin(async move {
                        let mut location: MemberLocation = decode_body(&decode_path, data)?;
                        location.member_id = member_id;

                        let system = ctx.solar_system(location.solar_system_id).await?;
                        location.solar_system_name = Some(system.name);

                        location.location_name = match (location.station_id, location.structure_id)
                        {
                            (Some(station_id), _) => Some(ctx.station(station_id).await?.name),
                            (None, Some(structure_id)) => ctx
                                .structure(structure_id, &token)
                                .await?
                                .map(|s| s.name),
                            (None, None) => None,
                        };
                        Ok(location)
                    })
                }),
            )
            .await?;

        Ok(synced.etag)
    }
}

/// Mirrors `/characters/{id}/ship/`.
pub struct MemberShipResolver {
    ctx: SyncContext,
}

impl MemberShipResolver {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ScopeResolver for MemberShipResolver {
    fn name(&self) -> &'static str {
        "MemberShip"
    }

    async fn resolve(
        &self,
        member: &Member,
        access_token: &str,
    ) -> Result<Option<Etag>, AppError> {
        let member_id = member.id;
        let path = format!("/characters/{}/ship/", member_id);
        let decode_path = path.clone();

        let synced = self
            .ctx
            .sync_entity::<MemberShip>(
                &member_id.to_string(),
                &path,
                Some(access_token),
                Box::new(move |data| {
                    Box::pin(async move {
                        let mut ship: MemberShip = decode_body(&decode_path, data)?;
                        ship.member_id = member_id;
                        Ok(ship)
                    })
                }),
            )
            .await?;

        Ok(synced.etag)
    }
}
