// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Universe lookups used to resolve secondary references.

use super::sync::{decode_body, SyncContext};
use crate::error::AppError;
use crate::models::{SolarSystem, Station, Structure};

impl SyncContext {
    pub async fn solar_system(&self, system_id: i32) -> Result<SolarSystem, AppError> {
        let path = format!("/universe/systems/{}/", system_id);
        let decode_path = path.clone();
        let synced = self
            .sync_entity::<SolarSystem>(
                &system_id.to_string(),
                &path,
                None,
                Box::new(move |data| Box::pin(async move { decode_body(&decode_path, data) })),
            )
            .await?;
        Ok(synced.record)
    }

    pub async fn station(&self, station_id: i32) -> Result<Station, AppError> {
        let path = format!("/universe/stations/{}/", station_id);
        let decode_path = path.clone();
        let synced = self
            .sync_entity::<Station>(
                &station_id.to_string(),
                &path,
                None,
                Box::new(move |data| Box::pin(async move { decode_body(&decode_path, data) })),
            )
            .await?;
        Ok(synced.record)
    }

    /// Structure lookups need docking access; `None` if ESI refuses (403).
    pub async fn structure(
        &self,
        structure_id: i64,
        access_token: &str,
    ) -> Result<Option<Structure>, AppError> {
        let path = format!("/universe/structures/{}/", structure_id);
        let decode_path = path.clone();
        let result = self
            .sync_entity::<Structure>(
                &structure_id.to_string(),
                &path,
                Some(access_token),
                Box::new(move |data| {
                    Box::pin(async move {
                        let mut structure: Structure = decode_body(&decode_path, data)?;
                        structure.structure_id = structure_id;
                        Ok(structure)
                    })
                }),
            )
            .await;

        match result {
            Ok(synced) => Ok(Some(synced.record)),
            Err(e) if e.is_forbidden() => {
                tracing::debug!(structure_id, "Structure not visible to member");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
