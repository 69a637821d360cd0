// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Universe reference data shared by all members.

use crate::db::{collections, Entity};
use serde::{Deserialize, Serialize};

/// Solar system from `/universe/systems/{id}/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolarSystem {
    pub system_id: i32,
    pub name: String,
    #[serde(default)]
    pub constellation_id: Option<i32>,
    #[serde(default)]
    pub security_status: Option<f64>,
}

impl Entity for SolarSystem {
    const COLLECTION: &'static str = collections::UNIVERSE_SYSTEMS;

    fn key(&self) -> String {
        self.system_id.to_string()
    }
}

/// NPC station from `/universe/stations/{id}/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub station_id: i32,
    pub name: String,
    pub system_id: i32,
    #[serde(default)]
    pub type_id: Option<i32>,
    #[serde(default)]
    pub owner: Option<i32>,
}

impl Entity for Station {
    const COLLECTION: &'static str = collections::UNIVERSE_STATIONS;

    fn key(&self) -> String {
        self.station_id.to_string()
    }
}

/// Player-owned structure from `/universe/structures/{id}/`.
///
/// ESI omits the ID from the body, so it is filled in by the resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Structure {
    #[serde(default)]
    pub structure_id: i64,
    pub name: String,
    #[serde(default)]
    pub owner_id: Option<i32>,
    pub solar_system_id: i32,
    #[serde(default)]
    pub type_id: Option<i32>,
}

impl Entity for Structure {
    const COLLECTION: &'static str = collections::UNIVERSE_STRUCTURES;

    fn key(&self) -> String {
        self.structure_id.to_string()
    }
}
