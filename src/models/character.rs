// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-member records mirrored from ESI character endpoints.
//!
//! Field names follow the ESI response bodies so object payloads decode
//! directly; `member_id` is absent upstream and filled in by the resolver.

use crate::db::{collections, Entity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! member_entity {
    ($ty:ty, $collection:expr) => {
        impl Entity for $ty {
            const COLLECTION: &'static str = $collection;

            fn key(&self) -> String {
                self.member_id.to_string()
            }
        }
    };
}

/// Current location, with names of the referenced universe objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(ts_rs::TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MemberLocation {
    #[serde(default)]
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub member_id: u64,
    pub solar_system_id: i32,
    #[serde(default)]
    pub station_id: Option<i32>,
    #[serde(default)]
    #[cfg_attr(feature = "binding-generation", ts(type = "number | null"))]
    pub structure_id: Option<i64>,
    #[serde(default)]
    pub solar_system_name: Option<String>,
    /// Station or structure name; `None` in space or when the structure is
    /// not visible to this member
    #[serde(default)]
    pub location_name: Option<String>,
}
member_entity!(MemberLocation, collections::MEMBER_LOCATIONS);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberShip {
    #[serde(default)]
    pub member_id: u64,
    pub ship_item_id: i64,
    pub ship_name: String,
    pub ship_type_id: i32,
}
member_entity!(MemberShip, collections::MEMBER_SHIPS);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeLocation {
    pub location_id: i64,
    pub location_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JumpClone {
    pub jump_clone_id: i32,
    pub location_id: i64,
    pub location_type: String,
    #[serde(default)]
    pub implants: Vec<i32>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberClones {
    #[serde(default)]
    pub member_id: u64,
    #[serde(default)]
    pub home_location: Option<HomeLocation>,
    #[serde(default)]
    pub jump_clones: Vec<JumpClone>,
    #[serde(default)]
    pub last_clone_jump_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_station_change_date: Option<DateTime<Utc>>,
}
member_entity!(MemberClones, collections::MEMBER_CLONES);

/// Active implant type IDs. ESI returns a bare array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberImplants {
    pub member_id: u64,
    pub implant_type_ids: Vec<i32>,
}
member_entity!(MemberImplants, collections::MEMBER_IMPLANTS);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub skill_id: i32,
    pub active_skill_level: i32,
    pub trained_skill_level: i32,
    pub skillpoints_in_skill: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSkills {
    #[serde(default)]
    pub member_id: u64,
    pub skills: Vec<Skill>,
    pub total_sp: i64,
    #[serde(default)]
    pub unallocated_sp: Option<i32>,
}
member_entity!(MemberSkills, collections::MEMBER_SKILLS);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberAttributes {
    #[serde(default)]
    pub member_id: u64,
    pub charisma: i32,
    pub intelligence: i32,
    pub memory: i32,
    pub perception: i32,
    pub willpower: i32,
    #[serde(default)]
    pub bonus_remaps: Option<i32>,
    #[serde(default)]
    pub last_remap_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub accrued_remap_cooldown_date: Option<DateTime<Utc>>,
}
member_entity!(MemberAttributes, collections::MEMBER_ATTRIBUTES);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillQueueItem {
    pub skill_id: i32,
    pub finished_level: i32,
    pub queue_position: i32,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finish_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub training_start_sp: Option<i32>,
    #[serde(default)]
    pub level_start_sp: Option<i32>,
    #[serde(default)]
    pub level_end_sp: Option<i32>,
}

/// Skill queue in queue order. ESI returns a bare array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSkillQueue {
    pub member_id: u64,
    pub items: Vec<SkillQueueItem>,
}
member_entity!(MemberSkillQueue, collections::MEMBER_SKILL_QUEUES);

/// ISK balance. ESI returns a bare number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberWalletBalance {
    pub member_id: u64,
    pub balance: f64,
}
member_entity!(MemberWalletBalance, collections::MEMBER_WALLET_BALANCES);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub contact_id: i64,
    pub contact_type: String,
    pub standing: f64,
    #[serde(default)]
    pub is_watched: Option<bool>,
    #[serde(default)]
    pub is_blocked: Option<bool>,
    #[serde(default)]
    pub label_ids: Vec<i64>,
}

/// First page of the member's contact list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberContacts {
    pub member_id: u64,
    pub contacts: Vec<Contact>,
}
member_entity!(MemberContacts, collections::MEMBER_CONTACTS);
