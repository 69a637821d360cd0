// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod character;
pub mod etag;
pub mod member;
pub mod scope;
pub mod universe;

pub use character::{
    Contact, HomeLocation, JumpClone, MemberAttributes, MemberClones, MemberContacts,
    MemberImplants, MemberLocation, MemberShip, MemberSkillQueue, MemberSkills,
    MemberWalletBalance, Skill, SkillQueueItem,
};
pub use etag::Etag;
pub use member::{Member, MemberScope, MemberSummary, ScopeStatus};
pub use scope::Scope;
pub use universe::{SolarSystem, Station, Structure};
