// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! ESI OAuth scope identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An ESI scope grant. Unknown scope strings are preserved as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Scope {
    ReadLocation,
    ReadShipType,
    ReadClones,
    ReadImplants,
    ReadSkills,
    ReadSkillQueue,
    ReadWallet,
    ReadContacts,
    ReadStructures,
    Other(String),
}

impl Scope {
    /// Every scope requested at login.
    pub const REQUESTED: &'static [Scope] = &[
        Scope::ReadLocation,
        Scope::ReadShipType,
        Scope::ReadClones,
        Scope::ReadImplants,
        Scope::ReadSkills,
        Scope::ReadSkillQueue,
        Scope::ReadWallet,
        Scope::ReadContacts,
        Scope::ReadStructures,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Scope::ReadLocation => "esi-location.read_location.v1",
            Scope::ReadShipType => "esi-location.read_ship_type.v1",
            Scope::ReadClones => "esi-clones.read_clones.v1",
            Scope::ReadImplants => "esi-clones.read_implants.v1",
            Scope::ReadSkills => "esi-skills.read_skills.v1",
            Scope::ReadSkillQueue => "esi-skills.read_skillqueue.v1",
            Scope::ReadWallet => "esi-wallet.read_character_wallet.v1",
            Scope::ReadContacts => "esi-characters.read_contacts.v1",
            Scope::ReadStructures => "esi-universe.read_structures.v1",
            Scope::Other(raw) => raw,
        }
    }

    /// Space-separated scope list for the SSO authorize URL.
    pub fn requested_scope_param() -> String {
        Self::REQUESTED
            .iter()
            .map(Scope::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl From<String> for Scope {
    fn from(raw: String) -> Self {
        Self::REQUESTED
            .iter()
            .find(|s| s.as_str() == raw)
            .cloned()
            .unwrap_or(Scope::Other(raw))
    }
}

impl From<&str> for Scope {
    fn from(raw: &str) -> Self {
        Scope::from(raw.to_string())
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        match scope {
            Scope::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
