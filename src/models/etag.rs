// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cache-control records for conditional ESI fetches.

use crate::db::{collections, Entity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Validator and expiry for one mirrored entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Etag {
    /// `<collection>:<entity key>`
    pub key: String,
    /// Opaque upstream validator; empty when ESI sent none
    #[serde(default)]
    pub etag: String,
    pub cached_until: DateTime<Utc>,
}

impl Etag {
    pub fn key_for(collection: &str, entity_key: &str) -> String {
        format!("{}:{}", collection, entity_key)
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.cached_until > now
    }

    /// Validator to send as `If-None-Match`, if any.
    pub fn validator(&self) -> Option<&str> {
        (!self.etag.is_empty()).then_some(self.etag.as_str())
    }
}

impl Entity for Etag {
    const COLLECTION: &'static str = collections::ETAGS;

    fn key(&self) -> String {
        self.key.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn key_avoids_path_separators() {
        assert_eq!(Etag::key_for("member_locations", "42"), "member_locations:42");
    }

    #[test]
    fn freshness_and_validator() {
        let now = Utc::now();
        let mut etag = Etag {
            key: "k".to_string(),
            etag: String::new(),
            cached_until: now + Duration::seconds(30),
        };
        assert!(etag.is_fresh(now));
        assert_eq!(etag.validator(), None);

        etag.etag = "\"abc\"".to_string();
        etag.cached_until = now;
        assert!(!etag.is_fresh(now));
        assert_eq!(etag.validator(), Some("\"abc\""));
    }
}
