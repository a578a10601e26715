//! Audience value types.
//!
//! # Responsibility
//! - Define the recipient groups a post can be visible to.
//! - Provide stable storage keys so audience sets can be persisted and diffed.
//!
//! # Invariants
//! - Two audiences are equal iff discriminant and referenced id match.
//! - `AudienceSet` iteration order is deterministic (`Ord` derive).
//! - `Audience::parse_key(a.storage_key()) == Some(a)` for every audience.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

use super::profile::ProfileId;

/// Deduplicated, ordered set of audiences attached to a post or profile.
pub type AudienceSet = BTreeSet<Audience>;

const PUBLIC_KEY: &str = "public";
const FOLLOWERS_PREFIX: &str = "followers:";
const ADDRESSED_PREFIX: &str = "addressed:";

/// One recipient group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "profile_id", rename_all = "snake_case")]
pub enum Audience {
    /// Everyone, including unauthenticated readers.
    Public,
    /// Followers of the referenced profile.
    Followers(ProfileId),
    /// One addressed individual or group.
    Addressed(ProfileId),
}

impl Audience {
    /// Audience for followers of `owner`.
    pub fn followers(owner: ProfileId) -> Self {
        Self::Followers(owner)
    }

    /// Audience for one addressed subject.
    pub fn addressed(subject: ProfileId) -> Self {
        Self::Addressed(subject)
    }

    /// Stable string key used by persistence adapters.
    pub fn storage_key(&self) -> String {
        match self {
            Self::Public => PUBLIC_KEY.to_string(),
            Self::Followers(id) => format!("{FOLLOWERS_PREFIX}{id}"),
            Self::Addressed(id) => format!("{ADDRESSED_PREFIX}{id}"),
        }
    }

    /// Parses a key produced by [`Audience::storage_key`].
    pub fn parse_key(value: &str) -> Option<Self> {
        if value == PUBLIC_KEY {
            return Some(Self::Public);
        }
        if let Some(rest) = value.strip_prefix(FOLLOWERS_PREFIX) {
            return Uuid::parse_str(rest).ok().map(Self::Followers);
        }
        if let Some(rest) = value.strip_prefix(ADDRESSED_PREFIX) {
            return Uuid::parse_str(rest).ok().map(Self::Addressed);
        }
        None
    }
}

impl Display for Audience {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.storage_key())
    }
}
