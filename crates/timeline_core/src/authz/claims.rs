//! Claim sets and the per-request context passed to every timeline operation.
//!
//! # Invariants
//! - A `ClaimSet` is immutable once built; scoping replaces it, never merges.
//! - A `RequestContext` lives for exactly one logical request.

use crate::model::profile::ProfileId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Claim kind naming the authenticated profile.
pub const CLAIM_SUBJECT: &str = "sub";
/// Claim kind naming a role, e.g. `admin` or `system`.
pub const CLAIM_ROLE: &str = "role";

/// One authenticated assertion.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Claim {
    pub kind: String,
    pub value: String,
}

impl Claim {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }

    pub fn subject(profile_id: ProfileId) -> Self {
        Self::new(CLAIM_SUBJECT, profile_id.to_string())
    }

    pub fn role(role: impl Into<String>) -> Self {
        Self::new(CLAIM_ROLE, role)
    }
}

/// Immutable list of claims presented by one caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimSet {
    claims: Arc<[Claim]>,
}

impl Default for ClaimSet {
    fn default() -> Self {
        Self {
            claims: Arc::from(Vec::new()),
        }
    }
}

impl ClaimSet {
    pub fn new(claims: impl IntoIterator<Item = Claim>) -> Self {
        Self {
            claims: claims.into_iter().collect(),
        }
    }

    /// Claim set with no assertions.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Claim> {
        self.claims.iter()
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    pub fn has(&self, kind: &str, value: &str) -> bool {
        self.claims
            .iter()
            .any(|claim| claim.kind == kind && claim.value == value)
    }

    pub fn values<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.claims
            .iter()
            .filter(move |claim| claim.kind == kind)
            .map(|claim| claim.value.as_str())
    }

    /// Profile id from the first parseable subject claim.
    pub fn subject(&self) -> Option<ProfileId> {
        self.values(CLAIM_SUBJECT)
            .find_map(|value| Uuid::parse_str(value).ok())
    }
}

impl FromIterator<Claim> for ClaimSet {
    fn from_iter<T: IntoIterator<Item = Claim>>(iter: T) -> Self {
        Self::new(iter)
    }
}

/// Cooperative cancellation flag shared between a caller and one request.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Capability context for one logical request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    claims: ClaimSet,
    cancel: Option<CancelToken>,
}

impl RequestContext {
    pub fn new(claims: ClaimSet) -> Self {
        Self {
            claims,
            cancel: None,
        }
    }

    /// Attaches a cancellation token checked at every store interaction.
    pub fn with_cancellation(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn claims(&self) -> &ClaimSet {
        &self.claims
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(CancelToken::is_cancelled)
    }
}
