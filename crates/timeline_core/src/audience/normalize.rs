//! Canonical audience computation for posts.
//!
//! # Invariants
//! - `normalize(p)` contains `p.audience` and every local addressee of `p`.
//! - `Public ∈ normalize(p)` implies `Followers(c) ∈ normalize(p)` for every
//!   creator `c`.
//! - `normalize` is idempotent once its result is stored on the post.

use crate::audience::addressing::resolve_local_addressees;
use crate::config::{AuthorityRules, LocalAuthority};
use crate::model::audience::{Audience, AudienceSet};
use crate::model::post::Post;

/// Audience changes between two revisions of one post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AudienceDiff {
    /// Present in the new revision only.
    pub added: AudienceSet,
    /// Present in the old revision only.
    pub removed: AudienceSet,
}

impl AudienceDiff {
    /// `added = next - previous`, `removed = previous - next`.
    pub fn between(next: &AudienceSet, previous: &AudienceSet) -> Self {
        Self {
            added: next.difference(previous).copied().collect(),
            removed: previous.difference(next).copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Computes canonical audience sets using injected local-authority rules.
#[derive(Debug, Clone)]
pub struct AudienceNormalizer<R: AuthorityRules = LocalAuthority> {
    rules: R,
}

impl<R: AuthorityRules> AudienceNormalizer<R> {
    pub fn new(rules: R) -> Self {
        Self { rules }
    }

    /// Recorded audience, plus local addressees, plus creators' followers
    /// when the post is public.
    pub fn normalize(&self, post: &Post) -> AudienceSet {
        let mut result = post.audience.clone();
        result.extend(resolve_local_addressees(&post.addressed_to, &self.rules));

        // Public reach is not the same as home-feed reach; followers must get
        // public posts even when the sender did not address them.
        if result.contains(&Audience::Public) {
            result.extend(
                post.creators
                    .iter()
                    .map(|creator| Audience::followers(creator.id)),
            );
        }
        result
    }

    /// One-directional differences between the normalized audiences of
    /// `old_post` and `post`. Audiences present in both are in neither side.
    pub fn diff(&self, post: &Post, old_post: &Post) -> AudienceDiff {
        AudienceDiff::between(&self.normalize(post), &self.normalize(old_post))
    }
}
