//! Authorization evaluator contract.

use crate::authz::claims::{ClaimSet, CLAIM_ROLE};
use crate::model::post::PostId;
use crate::model::profile::ProfileId;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

/// Action string for publishing a post into timelines.
pub const ACTION_PUBLISH: &str = "timeline.publish";
/// Action string for fanning out a share.
pub const ACTION_SHARE: &str = "timeline.share";
/// Action string for re-fanning an edited post.
pub const ACTION_UPDATE: &str = "timeline.update";
/// Action string for removing a post from timelines.
pub const ACTION_DELETE: &str = "timeline.delete";
/// Action string for reading a profile feed.
pub const ACTION_READ_FEED: &str = "timeline.read_feed";

/// Operation a caller asks to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimelineAction {
    Publish,
    Share,
    Update,
    Delete,
    ReadFeed,
}

impl TimelineAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Publish => ACTION_PUBLISH,
            Self::Share => ACTION_SHARE,
            Self::Update => ACTION_UPDATE,
            Self::Delete => ACTION_DELETE,
            Self::ReadFeed => ACTION_READ_FEED,
        }
    }
}

impl Display for TimelineAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource an action targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthzResource {
    /// A post, with its creators for ownership checks.
    Post {
        post_id: PostId,
        creators: BTreeSet<ProfileId>,
    },
    /// A share of a post by one profile.
    Share { post_id: PostId, sharer: ProfileId },
    /// One profile's feed.
    Feed { profile_id: ProfileId },
}

/// One authorization question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthzRequest {
    pub action: TimelineAction,
    pub resource: AuthzResource,
}

/// Evaluator verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Policy seam: decides whether `claims` may perform `request`.
pub trait Authorizer {
    fn evaluate(&self, claims: &ClaimSet, request: &AuthzRequest) -> Decision;
}

impl<F> Authorizer for F
where
    F: Fn(&ClaimSet, &AuthzRequest) -> Decision,
{
    fn evaluate(&self, claims: &ClaimSet, request: &AuthzRequest) -> Decision {
        self(claims, request)
    }
}

/// Subject-ownership policy with privileged roles.
///
/// - Privileged roles may perform every action.
/// - Post actions require the subject to be one of the creators.
/// - Shares require the subject to be the sharer.
/// - Feed reads require the subject to own the feed.
#[derive(Debug, Clone, Default)]
pub struct ClaimPolicy {
    privileged_roles: BTreeSet<String>,
}

impl ClaimPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_privileged_role(mut self, role: impl Into<String>) -> Self {
        self.privileged_roles.insert(role.into());
        self
    }
}

impl Authorizer for ClaimPolicy {
    fn evaluate(&self, claims: &ClaimSet, request: &AuthzRequest) -> Decision {
        if claims
            .values(CLAIM_ROLE)
            .any(|role| self.privileged_roles.contains(role))
        {
            return Decision::Allow;
        }

        let Some(subject) = claims.subject() else {
            return Decision::Deny;
        };
        let allowed = match &request.resource {
            AuthzResource::Post { creators, .. } => creators.contains(&subject),
            AuthzResource::Share { sharer, .. } => *sharer == subject,
            AuthzResource::Feed { profile_id } => *profile_id == subject,
        };
        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}
