//! Capability-scoped handle over a [`TimelineService`].
//!
//! # Invariants
//! - Every call made through a handle is evaluated against the handle's
//!   claim set only.
//! - `rescope` replaces the claim set; claims are never merged.

use crate::authz::claims::{CancelToken, ClaimSet, RequestContext};
use crate::authz::evaluator::Authorizer;
use crate::config::AuthorityRules;
use crate::model::post::Post;
use crate::model::profile::{ProfileId, ProfileRef};
use crate::repo::feed_repo::{FeedCursor, FeedStore};
use crate::repo::profile_repo::ProfileLookup;
use crate::service::error::TimelineError;
use crate::service::timeline_service::{FeedPage, TimelineService, UpdateOutcome};

/// Service handle bound to one caller's claims.
pub struct ScopedTimeline<'svc, F, P, A, R>
where
    F: FeedStore,
    P: ProfileLookup,
    A: Authorizer,
    R: AuthorityRules,
{
    service: &'svc TimelineService<F, P, A, R>,
    ctx: RequestContext,
}

impl<'svc, F, P, A, R> ScopedTimeline<'svc, F, P, A, R>
where
    F: FeedStore,
    P: ProfileLookup,
    A: Authorizer,
    R: AuthorityRules,
{
    pub(crate) fn new(service: &'svc TimelineService<F, P, A, R>, ctx: RequestContext) -> Self {
        Self { service, ctx }
    }

    pub fn claims(&self) -> &ClaimSet {
        self.ctx.claims()
    }

    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    /// Handle over the same service acting with `claims` instead.
    pub fn rescope(&self, claims: ClaimSet) -> Self {
        Self::new(self.service, RequestContext::new(claims))
    }

    /// Attaches a cancellation token to every later call on this handle.
    pub fn with_cancellation(self, token: CancelToken) -> Self {
        Self {
            service: self.service,
            ctx: self.ctx.with_cancellation(token),
        }
    }

    pub fn handle_publish(&self, post: &mut Post) -> Result<(), TimelineError> {
        self.service.handle_publish(&self.ctx, post)
    }

    pub fn handle_share(&self, post: &Post, shared_by: &ProfileRef) -> Result<(), TimelineError> {
        self.service.handle_share(&self.ctx, post, shared_by)
    }

    pub fn handle_update(
        &self,
        post: &mut Post,
        old_post: &Post,
    ) -> Result<UpdateOutcome, TimelineError> {
        self.service.handle_update(&self.ctx, post, old_post)
    }

    pub fn handle_delete(&self, post: &Post) -> Result<(), TimelineError> {
        self.service.handle_delete(&self.ctx, post)
    }

    pub fn get_feed(
        &self,
        profile_id: ProfileId,
        begin: i64,
        limit: Option<i64>,
    ) -> Result<FeedPage, TimelineError> {
        self.service.get_feed(&self.ctx, profile_id, begin, limit)
    }

    pub fn get_feed_after(
        &self,
        profile_id: ProfileId,
        cursor: &FeedCursor,
        limit: Option<i64>,
    ) -> Result<FeedPage, TimelineError> {
        self.service
            .get_feed_after(&self.ctx, profile_id, cursor, limit)
    }
}
