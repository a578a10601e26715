//! Timeline fan-out engine and feed read path.
//!
//! # Responsibility
//! - Translate post lifecycle events (publish/share/update/delete) into
//!   batched feed-store mutations.
//! - Read one profile's home feed across its subscribed audiences.
//!
//! # Invariants
//! - Every operation asks the authorizer before touching the store.
//! - Every mutating operation stages into exactly one batch and commits once.
//! - A failed, denied or cancelled operation leaves the store unchanged.
//! - Update fan-out adds only newly reached audiences and removes only
//!   audiences the post no longer reaches.
//! - Log events carry ids, counts and durations only, never post content.

use crate::audience::normalize::{AudienceDiff, AudienceNormalizer};
use crate::authz::claims::{ClaimSet, RequestContext};
use crate::authz::evaluator::{Authorizer, AuthzRequest, AuthzResource};
use crate::config::{AuthorityRules, CoreOptions, LocalAuthority, FEED_LIMIT_MAX};
use crate::model::audience::{Audience, AudienceSet};
use crate::model::post::Post;
use crate::model::profile::{ProfileId, ProfileRef};
use crate::repo::feed_repo::{FeedBatch, FeedCursor, FeedResult, FeedStore, TimelineEntry};
use crate::repo::profile_repo::ProfileLookup;
use crate::service::error::{EntityKind, TimelineError, TimelineOperation};
use crate::service::scoped::ScopedTimeline;
use log::{debug, error, info, warn};
use std::time::Instant;
use uuid::Uuid;

/// Summary of one applied update fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Audiences the post newly reached.
    pub added: AudienceSet,
    /// Audiences the post no longer reaches.
    pub removed: AudienceSet,
    /// Whether stored content was refreshed in place.
    pub refreshed: bool,
}

impl UpdateOutcome {
    /// Whether the update changed nothing in the feed store.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && !self.refreshed
    }
}

/// One page of a profile feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedPage {
    /// Entries sorted newest first.
    pub entries: Vec<TimelineEntry>,
    /// Effective normalized limit used by the query.
    pub applied_limit: u32,
    /// Position to resume from with [`TimelineService::get_feed_after`];
    /// `None` once the feed is exhausted.
    pub next_cursor: Option<FeedCursor>,
}

impl FeedPage {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Posts in page order.
    pub fn posts(&self) -> impl Iterator<Item = &Post> {
        self.entries.iter().map(|entry| &entry.post)
    }
}

impl IntoIterator for FeedPage {
    type Item = TimelineEntry;
    type IntoIter = std::vec::IntoIter<TimelineEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Fan-out engine over injected feed, profile and authorization collaborators.
///
/// The service holds no mutable state, so one instance can serve concurrent
/// requests; each request supplies its own [`RequestContext`].
pub struct TimelineService<F, P, A, R = LocalAuthority>
where
    F: FeedStore,
    P: ProfileLookup,
    A: Authorizer,
    R: AuthorityRules,
{
    feeds: F,
    profiles: P,
    authorizer: A,
    normalizer: AudienceNormalizer<R>,
    feed_page_limit: u32,
}

impl<F, P, A> TimelineService<F, P, A>
where
    F: FeedStore,
    P: ProfileLookup,
    A: Authorizer,
{
    /// Creates a service using `options`' local authorities and page size.
    pub fn new(feeds: F, profiles: P, authorizer: A, options: &CoreOptions) -> Self {
        Self::with_normalizer(
            feeds,
            profiles,
            authorizer,
            AudienceNormalizer::new(options.local_authority()),
            options.feed_page_limit,
        )
    }
}

impl<F, P, A, R> TimelineService<F, P, A, R>
where
    F: FeedStore,
    P: ProfileLookup,
    A: Authorizer,
    R: AuthorityRules,
{
    /// Creates a service with explicit normalizer rules.
    pub fn with_normalizer(
        feeds: F,
        profiles: P,
        authorizer: A,
        normalizer: AudienceNormalizer<R>,
        feed_page_limit: u32,
    ) -> Self {
        Self {
            feeds,
            profiles,
            authorizer,
            normalizer,
            feed_page_limit,
        }
    }

    pub fn feeds(&self) -> &F {
        &self.feeds
    }

    /// Handle acting on behalf of `claims` for every call made through it.
    pub fn scoped(&self, claims: ClaimSet) -> ScopedTimeline<'_, F, P, A, R> {
        ScopedTimeline::new(self, RequestContext::new(claims))
    }

    /// Fans a post out to its normalized audience.
    ///
    /// On success `post.audience` holds the normalized set. On failure the
    /// post is left untouched.
    pub fn handle_publish(
        &self,
        ctx: &RequestContext,
        post: &mut Post,
    ) -> Result<(), TimelineError> {
        let operation = TimelineOperation::Publish;
        let started_at = Instant::now();
        let result = self.publish(ctx, post);
        match &result {
            Ok(()) => info!(
                "event={} module=timeline status=ok post_id={} audiences={} duration_ms={}",
                operation.event(),
                post.id,
                post.audience.len(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => log_failure(operation, post.id, started_at, err),
        }
        result
    }

    /// Fans a boost out to the sharer's followers.
    ///
    /// `shared_by` must have a share event recorded on `post`; the most
    /// recent one orders the resulting entries.
    pub fn handle_share(
        &self,
        ctx: &RequestContext,
        post: &Post,
        shared_by: &ProfileRef,
    ) -> Result<(), TimelineError> {
        let operation = TimelineOperation::Share;
        let started_at = Instant::now();
        let result = self.share(ctx, post, shared_by);
        match &result {
            Ok(()) => info!(
                "event={} module=timeline status=ok post_id={} sharer_id={} duration_ms={}",
                operation.event(),
                post.id,
                shared_by.id,
                started_at.elapsed().as_millis()
            ),
            Err(err) => log_failure(operation, post.id, started_at, err),
        }
        result
    }

    /// Re-fans an edited post against its previous revision.
    ///
    /// On success `post.audience` holds the new normalized set.
    pub fn handle_update(
        &self,
        ctx: &RequestContext,
        post: &mut Post,
        old_post: &Post,
    ) -> Result<UpdateOutcome, TimelineError> {
        let operation = TimelineOperation::Update;
        let started_at = Instant::now();
        let result = self.update(ctx, post, old_post);
        match &result {
            Ok(outcome) => info!(
                "event={} module=timeline status=ok post_id={} added={} removed={} refreshed={} duration_ms={}",
                operation.event(),
                post.id,
                outcome.added.len(),
                outcome.removed.len(),
                outcome.refreshed,
                started_at.elapsed().as_millis()
            ),
            Err(err) => log_failure(operation, post.id, started_at, err),
        }
        result
    }

    /// Removes a post, and every boost of it, from all timelines.
    pub fn handle_delete(&self, ctx: &RequestContext, post: &Post) -> Result<(), TimelineError> {
        let operation = TimelineOperation::Delete;
        let started_at = Instant::now();
        let result = self.delete(ctx, post);
        match &result {
            Ok(()) => info!(
                "event={} module=timeline status=ok post_id={} duration_ms={}",
                operation.event(),
                post.id,
                started_at.elapsed().as_millis()
            ),
            Err(err) => log_failure(operation, post.id, started_at, err),
        }
        result
    }

    /// Reads one page of `profile_id`'s feed with `entry_time <= begin`.
    ///
    /// `limit` is normalized with [`normalize_feed_limit`].
    pub fn get_feed(
        &self,
        ctx: &RequestContext,
        profile_id: ProfileId,
        begin: i64,
        limit: Option<i64>,
    ) -> Result<FeedPage, TimelineError> {
        self.logged_read(ctx, profile_id, begin, None, limit)
    }

    /// Reads the page following `cursor`, as returned in
    /// [`FeedPage::next_cursor`].
    pub fn get_feed_after(
        &self,
        ctx: &RequestContext,
        profile_id: ProfileId,
        cursor: &FeedCursor,
        limit: Option<i64>,
    ) -> Result<FeedPage, TimelineError> {
        self.logged_read(ctx, profile_id, cursor.entry_time, Some(cursor), limit)
    }

    fn logged_read(
        &self,
        ctx: &RequestContext,
        profile_id: ProfileId,
        begin: i64,
        after: Option<&FeedCursor>,
        limit: Option<i64>,
    ) -> Result<FeedPage, TimelineError> {
        let operation = TimelineOperation::GetFeed;
        let started_at = Instant::now();
        let result = self.read_feed(ctx, profile_id, begin, after, limit);
        match &result {
            Ok(page) => info!(
                "event={} module=timeline status=ok profile_id={profile_id} entries={} applied_limit={} resumed={} duration_ms={}",
                operation.event(),
                page.len(),
                page.applied_limit,
                after.is_some(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => log_failure(operation, profile_id, started_at, err),
        }
        result
    }

    fn publish(&self, ctx: &RequestContext, post: &mut Post) -> Result<(), TimelineError> {
        let operation = TimelineOperation::Publish;
        self.authorize(ctx, operation, post_resource(post))?;

        let audience = self.normalizer.normalize(post);
        if audience.is_empty() {
            return Err(TimelineError::precondition(
                operation,
                format!("post {} has no audience to publish to", post.id),
            ));
        }

        let staged = with_audience(post, audience.clone());
        let mut batch = self.feeds.start().map_err(TimelineError::store(operation))?;
        stage(ctx, operation, &mut batch, |batch| {
            batch.add_to_timeline(&staged, &audience, None)
        })?;
        commit(ctx, operation, batch)?;

        post.audience = audience;
        Ok(())
    }

    fn share(
        &self,
        ctx: &RequestContext,
        post: &Post,
        shared_by: &ProfileRef,
    ) -> Result<(), TimelineError> {
        let operation = TimelineOperation::Share;
        self.authorize(
            ctx,
            operation,
            AuthzResource::Share {
                post_id: post.id,
                sharer: shared_by.id,
            },
        )?;

        let event = post.latest_share_by(shared_by).ok_or_else(|| {
            TimelineError::precondition(
                operation,
                format!("post {} has no share recorded for {}", post.id, shared_by.id),
            )
        })?;
        let audiences = AudienceSet::from([Audience::followers(shared_by.id)]);

        let mut batch = self.feeds.start().map_err(TimelineError::store(operation))?;
        stage(ctx, operation, &mut batch, |batch| {
            batch.add_to_timeline(post, &audiences, Some(event))
        })?;
        commit(ctx, operation, batch)
    }

    fn update(
        &self,
        ctx: &RequestContext,
        post: &mut Post,
        old_post: &Post,
    ) -> Result<UpdateOutcome, TimelineError> {
        let operation = TimelineOperation::Update;
        self.authorize(ctx, operation, post_resource(post))?;
        if post.id != old_post.id {
            return Err(TimelineError::precondition(
                operation,
                format!(
                    "revision ids differ: post {} vs old post {}",
                    post.id, old_post.id
                ),
            ));
        }

        let audience = self.normalizer.normalize(post);
        let AudienceDiff { added, removed } = self.normalizer.diff(post, old_post);
        let outcome = UpdateOutcome {
            added,
            removed,
            refreshed: post.preview() != old_post.preview(),
        };
        if outcome.is_noop() {
            debug!(
                "event={} module=timeline status=noop post_id={}",
                operation.event(),
                post.id
            );
            post.audience = audience;
            return Ok(outcome);
        }

        let staged = with_audience(post, audience.clone());
        let mut batch = self.feeds.start().map_err(TimelineError::store(operation))?;
        if !outcome.added.is_empty() {
            stage(ctx, operation, &mut batch, |batch| {
                batch.add_to_timeline(&staged, &outcome.added, None)
            })?;
        }
        if !outcome.removed.is_empty() {
            stage(ctx, operation, &mut batch, |batch| {
                batch.remove_from_timelines(staged.id, &outcome.removed)
            })?;
        }
        if outcome.refreshed {
            stage(ctx, operation, &mut batch, |batch| {
                batch.update_timeline(&staged)
            })?;
        }
        commit(ctx, operation, batch)?;

        // Full set of the new revision; only `outcome.added` was fanned out.
        post.audience = audience;
        Ok(outcome)
    }

    fn delete(&self, ctx: &RequestContext, post: &Post) -> Result<(), TimelineError> {
        let operation = TimelineOperation::Delete;
        self.authorize(ctx, operation, post_resource(post))?;

        let mut batch = self.feeds.start().map_err(TimelineError::store(operation))?;
        stage(ctx, operation, &mut batch, |batch| {
            batch.remove_from_all_timelines(post.id)
        })?;
        commit(ctx, operation, batch)
    }

    fn read_feed(
        &self,
        ctx: &RequestContext,
        profile_id: ProfileId,
        begin: i64,
        after: Option<&FeedCursor>,
        limit: Option<i64>,
    ) -> Result<FeedPage, TimelineError> {
        let operation = TimelineOperation::GetFeed;
        self.authorize(ctx, operation, AuthzResource::Feed { profile_id })?;
        ensure_active(ctx, operation)?;

        let profile = self
            .profiles
            .lookup_profile(profile_id)
            .map_err(|source| TimelineError::Lookup { operation, source })?
            .ok_or_else(|| TimelineError::MissingData {
                operation,
                kind: EntityKind::Profile,
                key: profile_id.to_string(),
            })?;

        let applied_limit = normalize_feed_limit(limit, self.feed_page_limit);
        let entries = self
            .feeds
            .timeline_entries(&profile.audiences, begin, after, applied_limit)
            .map_err(TimelineError::store(operation))?;
        let next_cursor = next_cursor(&entries, applied_limit);

        Ok(FeedPage {
            entries,
            applied_limit,
            next_cursor,
        })
    }

    fn authorize(
        &self,
        ctx: &RequestContext,
        operation: TimelineOperation,
        resource: AuthzResource,
    ) -> Result<(), TimelineError> {
        let request = AuthzRequest {
            action: operation.action(),
            resource,
        };
        if self.authorizer.evaluate(ctx.claims(), &request).is_allowed() {
            return Ok(());
        }
        Err(TimelineError::Denied {
            operation,
            action: request.action,
        })
    }
}

/// Normalizes feed page size.
///
/// - `None` -> `default_limit`
/// - `<= 0` -> `1`
/// - above [`FEED_LIMIT_MAX`] -> [`FEED_LIMIT_MAX`]
pub fn normalize_feed_limit(limit: Option<i64>, default_limit: u32) -> u32 {
    match limit {
        None => default_limit.clamp(1, FEED_LIMIT_MAX),
        Some(value) if value <= 0 => 1,
        Some(value) => u32::try_from(value)
            .unwrap_or(FEED_LIMIT_MAX)
            .min(FEED_LIMIT_MAX),
    }
}

fn next_cursor(entries: &[TimelineEntry], applied_limit: u32) -> Option<FeedCursor> {
    if entries.len() < applied_limit as usize {
        return None;
    }
    entries.last().map(FeedCursor::at)
}

fn post_resource(post: &Post) -> AuthzResource {
    AuthzResource::Post {
        post_id: post.id,
        creators: post.creators.iter().map(|creator| creator.id).collect(),
    }
}

fn with_audience(post: &Post, audience: AudienceSet) -> Post {
    Post {
        audience,
        ..post.clone()
    }
}

fn ensure_active(ctx: &RequestContext, operation: TimelineOperation) -> Result<(), TimelineError> {
    if ctx.is_cancelled() {
        return Err(TimelineError::Cancelled { operation });
    }
    Ok(())
}

/// Stages one mutation after checking for cancellation.
///
/// An error leaves the batch to be dropped by the caller, which rolls it back.
fn stage<B: FeedBatch>(
    ctx: &RequestContext,
    operation: TimelineOperation,
    batch: &mut B,
    mutation: impl FnOnce(&mut B) -> FeedResult<()>,
) -> Result<(), TimelineError> {
    ensure_active(ctx, operation)?;
    mutation(batch).map_err(TimelineError::store(operation))
}

fn commit<B: FeedBatch>(
    ctx: &RequestContext,
    operation: TimelineOperation,
    batch: B,
) -> Result<(), TimelineError> {
    if ctx.is_cancelled() {
        batch.abort().map_err(TimelineError::store(operation))?;
        return Err(TimelineError::Cancelled { operation });
    }
    batch.commit().map_err(TimelineError::store(operation))
}

fn log_failure(operation: TimelineOperation, target: Uuid, started_at: Instant, err: &TimelineError) {
    let duration_ms = started_at.elapsed().as_millis();
    match err {
        TimelineError::Store { .. } | TimelineError::Lookup { .. } => error!(
            "event={} module=timeline status=error target={target} duration_ms={duration_ms} error_code={} retriable={}",
            operation.event(),
            err.code(),
            err.is_retriable()
        ),
        _ => warn!(
            "event={} module=timeline status=rejected target={target} duration_ms={duration_ms} error_code={}",
            operation.event(),
            err.code()
        ),
    }
}
