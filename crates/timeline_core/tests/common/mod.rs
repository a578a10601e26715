#![allow(dead_code)]

use rusqlite::{params, Connection};
use std::cell::RefCell;
use timeline_core::{
    Audience, AudienceSet, AuthzRequest, ClaimSet, CoreOptions, Decision, FeedBatch,
    FeedCursor, FeedResult, FeedStore, FeedStoreError, Mention, Post, PostId, Profile,
    ProfileId, ProfileRef, ShareEvent, TimelineEntry,
};
use uuid::Uuid;

pub const LOCAL: &str = "local.example";
pub const REMOTE: &str = "remote.example";

pub fn options() -> CoreOptions {
    CoreOptions::for_domain(LOCAL)
}

pub fn allow_all(_: &ClaimSet, _: &AuthzRequest) -> Decision {
    Decision::Allow
}

pub fn deny_all(_: &ClaimSet, _: &AuthzRequest) -> Decision {
    Decision::Deny
}

pub fn local_profile(handle: &str) -> Profile {
    Profile::new(Uuid::new_v4(), LOCAL, handle)
}

pub fn remote_ref() -> ProfileRef {
    ProfileRef::new(Uuid::new_v4(), REMOTE)
}

/// Published post by `author` addressed to the public.
pub fn public_post(author: &ProfileRef, published_at: i64) -> Post {
    let mut post = Post::draft(author.clone(), published_at);
    post.published_at = Some(published_at);
    post.addressed_to.push(Mention::public());
    post.contents
        .push(timeline_core::ContentBlock::from_source("hello timeline"));
    post
}

/// Total number of timeline entries, shares included.
pub fn entry_count(conn: &Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM timeline_entries;", [], |row| row.get(0))
        .unwrap()
}

/// Audiences holding the post's own entries (shares excluded).
pub fn post_audiences(conn: &Connection, post_id: PostId) -> AudienceSet {
    let mut stmt = conn
        .prepare(
            "SELECT audience_key
             FROM timeline_entries
             WHERE post_id = ?1
               AND shared_by = '';",
        )
        .unwrap();
    let keys = stmt
        .query_map(params![post_id.to_string()], |row| row.get::<_, String>(0))
        .unwrap();
    keys.map(|key| Audience::parse_key(&key.unwrap()).unwrap())
        .collect()
}

/// Staged mutation observed by [`RecordingFeedStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Add {
        post_id: PostId,
        audiences: AudienceSet,
        shared_by: Option<ProfileId>,
    },
    Remove {
        post_id: PostId,
        audiences: AudienceSet,
    },
    RemoveAll {
        post_id: PostId,
    },
    Update {
        post_id: PostId,
    },
    Commit,
    Abort,
}

/// Point at which [`RecordingFeedStore`] injects a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Start,
    Add,
    Remove,
    Update,
    Commit,
}

/// Feed store wrapper that records staged mutations and can inject failures.
pub struct RecordingFeedStore<S> {
    inner: S,
    log: RefCell<Vec<Mutation>>,
    starts: RefCell<u32>,
    fail_on: Option<FailPoint>,
}

impl<S: FeedStore> RecordingFeedStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            log: RefCell::new(Vec::new()),
            starts: RefCell::new(0),
            fail_on: None,
        }
    }

    pub fn failing_on(mut self, point: FailPoint) -> Self {
        self.fail_on = Some(point);
        self
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.log.borrow().clone()
    }

    /// Staged mutations, excluding commit/abort markers.
    pub fn staged(&self) -> Vec<Mutation> {
        self.mutations()
            .into_iter()
            .filter(|mutation| !matches!(mutation, Mutation::Commit | Mutation::Abort))
            .collect()
    }

    pub fn batches_started(&self) -> u32 {
        *self.starts.borrow()
    }

    pub fn clear(&self) {
        self.log.borrow_mut().clear();
        *self.starts.borrow_mut() = 0;
    }
}

impl<S: FeedStore> FeedStore for RecordingFeedStore<S> {
    type Batch<'a> = RecordingBatch<'a, S::Batch<'a>> where Self: 'a;

    fn start(&self) -> FeedResult<Self::Batch<'_>> {
        *self.starts.borrow_mut() += 1;
        if self.fail_on == Some(FailPoint::Start) {
            return Err(injected("start"));
        }
        Ok(RecordingBatch {
            inner: self.inner.start()?,
            log: &self.log,
            fail_on: self.fail_on,
        })
    }

    fn timeline_entries(
        &self,
        audiences: &AudienceSet,
        before: i64,
        after: Option<&FeedCursor>,
        limit: u32,
    ) -> FeedResult<Vec<TimelineEntry>> {
        self.inner.timeline_entries(audiences, before, after, limit)
    }
}

pub struct RecordingBatch<'a, B> {
    inner: B,
    log: &'a RefCell<Vec<Mutation>>,
    fail_on: Option<FailPoint>,
}

impl<B: FeedBatch> RecordingBatch<'_, B> {
    fn check(&self, point: FailPoint) -> FeedResult<()> {
        if self.fail_on == Some(point) {
            return Err(injected(&format!("{point:?}")));
        }
        Ok(())
    }
}

impl<B: FeedBatch> FeedBatch for RecordingBatch<'_, B> {
    fn add_to_timeline(
        &mut self,
        post: &Post,
        audiences: &AudienceSet,
        shared_by: Option<&ShareEvent>,
    ) -> FeedResult<()> {
        self.log.borrow_mut().push(Mutation::Add {
            post_id: post.id,
            audiences: audiences.clone(),
            shared_by: shared_by.map(|event| event.sharer.id),
        });
        self.inner.add_to_timeline(post, audiences, shared_by)?;
        self.check(FailPoint::Add)
    }

    fn remove_from_timelines(
        &mut self,
        post_id: PostId,
        audiences: &AudienceSet,
    ) -> FeedResult<()> {
        self.log.borrow_mut().push(Mutation::Remove {
            post_id,
            audiences: audiences.clone(),
        });
        self.inner.remove_from_timelines(post_id, audiences)?;
        self.check(FailPoint::Remove)
    }

    fn remove_from_all_timelines(&mut self, post_id: PostId) -> FeedResult<()> {
        self.log.borrow_mut().push(Mutation::RemoveAll { post_id });
        self.inner.remove_from_all_timelines(post_id)
    }

    fn update_timeline(&mut self, post: &Post) -> FeedResult<()> {
        self.log
            .borrow_mut()
            .push(Mutation::Update { post_id: post.id });
        self.inner.update_timeline(post)?;
        self.check(FailPoint::Update)
    }

    fn commit(self) -> FeedResult<()> {
        self.check(FailPoint::Commit)?;
        self.log.borrow_mut().push(Mutation::Commit);
        self.inner.commit()
    }

    fn abort(self) -> FeedResult<()> {
        self.log.borrow_mut().push(Mutation::Abort);
        self.inner.abort()
    }
}

fn injected(point: &str) -> FeedStoreError {
    FeedStoreError::Conflict(format!("injected failure at {point}"))
}
