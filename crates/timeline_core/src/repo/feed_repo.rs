//! Feed store contracts and SQLite implementation.
//!
//! # Responsibility
//! - Define the batch-scoped mutation contract the fan-out engine stages into.
//! - Persist timeline entries and post snapshots in SQLite.
//!
//! # Invariants
//! - Mutations are only reachable through an open [`FeedBatch`].
//! - A batch is applied entirely on `commit` or not at all; dropping an
//!   uncommitted batch rolls it back.
//! - Re-adding an existing `(post, audience, sharer)` entry keeps the original
//!   ordering position.
//! - Write paths call `Post::validate()` before SQL mutations.

use crate::db::{is_contention, DbError};
use crate::model::audience::{Audience, AudienceSet};
use crate::model::post::{Post, PostId, PostValidationError, ShareEvent};
use crate::model::profile::{ProfileId, ProfileRef};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Marker stored in `timeline_entries.shared_by` for a post's own entries.
const ORIGINAL_ENTRY: &str = "";

pub type FeedResult<T> = Result<T, FeedStoreError>;

/// Feed store failure.
#[derive(Debug)]
pub enum FeedStoreError {
    Validation(PostValidationError),
    Db(DbError),
    /// Lock contention or a stale revision; safe to retry the whole operation.
    Conflict(String),
    /// Transport-level failure reported by a non-SQLite store; retriable.
    Transient(String),
    InvalidData(String),
}

impl FeedStoreError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Transient(_))
    }
}

impl Display for FeedStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Conflict(message) => write!(f, "feed store conflict: {message}"),
            Self::Transient(message) => write!(f, "transient feed store failure: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted timeline data: {message}"),
        }
    }
}

impl Error for FeedStoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Conflict(_) | Self::Transient(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<PostValidationError> for FeedStoreError {
    fn from(value: PostValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for FeedStoreError {
    fn from(value: DbError) -> Self {
        if value.is_contention() {
            return Self::Conflict(value.to_string());
        }
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for FeedStoreError {
    fn from(value: rusqlite::Error) -> Self {
        if is_contention(&value) {
            return Self::Conflict(value.to_string());
        }
        Self::Db(DbError::Sqlite(value))
    }
}

/// One feed row returned by the read path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    pub post: Post,
    /// Audience through which the entry reached the reader.
    pub audience: Audience,
    /// Sharer for boost entries, `None` for the post's own entries.
    pub shared_by: Option<ProfileRef>,
    /// Page-ordering timestamp (Unix epoch milliseconds).
    pub entry_time: i64,
}

/// Keyset position of one entry in feed order.
///
/// Feeds sort by `(entry_time, post_id, shared_by)` descending; a read
/// resumed from a cursor starts strictly after the entry it was taken from,
/// so entries sharing a millisecond are neither repeated nor skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeedCursor {
    pub entry_time: i64,
    pub post_id: PostId,
    pub shared_by: Option<ProfileId>,
}

impl FeedCursor {
    /// Cursor positioned at `entry`.
    pub fn at(entry: &TimelineEntry) -> Self {
        Self {
            entry_time: entry.entry_time,
            post_id: entry.post.id,
            shared_by: entry.shared_by.as_ref().map(|sharer| sharer.id),
        }
    }

    fn shared_by_key(&self) -> String {
        self.shared_by
            .map_or_else(|| ORIGINAL_ENTRY.to_string(), |id| id.to_string())
    }
}

/// Pending feed mutations applied atomically on [`FeedBatch::commit`].
pub trait FeedBatch {
    /// Adds `post` to the timelines of `audiences`.
    ///
    /// With `shared_by`, the entries are attributed to the sharer and ordered
    /// by the share time instead of the post time.
    fn add_to_timeline(
        &mut self,
        post: &Post,
        audiences: &AudienceSet,
        shared_by: Option<&ShareEvent>,
    ) -> FeedResult<()>;
    /// Removes the post's own entries for exactly `audiences`.
    fn remove_from_timelines(&mut self, post_id: PostId, audiences: &AudienceSet)
        -> FeedResult<()>;
    /// Removes every entry of the post from every timeline.
    fn remove_from_all_timelines(&mut self, post_id: PostId) -> FeedResult<()>;
    /// Refreshes post content in place without touching audience membership.
    fn update_timeline(&mut self, post: &Post) -> FeedResult<()>;
    /// Applies all staged mutations as one unit.
    fn commit(self) -> FeedResult<()>;
    /// Discards all staged mutations.
    fn abort(self) -> FeedResult<()>;
}

/// Feed store contract consumed by the fan-out engine.
pub trait FeedStore {
    type Batch<'a>: FeedBatch
    where
        Self: 'a;

    /// Opens a new batch.
    fn start(&self) -> FeedResult<Self::Batch<'_>>;

    /// Entries visible through `audiences` with `entry_time <= before`,
    /// newest first, at most `limit` rows, one per `(post, sharer)`.
    ///
    /// With `after`, only entries ordered strictly after that cursor are
    /// returned.
    fn timeline_entries(
        &self,
        audiences: &AudienceSet,
        before: i64,
        after: Option<&FeedCursor>,
        limit: u32,
    ) -> FeedResult<Vec<TimelineEntry>>;
}

/// SQLite-backed feed store.
pub struct SqliteFeedStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteFeedStore<'conn> {
    /// Wraps a migrated connection (see `db::open_db`).
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl FeedStore for SqliteFeedStore<'_> {
    type Batch<'a> = SqliteFeedBatch<'a> where Self: 'a;

    fn start(&self) -> FeedResult<Self::Batch<'_>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        Ok(SqliteFeedBatch { tx })
    }

    fn timeline_entries(
        &self,
        audiences: &AudienceSet,
        before: i64,
        after: Option<&FeedCursor>,
        limit: u32,
    ) -> FeedResult<Vec<TimelineEntry>> {
        if audiences.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; audiences.len()].join(", ");
        let keyset = if after.is_some() {
            "WHERE (g.entry_time, g.post_id, g.shared_by) < (?, ?, ?)"
        } else {
            ""
        };
        let sql = format!(
            "SELECT
                g.audience_key,
                g.shared_by,
                g.shared_by_authority,
                g.entry_time,
                p.payload
             FROM (
                SELECT
                    e.post_id,
                    e.audience_key,
                    e.shared_by,
                    e.shared_by_authority,
                    MAX(e.entry_time) AS entry_time
                FROM timeline_entries e
                WHERE e.audience_key IN ({placeholders})
                  AND e.entry_time <= ?
                GROUP BY e.post_id, e.shared_by
             ) g
             INNER JOIN timeline_posts p ON p.post_id = g.post_id
             {keyset}
             ORDER BY g.entry_time DESC, g.post_id DESC, g.shared_by DESC
             LIMIT ?;"
        );

        let mut bind_values: Vec<Value> = audiences
            .iter()
            .map(|audience| Value::Text(audience.storage_key()))
            .collect();
        bind_values.push(Value::Integer(before));
        if let Some(cursor) = after {
            bind_values.push(Value::Integer(cursor.entry_time));
            bind_values.push(Value::Text(cursor.post_id.to_string()));
            bind_values.push(Value::Text(cursor.shared_by_key()));
        }
        bind_values.push(Value::Integer(i64::from(limit)));

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(parse_entry_row(row)?);
        }
        Ok(entries)
    }
}

/// One `IMMEDIATE` SQLite transaction.
pub struct SqliteFeedBatch<'conn> {
    tx: Transaction<'conn>,
}

impl FeedBatch for SqliteFeedBatch<'_> {
    fn add_to_timeline(
        &mut self,
        post: &Post,
        audiences: &AudienceSet,
        shared_by: Option<&ShareEvent>,
    ) -> FeedResult<()> {
        post.validate()?;
        upsert_post_snapshot(&self.tx, post)?;

        let (sharer_id, sharer_authority, entry_time) = match shared_by {
            Some(event) => (
                event.sharer.id.to_string(),
                Some(event.sharer.authority.as_str()),
                event.shared_at,
            ),
            None => (ORIGINAL_ENTRY.to_string(), None, post.timeline_time()),
        };

        let mut stmt = self.tx.prepare_cached(
            "INSERT OR IGNORE INTO timeline_entries (
                post_id,
                audience_key,
                shared_by,
                shared_by_authority,
                entry_time
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
        )?;
        for audience in audiences {
            stmt.execute(params![
                post.id.to_string(),
                audience.storage_key(),
                sharer_id.as_str(),
                sharer_authority,
                entry_time,
            ])?;
        }
        Ok(())
    }

    fn remove_from_timelines(
        &mut self,
        post_id: PostId,
        audiences: &AudienceSet,
    ) -> FeedResult<()> {
        let mut stmt = self.tx.prepare_cached(
            "DELETE FROM timeline_entries
             WHERE post_id = ?1
               AND audience_key = ?2
               AND shared_by = ?3;",
        )?;
        for audience in audiences {
            stmt.execute(params![
                post_id.to_string(),
                audience.storage_key(),
                ORIGINAL_ENTRY
            ])?;
        }
        Ok(())
    }

    fn remove_from_all_timelines(&mut self, post_id: PostId) -> FeedResult<()> {
        let post_id = post_id.to_string();
        self.tx.execute(
            "DELETE FROM timeline_entries WHERE post_id = ?1;",
            [post_id.as_str()],
        )?;
        self.tx.execute(
            "DELETE FROM timeline_posts WHERE post_id = ?1;",
            [post_id.as_str()],
        )?;
        Ok(())
    }

    fn update_timeline(&mut self, post: &Post) -> FeedResult<()> {
        post.validate()?;
        let revision = post_revision(post);
        let changed = self.tx.execute(
            "UPDATE timeline_posts
             SET
                preview = ?2,
                payload = ?3,
                updated_at = ?4
             WHERE post_id = ?1
               AND updated_at <= ?4;",
            params![
                post.id.to_string(),
                post.preview(),
                encode_payload(post)?,
                revision,
            ],
        )?;

        if changed == 0 && snapshot_exists(&self.tx, post.id)? {
            return Err(FeedStoreError::Conflict(format!(
                "post {} has a newer revision than {revision}",
                post.id
            )));
        }
        Ok(())
    }

    fn commit(self) -> FeedResult<()> {
        self.tx.commit()?;
        Ok(())
    }

    fn abort(self) -> FeedResult<()> {
        self.tx.rollback()?;
        Ok(())
    }
}

fn upsert_post_snapshot(tx: &Transaction<'_>, post: &Post) -> FeedResult<()> {
    tx.execute(
        "INSERT INTO timeline_posts (
            post_id,
            authority,
            preview,
            payload,
            created_at,
            updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(post_id) DO UPDATE SET
            preview = excluded.preview,
            payload = excluded.payload,
            updated_at = excluded.updated_at
        WHERE excluded.updated_at >= timeline_posts.updated_at;",
        params![
            post.id.to_string(),
            post.authority.as_str(),
            post.preview(),
            encode_payload(post)?,
            post.created_at,
            post_revision(post),
        ],
    )?;
    Ok(())
}

fn snapshot_exists(tx: &Transaction<'_>, post_id: PostId) -> FeedResult<bool> {
    let exists: i64 = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM timeline_posts WHERE post_id = ?1);",
        [post_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn post_revision(post: &Post) -> i64 {
    post.updated_at.unwrap_or_else(|| post.timeline_time())
}

fn encode_payload(post: &Post) -> FeedResult<String> {
    serde_json::to_string(post)
        .map_err(|err| FeedStoreError::InvalidData(format!("cannot encode post {}: {err}", post.id)))
}

fn parse_entry_row(row: &Row<'_>) -> FeedResult<TimelineEntry> {
    let payload: String = row.get("payload")?;
    let post: Post = serde_json::from_str(&payload).map_err(|err| {
        FeedStoreError::InvalidData(format!("invalid payload in timeline_posts.payload: {err}"))
    })?;

    let audience_key: String = row.get("audience_key")?;
    let audience = parse_audience_key(&audience_key)?;

    let shared_by_text: String = row.get("shared_by")?;
    let shared_by = if shared_by_text == ORIGINAL_ENTRY {
        None
    } else {
        let id = Uuid::parse_str(&shared_by_text).map_err(|_| {
            FeedStoreError::InvalidData(format!(
                "invalid uuid value `{shared_by_text}` in timeline_entries.shared_by"
            ))
        })?;
        let authority: Option<String> = row.get("shared_by_authority")?;
        Some(ProfileRef::new(id, authority.as_deref().unwrap_or_default()))
    };

    Ok(TimelineEntry {
        post,
        audience,
        shared_by,
        entry_time: row.get("entry_time")?,
    })
}

fn parse_audience_key(value: &str) -> FeedResult<Audience> {
    Audience::parse_key(value).ok_or_else(|| {
        FeedStoreError::InvalidData(format!(
            "invalid audience key `{value}` in timeline_entries.audience_key"
        ))
    })
}
