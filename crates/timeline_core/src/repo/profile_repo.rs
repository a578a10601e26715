//! Profile lookup contract and SQLite implementation.
//!
//! # Responsibility
//! - Resolve profile ids to profile snapshots with their subscribed audiences.
//! - Seed/replace local profiles for the SQLite deployment.
//!
//! # Invariants
//! - Lookups never mutate storage.
//! - `save_profile` replaces the whole audience set in one transaction.

use crate::db::DbError;
use crate::model::audience::{Audience, AudienceSet};
use crate::model::profile::{Profile, ProfileId};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Profile repository error.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    NotFound(ProfileId),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "profile not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted profile data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::NotFound(_) => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Resolves profiles for feed reads.
pub trait ProfileLookup {
    /// Returns `Ok(None)` when the profile does not exist.
    fn lookup_profile(&self, id: ProfileId) -> RepoResult<Option<Profile>>;
}

/// SQLite-backed profile repository.
pub struct SqliteProfileRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteProfileRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Inserts or replaces one profile and its audience subscriptions.
    pub fn save_profile(&self, profile: &Profile) -> RepoResult<()> {
        let id = profile.id.to_string();
        let tx = rusqlite::Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO profiles (id, authority, handle)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                authority = excluded.authority,
                handle = excluded.handle;",
            params![id.as_str(), profile.authority.as_str(), profile.handle.as_str()],
        )?;
        tx.execute(
            "DELETE FROM profile_audiences WHERE profile_id = ?1;",
            [id.as_str()],
        )?;
        for audience in &profile.audiences {
            tx.execute(
                "INSERT INTO profile_audiences (profile_id, audience_key) VALUES (?1, ?2);",
                params![id.as_str(), audience.storage_key()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Adds one audience to an existing profile's subscriptions.
    pub fn subscribe(&self, id: ProfileId, audience: Audience) -> RepoResult<()> {
        if !self.profile_exists(id)? {
            return Err(RepoError::NotFound(id));
        }
        self.conn.execute(
            "INSERT OR IGNORE INTO profile_audiences (profile_id, audience_key) VALUES (?1, ?2);",
            params![id.to_string(), audience.storage_key()],
        )?;
        Ok(())
    }

    /// Removes one audience from a profile's subscriptions.
    pub fn unsubscribe(&self, id: ProfileId, audience: Audience) -> RepoResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM profile_audiences WHERE profile_id = ?1 AND audience_key = ?2;",
            params![id.to_string(), audience.storage_key()],
        )?;
        if changed == 0 && !self.profile_exists(id)? {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn profile_exists(&self, id: ProfileId) -> RepoResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM profiles WHERE id = ?1);",
            [id.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }
}

impl ProfileLookup for SqliteProfileRepository<'_> {
    fn lookup_profile(&self, id: ProfileId) -> RepoResult<Option<Profile>> {
        let id_text = id.to_string();
        let row = self
            .conn
            .query_row(
                "SELECT id, authority, handle FROM profiles WHERE id = ?1;",
                [id_text.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>("id")?,
                        row.get::<_, String>("authority")?,
                        row.get::<_, String>("handle")?,
                    ))
                },
            )
            .optional()?;

        let Some((stored_id, authority, handle)) = row else {
            return Ok(None);
        };
        let parsed_id = Uuid::parse_str(&stored_id).map_err(|_| {
            RepoError::InvalidData(format!("invalid uuid value `{stored_id}` in profiles.id"))
        })?;

        let mut profile = Profile::new(parsed_id, &authority, handle);
        profile.audiences = load_audiences(self.conn, &id_text)?;
        Ok(Some(profile))
    }
}

fn load_audiences(conn: &Connection, profile_id: &str) -> RepoResult<AudienceSet> {
    let mut stmt = conn.prepare(
        "SELECT audience_key
         FROM profile_audiences
         WHERE profile_id = ?1
         ORDER BY audience_key ASC;",
    )?;
    let mut rows = stmt.query([profile_id])?;
    let mut audiences = AudienceSet::new();
    while let Some(row) = rows.next()? {
        let key: String = row.get(0)?;
        let audience = Audience::parse_key(&key).ok_or_else(|| {
            RepoError::InvalidData(format!(
                "invalid audience key `{key}` in profile_audiences.audience_key"
            ))
        })?;
        audiences.insert(audience);
    }
    Ok(audiences)
}
