//! Post domain model.
//!
//! # Responsibility
//! - Define the post shape consumed by the fan-out engine.
//! - Derive content previews used to detect in-place timeline refreshes.
//!
//! # Invariants
//! - `audience` is empty for an unpublished draft.
//! - `creators` is never empty for a post that reaches a feed store.
//! - `published_at`/`updated_at` are never earlier than `created_at`.
//! - `shares` is ordered by occurrence (oldest first).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

use super::audience::AudienceSet;
use super::profile::{normalize_authority, ProfileRef};

/// Stable, time-sortable post identifier.
pub type PostId = Uuid;

const PREVIEW_MAX_CHARS: usize = 100;

static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));
static MARKDOWN_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid link regex"));
static MARKUP_SYMBOL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\*_`#>~\[\]]+"#).expect("valid markup symbol regex"));
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// One block of post content plus its derived preview string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    /// Source text (HTML or markdown fragment).
    pub text: String,
    /// Plain-text summary, at most 100 chars.
    pub preview: String,
}

impl ContentBlock {
    /// Builds a block and derives its preview from `text`.
    pub fn from_source(text: impl Into<String>) -> Self {
        let text = text.into();
        let preview = derive_preview(&text);
        Self { text, preview }
    }
}

/// Addressing relation recorded at authoring time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentionRelation {
    To,
    Cc,
    Bto,
    Bcc,
    /// Inline mention without explicit addressing.
    Mention,
}

/// Subject of one addressee entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "profile", rename_all = "snake_case")]
pub enum AddresseeSubject {
    /// The well-known public collection.
    Public,
    /// One individual profile.
    Profile(ProfileRef),
    /// The followers collection of a profile.
    Followers(ProfileRef),
}

/// One `(subject, relation)` pair from a post's addressee list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub subject: AddresseeSubject,
    pub relation: MentionRelation,
}

impl Mention {
    pub fn new(subject: AddresseeSubject, relation: MentionRelation) -> Self {
        Self { subject, relation }
    }

    /// `To` addressing of the public collection.
    pub fn public() -> Self {
        Self::new(AddresseeSubject::Public, MentionRelation::To)
    }

    /// `To` addressing of one profile.
    pub fn to(profile: ProfileRef) -> Self {
        Self::new(AddresseeSubject::Profile(profile), MentionRelation::To)
    }
}

/// One boost/share of a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareEvent {
    pub sharer: ProfileRef,
    /// Unix epoch milliseconds.
    pub shared_at: i64,
}

/// Post record handled by the fan-out engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    /// Authority of the server the post originates from.
    pub authority: String,
    pub creators: BTreeSet<ProfileRef>,
    pub contents: Vec<ContentBlock>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds. `None` while the post is a draft.
    pub published_at: Option<i64>,
    /// Unix epoch milliseconds of the last edit.
    pub updated_at: Option<i64>,
    pub in_reply_to: Option<PostId>,
    pub addressed_to: Vec<Mention>,
    /// Share events, oldest first.
    pub shares: Vec<ShareEvent>,
    /// Resolved recipient groups. Empty until normalized for publish.
    pub audience: AudienceSet,
}

impl Post {
    /// Creates a draft authored by `creator` with a generated UUIDv7 id.
    pub fn draft(creator: ProfileRef, created_at: i64) -> Self {
        Self::with_id(Uuid::now_v7(), creator, created_at)
    }

    /// Creates a draft with a caller-provided id.
    ///
    /// Used by import/federation paths where identity already exists.
    pub fn with_id(id: PostId, creator: ProfileRef, created_at: i64) -> Self {
        let authority = normalize_authority(&creator.authority);
        let mut creators = BTreeSet::new();
        creators.insert(creator);
        Self {
            id,
            authority,
            creators,
            contents: Vec::new(),
            created_at,
            published_at: None,
            updated_at: None,
            in_reply_to: None,
            addressed_to: Vec::new(),
            shares: Vec::new(),
            audience: AudienceSet::new(),
        }
    }

    /// Preview of the first content block, if any.
    pub fn preview(&self) -> Option<&str> {
        self.contents.first().map(|block| block.preview.as_str())
    }

    /// Timestamp used to order this post's own timeline entries.
    pub fn timeline_time(&self) -> i64 {
        self.published_at.unwrap_or(self.created_at)
    }

    /// Most recent share event recorded for `sharer`.
    pub fn latest_share_by(&self, sharer: &ProfileRef) -> Option<&ShareEvent> {
        self.shares
            .iter()
            .filter(|event| event.sharer.id == sharer.id)
            .max_by_key(|event| event.shared_at)
    }

    /// Validates structural invariants before persistence.
    pub fn validate(&self) -> Result<(), PostValidationError> {
        if self.creators.is_empty() {
            return Err(PostValidationError::MissingCreators);
        }
        if let Some(published_at) = self.published_at {
            if published_at < self.created_at {
                return Err(PostValidationError::PublishedBeforeCreated {
                    created_at: self.created_at,
                    published_at,
                });
            }
        }
        if let Some(updated_at) = self.updated_at {
            if updated_at < self.created_at {
                return Err(PostValidationError::UpdatedBeforeCreated {
                    created_at: self.created_at,
                    updated_at,
                });
            }
        }
        Ok(())
    }
}

/// Structural validation failures for [`Post`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostValidationError {
    MissingCreators,
    PublishedBeforeCreated { created_at: i64, published_at: i64 },
    UpdatedBeforeCreated { created_at: i64, updated_at: i64 },
}

impl Display for PostValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCreators => write!(f, "post must have at least one creator"),
            Self::PublishedBeforeCreated {
                created_at,
                published_at,
            } => write!(
                f,
                "published_at ({published_at}) is earlier than created_at ({created_at})"
            ),
            Self::UpdatedBeforeCreated {
                created_at,
                updated_at,
            } => write!(
                f,
                "updated_at ({updated_at}) is earlier than created_at ({created_at})"
            ),
        }
    }
}

impl Error for PostValidationError {}

/// Derives a plain-text preview from HTML or markdown source.
///
/// Rules:
/// - tags are dropped, markdown links keep their label;
/// - markup symbols are removed and whitespace collapsed;
/// - the first 100 chars are retained.
fn derive_preview(source: &str) -> String {
    let without_tags = HTML_TAG_RE.replace_all(source, " ");
    let without_links = MARKDOWN_LINK_RE.replace_all(&without_tags, "$1");
    let without_symbols = MARKUP_SYMBOL_RE.replace_all(&without_links, " ");
    let normalized = WHITESPACE_RE.replace_all(&without_symbols, " ");
    normalized.trim().chars().take(PREVIEW_MAX_CHARS).collect()
}
