//! Core domain logic for home-timeline fan-out.
//! This crate owns audience resolution and feed consistency invariants.

pub mod audience;
pub mod authz;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use audience::addressing::{resolve_addressee, resolve_local_addressees};
pub use audience::normalize::{AudienceDiff, AudienceNormalizer};
pub use authz::claims::{CancelToken, Claim, ClaimSet, RequestContext};
pub use authz::evaluator::{
    Authorizer, AuthzRequest, AuthzResource, ClaimPolicy, Decision, TimelineAction,
};
pub use config::{AuthorityRules, ConfigError, CoreOptions, LocalAuthority};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{init_logging, logging_status, LogLevel, LoggingError};
pub use model::audience::{Audience, AudienceSet};
pub use model::post::{
    AddresseeSubject, ContentBlock, Mention, MentionRelation, Post, PostId, PostValidationError,
    ShareEvent,
};
pub use model::profile::{Profile, ProfileId, ProfileRef};
pub use repo::feed_repo::{
    FeedBatch, FeedCursor, FeedResult, FeedStore, FeedStoreError, SqliteFeedBatch,
    SqliteFeedStore, TimelineEntry,
};
pub use repo::profile_repo::{ProfileLookup, RepoError, RepoResult, SqliteProfileRepository};
pub use service::error::{EntityKind, TimelineError, TimelineOperation};
pub use service::scoped::ScopedTimeline;
pub use service::timeline_service::{
    normalize_feed_limit, FeedPage, TimelineService, UpdateOutcome,
};

/// Minimal health-check API for host wiring probes.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
