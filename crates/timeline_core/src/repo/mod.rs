//! Collaborator contracts and their SQLite implementations.
//!
//! # Responsibility
//! - Define the feed-store and profile-lookup contracts the engine consumes.
//! - Isolate SQLite query details from fan-out orchestration.
//!
//! # Invariants
//! - Feed mutations are only reachable through an explicit batch object.
//! - Repository APIs return semantic errors (`NotFound`, `Conflict`) in
//!   addition to DB transport errors.

pub mod feed_repo;
pub mod profile_repo;
