//! Domain model for audience resolution and timeline fan-out.
//!
//! # Responsibility
//! - Define the post, profile and audience shapes the engine operates on.
//! - Keep value semantics (equality, ordering, hashing) explicit so audience
//!   sets can be diffed.
//!
//! # Invariants
//! - Every post and profile is identified by a stable UUID.
//! - Timestamps are Unix epoch milliseconds.

pub mod audience;
pub mod post;
pub mod profile;
