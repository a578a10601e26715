//! Audience resolution.
//!
//! # Responsibility
//! - Map a post's addressee list to the local audiences this server maintains.
//! - Compose explicit, addressed and implicit audiences into one canonical set.
//!
//! # Invariants
//! - Non-local addressees never produce audiences.
//! - Normalization is idempotent.

pub mod addressing;
pub mod normalize;
