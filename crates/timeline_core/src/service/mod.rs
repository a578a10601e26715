//! Timeline use-case services.
//!
//! # Responsibility
//! - Fan post lifecycle events out to feed-store batches.
//! - Serve feed pages to authorized readers.
//! - Keep protocol layers decoupled from storage details.

pub mod error;
pub mod scoped;
pub mod timeline_service;
