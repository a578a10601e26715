//! Timeline service error taxonomy.
//!
//! Every variant names the operation it came from so callers can log or map
//! it to a protocol response without extra context.

use crate::authz::evaluator::TimelineAction;
use crate::repo::feed_repo::FeedStoreError;
use crate::repo::profile_repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Public timeline operation names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimelineOperation {
    Publish,
    Share,
    Update,
    Delete,
    GetFeed,
}

impl TimelineOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Publish => "handle_publish",
            Self::Share => "handle_share",
            Self::Update => "handle_update",
            Self::Delete => "handle_delete",
            Self::GetFeed => "get_feed",
        }
    }

    /// Log event name for this operation.
    pub fn event(self) -> &'static str {
        match self {
            Self::Publish => "timeline_publish",
            Self::Share => "timeline_share",
            Self::Update => "timeline_update",
            Self::Delete => "timeline_delete",
            Self::GetFeed => "timeline_feed_read",
        }
    }

    /// Authorization action checked before the operation runs.
    pub fn action(self) -> TimelineAction {
        match self {
            Self::Publish => TimelineAction::Publish,
            Self::Share => TimelineAction::Share,
            Self::Update => TimelineAction::Update,
            Self::Delete => TimelineAction::Delete,
            Self::GetFeed => TimelineAction::ReadFeed,
        }
    }
}

impl Display for TimelineOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity kind named by missing-data errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Profile,
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Profile => f.write_str("profile"),
        }
    }
}

/// Timeline service failure.
#[derive(Debug)]
pub enum TimelineError {
    /// Referenced entity cannot be resolved. Not retried.
    MissingData {
        operation: TimelineOperation,
        kind: EntityKind,
        key: String,
    },
    /// Input violates an operation precondition. Not retried.
    Precondition {
        operation: TimelineOperation,
        details: String,
    },
    /// Authorization evaluator denied the caller's claims.
    Denied {
        operation: TimelineOperation,
        action: TimelineAction,
    },
    /// Caller cancelled the request; no staged mutation was applied.
    Cancelled { operation: TimelineOperation },
    /// Feed store failure; the batch was rolled back.
    Store {
        operation: TimelineOperation,
        source: FeedStoreError,
    },
    /// Profile lookup failure other than absence.
    Lookup {
        operation: TimelineOperation,
        source: RepoError,
    },
}

impl TimelineError {
    pub fn operation(&self) -> TimelineOperation {
        match self {
            Self::MissingData { operation, .. }
            | Self::Precondition { operation, .. }
            | Self::Denied { operation, .. }
            | Self::Cancelled { operation }
            | Self::Store { operation, .. }
            | Self::Lookup { operation, .. } => *operation,
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Store { source, .. } => source.is_retriable(),
            _ => false,
        }
    }

    /// Stable snake_case code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingData { .. } => "missing_data",
            Self::Precondition { .. } => "precondition",
            Self::Denied { .. } => "denied",
            Self::Cancelled { .. } => "cancelled",
            Self::Store { source, .. } if source.is_retriable() => "store_conflict",
            Self::Store { .. } => "store_failed",
            Self::Lookup { .. } => "lookup_failed",
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }

    pub(crate) fn store(operation: TimelineOperation) -> impl FnOnce(FeedStoreError) -> Self {
        move |source| Self::Store { operation, source }
    }

    pub(crate) fn precondition(operation: TimelineOperation, details: impl Into<String>) -> Self {
        Self::Precondition {
            operation,
            details: details.into(),
        }
    }
}

impl Display for TimelineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingData {
                operation,
                kind,
                key,
            } => write!(f, "{operation}: missing {kind} `{key}`"),
            Self::Precondition { operation, details } => {
                write!(f, "{operation}: precondition failed: {details}")
            }
            Self::Denied { operation, action } => {
                write!(f, "{operation}: not authorized for `{action}`")
            }
            Self::Cancelled { operation } => write!(f, "{operation}: cancelled"),
            Self::Store { operation, source } => write!(f, "{operation}: {source}"),
            Self::Lookup { operation, source } => write!(f, "{operation}: {source}"),
        }
    }
}

impl Error for TimelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store { source, .. } => Some(source),
            Self::Lookup { source, .. } => Some(source),
            _ => None,
        }
    }
}
