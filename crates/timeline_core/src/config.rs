//! Core configuration and local-authority rules.
//!
//! # Responsibility
//! - Parse and validate `CoreOptions` from JSON.
//! - Build the `LocalAuthority` predicate injected into the audience normalizer.
//!
//! # Invariants
//! - `domain_name` is non-empty after normalization.
//! - `feed_page_limit` is within `1..=FEED_LIMIT_MAX`.

use crate::model::profile::normalize_authority;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Default page size for feed reads.
pub const FEED_DEFAULT_LIMIT: u32 = 40;
/// Largest page size accepted by feed reads.
pub const FEED_LIMIT_MAX: u32 = 200;

/// Decides whether an authority belongs to this server.
pub trait AuthorityRules {
    fn is_local(&self, authority: &str) -> bool;
}

/// Runtime options for the timeline core.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreOptions {
    /// Public host name of this server, e.g. `letterbook.example`.
    pub domain_name: String,
    /// Public port when it is not the scheme default.
    pub port: Option<u16>,
    /// Extra authorities treated as local (e.g. legacy host names).
    pub authority_aliases: Vec<String>,
    /// Feed page size used when callers do not pass a limit.
    pub feed_page_limit: u32,
}

impl Default for CoreOptions {
    fn default() -> Self {
        Self {
            domain_name: "localhost".to_string(),
            port: None,
            authority_aliases: Vec::new(),
            feed_page_limit: FEED_DEFAULT_LIMIT,
        }
    }
}

impl CoreOptions {
    /// Options for `domain_name` with all other fields defaulted.
    pub fn for_domain(domain_name: impl Into<String>) -> Self {
        Self {
            domain_name: domain_name.into(),
            ..Self::default()
        }
    }

    /// Parses options from JSON and validates them.
    pub fn from_json_str(value: &str) -> Result<Self, ConfigError> {
        let options: Self =
            serde_json::from_str(value).map_err(|err| ConfigError::Parse(err.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if normalize_authority(&self.domain_name).is_empty() {
            return Err(ConfigError::EmptyDomainName);
        }
        if self.feed_page_limit == 0 || self.feed_page_limit > FEED_LIMIT_MAX {
            return Err(ConfigError::FeedLimitOutOfRange(self.feed_page_limit));
        }
        Ok(())
    }

    /// Normalized `host[:port]` of this server.
    pub fn authority(&self) -> String {
        let host = normalize_authority(&self.domain_name);
        match self.port {
            Some(port) => format!("{host}:{port}"),
            None => host,
        }
    }

    /// Builds the local-authority rules for this configuration.
    pub fn local_authority(&self) -> LocalAuthority {
        let mut authorities = BTreeSet::new();
        authorities.insert(self.authority());
        for alias in &self.authority_aliases {
            let normalized = normalize_authority(alias);
            if !normalized.is_empty() {
                authorities.insert(normalized);
            }
        }
        LocalAuthority { authorities }
    }
}

/// Set of authorities owned by this server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAuthority {
    authorities: BTreeSet<String>,
}

impl LocalAuthority {
    pub fn new<I, S>(authorities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            authorities: authorities
                .into_iter()
                .map(|value| normalize_authority(value.as_ref()))
                .filter(|value| !value.is_empty())
                .collect(),
        }
    }

    pub fn authorities(&self) -> impl Iterator<Item = &str> {
        self.authorities.iter().map(String::as_str)
    }
}

impl AuthorityRules for LocalAuthority {
    fn is_local(&self, authority: &str) -> bool {
        self.authorities.contains(&normalize_authority(authority))
    }
}

/// Configuration parse/validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Parse(String),
    EmptyDomainName,
    FeedLimitOutOfRange(u32),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(message) => write!(f, "invalid core options: {message}"),
            Self::EmptyDomainName => write!(f, "domain_name must not be empty"),
            Self::FeedLimitOutOfRange(value) => write!(
                f,
                "feed_page_limit must be within 1..={FEED_LIMIT_MAX}, got {value}"
            ),
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::{AuthorityRules, ConfigError, CoreOptions, LocalAuthority, FEED_DEFAULT_LIMIT};

    #[test]
    fn parses_json_with_defaults() {
        let options =
            CoreOptions::from_json_str(r#"{"domain_name": "Letterbook.Example"}"#).unwrap();
        assert_eq!(options.feed_page_limit, FEED_DEFAULT_LIMIT);
        assert_eq!(options.authority(), "letterbook.example");
    }

    #[test]
    fn includes_port_in_authority() {
        let options = CoreOptions::from_json_str(
            r#"{"domain_name": "dev.example", "port": 5127, "feed_page_limit": 20}"#,
        )
        .unwrap();
        assert_eq!(options.authority(), "dev.example:5127");
        assert!(options.local_authority().is_local("http://dev.example:5127/actor"));
        assert!(!options.local_authority().is_local("dev.example"));
    }

    #[test]
    fn rejects_unknown_fields_and_bad_limits() {
        let err = CoreOptions::from_json_str(r#"{"domain": "x.example"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = CoreOptions::from_json_str(r#"{"domain_name": "x.example", "feed_page_limit": 0}"#)
            .unwrap_err();
        assert_eq!(err, ConfigError::FeedLimitOutOfRange(0));

        let err = CoreOptions::from_json_str(r#"{"domain_name": "  "}"#).unwrap_err();
        assert_eq!(err, ConfigError::EmptyDomainName);
    }

    #[test]
    fn aliases_count_as_local() {
        let mut options = CoreOptions::for_domain("new.example");
        options.authority_aliases = vec!["OLD.example".to_string()];
        let rules = options.local_authority();
        assert!(rules.is_local("old.example"));
        assert!(rules.is_local("https://new.example/@alice"));
        assert!(!rules.is_local("remote.example"));
    }

    #[test]
    fn local_authority_from_list() {
        let rules = LocalAuthority::new(["a.example", "", "B.example"]);
        assert_eq!(rules.authorities().count(), 2);
        assert!(rules.is_local("b.example"));
    }
}
