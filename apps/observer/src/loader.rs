//! Endpoint definitions file.
//!
//! The file is a JSON array of objects:
//!
//! ```json
//! [
//!   { "location": "https://example.com/health", "frequency": "30s", "method": "HEAD" },
//!   { "location": "https://example.org/", "frequency": "1m" }
//! ]
//! ```
//!
//! `method` defaults to `GET`. `frequency` accepts humantime durations such
//! as `500ms`, `1s`, `1m30s` or `2h`.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Method;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::monitoring::types::{FrequencyGroups, Job};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read definitions from {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed definitions")]
    Parse(#[from] serde_json::Error),
    #[error("definition #{index}: invalid frequency {value:?}")]
    InvalidFrequency {
        index: usize,
        value: String,
        #[source]
        source: humantime::DurationError,
    },
    #[error("definition #{index}: frequency must be greater than zero")]
    ZeroFrequency { index: usize },
    #[error("definition #{index}: invalid location {value:?}")]
    InvalidLocation {
        index: usize,
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("definition #{index}: invalid method {value:?}")]
    InvalidMethod { index: usize, value: String },
}

/// One raw endpoint entry, as written in the definitions file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Definition {
    pub location: String,
    pub frequency: String,
    #[serde(default = "default_method")]
    pub method: String,
}

fn default_method() -> String {
    Method::GET.to_string()
}

impl Definition {
    /// Validate the entry at position `index` into its interval and job.
    pub fn into_job(self, index: usize) -> Result<(Duration, Job), LoadError> {
        let interval = humantime::parse_duration(self.frequency.trim()).map_err(|source| {
            LoadError::InvalidFrequency { index, value: self.frequency.clone(), source }
        })?;
        if interval.is_zero() {
            return Err(LoadError::ZeroFrequency { index });
        }

        let location = Url::parse(&self.location).map_err(|source| LoadError::InvalidLocation {
            index,
            value: self.location.clone(),
            source,
        })?;

        let method = if self.method.trim().is_empty() {
            Method::GET
        } else {
            Method::from_bytes(self.method.trim().to_ascii_uppercase().as_bytes())
                .map_err(|_| LoadError::InvalidMethod { index, value: self.method.clone() })?
        };

        Ok((interval, Job::new(location, method)))
    }
}

/// Raw definitions read from disk, not yet parsed.
#[derive(Debug, Clone)]
pub struct DefinitionSource {
    origin: String,
    contents: String,
}

impl DefinitionSource {
    /// Read the whole definitions file. Parsing is deferred to [`parse`](Self::parse).
    pub fn read(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|source| LoadError::Read { path: path.to_path_buf(), source })?;

        Ok(Self { origin: path.display().to_string(), contents })
    }

    pub fn from_string(contents: impl Into<String>) -> Self {
        Self { origin: "<inline>".to_string(), contents: contents.into() }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn parse(&self) -> Result<FrequencyGroups, LoadError> {
        let groups = parse_definitions(&self.contents)?;
        debug!(origin = %self.origin, tiers = groups.len(), jobs = groups.job_count(), "definitions loaded");
        Ok(groups)
    }
}

/// Parse a JSON array of definitions into frequency groups.
///
/// The first invalid entry aborts the whole load.
pub fn parse_definitions(contents: &str) -> Result<FrequencyGroups, LoadError> {
    let definitions: Vec<Definition> = serde_json::from_str(contents)?;

    definitions
        .into_iter()
        .enumerate()
        .map(|(index, definition)| definition.into_job(index))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_by_frequency_in_file_order() {
        let groups = parse_definitions(
            r#"[
                {"location": "https://a.example/", "frequency": "1s"},
                {"location": "https://b.example/", "frequency": "1m30s", "method": "head"},
                {"location": "https://c.example/", "frequency": "1s", "method": "POST"}
            ]"#,
        )
        .unwrap();

        assert_eq!(groups.len(), 2);

        let fast = groups.get(Duration::from_secs(1)).unwrap();
        assert_eq!(fast.len(), 2);
        assert_eq!(fast[0].location.as_str(), "https://a.example/");
        assert_eq!(fast[0].method, Method::GET);
        assert_eq!(fast[1].location.as_str(), "https://c.example/");
        assert_eq!(fast[1].method, Method::POST);

        let slow = groups.get(Duration::from_secs(90)).unwrap();
        assert_eq!(slow[0].method, Method::HEAD);
    }

    #[test]
    fn test_empty_array_is_valid() {
        let groups = parse_definitions("[]").unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let error = parse_definitions(r#"[{"location": "https://a.example/""#).unwrap_err();
        assert!(matches!(error, LoadError::Parse(_)));
    }

    #[test]
    fn test_bad_entries_name_their_index() {
        let error = parse_definitions(
            r#"[
                {"location": "https://a.example/", "frequency": "1s"},
                {"location": "https://b.example/", "frequency": "soon"}
            ]"#,
        )
        .unwrap_err();
        assert!(matches!(error, LoadError::InvalidFrequency { index: 1, .. }));

        let error = parse_definitions(r#"[{"location": "https://a.example/", "frequency": "0s"}]"#).unwrap_err();
        assert!(matches!(error, LoadError::ZeroFrequency { index: 0 }));

        let error = parse_definitions(r#"[{"location": "not a url", "frequency": "1s"}]"#).unwrap_err();
        assert!(matches!(error, LoadError::InvalidLocation { index: 0, .. }));

        let error =
            parse_definitions(r#"[{"location": "https://a.example/", "frequency": "1s", "method": "GE T"}]"#)
                .unwrap_err();
        assert!(matches!(error, LoadError::InvalidMethod { index: 0, .. }));
    }

    #[test]
    fn test_read_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let error = DefinitionSource::read(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(error, LoadError::Read { .. }));
    }

    #[test]
    fn test_error_chain_names_each_cause_once() {
        let error = parse_definitions(r#"[{"location": "https://a.example/", "frequency": "soon"}]"#).unwrap_err();
        let cause = std::error::Error::source(&error).unwrap().to_string();

        let chain = format!("{:#}", anyhow::Error::from(error));
        assert!(chain.starts_with("definition #0: invalid frequency \"soon\": "));
        assert_eq!(chain.matches(cause.as_str()).count(), 1);
    }

    #[test]
    fn test_read_then_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("definitions.json");
        std::fs::write(&path, r#"[{"location": "http://127.0.0.1:8080/", "frequency": "250ms"}]"#).unwrap();

        let source = DefinitionSource::read(&path).unwrap();
        assert_eq!(source.origin(), path.display().to_string());

        let groups = source.parse().unwrap();
        assert_eq!(groups.job_count(), 1);
        assert!(groups.get(Duration::from_millis(250)).is_some());
    }
}
