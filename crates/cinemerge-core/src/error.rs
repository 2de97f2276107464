use std::fmt;
use std::io;

use thiserror::Error;

/// Upstream catalog that produced a record or an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Catalog {
    /// Popularity-ranked movie catalog (listing, cross-reference, by-id detail).
    Tmdb,
    /// Ratings/plot catalog keyed by IMDb id.
    Omdb,
}

impl fmt::Display for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Catalog::Tmdb => f.write_str("tmdb"),
            Catalog::Omdb => f.write_str("omdb"),
        }
    }
}

/// Setup failures raised before the first item is processed.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Item-level failure reported by a resolver or detail fetcher.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("{catalog} has no record for {id}")]
    NotFound { catalog: Catalog, id: String },
    #[error("{catalog} request for {id} failed: {message}")]
    Transport {
        catalog: Catalog,
        id: String,
        status: Option<u16>,
        message: String,
        /// Timeouts and connection failures that never produced a status.
        transient: bool,
    },
}

impl FetchError {
    pub fn not_found(catalog: Catalog, id: impl Into<String>) -> Self {
        FetchError::NotFound {
            catalog,
            id: id.into(),
        }
    }

    pub fn status(catalog: Catalog, id: impl Into<String>, status: u16) -> Self {
        FetchError::Transport {
            catalog,
            id: id.into(),
            status: Some(status),
            message: format!("upstream responded with status {status}"),
            transient: false,
        }
    }

    pub fn malformed(catalog: Catalog, id: impl Into<String>, detail: impl fmt::Display) -> Self {
        FetchError::Transport {
            catalog,
            id: id.into(),
            status: None,
            message: format!("malformed response body: {detail}"),
            transient: false,
        }
    }

    pub fn from_reqwest(catalog: Catalog, id: impl Into<String>, err: &reqwest::Error) -> Self {
        FetchError::Transport {
            catalog,
            id: id.into(),
            status: err.status().map(|status| status.as_u16()),
            message: err.to_string(),
            transient: err.is_timeout() || err.is_connect() || err.is_request(),
        }
    }

    /// Server errors, throttling and connection-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::NotFound { .. } => false,
            FetchError::Transport {
                status, transient, ..
            } => match status {
                Some(code) => *code >= 500 || *code == 429,
                None => *transient,
            },
        }
    }
}

/// Raised when two payloads cannot be combined into one record.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MergeError {
    #[error("{catalog} payload for {id} is not a JSON object")]
    Incomplete { catalog: Catalog, id: String },
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        assert!(FetchError::status(Catalog::Tmdb, "1", 503).is_retryable());
        assert!(FetchError::status(Catalog::Tmdb, "1", 429).is_retryable());
        assert!(!FetchError::status(Catalog::Tmdb, "1", 401).is_retryable());
        assert!(!FetchError::status(Catalog::Omdb, "tt1", 404).is_retryable());
        assert!(!FetchError::not_found(Catalog::Omdb, "tt1").is_retryable());
        assert!(!FetchError::malformed(Catalog::Tmdb, "1", "eof").is_retryable());
    }

    #[test]
    fn transport_message_names_catalog_and_id() {
        let err = FetchError::status(Catalog::Omdb, "tt0111161", 500);
        assert_eq!(
            err.to_string(),
            "omdb request for tt0111161 failed: upstream responded with status 500"
        );
    }
}
