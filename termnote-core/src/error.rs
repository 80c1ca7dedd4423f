use std::path::PathBuf;

use thiserror::Error;

/// Reasons a document load attempt can end without a viewable document.
///
/// A load failure is terminal for that attempt; the session stays usable and
/// accepts a new selection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("no document provided")]
    NoDocument,
    #[error("failed to read {path:?}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
    #[error("failed to decode PDF: {0}")]
    Decode(String),
    #[error("document contains no pages")]
    Empty,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}
