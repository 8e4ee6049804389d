//! Error taxonomy for the configuration subsystem.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::document::DocumentVersion;
use crate::config::validation::ValidationError;

/// Errors raised while loading, reconciling or watching configuration sections.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Local file system access failed.
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A document could not be parsed.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A section could not be rendered as a document.
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A document lacks a required version attribute.
    #[error("Document is missing the `{0}` attribute")]
    MissingVersion(&'static str),

    /// The document's major version does not match the section type.
    #[error("Section '{section}' major version mismatch: expected {expected}, found {actual}")]
    VersionMismatch {
        section: String,
        expected: i32,
        actual: i32,
    },

    /// A fetched document is not newer than the one already held.
    #[error("Section '{section}' offered version {offered} is not newer than held {held}")]
    Outdated {
        section: String,
        held: DocumentVersion,
        offered: DocumentVersion,
    },

    /// A section name was requested with two different types.
    #[error("Section '{section}' is registered as {registered}, requested as {requested}")]
    TypeMismatch {
        section: String,
        registered: &'static str,
        requested: &'static str,
    },

    /// A caller passed an unusable argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// HTTP transport failure (connect, timeout, body).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The authority answered with a non-success status.
    #[error("Remote returned status {status} for {url}")]
    Status { url: String, status: u16 },

    /// OS change notification could not be set up.
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// No async runtime, or a background task died.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Settings failed semantic validation.
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the failure is an I/O or network condition that the next
    /// reconciliation cycle may clear. Everything else is a schema or
    /// programming error and is surfaced to the caller.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConfigError::Io { .. }
                | ConfigError::Http(_)
                | ConfigError::Status { .. }
                | ConfigError::Watch(_)
                | ConfigError::Runtime(_)
        )
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
