//! Versioned document codec.
//!
//! A section is stored on disk and served by the authority as a TOML
//! document. Two top-level integer keys carry its version:
//!
//! ```toml
//! majorVersion = 2
//! minorVersion = 14
//!
//! connection_limit = 40
//! [features]
//! beta = true
//! ```
//!
//! Everything else belongs to the section type.

use serde::Serialize;

use crate::config::error::{ConfigError, ConfigResult};
use crate::config::section::ConfigSection;

/// Key holding the schema compatibility marker.
pub const MAJOR_VERSION_KEY: &str = "majorVersion";

/// Key holding the content revision counter.
pub const MINOR_VERSION_KEY: &str = "minorVersion";

/// (major, minor) version pair embedded in every document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentVersion {
    pub major: i32,
    pub minor: i32,
}

impl DocumentVersion {
    pub const fn new(major: i32, minor: i32) -> Self {
        Self { major, minor }
    }
}

impl std::fmt::Display for DocumentVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// A decoded section together with the version it was stored under.
#[derive(Debug, Clone)]
pub struct VersionedDocument<T> {
    pub version: DocumentVersion,
    pub value: T,
}

/// Parse a document and split the version attributes from the body.
///
/// `minorVersion` defaults to 0 when absent; `majorVersion` is required.
pub fn split(text: &str) -> ConfigResult<(DocumentVersion, toml::Table)> {
    let mut table: toml::Table = text.parse()?;

    let major = take_version(&mut table, MAJOR_VERSION_KEY)?
        .ok_or(ConfigError::MissingVersion(MAJOR_VERSION_KEY))?;
    let minor = take_version(&mut table, MINOR_VERSION_KEY)?.unwrap_or(0);

    Ok((DocumentVersion::new(major, minor), table))
}

/// Read only the version of a document.
pub fn read_version(text: &str) -> ConfigResult<DocumentVersion> {
    split(text).map(|(version, _)| version)
}

/// Decode a document into `T`, rejecting a major version other than
/// `T::MAJOR_VERSION`.
pub fn decode<T: ConfigSection>(section: &str, text: &str) -> ConfigResult<VersionedDocument<T>> {
    let (version, table) = split(text)?;

    if version.major != T::MAJOR_VERSION {
        return Err(ConfigError::VersionMismatch {
            section: section.to_string(),
            expected: T::MAJOR_VERSION,
            actual: version.major,
        });
    }

    let value: T = toml::Value::Table(table).try_into()?;
    Ok(VersionedDocument { version, value })
}

/// Render `value` as a document stamped with `version`.
pub fn encode<T: Serialize>(value: &T, version: DocumentVersion) -> ConfigResult<String> {
    let mut table = match toml::Value::try_from(value)? {
        toml::Value::Table(table) => table,
        other => {
            return Err(ConfigError::InvalidArgument(format!(
                "section must serialize to a table, got {}",
                other.type_str()
            )))
        }
    };

    table.insert(MAJOR_VERSION_KEY.to_string(), toml::Value::Integer(version.major.into()));
    table.insert(MINOR_VERSION_KEY.to_string(), toml::Value::Integer(version.minor.into()));

    Ok(toml::to_string(&table)?)
}

fn take_version(table: &mut toml::Table, key: &'static str) -> ConfigResult<Option<i32>> {
    match table.remove(key) {
        None => Ok(None),
        Some(toml::Value::Integer(raw)) => i32::try_from(raw).map(Some).map_err(|_| {
            ConfigError::InvalidArgument(format!("`{key}` out of range: {raw}"))
        }),
        Some(other) => Err(ConfigError::InvalidArgument(format!(
            "`{key}` must be an integer, got {}",
            other.type_str()
        ))),
    }
}
