//! Installing a downloaded section on disk.
//!
//! ```text
//! bytes (already checked)
//!     → <name>.config.<uuid>.tmp      staged next to the target
//!     → <name>.<yyyyMMddHHmmss>.config   copy of the old target (backup policy)
//!     → rename tmp → <name>.config    atomic replace
//!     → prune backups beyond max_files
//! ```
//!
//! The target path never shows a partially written file.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use uuid::Uuid;

use crate::config::error::{ConfigError, ConfigResult};
use crate::config::local::SECTION_EXTENSION;

const BACKUP_STAMP: &str = "%Y%m%d%H%M%S";
const BACKUP_STAMP_LEN: usize = 14;

/// What to do with the document being replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupPolicy {
    pub enabled: bool,
    pub max_files: usize,
}

impl BackupPolicy {
    pub const NONE: BackupPolicy = BackupPolicy {
        enabled: false,
        max_files: 0,
    };
}

/// Atomically replace `target` with `bytes`.
///
/// Returns the backup written, if any.
pub fn install(target: &Path, bytes: &[u8], policy: BackupPolicy) -> ConfigResult<Option<PathBuf>> {
    let staged = staging_path(target)?;
    fs::write(&staged, bytes).map_err(|e| ConfigError::io(&staged, e))?;

    match replace(target, &staged, policy) {
        Ok(backup) => Ok(backup),
        Err(e) => {
            let _ = fs::remove_file(&staged);
            Err(e)
        }
    }
}

fn replace(target: &Path, staged: &Path, policy: BackupPolicy) -> ConfigResult<Option<PathBuf>> {
    let backup = if policy.enabled && target.exists() {
        let backup = backup_path(target, &Local::now().format(BACKUP_STAMP).to_string())?;
        fs::copy(target, &backup).map_err(|e| ConfigError::io(&backup, e))?;
        Some(backup)
    } else {
        None
    };

    fs::rename(staged, target).map_err(|e| ConfigError::io(target, e))?;

    if policy.enabled {
        prune_backups(target, policy.max_files)?;
    }
    Ok(backup)
}

/// `<dir>/<file>.<uuid>.tmp`
fn staging_path(target: &Path) -> ConfigResult<PathBuf> {
    let file_name = file_name(target)?;
    Ok(target.with_file_name(format!("{file_name}.{}.tmp", Uuid::new_v4().simple())))
}

/// `<dir>/<section>.<stamp>.config`
pub fn backup_path(target: &Path, stamp: &str) -> ConfigResult<PathBuf> {
    let section = section_stem(target)?;
    Ok(target.with_file_name(format!("{section}.{stamp}.{SECTION_EXTENSION}")))
}

/// Backups of `target`, newest first.
pub fn list_backups(target: &Path) -> ConfigResult<Vec<PathBuf>> {
    let section = section_stem(target)?;
    let directory = target.parent().unwrap_or_else(|| Path::new("."));
    let prefix = format!("{section}.");
    let suffix = format!(".{SECTION_EXTENSION}");

    let read_dir = fs::read_dir(directory).map_err(|e| ConfigError::io(directory, e))?;
    let mut backups: Vec<(String, PathBuf)> = read_dir
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            let stamp = name.strip_prefix(&prefix)?.strip_suffix(&suffix)?;
            let is_stamp = stamp.len() == BACKUP_STAMP_LEN && stamp.bytes().all(|b| b.is_ascii_digit());
            is_stamp.then(|| (stamp.to_string(), entry.path()))
        })
        .collect();

    backups.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(backups.into_iter().map(|(_, path)| path).collect())
}

/// Delete all but the `keep` newest backups of `target`.
pub fn prune_backups(target: &Path, keep: usize) -> ConfigResult<usize> {
    let mut removed = 0;
    for stale in list_backups(target)?.into_iter().skip(keep) {
        match fs::remove_file(&stale) {
            Ok(()) => {
                removed += 1;
                tracing::debug!(path = %stale.display(), "Pruned backup");
            }
            Err(e) => tracing::warn!(path = %stale.display(), error = %e, "Failed to prune backup"),
        }
    }
    Ok(removed)
}

fn file_name(path: &Path) -> ConfigResult<&str> {
    path.file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| ConfigError::InvalidArgument(format!("'{}' does not name a file", path.display())))
}

fn section_stem(target: &Path) -> ConfigResult<&str> {
    let name = file_name(target)?;
    Ok(name
        .strip_suffix(&format!(".{SECTION_EXTENSION}"))
        .unwrap_or(name))
}
