//! Remote synchronisation settings.
//!
//! Read from `RemoteConfigurationManager.config` in the configuration
//! root. The file is a versioned document like any section; it is written
//! with defaults when missing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::document::{self, DocumentVersion};
use crate::config::error::{ConfigError, ConfigResult};
use crate::config::section::ConfigSection;
use crate::config::validation::validate_settings;
use crate::remote::download::BackupPolicy;
use crate::remote::environment::{self, NetworkEnvironment};

/// Bootstrap file name inside the configuration root.
pub const BOOTSTRAP_FILE: &str = "RemoteConfigurationManager.config";

/// Settings of the remote configuration manager.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteSettings {
    /// Application name reported to the authority; also the default
    /// section folder name.
    pub application_name: String,

    /// Connect timeout in milliseconds.
    pub timeout_ms: u64,

    /// Whole-request timeout (send + read body) in milliseconds.
    pub read_write_timeout_ms: u64,

    /// Delay between the end of one poll cycle and the start of the next.
    pub timer_interval_ms: u64,

    /// Poll endpoint of the authority.
    pub remote_configuration_url: String,

    /// Section folder; relative paths resolve against the configuration
    /// root. Defaults to `<root>/<application_name>`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_configuration_folder: Option<PathBuf>,

    /// Keep a timestamped copy of a section before replacing it.
    pub backup_config: bool,

    /// Backups kept per section when `backup_config` is on.
    pub max_backup_files: usize,

    /// Master switch for polling and remote fetches.
    pub check_remote_config: bool,

    /// Overrides detection when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_environment: Option<NetworkEnvironment>,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            application_name: environment::application_name(),
            timeout_ms: 5_000,
            read_write_timeout_ms: 15_000,
            timer_interval_ms: 60_000,
            remote_configuration_url: NetworkEnvironment::detect()
                .default_remote_url()
                .to_string(),
            local_configuration_folder: None,
            backup_config: false,
            max_backup_files: 5,
            check_remote_config: true,
            network_environment: None,
        }
    }
}

impl ConfigSection for RemoteSettings {
    const MAJOR_VERSION: i32 = 1;
}

impl RemoteSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn read_write_timeout(&self) -> Duration {
        Duration::from_millis(self.read_write_timeout_ms)
    }

    pub fn timer_interval(&self) -> Duration {
        Duration::from_millis(self.timer_interval_ms)
    }

    pub fn backup_policy(&self) -> BackupPolicy {
        BackupPolicy {
            enabled: self.backup_config,
            max_files: self.max_backup_files,
        }
    }

    /// Where section documents live for this application.
    pub fn section_folder(&self, root: &Path) -> PathBuf {
        match &self.local_configuration_folder {
            Some(folder) if folder.is_absolute() => folder.clone(),
            Some(folder) => root.join(folder),
            None => root.join(&self.application_name),
        }
    }

    /// Apply the explicit environment override to the authority URL when
    /// the URL was left at another environment's default.
    fn resolve_environment(&mut self) {
        let Some(env) = self.network_environment else {
            return;
        };
        let is_default = [
            NetworkEnvironment::Production,
            NetworkEnvironment::Development,
            NetworkEnvironment::Testing,
            NetworkEnvironment::Labs,
        ]
        .iter()
        .any(|candidate| candidate.default_remote_url() == self.remote_configuration_url);
        if is_default {
            self.remote_configuration_url = env.default_remote_url().to_string();
        }
    }
}

/// Parse and validate settings from document text.
pub fn parse_settings(text: &str) -> ConfigResult<(RemoteSettings, DocumentVersion)> {
    let doc = document::decode::<RemoteSettings>(BOOTSTRAP_FILE, text)?;
    let mut settings = doc.value;
    settings.resolve_environment();
    validate_settings(&settings).map_err(ConfigError::Validation)?;
    Ok((settings, doc.version))
}

/// Load `<root>/RemoteConfigurationManager.config`, writing defaults first
/// if it does not exist.
pub fn load_or_create(root: &Path) -> ConfigResult<(RemoteSettings, DocumentVersion)> {
    let path = root.join(BOOTSTRAP_FILE);
    match std::fs::read_to_string(&path) {
        Ok(text) => parse_settings(&text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let settings = RemoteSettings::default();
            let version = DocumentVersion::new(RemoteSettings::MAJOR_VERSION, 0);
            write_settings(root, &settings, version)?;
            tracing::info!(path = %path.display(), "Created default remote configuration settings");
            validate_settings(&settings).map_err(ConfigError::Validation)?;
            Ok((settings, version))
        }
        Err(e) => Err(ConfigError::io(path, e)),
    }
}

/// Write settings as the bootstrap document.
pub fn write_settings(root: &Path, settings: &RemoteSettings, version: DocumentVersion) -> ConfigResult<()> {
    std::fs::create_dir_all(root).map_err(|e| ConfigError::io(root, e))?;
    let path = root.join(BOOTSTRAP_FILE);
    let text = document::encode(settings, version)?;
    std::fs::write(&path, text).map_err(|e| ConfigError::io(path, e))
}
