use std::path::Path;

use serde::{Deserialize, Serialize};

/// The `[LightDM]` configuration section consulted by the local X server
/// supervisor. Mirrors the handful of keys the supervisor actually reads;
/// the rest of a real daemon's configuration store is out of scope here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LightDmSection {
    /// Starting point for the display-number search.
    #[serde(default = "default_minimum_display_number")]
    pub minimum_display_number: u32,
    /// Root under which the `root/<address>` authority file is written.
    #[serde(default = "default_run_directory")]
    pub run_directory: String,
    /// Root under which `x-<N>.log` is written.
    #[serde(default = "default_log_directory")]
    pub log_directory: String,
    /// When true, rotate an existing log to `.old` instead of appending.
    #[serde(default)]
    pub backup_logs: bool,
}

impl Default for LightDmSection {
    fn default() -> Self {
        Self {
            minimum_display_number: default_minimum_display_number(),
            run_directory: default_run_directory(),
            log_directory: default_log_directory(),
            backup_logs: false,
        }
    }
}

fn default_minimum_display_number() -> u32 {
    0
}
fn default_run_directory() -> String {
    "/var/run/lightdm".to_string()
}
fn default_log_directory() -> String {
    "/var/log/lightdm".to_string()
}

/// Top-level configuration document. Only the `[LightDM]` section is
/// modeled; unknown sections are ignored rather than rejected so this
/// supervisor can read a config file shared with the rest of a daemon.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default, rename = "LightDM")]
    pub lightdm: LightDmSection,
}

/// Read-only accessor for the `LightDM.*` keys consumed by the supervisor.
///
/// Kept as a trait (rather than a concrete struct dependency) so tests can
/// inject fixed values without touching the filesystem, matching the
/// collaborator-injection approach used for the display-number registry.
pub trait ConfigStore: Send + Sync {
    fn minimum_display_number(&self) -> u32;
    fn run_directory(&self) -> String;
    fn log_directory(&self) -> String;
    fn backup_logs(&self) -> bool;
}

impl ConfigStore for SupervisorConfig {
    fn minimum_display_number(&self) -> u32 {
        self.lightdm.minimum_display_number
    }

    fn run_directory(&self) -> String {
        self.lightdm.run_directory.clone()
    }

    fn log_directory(&self) -> String {
        self.lightdm.log_directory.clone()
    }

    fn backup_logs(&self) -> bool {
        self.lightdm.backup_logs
    }
}

/// Load configuration from a TOML file at the given path.
///
/// If the file doesn't exist, returns default configuration rather than
/// failing — a fresh install has no config file yet.
pub fn load_config(path: &Path) -> Result<SupervisorConfig, ConfigError> {
    if !path.exists() {
        tracing::warn!(
            path = %path.display(),
            "config file not found, using defaults"
        );
        return Ok(SupervisorConfig::default());
    }

    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let config: SupervisorConfig =
        toml::from_str(&contents).map_err(|source| ConfigError::Parse { source })?;

    tracing::info!(path = %path.display(), "loaded config");
    Ok(config)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config TOML: {source}")]
    Parse {
        #[source]
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_from_empty_string() {
        let config: SupervisorConfig = toml::from_str("").expect("empty doc uses defaults");
        assert_eq!(config.lightdm.minimum_display_number, 0);
        assert_eq!(config.lightdm.run_directory, "/var/run/lightdm");
        assert_eq!(config.lightdm.log_directory, "/var/log/lightdm");
        assert!(!config.lightdm.backup_logs);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let toml_str = r#"
[LightDM]
minimum-display-number = 10
"#;
        let config: SupervisorConfig = toml::from_str(toml_str).expect("partial doc parses");
        assert_eq!(config.lightdm.minimum_display_number, 10);
        assert_eq!(config.lightdm.run_directory, "/var/run/lightdm");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = std::path::Path::new("/nonexistent/path/lightdm.conf");
        let config = load_config(path).expect("missing file is not an error");
        assert_eq!(config, SupervisorConfig::default());
    }

    #[test]
    fn unknown_sections_are_ignored() {
        let toml_str = r#"
[SomeOtherDaemon]
setting = "value"

[LightDM]
backup-logs = true
"#;
        let config: SupervisorConfig = toml::from_str(toml_str).expect("unknown sections ignored");
        assert!(config.lightdm.backup_logs);
    }
}
