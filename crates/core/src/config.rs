//! TOML-based tool configuration for wsync.
//!
//! The config file is optional: every field has a default, so a missing file
//! simply yields [`ToolConfig::default`]. Secrets (the SVN password) are
//! stored as `_env` fields that reference environment variable names and are
//! resolved at runtime via [`ToolConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;
use crate::executor::DEFAULT_BACKUP_FORMAT;

/// Environment variable that points at an alternative config file.
pub const CONFIG_ENV: &str = "WSYNC_CONFIG";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level tool configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Subprocess settings shared by all VCS adapters.
    #[serde(default)]
    pub vcs: VcsConfig,

    /// Subversion credentials.
    #[serde(default)]
    pub svn: SvnConfig,

    /// Backup naming for `--backup-changed-uri`.
    #[serde(default)]
    pub backup: BackupConfig,
}

// ---------------------------------------------------------------------------
// VCS tools
// ---------------------------------------------------------------------------

/// Subprocess settings for the external VCS tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VcsConfig {
    /// Seconds before a single tool invocation is abandoned (default 600).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Binary overrides, e.g. `hg = "/opt/mercurial/bin/hg"`.
    #[serde(default)]
    pub binaries: BinaryConfig,
}

fn default_timeout() -> u64 {
    600
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            binaries: BinaryConfig::default(),
        }
    }
}

impl VcsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Names or paths of the external tool binaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryConfig {
    #[serde(default = "default_hg")]
    pub hg: String,
    #[serde(default = "default_svn")]
    pub svn: String,
    #[serde(default = "default_bzr")]
    pub bzr: String,
}

fn default_hg() -> String {
    "hg".into()
}
fn default_svn() -> String {
    "svn".into()
}
fn default_bzr() -> String {
    "bzr".into()
}

impl Default for BinaryConfig {
    fn default() -> Self {
        Self {
            hg: default_hg(),
            svn: default_svn(),
            bzr: default_bzr(),
        }
    }
}

// ---------------------------------------------------------------------------
// SVN
// ---------------------------------------------------------------------------

/// Optional SVN credentials passed to every `svn` invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SvnConfig {
    /// SVN username for authentication.
    #[serde(default)]
    pub username: Option<String>,

    /// Environment variable holding the SVN password.
    #[serde(default)]
    pub password_env: Option<String>,

    /// Resolved password (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub password: Option<String>,
}

// ---------------------------------------------------------------------------
// Backup
// ---------------------------------------------------------------------------

/// Naming of backup directories created by `--backup-changed-uri`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// `chrono` strftime pattern appended to the entry's base name.
    #[serde(default = "default_name_format")]
    pub name_format: String,
}

fn default_name_format() -> String {
    DEFAULT_BACKUP_FORMAT.into()
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            name_format: default_name_format(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl ToolConfig {
    /// Load a [`ToolConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: ToolConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Per-user config location: `<config_dir>/wsync/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("wsync").join("config.toml"))
    }

    /// Locate and load the config.
    ///
    /// An explicit path (from `--config` or `$WSYNC_CONFIG`) must exist. The
    /// per-user default is only read when present; otherwise defaults apply.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let explicit = explicit.map(Path::to_path_buf).or(from_env);

        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_from_file(path)?,
                _ => {
                    debug!("no config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve all `*_env` fields from environment variables and populate the
    /// corresponding resolved fields.
    ///
    /// Missing variables log a warning but do not fail.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(ref env_name) = self.svn.password_env {
            self.svn.password = resolve_optional_env(env_name, "svn.password_env");
        }
        Ok(())
    }

    /// Validate that all values are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vcs.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "vcs.timeout_secs".into(),
                detail: "timeout must be > 0".into(),
            });
        }
        if self.backup.name_format.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "backup.name_format".into(),
                detail: "backup name format must not be empty".into(),
            });
        }
        if StrftimeItems::new(&self.backup.name_format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::InvalidValue {
                field: "backup.name_format".into(),
                detail: format!("invalid strftime pattern '{}'", self.backup.name_format),
            });
        }
        for (field, value) in [
            ("vcs.binaries.hg", &self.vcs.binaries.hg),
            ("vcs.binaries.svn", &self.vcs.binaries.svn),
            ("vcs.binaries.bzr", &self.vcs.binaries.bzr),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    detail: "binary name must not be empty".into(),
                });
            }
        }
        if self.svn.password_env.is_some() && self.svn.username.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "svn.username".into(),
                detail: "a username is required when svn.password_env is set".into(),
            });
        }
        Ok(())
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[vcs]
timeout_secs = 120

[vcs.binaries]
hg = "/opt/hg/bin/hg"

[svn]
username = "builder"
password_env = "WSYNC_TEST_SVN_PW"

[backup]
name_format = "%Y%m%d"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: ToolConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.vcs.timeout(), Duration::from_secs(120));
        assert_eq!(config.vcs.binaries.hg, "/opt/hg/bin/hg");
        assert_eq!(config.vcs.binaries.svn, "svn");
        assert_eq!(config.svn.username.as_deref(), Some("builder"));
        assert_eq!(config.backup.name_format, "%Y%m%d");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = ToolConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.vcs.timeout_secs, 120);
    }

    #[test]
    fn test_file_not_found() {
        let result = ToolConfig::load_from_file("/nonexistent/config.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_discover_explicit_missing_fails() {
        let result = ToolConfig::discover(Some(Path::new("/nonexistent/wsync.toml")));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = ToolConfig::default();
        config.vcs.timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "vcs.timeout_secs"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_backup_format() {
        let mut config = ToolConfig::default();
        config.backup.name_format = "%Q-%".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "backup.name_format"
        ));
    }

    #[test]
    fn test_validate_rejects_password_without_username() {
        let mut config = ToolConfig::default();
        config.svn.password_env = Some("SVN_PW".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "svn.username"
        ));
    }

    #[test]
    fn test_resolve_env_vars() {
        std::env::set_var("WSYNC_TEST_SVN_PW", "s3cret");

        let mut config: ToolConfig = toml::from_str(sample_toml()).unwrap();
        config.resolve_env_vars().unwrap();
        assert_eq!(config.svn.password.as_deref(), Some("s3cret"));

        std::env::remove_var("WSYNC_TEST_SVN_PW");
    }

    #[test]
    fn test_defaults() {
        let config: ToolConfig = toml::from_str("").unwrap();
        assert_eq!(config.vcs.timeout_secs, 600);
        assert_eq!(config.vcs.binaries.bzr, "bzr");
        assert_eq!(config.backup.name_format, "%Y-%m-%d-%H-%M-%S");
        assert!(config.svn.username.is_none());
        config.validate().unwrap();
    }
}
