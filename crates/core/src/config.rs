//! TOML-based configuration for branchnote.
//!
//! Every section is optional; an empty file yields a working configuration.
//! A handful of `BRANCHNOTE_*` environment variables override file values
//! after loading (see [`AppConfig::apply_env_overrides`]).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;
use crate::models::IsolationKind;
use crate::store::StoreSignature;
use crate::validation;

/// Overrides `store.data_dir`.
pub const ENV_DATA_DIR: &str = "BRANCHNOTE_DATA_DIR";
/// Overrides `store.trunk_branch`.
pub const ENV_TRUNK_BRANCH: &str = "BRANCHNOTE_TRUNK_BRANCH";
/// Overrides `server.log_level`.
pub const ENV_LOG_LEVEL: &str = "BRANCHNOTE_LOG_LEVEL";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Repository storage settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Request size limits.
    #[serde(default)]
    pub limits: LimitsConfig,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address (default `127.0.0.1:5000`).
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Maximum accepted request body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_listen() -> String {
    "127.0.0.1:5000".into()
}
fn default_log_level() -> String {
    "info".into()
}
fn default_max_body_bytes() -> usize {
    6 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            log_level: default_log_level(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory; each repository is a subdirectory named after it.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Trunk branch name (default `master`).
    #[serde(default = "default_trunk_branch")]
    pub trunk_branch: String,

    /// Repository used when a request names none.
    #[serde(default = "default_repo")]
    pub default_repo: String,

    /// Commit author name.
    #[serde(default = "default_author_name")]
    pub author_name: String,

    /// Commit author email.
    #[serde(default = "default_author_email")]
    pub author_email: String,

    /// Initialize repositories on first use.
    #[serde(default = "default_true")]
    pub create_missing: bool,

    /// Seconds to wait for a repository lock before giving up.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/branchnote")
}
fn default_trunk_branch() -> String {
    "master".into()
}
fn default_repo() -> String {
    "notes".into()
}
fn default_author_name() -> String {
    "branchnote".into()
}
fn default_author_email() -> String {
    "branchnote@localhost".into()
}
fn default_true() -> bool {
    true
}
fn default_lock_timeout() -> u64 {
    30
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            trunk_branch: default_trunk_branch(),
            default_repo: default_repo(),
            author_name: default_author_name(),
            author_email: default_author_email(),
            create_missing: default_true(),
            lock_timeout_secs: default_lock_timeout(),
        }
    }
}

impl StoreConfig {
    /// Signature stamped on every commit.
    pub fn signature(&self) -> StoreSignature {
        StoreSignature {
            name: self.author_name.clone(),
            email: self.author_email.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum note path length in bytes.
    #[serde(default = "default_max_path_len")]
    pub max_path_len: usize,

    /// Maximum note content size in bytes.
    #[serde(default = "default_max_content_bytes")]
    pub max_content_bytes: usize,
}

fn default_max_path_len() -> usize {
    255
}
fn default_max_content_bytes() -> usize {
    5 * 1024 * 1024
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_path_len: default_max_path_len(),
            max_content_bytes: default_max_content_bytes(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Parse a TOML configuration file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Apply `BRANCHNOTE_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Some(dir) = resolve_optional_env(ENV_DATA_DIR, "store.data_dir") {
            self.store.data_dir = PathBuf::from(dir);
        }
        if let Some(trunk) = resolve_optional_env(ENV_TRUNK_BRANCH, "store.trunk_branch") {
            self.store.trunk_branch = trunk;
        }
        if let Some(level) = resolve_optional_env(ENV_LOG_LEVEL, "server.log_level") {
            self.server.log_level = level;
        }
    }

    /// Check that the configuration is internally consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.trunk_branch.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "store.trunk_branch".into(),
                detail: "trunk branch must not be empty".into(),
            });
        }
        if let Err(e) = validation::validate_branch_name(&self.store.trunk_branch) {
            return Err(ConfigError::InvalidValue {
                field: "store.trunk_branch".into(),
                detail: e.to_string(),
            });
        }
        if IsolationKind::parse(&self.store.trunk_branch).is_some() {
            return Err(ConfigError::InvalidValue {
                field: "store.trunk_branch".into(),
                detail: "trunk branch must not use the isolation branch prefix".into(),
            });
        }
        if let Err(e) = validation::validate_repo_name(&self.store.default_repo) {
            return Err(ConfigError::InvalidValue {
                field: "store.default_repo".into(),
                detail: e.to_string(),
            });
        }
        if self.store.lock_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "store.lock_timeout_secs".into(),
                detail: "lock timeout must be > 0".into(),
            });
        }
        if self.limits.max_path_len == 0 || self.limits.max_content_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "limits".into(),
                detail: "limits must be > 0".into(),
            });
        }
        if self.server.max_body_bytes < self.limits.max_content_bytes {
            warn!(
                max_body_bytes = self.server.max_body_bytes,
                max_content_bytes = self.limits.max_content_bytes,
                "request body limit is below the content limit"
            );
        }

        Ok(())
    }

    /// Convenience: load, apply overrides, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

/// Read an override variable. Unset is normal; set-but-empty is suspicious.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            info!(field, env_name, "configuration overridden from environment");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty, ignoring");
            None
        }
        Err(_) => {
            debug!(field, env_name, "env var not set");
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
[server]
listen = "0.0.0.0:8080"
log_level = "debug"

[store]
data_dir = "/tmp/branchnote"
trunk_branch = "main"
default_repo = "team-notes"
author_name = "Notes Bot"
author_email = "bot@example.com"
lock_timeout_secs = 5

[limits]
max_path_len = 128
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.server.listen, "0.0.0.0:8080");
        assert_eq!(config.store.trunk_branch, "main");
        assert_eq!(config.store.default_repo, "team-notes");
        assert_eq!(config.store.lock_timeout_secs, 5);
        assert_eq!(config.limits.max_path_len, 128);
        assert_eq!(config.limits.max_content_bytes, 5 * 1024 * 1024);

        let sig = config.store.signature();
        assert_eq!(sig.name, "Notes Bot");
        assert_eq!(sig.email, "bot@example.com");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = AppConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.server.log_level, "debug");
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/config.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[store\ntrunk_branch = ").unwrap();
        let result = AppConfig::load_from_file(&path);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:5000");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.store.trunk_branch, "master");
        assert_eq!(config.store.default_repo, "notes");
        assert!(config.store.create_missing);
        assert_eq!(config.store.lock_timeout_secs, 30);
        assert_eq!(config.limits.max_path_len, 255);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.store.trunk_branch = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "store.trunk_branch"
        ));

        let mut config = AppConfig::default();
        config.store.trunk_branch = "user-main".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "store.trunk_branch"
        ));

        let mut config = AppConfig::default();
        config.store.default_repo = "../escape".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "store.default_repo"
        ));

        let mut config = AppConfig::default();
        config.store.lock_timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "store.lock_timeout_secs"
        ));
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var(ENV_DATA_DIR, "/srv/notes");
        std::env::set_var(ENV_TRUNK_BRANCH, "trunk");
        std::env::set_var(ENV_LOG_LEVEL, "");

        let mut config = AppConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.store.data_dir, PathBuf::from("/srv/notes"));
        assert_eq!(config.store.trunk_branch, "trunk");
        assert_eq!(config.server.log_level, "info");

        std::env::remove_var(ENV_DATA_DIR);
        std::env::remove_var(ENV_TRUNK_BRANCH);
        std::env::remove_var(ENV_LOG_LEVEL);
    }
}
