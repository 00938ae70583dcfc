//! # configs
//!
//! Layered settings: serde defaults, then an optional TOML file, then
//! `THREADBASE_*` environment variables (`__` separates nested keys, e.g.
//! `THREADBASE_VOTES__MAX_ATTEMPTS=7`). A `.env` file is loaded first.

use std::path::PathBuf;

use config::{Config, Environment, File, FileFormat, Source};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const ENV_PREFIX: &str = "THREADBASE";
/// Environment variable naming the settings file.
pub const CONFIG_PATH_ENV: &str = "THREADBASE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "threadbase.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Snapshot file; absent keeps the store purely in memory.
    pub snapshot_path: Option<PathBuf>,
    /// Directory for image blobs; absent keeps them in memory.
    pub image_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct VoteSettings {
    pub max_attempts: usize,
}

impl Default for VoteSettings {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ThreadSettings {
    pub max_depth: usize,
}

impl Default for ThreadSettings {
    fn default() -> Self {
        Self { max_depth: 512 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub ranking_limit: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self { ranking_limit: 10 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub format: LogFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AdminSettings {
    pub username: String,
    pub display_name: String,
    /// When set, the bootstrap ensures this administrator exists.
    pub password: Option<SecretString>,
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            display_name: "Administrator".to_string(),
            password: None,
        }
    }
}

impl AdminSettings {
    pub fn password(&self) -> Option<&str> {
        self.password.as_ref().map(|secret| secret.expose_secret())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub votes: VoteSettings,
    pub threads: ThreadSettings,
    pub search: SearchSettings,
    pub log: LogSettings,
    pub admin: AdminSettings,
}

impl Settings {
    /// Loads `.env`, then the file named by `THREADBASE_CONFIG` (default
    /// `threadbase.toml`, optional), then the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        debug!(path = %path, "loading settings");
        Self::from_layers(
            File::new(&path, FileFormat::Toml).required(false),
            Self::environment(),
        )
    }

    /// The environment layer as [`Settings::load`] configures it.
    pub fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    /// Builds settings from an explicit file layer and environment layer,
    /// later layers winning, then validates them.
    pub fn from_layers<F>(file: F, env: Environment) -> Result<Self, ConfigError>
    where
        F: Source + Send + Sync + 'static,
    {
        let settings: Settings = Config::builder()
            .add_source(file)
            .add_source(env)
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("votes.max_attempts", self.votes.max_attempts),
            ("threads.max_depth", self.threads.max_depth),
            ("search.ranking_limit", self.search.ranking_limit),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        if self.admin.username.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "admin.username",
                reason: "must not be blank".to_string(),
            });
        }
        if self.admin.password().is_some_and(str::is_empty) {
            return Err(ConfigError::Invalid {
                key: "admin.password",
                reason: "must not be empty when set".to_string(),
            });
        }
        if self.log.filter.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "log.filter",
                reason: "must not be blank".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn toml(content: &str) -> File<config::FileSourceString, FileFormat> {
        File::from_str(content, FileFormat::Toml)
    }

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::environment().source(Some(map))
    }

    #[test]
    fn defaults_apply_without_sources() {
        let settings = Settings::from_layers(toml(""), env(&[])).unwrap();
        assert_eq!(settings.votes.max_attempts, 5);
        assert_eq!(settings.threads.max_depth, 512);
        assert_eq!(settings.search.ranking_limit, 10);
        assert_eq!(settings.log.format, LogFormat::Pretty);
        assert_eq!(settings.log.filter, "info");
        assert_eq!(settings.admin.username, "admin");
        assert!(settings.admin.password().is_none());
        assert!(settings.store.snapshot_path.is_none());
    }

    #[test]
    fn file_then_environment_override() {
        let file = toml(
            r#"
            [votes]
            max_attempts = 8

            [log]
            format = "json"

            [store]
            snapshot_path = "data/forum.json"
            "#,
        );
        let settings = Settings::from_layers(
            file,
            env(&[
                ("THREADBASE_VOTES__MAX_ATTEMPTS", "3"),
                ("THREADBASE_ADMIN__PASSWORD", "hunter2"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.votes.max_attempts, 3);
        assert_eq!(settings.log.format, LogFormat::Json);
        assert_eq!(settings.store.snapshot_path, Some(PathBuf::from("data/forum.json")));
        assert_eq!(settings.admin.password(), Some("hunter2"));
    }

    #[test]
    fn zero_bounds_rejected() {
        let err = Settings::from_layers(toml("[threads]\nmax_depth = 0"), env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "threads.max_depth", .. }));
    }

    #[test]
    fn unknown_log_format_fails_to_load() {
        let err = Settings::from_layers(toml("[log]\nformat = \"xml\""), env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn secret_is_redacted_in_debug() {
        let settings =
            Settings::from_layers(toml("[admin]\npassword = \"s3cret\""), env(&[])).unwrap();
        assert!(!format!("{settings:?}").contains("s3cret"));
    }
}
