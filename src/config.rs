//! Device configuration: whose diet this device edits, where the local store
//! lives and how to reach the backend.
//!
//! Values are layered defaults < YAML file < `DIETSYNC_*` environment, and
//! each one remembers which layer it came from so `dietsync config show` can
//! explain it. The merged result is validated as a whole: a device set to
//! sync automatically must have a usable http(s) endpoint and a key.

use reqwest::Url;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::is_valid_user_id;

const ENV_DATABASE_PATH: &str = "DIETSYNC_DATABASE_PATH";
const ENV_USER_ID: &str = "DIETSYNC_USER_ID";
const ENV_SYNC_URL: &str = "DIETSYNC_SYNC_URL";
const ENV_SYNC_API_KEY: &str = "DIETSYNC_SYNC_API_KEY";
const ENV_AUTO_SYNC: &str = "DIETSYNC_AUTO_SYNC";

/// Which layer a value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Bearer key for the backend. Debug output and serialization only show a prefix.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// At most four characters, and never more than half the key.
    pub fn masked(&self) -> String {
        let shown = (self.0.chars().count() / 2).min(4);
        format!("{}…", self.0.chars().take(shown).collect::<String>())
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({})", self.masked())
    }
}

impl Serialize for ApiKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.masked())
    }
}

/// How this device reaches the diet backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncConfig {
    /// Normalized `http(s)://host[:port][/prefix]`, without a trailing slash.
    pub server_url: Option<ConfigValue<String>>,
    pub api_key: Option<ConfigValue<ApiKey>>,
    /// Sync on startup and after every edit.
    pub auto_sync: ConfigValue<bool>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            api_key: None,
            auto_sync: ConfigValue::new(false, ConfigSource::Default),
        }
    }
}

impl SyncConfig {
    pub fn is_configured(&self) -> bool {
        self.endpoint().is_some()
    }

    /// Server URL and key, when both are set.
    pub fn endpoint(&self) -> Option<(&str, &ApiKey)> {
        match (&self.server_url, &self.api_key) {
            (Some(url), Some(key)) => Some((url.value.as_str(), &key.value)),
            _ => None,
        }
    }

    /// Keys still needed before this device can sync.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.server_url.is_none() {
            missing.push("sync.server_url");
        }
        if self.api_key.is_none() {
            missing.push("sync.api_key");
        }
        missing
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub database_path: ConfigValue<PathBuf>,
    /// Whose diet record this device works on.
    pub user_id: ConfigValue<String>,
    /// The file that was read, if one existed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    database_path: Option<PathBuf>,
    user_id: Option<String>,
    sync: SyncSection,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct SyncSection {
    server_url: Option<String>,
    api_key: Option<String>,
    auto_sync: Option<bool>,
}

impl Config {
    /// Loads `config_path` (or the default path) and the process environment.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with(config_path, |key| std::env::var(key).ok())
    }

    fn load_with(
        config_path: Option<PathBuf>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self {
            database_path: ConfigValue::new(
                Self::default_data_dir().join("dietsync.db"),
                ConfigSource::Default,
            ),
            user_id: ConfigValue::new("default".to_string(), ConfigSource::Default),
            config_file: None,
            sync: SyncConfig::default(),
        };

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|source| {
                ConfigError::ReadError {
                    path: path.clone(),
                    source,
                }
            })?;
            let file: ConfigFile =
                serde_yaml::from_str(&contents).map_err(|source| ConfigError::ParseError {
                    path: path.clone(),
                    source,
                })?;
            config.apply_file(&path, file);
            config.config_file = Some(path);
        }

        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path, file: ConfigFile) {
        let from_file = |value| ConfigValue::new(value, ConfigSource::File);

        if let Some(db_path) = file.database_path {
            // Relative paths are relative to the config file.
            let resolved = match path.parent() {
                Some(dir) if db_path.is_relative() => dir.join(db_path),
                _ => db_path,
            };
            self.database_path = from_file(resolved);
        }
        if let Some(user_id) = file.user_id {
            self.user_id = ConfigValue::new(user_id, ConfigSource::File);
        }
        if let Some(url) = file.sync.server_url {
            self.sync.server_url = Some(ConfigValue::new(url, ConfigSource::File));
        }
        if let Some(key) = file.sync.api_key {
            self.sync.api_key = Some(ConfigValue::new(ApiKey(key), ConfigSource::File));
        }
        if let Some(auto_sync) = file.sync.auto_sync {
            self.sync.auto_sync = ConfigValue::new(auto_sync, ConfigSource::File);
        }
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let from_env = ConfigSource::Environment;

        if let Some(db_path) = env(ENV_DATABASE_PATH) {
            self.database_path = ConfigValue::new(PathBuf::from(db_path), from_env);
        }
        if let Some(user_id) = env(ENV_USER_ID) {
            self.user_id = ConfigValue::new(user_id, from_env);
        }
        if let Some(url) = env(ENV_SYNC_URL) {
            self.sync.server_url = Some(ConfigValue::new(url, from_env));
        }
        if let Some(key) = env(ENV_SYNC_API_KEY) {
            self.sync.api_key = Some(ConfigValue::new(ApiKey(key), from_env));
        }
        if let Some(flag) = env(ENV_AUTO_SYNC) {
            let auto_sync = parse_flag(&flag).ok_or_else(|| ConfigError::InvalidValue {
                key: "sync.auto_sync",
                origin: from_env,
                reason: format!("expected true or false, got '{}'", flag),
            })?;
            self.sync.auto_sync = ConfigValue::new(auto_sync, from_env);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<(), ConfigError> {
        if !is_valid_user_id(&self.user_id.value) {
            return Err(ConfigError::InvalidValue {
                key: "user_id",
                origin: self.user_id.source,
                reason: format!(
                    "'{}' must be non-empty and must not contain '/', '\\' or '..'",
                    self.user_id.value
                ),
            });
        }

        if let Some(url) = &mut self.sync.server_url {
            url.value = normalize_server_url(&url.value).map_err(|reason| {
                ConfigError::InvalidValue {
                    key: "sync.server_url",
                    origin: url.source,
                    reason,
                }
            })?;
        }

        if let Some(key) = &self.sync.api_key {
            if key.value.expose().trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "sync.api_key",
                    origin: key.source,
                    reason: "must not be empty".to_string(),
                });
            }
        }

        let missing = self.sync.missing();
        if self.sync.auto_sync.value && !missing.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "sync.auto_sync",
                origin: self.sync.auto_sync.source,
                reason: format!("enabled but {} not set", missing.join(" and ")),
            });
        }

        Ok(())
    }

    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dietsync")
            .join("config.yaml")
    }

    fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dietsync")
    }
}

/// The backend speaks plain HTTP; anything else is a setup mistake.
fn normalize_server_url(raw: &str) -> Result<String, String> {
    let url = Url::parse(raw.trim()).map_err(|e| format!("'{}' is not a URL: {}", raw, e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!(
            "expected an http:// or https:// URL, got {}://",
            url.scheme()
        ));
    }
    if url.host_str().is_none() {
        return Err(format!("'{}' has no host", raw));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(format!("'{}' must not carry a query or fragment", raw));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}': {source}", path.display())]
    ParseError {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid {key} (from {origin}): {reason}")]
    InvalidValue {
        key: &'static str,
        origin: ConfigSource,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::{tempdir, TempDir};

    fn write_config(contents: &str) -> (TempDir, PathBuf) {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, contents).unwrap();
        (temp_dir, path)
    }

    fn load(path: PathBuf, env: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let env: HashMap<String, String> = env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::load_with(Some(path), |key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_file() {
        let temp_dir = tempdir().unwrap();
        let config = load(temp_dir.path().join("missing.yaml"), &[]).unwrap();

        assert!(config.database_path.value.ends_with("dietsync/dietsync.db"));
        assert_eq!(config.database_path.source, ConfigSource::Default);
        assert_eq!(config.user_id.value, "default");
        assert!(config.config_file.is_none());
        assert_eq!(config.sync, SyncConfig::default());
        assert_eq!(
            config.sync.missing(),
            vec!["sync.server_url", "sync.api_key"]
        );
    }

    #[test]
    fn test_file_values_and_normalized_url() {
        let (temp_dir, path) = write_config(
            "user_id: ana\ndatabase_path: data/diet.db\nsync:\n  server_url: http://localhost:8080/\n  api_key: secret-key\n  auto_sync: true\n",
        );

        let config = load(path.clone(), &[]).unwrap();
        assert_eq!(config.user_id, ConfigValue::new("ana".to_string(), ConfigSource::File));
        assert_eq!(config.database_path.value, temp_dir.path().join("data/diet.db"));
        assert_eq!(config.config_file, Some(path));

        let (url, key) = config.sync.endpoint().unwrap();
        assert_eq!(url, "http://localhost:8080");
        assert_eq!(key.expose(), "secret-key");
        assert!(config.sync.auto_sync.value);
    }

    #[test]
    fn test_environment_overrides_file() {
        let (_temp_dir, path) = write_config("user_id: fromfile\nsync:\n  auto_sync: false\n");

        let config = load(
            path,
            &[
                (ENV_USER_ID, "fromenv"),
                (ENV_SYNC_URL, "https://diets.example.com/api/"),
                (ENV_SYNC_API_KEY, "k3y-from-env"),
                (ENV_AUTO_SYNC, "yes"),
            ],
        )
        .unwrap();

        assert_eq!(config.user_id.value, "fromenv");
        assert_eq!(config.user_id.source, ConfigSource::Environment);
        assert_eq!(
            config.sync.server_url.unwrap().value,
            "https://diets.example.com/api"
        );
        assert_eq!(config.sync.auto_sync.source, ConfigSource::Environment);
        assert!(config.sync.auto_sync.value);
    }

    #[test]
    fn test_websocket_url_rejected() {
        let (_temp_dir, path) = write_config("sync:\n  server_url: ws://localhost:8080\n");

        let err = load(path, &[]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "sync.server_url",
                origin: ConfigSource::File,
                ..
            }
        ));
        assert!(err.to_string().contains("ws://"));
    }

    #[test]
    fn test_url_without_scheme_rejected() {
        let (_temp_dir, path) = write_config("sync:\n  server_url: localhost:8080\n");
        assert!(load(path, &[]).is_err());

        let (_temp_dir, path) = write_config("sync:\n  server_url: \"http://host/?token=1\"\n");
        assert!(load(path, &[]).is_err());
    }

    #[test]
    fn test_auto_sync_requires_key() {
        let (_temp_dir, path) =
            write_config("sync:\n  server_url: http://localhost:8080\n  auto_sync: true\n");

        let err = load(path, &[]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "sync.auto_sync",
                ..
            }
        ));
        assert!(err.to_string().contains("sync.api_key"));
    }

    #[test]
    fn test_incomplete_sync_is_allowed_without_auto_sync() {
        let (_temp_dir, path) = write_config("sync:\n  server_url: http://localhost:8080\n");

        let config = load(path, &[]).unwrap();
        assert!(!config.sync.is_configured());
        assert_eq!(config.sync.missing(), vec!["sync.api_key"]);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let (_temp_dir, path) = write_config("user_id: \"  \"\n");
        let err = load(path, &[]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "user_id", .. }));

        let (_temp_dir, path) = write_config("user_id: ../ana\n");
        assert!(load(path, &[]).is_err());

        let (_temp_dir, path) = write_config("sync:\n  api_key: \"\"\n");
        let err = load(path, &[]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "sync.api_key", .. }));

        let temp_dir = tempdir().unwrap();
        let err = load(temp_dir.path().join("none.yaml"), &[(ENV_AUTO_SYNC, "maybe")])
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                origin: ConfigSource::Environment,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_key_is_a_parse_error() {
        let (_temp_dir, path) = write_config("sync:\n  sever_url: http://localhost:8080\n");

        let err = load(path, &[]).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_api_key_is_masked() {
        let key = ApiKey::new("secret-key");
        assert_eq!(key.masked(), "secr…");
        assert_eq!(format!("{:?}", key), "ApiKey(secr…)");
        assert_eq!(ApiKey::new("ab").masked(), "a…");

        let sync = SyncConfig {
            server_url: None,
            api_key: Some(ConfigValue::new(key, ConfigSource::File)),
            auto_sync: ConfigValue::new(false, ConfigSource::Default),
        };
        let json = serde_json::to_string(&sync).unwrap();
        assert!(!json.contains("secret-key"));
        assert!(json.contains("secr…"));
    }
}
