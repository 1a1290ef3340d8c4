//! Configuration management for Pokecast
//!
//! Configuration is read once by the entry point and passed by value into
//! the constructors that need it. Nothing in the library reads the
//! environment on its own except [`Config::apply_env_overrides`].

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

pub const DEFAULT_CATALOG_SIZE: u32 = 1025;
pub const DEFAULT_POKEAPI_URL: &str = "https://pokeapi.co/api/v2";
pub const DEFAULT_BLUESKY_SERVICE: &str = "https://bsky.social";
pub const DEFAULT_HISTORY_PATH: &str = "~/.local/share/pokecast/published_pokemon.txt";

/// Env var holding the Bluesky handle (overrides the config file)
pub const HANDLE_ENV: &str = "POKECAST_BSKY_HANDLE";
/// Env var holding the Bluesky app password (overrides the config file)
pub const PASSWORD_ENV: &str = "POKECAST_BSKY_PASSWORD";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub pokeapi: PokeApiConfig,
    #[serde(default)]
    pub bluesky: BlueskyConfig,
    #[serde(default)]
    pub post: PostConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_size")]
    pub size: u32,
    /// Consecutive collisions tolerated before sweeping the whole catalog
    #[serde(default = "default_max_random_draws")]
    pub max_random_draws: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_CATALOG_SIZE,
            max_random_draws: default_max_random_draws(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PokeApiConfig {
    #[serde(default = "default_pokeapi_url")]
    pub base_url: String,
}

impl Default for PokeApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_pokeapi_url(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BlueskyConfig {
    #[serde(default = "default_bluesky_service")]
    pub service: String,
    #[serde(default)]
    pub handle: String,
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub app_password: Option<SecretString>,
}

impl Default for BlueskyConfig {
    fn default() -> Self {
        Self {
            service: default_bluesky_service(),
            handle: String::new(),
            app_password: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostConfig {
    /// Link appended to every post; `{name}` and `{id}` are substituted
    #[serde(default)]
    pub link_template: Option<String>,
    /// Attach a rendered base-stat chart next to the sprite
    #[serde(default = "default_true")]
    pub stats_chart: bool,
}

impl Default for PostConfig {
    fn default() -> Self {
        Self {
            link_template: None,
            stats_chart: true,
        }
    }
}

/// Which history backend to use, selected by the `backend` key
#[derive(Debug, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum HistoryConfig {
    Local(LocalHistoryConfig),
    S3(S3HistoryConfig),
    Gcs(GcsHistoryConfig),
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig::Local(LocalHistoryConfig::default())
    }
}

impl HistoryConfig {
    pub fn backend_name(&self) -> &'static str {
        match self {
            HistoryConfig::Local(_) => "local",
            HistoryConfig::S3(_) => "s3",
            HistoryConfig::Gcs(_) => "gcs",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalHistoryConfig {
    #[serde(default = "default_history_path")]
    pub path: String,
}

impl Default for LocalHistoryConfig {
    fn default() -> Self {
        Self {
            path: default_history_path(),
        }
    }
}

/// S3-compatible bucket. Unset credentials fall back to the standard
/// `AWS_*` environment variables.
#[derive(Debug, Deserialize)]
pub struct S3HistoryConfig {
    pub bucket: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub secret_access_key: Option<SecretString>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub allow_http: bool,
    #[serde(default = "default_record_timeout_secs")]
    pub record_timeout_secs: u64,
}

/// GCS bucket. Unset credentials fall back to the standard `GOOGLE_*`
/// environment variables.
#[derive(Debug, Deserialize)]
pub struct GcsHistoryConfig {
    pub bucket: String,
    #[serde(default)]
    pub service_account_path: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default = "default_record_timeout_secs")]
    pub record_timeout_secs: u64,
}

fn default_catalog_size() -> u32 {
    DEFAULT_CATALOG_SIZE
}

fn default_max_random_draws() -> u32 {
    64
}

fn default_pokeapi_url() -> String {
    DEFAULT_POKEAPI_URL.to_string()
}

fn default_bluesky_service() -> String {
    DEFAULT_BLUESKY_SERVICE.to_string()
}

fn default_history_path() -> String {
    DEFAULT_HISTORY_PATH.to_string()
}

fn default_record_timeout_secs() -> u64 {
    50
}

fn default_true() -> bool {
    true
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()).map(SecretString::from))
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load from the default location, or use defaults if no file exists
    ///
    /// Lets a deployment configure everything through the environment.
    pub fn load_or_default() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Let `POKECAST_BSKY_HANDLE` / `POKECAST_BSKY_PASSWORD` override the file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(handle) = std::env::var(HANDLE_ENV) {
            if !handle.trim().is_empty() {
                self.bluesky.handle = handle.trim().to_string();
            }
        }
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            if !password.is_empty() {
                self.bluesky.app_password = Some(SecretString::from(password));
            }
        }
    }

    /// Check the fields a publish run cannot do without
    pub fn validate(&self) -> Result<()> {
        if self.catalog.size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "catalog.size".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        if self.bluesky.handle.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "bluesky.handle (or {})",
                HANDLE_ENV
            ))
            .into());
        }
        if self.bluesky.app_password.is_none() {
            return Err(ConfigError::MissingField(format!(
                "bluesky.app_password (or {})",
                PASSWORD_ENV
            ))
            .into());
        }
        Ok(())
    }
}

/// Resolve the configuration file path following the XDG Base Directory layout
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("POKECAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("pokecast").join("config.toml"))
}

/// Expand `~` and environment variables in a configured path
pub fn expand_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path).map_err(|e| ConfigError::InvalidValue {
        field: "path".to_string(),
        reason: e.to_string(),
    })?;
    Ok(PathBuf::from(expanded.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;

    const FULL_CONFIG: &str = r#"
[catalog]
size = 151
max_random_draws = 10

[pokeapi]
base_url = "http://localhost:9000/api/v2"

[bluesky]
service = "https://pds.example"
handle = "pokecast.example"
app_password = "abcd-efgh-ijkl-mnop"

[post]
link_template = "https://pokemondb.net/pokedex/{name}"
stats_chart = false

[history]
backend = "local"
path = "/tmp/published.txt"
"#;

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml_str(FULL_CONFIG).unwrap();
        assert_eq!(config.catalog.size, 151);
        assert_eq!(config.catalog.max_random_draws, 10);
        assert_eq!(config.pokeapi.base_url, "http://localhost:9000/api/v2");
        assert_eq!(config.bluesky.service, "https://pds.example");
        assert_eq!(config.bluesky.handle, "pokecast.example");
        assert_eq!(
            config.bluesky.app_password.as_ref().unwrap().expose_secret(),
            "abcd-efgh-ijkl-mnop"
        );
        assert!(!config.post.stats_chart);
        match config.history {
            HistoryConfig::Local(local) => assert_eq!(local.path, "/tmp/published.txt"),
            other => panic!("Expected local history, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.catalog.size, DEFAULT_CATALOG_SIZE);
        assert_eq!(config.pokeapi.base_url, DEFAULT_POKEAPI_URL);
        assert_eq!(config.bluesky.service, DEFAULT_BLUESKY_SERVICE);
        assert!(config.post.stats_chart);
        assert!(config.post.link_template.is_none());
        assert_eq!(config.history.backend_name(), "local");
    }

    #[test]
    fn test_parse_s3_history() {
        let config = Config::from_toml_str(
            r#"
[history]
backend = "s3"
bucket = "published-pokemon"
region = "us-east-1"
access_key_id = "AKIAEXAMPLE"
secret_access_key = "shh"
"#,
        )
        .unwrap();

        match config.history {
            HistoryConfig::S3(s3) => {
                assert_eq!(s3.bucket, "published-pokemon");
                assert_eq!(s3.region.as_deref(), Some("us-east-1"));
                assert_eq!(s3.secret_access_key.unwrap().expose_secret(), "shh");
                assert_eq!(s3.record_timeout_secs, 50);
                assert!(s3.prefix.is_none());
            }
            other => panic!("Expected s3 history, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_gcs_history() {
        let config = Config::from_toml_str(
            r#"
[history]
backend = "gcs"
bucket = "pokebot-history"
prefix = "published"
record_timeout_secs = 10
"#,
        )
        .unwrap();

        match config.history {
            HistoryConfig::Gcs(gcs) => {
                assert_eq!(gcs.bucket, "pokebot-history");
                assert_eq!(gcs.prefix.as_deref(), Some("published"));
                assert_eq!(gcs.record_timeout_secs, 10);
            }
            other => panic!("Expected gcs history, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let result = Config::from_toml_str("[history]\nbackend = \"ftp\"\n");
        assert!(matches!(
            result,
            Err(crate::PokecastError::Config(ConfigError::ParseError(_)))
        ));
    }

    #[test]
    fn test_secret_not_in_debug_output() {
        let config = Config::from_toml_str(FULL_CONFIG).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("abcd-efgh-ijkl-mnop"));
    }

    #[test]
    fn test_validate_requires_handle_and_password() {
        let config = Config::from_toml_str("").unwrap();
        match config.validate() {
            Err(crate::PokecastError::Config(ConfigError::MissingField(field))) => {
                assert!(field.contains("bluesky.handle"));
            }
            other => panic!("Expected missing handle, got {:?}", other),
        }

        let config = Config::from_toml_str("[bluesky]\nhandle = \"a.example\"\n").unwrap();
        match config.validate() {
            Err(crate::PokecastError::Config(ConfigError::MissingField(field))) => {
                assert!(field.contains("app_password"));
            }
            other => panic!("Expected missing password, got {:?}", other),
        }

        assert!(Config::from_toml_str(FULL_CONFIG).unwrap().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_catalog() {
        let mut config = Config::from_toml_str(FULL_CONFIG).unwrap();
        config.catalog.size = 0;
        assert!(matches!(
            config.validate(),
            Err(crate::PokecastError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var(HANDLE_ENV, "override.example");
        std::env::set_var(PASSWORD_ENV, "from-env");

        let mut config = Config::from_toml_str(FULL_CONFIG).unwrap();
        config.apply_env_overrides();

        std::env::remove_var(HANDLE_ENV);
        std::env::remove_var(PASSWORD_ENV);

        assert_eq!(config.bluesky.handle, "override.example");
        assert_eq!(
            config.bluesky.app_password.unwrap().expose_secret(),
            "from-env"
        );
    }

    #[test]
    #[serial]
    fn test_load_or_default_without_file() {
        let dir = tempfile::TempDir::new().unwrap();
        std::env::set_var("POKECAST_CONFIG", dir.path().join("absent.toml"));
        let config = Config::load_or_default();
        std::env::remove_var("POKECAST_CONFIG");

        let config = config.unwrap();
        assert_eq!(config.catalog.size, DEFAULT_CATALOG_SIZE);
        assert_eq!(config.history.backend_name(), "local");
    }

    #[test]
    #[serial]
    fn test_resolve_config_path_from_env() {
        std::env::set_var("POKECAST_CONFIG", "/etc/pokecast.toml");
        let path = resolve_config_path().unwrap();
        std::env::remove_var("POKECAST_CONFIG");
        assert_eq!(path, PathBuf::from("/etc/pokecast.toml"));
    }
}
