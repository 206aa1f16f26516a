//! Configuration parsing and environment overlay.
//!
//! Settings are read from an optional YAML (or TOML, by `.toml` extension)
//! file and then overlaid with `ASSET_CATALOG_*` environment variables.
//! The environment always wins over the file; both fall back to the
//! defaults below.
//!
//! ```yaml
//! store:
//!   url: "sqlite://./data/assets.sqlite"
//!   min_pool_size: 1
//!   max_pool_size: 5
//! retry:
//!   max_retries: 5      # negative means unlimited
//!   cooldown_secs: 1
//! catalog:
//!   models_dir: "./models"
//!   include: ["**"]
//!   exclude: []
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "ASSET_CATALOG_";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub catalog: CatalogSettings,
}

/// Document store connection settings.
#[derive(Debug, Deserialize, Clone)]
pub struct StoreSettings {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_min_pool_size")]
    pub min_pool_size: u32,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: default_url(),
            min_pool_size: default_min_pool_size(),
            max_pool_size: default_max_pool_size(),
        }
    }
}

fn default_url() -> String {
    "sqlite://./data/assets.sqlite".to_string()
}
fn default_min_pool_size() -> u32 {
    1
}
fn default_max_pool_size() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrySettings {
    /// Negative values mean unlimited retries.
    #[serde(default = "default_max_retries")]
    pub max_retries: i64,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl RetrySettings {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

fn default_max_retries() -> i64 {
    5
}
fn default_cooldown_secs() -> u64 {
    1
}

/// Local model repository settings.
#[derive(Debug, Deserialize, Clone)]
pub struct CatalogSettings {
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,
    /// Glob patterns over service names.
    #[serde(default = "default_include")]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            models_dir: default_models_dir(),
            include: default_include(),
            exclude: Vec::new(),
        }
    }
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("./models")
}
fn default_include() -> Vec<String> {
    vec!["**".to_string()]
}

/// Load settings from `path` (if it exists) and the process environment.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    load_settings_with_env(path, |key| std::env::var(key).ok())
}

/// Same as [`load_settings`], reading overrides through `env`.
pub fn load_settings_with_env<F>(path: Option<&Path>, env: F) -> Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = match path {
        Some(p) if p.exists() => read_settings_file(p)?,
        _ => Settings::default(),
    };
    apply_env_overrides(&mut settings, env)?;
    validate(&settings)?;
    Ok(settings)
}

fn read_settings_file(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let is_toml = path.extension().and_then(|e| e.to_str()) == Some("toml");
    let settings = if is_toml {
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else if content.trim().is_empty() {
        Settings::default()
    } else {
        serde_yaml::from_str(&content).with_context(|| "Failed to parse config file")?
    };
    Ok(settings)
}

fn apply_env_overrides<F>(settings: &mut Settings, env: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| env(&format!("{}{}", ENV_PREFIX, name));

    if let Some(url) = var("STORE_URL") {
        settings.store.url = url;
    }
    if let Some(v) = var("STORE_MIN_POOL_SIZE") {
        settings.store.min_pool_size = parse_var("STORE_MIN_POOL_SIZE", &v)?;
    }
    if let Some(v) = var("STORE_MAX_POOL_SIZE") {
        settings.store.max_pool_size = parse_var("STORE_MAX_POOL_SIZE", &v)?;
    }
    if let Some(v) = var("RETRY_MAX_RETRIES") {
        settings.retry.max_retries = parse_var("RETRY_MAX_RETRIES", &v)?;
    }
    if let Some(v) = var("RETRY_COOLDOWN_SECS") {
        settings.retry.cooldown_secs = parse_var("RETRY_COOLDOWN_SECS", &v)?;
    }
    if let Some(dir) = var("CATALOG_MODELS_DIR") {
        settings.catalog.models_dir = PathBuf::from(dir);
    }
    Ok(())
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{}{} has an invalid value: '{}'", ENV_PREFIX, name, value))
}

fn validate(settings: &Settings) -> Result<()> {
    if settings.store.url.trim().is_empty() {
        bail!("store.url must not be empty");
    }
    if settings.store.max_pool_size < 1 {
        bail!("store.max_pool_size must be >= 1");
    }
    if settings.store.min_pool_size > settings.store.max_pool_size {
        bail!(
            "store.min_pool_size ({}) must not exceed store.max_pool_size ({})",
            settings.store.min_pool_size,
            settings.store.max_pool_size
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_file() {
        let settings = load_settings_with_env(None, no_env).unwrap();
        assert_eq!(settings.store.url, "sqlite://./data/assets.sqlite");
        assert_eq!(settings.store.min_pool_size, 1);
        assert_eq!(settings.store.max_pool_size, 5);
        assert_eq!(settings.retry.max_retries, 5);
        assert_eq!(settings.retry.cooldown(), Duration::from_secs(1));
        assert_eq!(settings.catalog.include, vec!["**".to_string()]);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("absent.yaml");
        let settings = load_settings_with_env(Some(&path), no_env).unwrap();
        assert_eq!(settings.store.max_pool_size, 5);
    }

    #[test]
    fn test_yaml_file_partial_sections() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(
            &path,
            "store:\n  url: \"sqlite://./x.sqlite\"\n  max_pool_size: 20\nretry:\n  max_retries: -1\n",
        )
        .unwrap();
        let settings = load_settings_with_env(Some(&path), no_env).unwrap();
        assert_eq!(settings.store.url, "sqlite://./x.sqlite");
        assert_eq!(settings.store.max_pool_size, 20);
        assert_eq!(settings.store.min_pool_size, 1);
        assert_eq!(settings.retry.max_retries, -1);
        assert_eq!(settings.retry.cooldown_secs, 1);
    }

    #[test]
    fn test_toml_file_by_extension() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[catalog]\nmodels_dir = \"/srv/models\"\n").unwrap();
        let settings = load_settings_with_env(Some(&path), no_env).unwrap();
        assert_eq!(settings.catalog.models_dir, PathBuf::from("/srv/models"));
    }

    #[test]
    fn test_env_wins_over_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(&path, "store:\n  url: \"sqlite://./file.sqlite\"\n  min_pool_size: 2\n")
            .unwrap();
        let env = env_from(&[
            ("ASSET_CATALOG_STORE_URL", "sqlite://./env.sqlite"),
            ("ASSET_CATALOG_STORE_MIN_POOL_SIZE", "3"),
            ("ASSET_CATALOG_RETRY_COOLDOWN_SECS", "0"),
        ]);
        let settings = load_settings_with_env(Some(&path), env).unwrap();
        assert_eq!(settings.store.url, "sqlite://./env.sqlite");
        assert_eq!(settings.store.min_pool_size, 3);
        assert_eq!(settings.retry.cooldown_secs, 0);
    }

    #[test]
    fn test_invalid_env_value_names_variable() {
        let env = env_from(&[("ASSET_CATALOG_STORE_MAX_POOL_SIZE", "many")]);
        let err = load_settings_with_env(None, env).unwrap_err();
        assert!(err.to_string().contains("ASSET_CATALOG_STORE_MAX_POOL_SIZE"));
    }

    #[test]
    fn test_min_pool_above_max_rejected() {
        let env = env_from(&[
            ("ASSET_CATALOG_STORE_MIN_POOL_SIZE", "10"),
            ("ASSET_CATALOG_STORE_MAX_POOL_SIZE", "2"),
        ]);
        assert!(load_settings_with_env(None, env).is_err());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(&path, "store: [unclosed").unwrap();
        assert!(load_settings_with_env(Some(&path), no_env).is_err());
    }
}
