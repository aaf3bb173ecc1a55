use crate::core::cache::DEFAULT_TTL_DAYS;
use crate::core::rules::RuleSource;
use crate::providers::yahoo_finance::DEFAULT_BASE_URL;
use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

pub const DEFAULT_BIND: &str = "127.0.0.1:3000";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct YahooProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub yahoo: Option<YahooProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            yahoo: Some(YahooProviderConfig {
                base_url: DEFAULT_BASE_URL.to_string(),
            }),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct RulesConfig {
    pub path: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_days")]
    pub ttl_days: i64,
}

fn default_ttl_days() -> i64 {
    DEFAULT_TTL_DAYS
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            ttl_days: DEFAULT_TTL_DAYS,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub rules: Option<RulesConfig>,
    #[serde(default)]
    pub cache: Option<CacheConfig>,
    #[serde(default)]
    pub server: Option<ServerConfig>,
}

impl AppConfig {
    /// Loads the default config file, or defaults when it does not exist.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!("No config at {}, using defaults", config_path.display());
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "divrole", "divrole")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        // An empty or comment-only file is a valid, all-default config.
        let config: Option<Self> = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config.unwrap_or_default())
    }

    pub fn yahoo_base_url(&self) -> &str {
        self.providers
            .yahoo
            .as_ref()
            .map_or(DEFAULT_BASE_URL, |p| &p.base_url)
    }

    pub fn rule_source(&self) -> RuleSource {
        match &self.rules {
            Some(RulesConfig { path: Some(path), .. }) => RuleSource::Path(PathBuf::from(path)),
            Some(RulesConfig { url: Some(url), .. }) => RuleSource::Url(url.clone()),
            _ => RuleSource::Embedded,
        }
    }

    pub fn cache_ttl(&self) -> Result<chrono::Duration> {
        let days = self
            .cache
            .as_ref()
            .map_or(DEFAULT_TTL_DAYS, |c| c.ttl_days);
        if days < 0 {
            bail!("Invalid cache.ttl_days {days}: must not be negative");
        }
        chrono::Duration::try_days(days)
            .with_context(|| format!("Invalid cache.ttl_days {days}: out of range"))
    }

    pub fn bind_address(&self) -> &str {
        self.server.as_ref().map_or(DEFAULT_BIND, |s| &s.bind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
providers:
  yahoo:
    base_url: "http://example.com/yahoo"
rules:
  path: "/etc/divrole/rules.json"
cache:
  ttl_days: 3
server:
  bind: "0.0.0.0:8080"
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.yahoo_base_url(), "http://example.com/yahoo");
        assert_eq!(
            config.rule_source(),
            RuleSource::Path(PathBuf::from("/etc/divrole/rules.json"))
        );
        assert_eq!(config.cache_ttl().unwrap(), chrono::Duration::days(3));
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_config_defaults() {
        let config: AppConfig = serde_yaml::from_str("rules:\n  url: \"https://example.com/r.json\"\n")
            .expect("Failed to deserialize");
        assert_eq!(config.yahoo_base_url(), DEFAULT_BASE_URL);
        assert_eq!(
            config.rule_source(),
            RuleSource::Url("https://example.com/r.json".to_string())
        );
        assert_eq!(config.cache_ttl().unwrap(), chrono::Duration::days(7));
        assert_eq!(config.bind_address(), DEFAULT_BIND);

        let empty = AppConfig::default();
        assert_eq!(empty.rule_source(), RuleSource::Embedded);
    }

    #[test]
    fn test_cache_ttl_rejects_out_of_range_days() {
        let huge: AppConfig = serde_yaml::from_str("cache:\n  ttl_days: 9223372036854775807\n")
            .expect("Failed to deserialize");
        let err = huge.cache_ttl().unwrap_err();
        assert!(err.to_string().contains("out of range"));

        let negative: AppConfig =
            serde_yaml::from_str("cache:\n  ttl_days: -1\n").expect("Failed to deserialize");
        let err = negative.cache_ttl().unwrap_err();
        assert!(err.to_string().contains("must not be negative"));

        let zero: AppConfig =
            serde_yaml::from_str("cache:\n  ttl_days: 0\n").expect("Failed to deserialize");
        assert_eq!(zero.cache_ttl().unwrap(), chrono::Duration::zero());
    }

    #[test]
    fn test_load_comment_only_file() -> Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        fs::write(file.path(), "# nothing here\n")?;
        let config = AppConfig::load_from_path(file.path())?;
        assert_eq!(config.rule_source(), RuleSource::Embedded);
        Ok(())
    }

    #[test]
    fn test_load_missing_file() {
        let err = AppConfig::load_from_path("/nonexistent/config.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
