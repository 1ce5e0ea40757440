//! Application configuration.
//!
//! Settings come from an optional TOML file. Every section and field has a
//! default, so an empty file (or no file) is a valid configuration. A few
//! values can be overridden from the environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "newsletter-analytics.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub cache: CacheConfig,
    pub targets: TargetConfig,
    pub economics: EconomicsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Hosts whose links count as article traffic.
    pub content_domains: Vec<String>,
    pub rate_limit_delay_ms: u64,
    pub max_per_page: u32,
    pub rate_limit_backoff_secs: u64,
    pub max_rate_limit_retries: u32,
    pub max_segment_details: usize,
    pub max_subscription_pages: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.beehiiv.com/v2".to_string(),
            api_key_env: "BEEHIIV_API_KEY".to_string(),
            api_key: None,
            content_domains: vec!["inquisitr.com".to_string(), "www.inquisitr.com".to_string()],
            rate_limit_delay_ms: 200,
            max_per_page: 100,
            rate_limit_backoff_secs: 60,
            max_rate_limit_retries: 5,
            max_segment_details: 20,
            max_subscription_pages: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    File,
    Postgres,
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" | "json" => Ok(CacheBackend::File),
            "postgres" | "pg" => Ok(CacheBackend::Postgres),
            other => Err(format!("unknown cache backend: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub path: PathBuf,
    pub refresh_interval_hours: f64,
    #[serde(skip)]
    pub database_url: Option<String>,
    /// Snapshot rows kept by the Postgres cache after each write.
    pub keep_snapshots: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::File,
            path: PathBuf::from("data-cache.json"),
            refresh_interval_hours: 2.0,
            database_url: None,
            keep_snapshots: 10,
        }
    }
}

/// Inclusive band for a rate target, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateTarget {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub subscribers: u64,
    pub open_rate: RateTarget,
    pub ctr: RateTarget,
    pub ctor: RateTarget,
    pub traffic_per_send: f64,
    pub deadline: DateTime<Utc>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            subscribers: 30_000,
            open_rate: RateTarget { min: 35.0, max: 40.0 },
            ctr: RateTarget { min: 5.0, max: 6.0 },
            ctor: RateTarget { min: 16.0, max: 17.0 },
            traffic_per_send: 3000.0,
            deadline: Utc
                .with_ymd_and_hms(2026, 3, 31, 0, 0, 0)
                .single()
                .unwrap_or_default(),
        }
    }
}

/// Cost and revenue assumptions for unit economics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EconomicsConfig {
    /// UTM sources (substring match) whose signups are bought.
    pub paid_sources: Vec<String>,
    pub cost_per_paid_subscriber: f64,
    pub platform_monthly_cost: f64,
    pub page_views_per_click: f64,
    /// Revenue per 1000 page views.
    pub rpm: f64,
}

impl Default for EconomicsConfig {
    fn default() -> Self {
        Self {
            paid_sources: vec!["ml2".to_string(), "ml3".to_string()],
            cost_per_paid_subscriber: 0.10,
            platform_monthly_cost: 109.0,
            page_views_per_click: 1.5,
            rpm: 2.70,
        }
    }
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            AnalyticsError::Config(format!(
                "failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| AnalyticsError::Config(format!("failed to parse config: {e}")))
    }

    /// Read `path` if given, else the default file if it exists, else defaults.
    /// Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(&self.api.api_key_env).filter(|k| !k.trim().is_empty()) {
            self.api.api_key = Some(key);
        }
        if let Some(hours) = lookup("REFRESH_INTERVAL_HOURS") {
            self.cache.refresh_interval_hours = hours.trim().parse().map_err(|_| {
                AnalyticsError::Config(format!("REFRESH_INTERVAL_HOURS is not a number: {hours}"))
            })?;
        }
        if let Some(url) = lookup("DATABASE_URL").filter(|u| !u.trim().is_empty()) {
            self.cache.database_url = Some(url);
        }
        if let Some(backend) = lookup("CACHE_BACKEND") {
            self.cache.backend = backend.parse().map_err(AnalyticsError::Config)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn empty_file_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.api.rate_limit_delay_ms, 200);
        assert_eq!(config.cache.refresh_interval_hours, 2.0);
        assert_eq!(config.targets.subscribers, 30_000);
        assert_eq!(config.targets.deadline.to_rfc3339(), "2026-03-31T00:00:00+00:00");
    }

    #[test]
    fn sample_config_matches_defaults() {
        let config = AppConfig::from_toml(include_str!("../config/newsletter-analytics.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let toml = r#"
[api]
content_domains = ["example.com"]

[cache]
backend = "postgres"

[targets]
subscribers = 12000
deadline = "2026-06-30T00:00:00Z"

[targets.open_rate]
min = 30
max = 35

[economics]
paid_sources = ["facebook"]
rpm = 4.5
"#;
        let config = AppConfig::from_toml(toml).unwrap();
        assert_eq!(config.api.content_domains, vec!["example.com"]);
        assert_eq!(config.api.max_per_page, 100);
        assert_eq!(config.cache.backend, CacheBackend::Postgres);
        assert_eq!(config.targets.subscribers, 12000);
        assert_eq!(config.targets.open_rate.min, 30.0);
        assert_eq!(config.targets.ctor.min, 16.0);
        assert_eq!(config.economics.paid_sources, vec!["facebook"]);
        assert_eq!(config.economics.rpm, 4.5);
        assert_eq!(config.economics.platform_monthly_cost, 109.0);
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("BEEHIIV_API_KEY", "secret"),
            ("REFRESH_INTERVAL_HOURS", "0.5"),
            ("DATABASE_URL", "postgres://localhost/news"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.api.api_key.as_deref(), Some("secret"));
        assert_eq!(config.cache.refresh_interval_hours, 0.5);
        assert_eq!(
            config.cache.database_url.as_deref(),
            Some("postgres://localhost/news")
        );
    }

    #[test]
    fn bad_refresh_interval_is_a_config_error() {
        let mut config = AppConfig::default();
        let result = config.apply_env(|key| {
            (key == "REFRESH_INTERVAL_HOURS").then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(AnalyticsError::Config(_))));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cache]\npath = \"snapshots/cache.json\"").unwrap();
        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.cache.path, PathBuf::from("snapshots/cache.json"));
        assert!(AppConfig::from_file("/nonexistent/newsletter.toml").is_err());
    }
}
