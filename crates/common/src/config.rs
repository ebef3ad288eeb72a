use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub github: GithubConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(".")
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let layer = |name: &str| {
            File::with_name(path.as_ref().join(name).to_string_lossy().as_ref()).required(false)
        };

        Config::builder()
            .add_source(layer("config/default"))
            .add_source(layer("config/local"))
            .add_source(
                Environment::default()
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("collector.organizations")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default)]
    pub test_admin_url: Option<String>,
    #[serde(default = "DatabaseConfig::default_max_connections")]
    pub max_connections: u32,
}

impl DatabaseConfig {
    const fn default_max_connections() -> u32 {
        10
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubToken {
    pub id: String,
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubConfig {
    #[serde(default)]
    pub tokens: Vec<GithubToken>,
    #[serde(default = "GithubConfig::default_user_agent")]
    pub user_agent: String,
    #[serde(default = "GithubConfig::default_api_base")]
    pub api_base: String,
}

impl GithubConfig {
    fn default_user_agent() -> String {
        "org-activity-sync".to_string()
    }

    fn default_api_base() -> String {
        "https://api.github.com/".to_string()
    }

    /// Configured tokens, or a single `env` token built from `GITHUB_TOKEN`
    /// when none are configured.
    pub fn resolved_tokens(&self) -> Vec<GithubToken> {
        if !self.tokens.is_empty() {
            return self.tokens.clone();
        }
        match std::env::var("GITHUB_TOKEN") {
            Ok(secret) if !secret.trim().is_empty() => vec![GithubToken {
                id: "env".to_string(),
                secret: secret.trim().to_string(),
            }],
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    #[serde(default = "CollectorConfig::default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "CollectorConfig::default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub run_once: bool,
    #[serde(default)]
    pub organizations: Vec<String>,
    #[serde(default = "CollectorConfig::default_upsert_concurrency")]
    pub upsert_concurrency: usize,
    #[serde(default = "CollectorConfig::default_changelog_concurrency")]
    pub changelog_concurrency: usize,
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
}

impl CollectorConfig {
    const fn default_interval_secs() -> u64 {
        300
    }

    const fn default_page_size() -> u32 {
        100
    }

    const fn default_upsert_concurrency() -> usize {
        8
    }

    const fn default_changelog_concurrency() -> usize {
        8
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval_secs: Self::default_interval_secs(),
            page_size: Self::default_page_size(),
            run_once: false,
            organizations: Vec::new(),
            upsert_concurrency: Self::default_upsert_concurrency(),
            changelog_concurrency: Self::default_changelog_concurrency(),
            run_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "BrokerConfig::default_max_inflight")]
    pub max_inflight: usize,
    #[serde(default = "BrokerConfig::default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "BrokerConfig::default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "BrokerConfig::default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "BrokerConfig::default_jitter_frac")]
    pub jitter_frac: f32,
}

impl BrokerConfig {
    const fn default_max_inflight() -> usize {
        32
    }

    const fn default_max_attempts() -> u32 {
        5
    }

    const fn default_backoff_base_ms() -> u64 {
        500
    }

    const fn default_backoff_max_ms() -> u64 {
        60_000
    }

    const fn default_jitter_frac() -> f32 {
        0.2
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_inflight: Self::default_max_inflight(),
            max_attempts: Self::default_max_attempts(),
            backoff_base_ms: Self::default_backoff_base_ms(),
            backoff_max_ms: Self::default_backoff_max_ms(),
            jitter_frac: Self::default_jitter_frac(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "ApiConfig::default_bind")]
    pub bind: String,
}

impl ApiConfig {
    fn default_bind() -> String {
        "0.0.0.0:8080".to_string()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: Self::default_bind(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "ObservabilityConfig::default_metrics_path")]
    pub metrics_path: String,
}

impl ObservabilityConfig {
    fn default_metrics_path() -> String {
        "/metrics".to_string()
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_path: Self::default_metrics_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_defaults_from_minimal_file() {
        let dir = std::env::temp_dir().join(format!("cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(dir.join("config")).unwrap();
        std::fs::write(
            dir.join("config/default.toml"),
            r#"
[database]
url = "postgres://localhost/activity"

[github]
user_agent = "tests"

[collector]
organizations = ["acme"]
"#,
        )
        .unwrap();

        let cfg = AppConfig::load_from_path(&dir).unwrap();
        assert_eq!(cfg.database.url, "postgres://localhost/activity");
        assert_eq!(cfg.github.api_base, "https://api.github.com/");
        assert_eq!(cfg.collector.organizations, vec!["acme".to_string()]);
        assert_eq!(cfg.collector.page_size, 100);
        assert_eq!(cfg.collector.changelog_concurrency, 8);
        assert_eq!(cfg.broker.max_attempts, 5);
        assert_eq!(cfg.observability.metrics_path, "/metrics");

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn configured_tokens_take_precedence() {
        let cfg = GithubConfig {
            tokens: vec![GithubToken {
                id: "primary".into(),
                secret: "s3cret".into(),
            }],
            user_agent: "tests".into(),
            api_base: GithubConfig::default_api_base(),
        };
        let tokens = cfg.resolved_tokens();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].id, "primary");
    }
}
