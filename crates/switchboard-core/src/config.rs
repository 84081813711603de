//! Gateway configuration. Load from TOML or env.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Global application configuration for the boundary process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Application identity shown by `/api/config`.
    pub app_name: String,
    /// Listen address for the gateway.
    pub host: String,
    pub port: u16,
    /// Directory with the built UI; served at `/` when set.
    #[serde(default)]
    pub static_dir: Option<String>,
    pub downstream: DownstreamConfig,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Where the downstream gateway lives and how long to wait for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownstreamConfig {
    /// Single base URL fronting all three backend variants.
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub routes: RouteTable,
}

fn default_timeout_secs() -> u64 {
    30
}

/// Downstream route paths, relative to `base_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteTable {
    pub search: String,
    pub passages: String,
    pub answer: String,
    pub agent_chat: String,
    pub gateway: String,
    pub suggest: String,
    pub content: String,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            search: "search".to_string(),
            passages: "passages".to_string(),
            answer: "answer".to_string(),
            agent_chat: "bedrock-agent-chat".to_string(),
            gateway: "agentcore".to_string(),
            suggest: "query-suggest".to_string(),
            content: "html".to_string(),
        }
    }
}

/// Search-organisation constants stamped onto every payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub search_hub: String,
    pub pipeline: String,
    pub locale: String,
    pub fallback_locale: String,
    pub timezone: String,
    /// Sent with passage requests when the downstream cannot infer it.
    pub organization_id: Option<String>,
    pub number_of_results: u32,
    pub number_of_passages: u32,
    pub suggest_count: u32,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            search_hub: "workshop".to_string(),
            pipeline: "default".to_string(),
            locale: "en-US".to_string(),
            fallback_locale: "en".to_string(),
            timezone: "America/New_York".to_string(),
            organization_id: None,
            number_of_results: 20,
            number_of_passages: 5,
            suggest_count: 5,
        }
    }
}

/// Bearer enforcement and the identity provider's public settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// When false, `/api/*` accepts unauthenticated calls. Off only by explicit choice.
    pub enforce: bool,
    pub user_pool_id: Option<String>,
    pub client_id: Option<String>,
    pub domain: Option<String>,
    pub region: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enforce: true,
            user_pool_id: None,
            client_id: None,
            domain: None,
            region: None,
        }
    }
}

impl CoreConfig {
    /// Defaults everywhere except the downstream base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            app_name: "Switchboard Gateway".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8001,
            static_dir: None,
            downstream: DownstreamConfig {
                base_url: base_url.into(),
                timeout_secs: default_timeout_secs(),
                routes: RouteTable::default(),
            },
            search: SearchSettings::default(),
            auth: AuthConfig::default(),
        }
    }

    /// Load config from file and environment. Precedence: env `SWITCHBOARD_CONFIG` path >
    /// `config/gateway.toml` > defaults, then `SWITCHBOARD__SECTION__KEY` overrides.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("SWITCHBOARD_CONFIG").unwrap_or_else(|_| "config/gateway.toml".to_string());
        let builder = config::Config::builder()
            .set_default("app_name", "Switchboard Gateway")?
            .set_default("host", "127.0.0.1")?
            .set_default("port", 8001_i64)?
            .set_default("downstream.timeout_secs", 30_i64)?
            .set_default("auth.enforce", true)?;

        let path = Path::new(&config_path);
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("SWITCHBOARD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        built.try_deserialize()
    }

    /// Full URL of a downstream route path.
    pub fn downstream_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.downstream.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
