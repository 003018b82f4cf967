use std::time::Duration;

use anyhow::{Context, bail};

use huddle_api::ApiConfig;
use huddle_gateway::GatewayConfig;
use huddle_types::models::Identity;

const DEFAULT_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_WS_URL: &str = "ws://localhost:3001";
const DEFAULT_PAGE_SIZE: u32 = 20;

/// Client settings, read from `HUDDLE_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub gateway: GatewayConfig,
    pub page_size: u32,
    pub identity: Option<Identity>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let mut gateway = GatewayConfig::new(&var("HUDDLE_WS_URL", DEFAULT_WS_URL))
            .context("HUDDLE_WS_URL is not a valid URL")?;
        if let Some(secs) = lookup("HUDDLE_PING_INTERVAL_SECS") {
            let secs: u64 = secs
                .parse()
                .context("HUDDLE_PING_INTERVAL_SECS must be a number of seconds")?;
            if secs == 0 {
                bail!("HUDDLE_PING_INTERVAL_SECS must be positive");
            }
            gateway = gateway.with_ping_interval(Duration::from_secs(secs));
        }

        let page_size = match lookup("HUDDLE_PAGE_SIZE") {
            Some(size) => size.parse().context("HUDDLE_PAGE_SIZE must be a number")?,
            None => DEFAULT_PAGE_SIZE,
        };
        if page_size == 0 {
            bail!("HUDDLE_PAGE_SIZE must be positive");
        }

        let identity = match lookup("HUDDLE_USER_ID") {
            Some(id) => Some(Identity {
                user_id: id.parse().context("HUDDLE_USER_ID must be a number")?,
                auth_token: lookup("HUDDLE_AUTH_TOKEN").filter(|t| !t.is_empty()),
            }),
            None => None,
        };

        Ok(Self {
            api: ApiConfig {
                base_url: var("HUDDLE_BASE_URL", DEFAULT_BASE_URL),
                api_url: var("HUDDLE_API_URL", DEFAULT_API_URL),
            },
            gateway,
            page_size,
            identity,
        })
    }

    /// The configured user, required by every command.
    pub fn identity(&self) -> anyhow::Result<Identity> {
        self.identity
            .clone()
            .context("HUDDLE_USER_ID is not set")
    }
}
