use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::client::{DEFAULT_BACKOFF_FACTOR, DEFAULT_MAX_RETRIES};

pub const PROVIDER: &str = "mistral";

const DEFAULT_BASE_URL: &str = "https://api.mistral.ai/v1";
const DEFAULT_MODEL: &str = "mistral-small-latest";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_WEB_BIND_ADDR: &str = "127.0.0.1:5000";
const DEFAULT_WEB_STATIC_DIR: &str = "web";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("MISTRAL_API_KEY is not set. Please add it to your environment or .env file.")]
    MissingApiKey,
}

#[derive(Clone)]
pub struct Config {
    pub provider: String,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub web_bind_addr: SocketAddr,
    pub web_static_dir: PathBuf,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("backoff_factor", &self.backoff_factor)
            .field("web_bind_addr", &self.web_bind_addr)
            .field("web_static_dir", &self.web_static_dir)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|key| env::var(key).ok())
    }

    fn from_env_with(mut get_var: impl FnMut(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = get_var("MISTRAL_API_KEY")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        Ok(Self {
            provider: PROVIDER.to_string(),
            api_key,
            base_url: parse_non_empty(get_var("LLM_BASE_URL").as_deref(), DEFAULT_BASE_URL),
            model: parse_non_empty(get_var("LLM_MODEL").as_deref(), DEFAULT_MODEL),
            timeout_secs: parse_timeout_secs(get_var("API_TIMEOUT").as_deref()),
            max_retries: parse_max_retries(get_var("LLM_MAX_RETRIES").as_deref()),
            backoff_factor: parse_backoff_factor(get_var("LLM_BACKOFF_FACTOR").as_deref()),
            web_bind_addr: parse_bind_addr(get_var("WEB_BIND_ADDR").as_deref()),
            web_static_dir: PathBuf::from(parse_non_empty(
                get_var("WEB_STATIC_DIR").as_deref(),
                DEFAULT_WEB_STATIC_DIR,
            )),
        })
    }
}

fn parse_non_empty(raw: Option<&str>, default: &str) -> String {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(default)
        .to_string()
}

fn parse_timeout_secs(raw: Option<&str>) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
}

fn parse_max_retries(raw: Option<&str>) -> u32 {
    raw.and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(DEFAULT_MAX_RETRIES)
}

fn parse_backoff_factor(raw: Option<&str>) -> f64 {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value >= 0.0)
        .unwrap_or(DEFAULT_BACKOFF_FACTOR)
}

fn parse_bind_addr(raw: Option<&str>) -> SocketAddr {
    raw.and_then(|value| value.trim().parse::<SocketAddr>().ok())
        .unwrap_or_else(|| {
            DEFAULT_WEB_BIND_ADDR
                .parse()
                .unwrap_or(SocketAddr::from(([127, 0, 0, 1], 5000)))
        })
}
