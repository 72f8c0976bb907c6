//! Application configuration — environment variables, CLI overrides, defaults.

use tracing::warn;

/// Voice-calling provider configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Provider API key. Empty means unconfigured; the gateway refuses to
    /// construct without it.
    pub api_key: String,
    /// Provider API base URL.
    pub base_url: String,
    /// Public URL the provider should push webhook events to.
    pub webhook_url: Option<String>,
    /// Per-request timeout for provider calls in seconds.
    pub request_timeout_secs: u64,
    /// Default agent voice.
    pub default_voice: String,
    /// Default maximum call duration in seconds.
    pub max_call_duration_secs: u32,
    /// Default agent temperature.
    pub temperature: f64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.bland.ai".to_string(),
            webhook_url: None,
            request_timeout_secs: 30,
            default_voice: "nat".to_string(),
            max_call_duration_secs: 300,
            temperature: 0.7,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
    /// How many calls a batch sync reconciles in parallel.
    pub sync_concurrency: usize,
    pub provider: ProviderConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            sync_concurrency: 8,
            provider: ProviderConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with CLI overrides.
    pub fn from_env(bind_address: Option<String>, port: Option<u16>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = bind_address {
            config.bind_address = addr;
        } else if let Some(p) = port {
            config.bind_address = format!("0.0.0.0:{p}");
        }

        config.provider.api_key = std::env::var("PROVIDER_API_KEY").unwrap_or_default();
        if config.provider.api_key.is_empty() {
            warn!("PROVIDER_API_KEY not set — outbound dialing will be unavailable");
        }

        if let Ok(url) = std::env::var("PROVIDER_BASE_URL") {
            config.provider.base_url = url;
        }
        if let Ok(url) = std::env::var("PROVIDER_WEBHOOK_URL") {
            if !url.is_empty() {
                config.provider.webhook_url = Some(url);
            }
        }
        if let Ok(v) = std::env::var("PROVIDER_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                config.provider.request_timeout_secs = n;
            }
        }
        if let Ok(v) = std::env::var("PROVIDER_DEFAULT_VOICE") {
            if !v.is_empty() {
                config.provider.default_voice = v;
            }
        }
        if let Ok(v) = std::env::var("OUTDIAL_SYNC_CONCURRENCY") {
            if let Ok(n) = v.parse::<usize>() {
                config.sync_concurrency = n.max(1);
            }
        }

        config
    }
}
