use serde::Deserialize;

/// Environment variable that overrides `backend.auth_token`.
pub const AUTH_TOKEN_ENV: &str = "SIGNALSENSE_AUTH_TOKEN";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub live: LiveConfig,
    #[serde(default)]
    pub aggregator: AggregatorSettings,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// REST backend the snapshot fetcher polls.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// e.g. "http://localhost:5000/api/v1"; `/audience/live` and `/analytics/dashboard` are appended.
    pub api_base_url: String,
    /// Sent as `Authorization: Bearer <token>` when set.
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

/// Live telemetry channel. Reconnect defaults mirror the socket.io client the dashboard used.
#[derive(Debug, Clone, Deserialize)]
pub struct LiveConfig {
    pub endpoint_url: String,
    #[serde(default = "default_join_event")]
    pub join_event: String,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_reconnect_delay_max_ms")]
    pub reconnect_delay_max_ms: u64,
    /// Jitter applied to each reconnect delay, 0.0..=1.0.
    #[serde(default = "default_randomization_factor")]
    pub randomization_factor: f64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_join_event() -> String {
    "joinDashboard".into()
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_delay_max_ms() -> u64 {
    5_000
}

fn default_randomization_factor() -> f64 {
    0.5
}

fn default_connect_timeout_ms() -> u64 {
    20_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,
    /// Max published states a slow subscriber (e.g. a /ws/dashboard client) may lag behind.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            window_capacity: default_window_capacity(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    30_000
}

fn default_window_capacity() -> usize {
    crate::window::DEFAULT_WINDOW_CAPACITY
}

fn default_broadcast_capacity() -> usize {
    64
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    /// How often the aggregator logs its stats (window size, events, fetch failures) at INFO level.
    pub stats_log_interval_secs: u64,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        let mut config = Self::load_from_str(&s)?;
        if let Ok(token) = std::env::var(AUTH_TOKEN_ENV)
            && !token.trim().is_empty()
        {
            config.backend.auth_token = Some(token);
        }
        Ok(config)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            self.backend.api_base_url.starts_with("http://")
                || self.backend.api_base_url.starts_with("https://"),
            "backend.api_base_url must start with http:// or https://, got {:?}",
            self.backend.api_base_url
        );
        anyhow::ensure!(
            self.backend.request_timeout_ms > 0,
            "backend.request_timeout_ms must be > 0, got {}",
            self.backend.request_timeout_ms
        );
        anyhow::ensure!(
            self.live.endpoint_url.starts_with("ws://")
                || self.live.endpoint_url.starts_with("wss://"),
            "live.endpoint_url must start with ws:// or wss://, got {:?}",
            self.live.endpoint_url
        );
        anyhow::ensure!(
            !self.live.join_event.trim().is_empty(),
            "live.join_event must be non-empty"
        );
        anyhow::ensure!(
            self.live.reconnect_delay_ms > 0,
            "live.reconnect_delay_ms must be > 0, got {}",
            self.live.reconnect_delay_ms
        );
        anyhow::ensure!(
            self.live.reconnect_delay_max_ms >= self.live.reconnect_delay_ms,
            "live.reconnect_delay_max_ms must be >= live.reconnect_delay_ms ({}), got {}",
            self.live.reconnect_delay_ms,
            self.live.reconnect_delay_max_ms
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.live.randomization_factor),
            "live.randomization_factor must be between 0.0 and 1.0, got {}",
            self.live.randomization_factor
        );
        anyhow::ensure!(
            self.live.connect_timeout_ms > 0,
            "live.connect_timeout_ms must be > 0, got {}",
            self.live.connect_timeout_ms
        );
        anyhow::ensure!(
            self.aggregator.poll_interval_ms > 0,
            "aggregator.poll_interval_ms must be > 0, got {}",
            self.aggregator.poll_interval_ms
        );
        anyhow::ensure!(
            self.aggregator.window_capacity > 0,
            "aggregator.window_capacity must be > 0, got {}",
            self.aggregator.window_capacity
        );
        anyhow::ensure!(
            self.aggregator.broadcast_capacity > 0,
            "aggregator.broadcast_capacity must be > 0, got {}",
            self.aggregator.broadcast_capacity
        );
        anyhow::ensure!(
            self.monitoring.stats_log_interval_secs > 0,
            "monitoring.stats_log_interval_secs must be > 0, got {}",
            self.monitoring.stats_log_interval_secs
        );
        Ok(())
    }
}
