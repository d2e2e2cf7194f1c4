use serde::Deserialize;

/// Configuration settings for the traffic guard
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Which backend holds counters, bans and whitelist entries
    pub store: StoreConfig,
    /// Redis configuration
    pub redis: RedisConfig,
    /// Administrative surface configuration
    pub admin: AdminConfig,
    /// Periodic job configuration
    pub jobs: JobsConfig,
    /// Prometheus exporter configuration
    pub metrics: MetricsConfig,
}

/// Server configuration settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind the server to
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
}

/// Redis configuration settings
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
}

/// Administrative API settings
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Bearer token required on every `/admin` route
    pub token: String,
    /// Actor id recorded on bans added through the API
    pub actor_id: i64,
}

/// Intervals for the built-in job runner, in seconds. Zero disables a job.
#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    pub autoban_interval_secs: u64,
    pub autowhitelist_interval_secs: u64,
    pub gc_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Listen address of the Prometheus scrape endpoint
    pub listen: String,
}

impl Settings {
    /// Load configuration from defaults, an optional config file and
    /// `APP_`-prefixed environment variables (`APP_REDIS__URL`, ...)
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let config = config::Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("store.backend", "redis")?
            .set_default("redis.url", "redis://localhost:6379")?
            .set_default("admin.token", "")?
            .set_default("admin.actor_id", 1)?
            .set_default("jobs.autoban_interval_secs", 0)?
            .set_default("jobs.autowhitelist_interval_secs", 0)?
            .set_default("jobs.gc_interval_secs", 0)?
            .set_default("metrics.enabled", false)?
            .set_default("metrics.listen", "127.0.0.1:9000")?
            .add_source(config::File::with_name("config/traffic_guard").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        config.try_deserialize()
    }
}
