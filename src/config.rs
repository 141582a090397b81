use envconfig::Envconfig;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Envconfig, Clone)]
pub struct Config {
    /// Server bind address
    #[envconfig(from = "BIND_ADDR", default = "127.0.0.1:3000")]
    pub bind_addr: SocketAddr,

    /// Samples retained per endpoint for percentile computation
    #[envconfig(from = "TRACKER_CAPACITY", default = "100")]
    pub tracker_capacity: usize,

    /// Default rate limit budget per window
    #[envconfig(from = "RATE_LIMIT_MAX_REQUESTS", default = "60")]
    pub rate_limit_max_requests: u32,

    /// Default rate limit window in milliseconds
    #[envconfig(from = "RATE_LIMIT_WINDOW_MS", default = "60000")]
    pub rate_limit_window_ms: u64,

    /// Idle window counters older than this are pruned, in seconds
    #[envconfig(from = "CLEANUP_INTERVAL", default = "300")]
    pub cleanup_interval_secs: u64,

    /// Log level for the service's own targets
    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, envconfig::Error> {
        Config::init_from_env()
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}
