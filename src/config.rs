use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_request_timeout() -> u64 {
    5
}
fn default_max_body_bytes() -> usize {
    4 * 1024
}

/// Connection pool and backend settings for the click store.
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// Upper bound on simultaneously open connections.
    #[serde(default = "default_max_open_conns")]
    pub max_open_conns: usize,
    /// Idle connections kept between calls; the rest are closed by maintenance.
    #[serde(default = "default_max_idle_conns")]
    pub max_idle_conns: usize,
    #[serde(default = "default_conn_max_lifetime")]
    pub conn_max_lifetime_secs: u64,
    #[serde(default = "default_conn_max_idle")]
    pub conn_max_idle_secs: u64,
    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_secs: u64,
    /// Deadline for a single record/query call, pool wait included.
    #[serde(default = "default_op_timeout")]
    pub op_timeout_ms: u64,
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_connect_delay")]
    pub connect_delay_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_open_conns: default_max_open_conns(),
            max_idle_conns: default_max_idle_conns(),
            conn_max_lifetime_secs: default_conn_max_lifetime(),
            conn_max_idle_secs: default_conn_max_idle(),
            maintenance_interval_secs: default_maintenance_interval(),
            op_timeout_ms: default_op_timeout(),
            busy_timeout_ms: default_busy_timeout(),
            connect_attempts: default_connect_attempts(),
            connect_delay_ms: default_connect_delay(),
        }
    }
}

impl DatabaseConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn connect_delay(&self) -> Duration {
        Duration::from_millis(self.connect_delay_ms)
    }

    pub fn conn_max_lifetime(&self) -> Duration {
        Duration::from_secs(self.conn_max_lifetime_secs)
    }

    pub fn conn_max_idle(&self) -> Duration {
        Duration::from_secs(self.conn_max_idle_secs)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("banner_stat.db")
}
fn default_max_open_conns() -> usize {
    100
}
fn default_max_idle_conns() -> usize {
    50
}
fn default_conn_max_lifetime() -> u64 {
    3600
}
fn default_conn_max_idle() -> u64 {
    1800
}
fn default_maintenance_interval() -> u64 {
    30
}
fn default_op_timeout() -> u64 {
    5000
}
fn default_busy_timeout() -> u64 {
    5000
}
fn default_connect_attempts() -> u32 {
    30
}
fn default_connect_delay() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Interval after which one request of the burst quota is replenished.
    #[serde(default = "default_replenish_interval")]
    pub replenish_interval_ms: u64,
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            replenish_interval_ms: default_replenish_interval(),
            burst_size: default_burst_size(),
        }
    }
}

fn default_replenish_interval() -> u64 {
    1
}
fn default_burst_size() -> u32 {
    1000
}

impl AppConfig {
    /// Reject settings the store or server cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        let db = &self.database;
        if db.max_open_conns == 0 {
            return Err("database.max_open_conns must be at least 1".to_string());
        }
        if db.max_idle_conns > db.max_open_conns {
            return Err(format!(
                "database.max_idle_conns ({}) cannot exceed database.max_open_conns ({})",
                db.max_idle_conns, db.max_open_conns
            ));
        }
        if db.connect_attempts == 0 {
            return Err("database.connect_attempts must be at least 1".to_string());
        }
        if db.op_timeout_ms == 0 {
            return Err("database.op_timeout_ms must be greater than 0".to_string());
        }
        if db.maintenance_interval_secs == 0 {
            return Err("database.maintenance_interval_secs must be greater than 0".to_string());
        }
        if self.server.request_timeout_secs == 0 {
            return Err("server.request_timeout_secs must be greater than 0".to_string());
        }
        if self.rate_limit.enabled
            && (self.rate_limit.replenish_interval_ms == 0 || self.rate_limit.burst_size == 0)
        {
            return Err(
                "rate_limit.replenish_interval_ms and rate_limit.burst_size must be non-zero"
                    .to_string(),
            );
        }
        Ok(())
    }

    pub fn load(config_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder();

        // Load from config file
        let path = config_path.unwrap_or("config.toml");
        builder = builder.add_source(File::with_name(path).required(false));

        // Overlay with environment variables (BANNER_STAT__SERVER__PORT=3001, etc.)
        builder = builder.add_source(
            Environment::with_prefix("BANNER_STAT")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
