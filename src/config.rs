use serde::Deserialize;
use std::convert::TryFrom;
use std::ops::RangeInclusive;

use crate::error::{Result, ServerError};

/// Configuration for the HTTP server.
///
/// Every value is fixed once the server is constructed. It can be initialized
/// from environment variables with the "FERRULE_" prefix or from a config file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServerConfig {
    /// Server host address. Defaults to "0.0.0.0".
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port number. Defaults to 8080. Port 0 binds an ephemeral port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Pending connection queue length passed to `listen`. Defaults to 1000.
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    /// Number of worker reactors. Defaults to the CPU count.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Bytes read or written per connection per I/O call. Defaults to 4096.
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: usize,
    /// Readiness events drained per poll. Defaults to 2048.
    #[serde(default = "default_max_events")]
    pub max_events: usize,
    /// Open connections across all workers. Defaults to 10000.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Lower bound of the idle backoff sleep, in microseconds.
    #[serde(default = "default_sleep_min_us")]
    pub sleep_min_us: u64,
    /// Upper bound of the idle backoff sleep, in microseconds.
    #[serde(default = "default_sleep_max_us")]
    pub sleep_max_us: u64,
}

/// Implements conversion from the config crate's Config type to ServerConfig.
impl TryFrom<config::Config> for ServerConfig {
    type Error = config::ConfigError;

    fn try_from(config: config::Config) -> std::result::Result<Self, Self::Error> {
        config.try_deserialize()
    }
}

impl ServerConfig {
    /// Creates a new ServerConfig instance from environment variables and config file.
    ///
    /// This method will:
    /// 1. Load environment variables from a .env file if present
    /// 2. Load configuration from a "ferrule" file (if it exists)
    /// 3. Override with environment variables prefixed with "FERRULE_"
    ///
    /// # Errors
    /// Returns a ConfigError if configuration loading or parsing fails.
    pub fn new() -> std::result::Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let builder = config::Config::builder()
            .add_source(config::File::with_name("ferrule").required(false))
            .add_source(config::Environment::with_prefix("FERRULE"));

        builder.build()?.try_into()
    }

    /// Default configuration listening on the given address.
    pub fn with_address(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Checks the invariants the reactor relies on.
    ///
    /// # Errors
    /// Returns `ServerError::InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(ServerError::InvalidConfig(msg.to_owned()));

        if self.workers == 0 {
            return invalid("workers must be at least 1");
        }
        if self.max_buffer_size == 0 {
            return invalid("max_buffer_size must be at least 1");
        }
        if self.max_events == 0 {
            return invalid("max_events must be at least 1");
        }
        if self.backlog == 0 {
            return invalid("backlog must be at least 1");
        }
        if self.max_connections == 0 {
            return invalid("max_connections must be at least 1");
        }
        if self.sleep_min_us > self.sleep_max_us {
            return invalid("sleep_min_us must not exceed sleep_max_us");
        }
        Ok(())
    }

    /// Bounds of the randomized idle sleep, in microseconds.
    pub fn backoff_range(&self) -> RangeInclusive<u64> {
        self.sleep_min_us..=self.sleep_max_us
    }

    /// Connection slots available to each worker.
    pub fn connections_per_worker(&self) -> usize {
        (self.max_connections / self.workers.max(1)).max(1)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_backlog() -> u32 {
    1000
}

/// One worker per CPU.
fn default_workers() -> usize {
    num_cpus::get()
}

fn default_max_buffer_size() -> usize {
    4096
}

fn default_max_events() -> usize {
    2048
}

fn default_max_connections() -> usize {
    10_000
}

fn default_sleep_min_us() -> u64 {
    10
}

fn default_sleep_max_us() -> u64 {
    100
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            backlog: default_backlog(),
            workers: default_workers(),
            max_buffer_size: default_max_buffer_size(),
            max_events: default_max_events(),
            max_connections: default_max_connections(),
            sleep_min_us: default_sleep_min_us(),
            sleep_max_us: default_sleep_max_us(),
        }
    }
}
