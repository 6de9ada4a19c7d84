use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args};
use tracing::trace;

use crate::metric::Signer;
use crate::util::parse_duration;

/// Agent settings, from flags or environment
#[derive(Clone, Args)]
pub struct AgentConfig {
    /// Server address (host:port)
    #[arg(short, long, env = "ADDRESS", default_value = "127.0.0.1:8080")]
    pub address: String,

    /// How often host statistics are refreshed
    #[arg(short, long, env = "POLL_INTERVAL", default_value = "2s", value_parser = parse_duration)]
    pub poll_interval: Duration,

    /// How often a batch is sent
    #[arg(short, long, env = "REPORT_INTERVAL", default_value = "10s", value_parser = parse_duration)]
    pub report_interval: Duration,

    /// Shared signing key; signing is off when empty
    #[arg(short, long, env = "KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// Maximum concurrent deliveries
    #[arg(short = 'l', long, env = "RATE_LIMIT", default_value_t = 1)]
    pub rate_limit: usize,
}

impl AgentConfig {
    /// Reject settings the pipeline can not run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("poll"));
        }
        if self.report_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("report"));
        }
        if self.poll_interval >= self.report_interval {
            return Err(ConfigError::PollNotFasterThanReport {
                poll: self.poll_interval,
                report: self.report_interval,
            });
        }
        if self.rate_limit == 0 {
            return Err(ConfigError::ZeroRateLimit);
        }

        trace!(
            "agent config is valid: poll {:?}, report {:?}, rate limit {}",
            self.poll_interval, self.report_interval, self.rate_limit
        );
        Ok(())
    }

    pub fn signer(&self) -> Option<Signer> {
        Signer::from_key(self.key.as_deref())
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".to_string(),
            poll_interval: Duration::from_secs(2),
            report_interval: Duration::from_secs(10),
            key: None,
            rate_limit: 1,
        }
    }
}

/// Server settings, from flags or environment
#[derive(Clone, Args)]
pub struct ServerConfig {
    /// Listen address (host:port)
    #[arg(short, long, env = "ADDRESS", default_value = "127.0.0.1:8080")]
    pub address: String,

    /// Snapshot interval; 0 disables periodic dumps
    #[arg(short = 'i', long, env = "STORE_INTERVAL", default_value = "300s", value_parser = parse_duration)]
    pub store_interval: Duration,

    /// Snapshot file; empty disables the snapshot
    #[arg(short = 'f', long, env = "STORE_FILE", default_value = "/tmp/devops-metrics-db.json")]
    pub store_file: String,

    /// Load the snapshot file at start
    #[arg(short, long, env = "RESTORE", default_value_t = true, action = ArgAction::Set)]
    pub restore: bool,

    /// Shared signing key; verification is off when empty
    #[arg(short, long, env = "KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// SQLite DSN; selects the database store when set
    #[arg(short = 'd', long, env = "DATABASE_DSN")]
    pub database_dsn: Option<String>,
}

impl ServerConfig {
    pub fn signer(&self) -> Option<Signer> {
        Signer::from_key(self.key.as_deref())
    }

    /// Non-empty database DSN
    pub fn dsn(&self) -> Option<&str> {
        self.database_dsn.as_deref().filter(|dsn| !dsn.is_empty())
    }

    /// Snapshot file, unless disabled or superseded by a database
    pub fn backup_path(&self) -> Option<PathBuf> {
        if self.dsn().is_some() || self.store_file.is_empty() {
            return None;
        }
        Some(PathBuf::from(&self.store_file))
    }

    pub fn need_restore(&self) -> bool {
        self.restore && self.backup_path().is_some()
    }

    pub fn need_periodic_store(&self) -> bool {
        !self.store_interval.is_zero() && self.backup_path().is_some()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".to_string(),
            store_interval: Duration::from_secs(300),
            store_file: "/tmp/devops-metrics-db.json".to_string(),
            restore: true,
            key: None,
            database_dsn: None,
        }
    }
}

fn redacted(key: &Option<String>) -> Option<&'static str> {
    key.as_ref().map(|_| "<redacted>")
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("address", &self.address)
            .field("poll_interval", &self.poll_interval)
            .field("report_interval", &self.report_interval)
            .field("key", &redacted(&self.key))
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("address", &self.address)
            .field("store_interval", &self.store_interval)
            .field("store_file", &self.store_file)
            .field("restore", &self.restore)
            .field("key", &redacted(&self.key))
            .field("database_dsn", &self.database_dsn)
            .finish()
    }
}

/// Startup configuration errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    ZeroInterval(&'static str),
    PollNotFasterThanReport { poll: Duration, report: Duration },
    ZeroRateLimit,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroInterval(which) => write!(f, "{which} interval must be positive"),
            ConfigError::PollNotFasterThanReport { poll, report } => write!(
                f,
                "poll interval ({poll:?}) must be shorter than report interval ({report:?})"
            ),
            ConfigError::ZeroRateLimit => write!(f, "rate limit must be at least 1"),
        }
    }
}

impl std::error::Error for ConfigError {}
