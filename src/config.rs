use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use crate::publish::DEFAULT_PUBLISH_PORT;

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Root directory holding one subdirectory per project
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Host address both servers bind to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Publish endpoint port
    #[serde(default = "default_publish_port")]
    pub publish_port: u16,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Seconds a publish connection may wait for its next message
    #[serde(default = "default_publish_idle_timeout_secs")]
    pub publish_idle_timeout_secs: u64,

    /// Maximum size of one publish message in MB
    #[serde(default = "default_max_message_mb")]
    pub max_message_mb: usize,

    /// Serve UI assets from this directory instead of the embedded copy
    #[serde(default)]
    pub static_dir: Option<PathBuf>,

    /// Log filter, `tracing_subscriber::EnvFilter` syntax
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Where a daemonized process writes its log output
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            bind_addr: default_bind_addr(),
            port: default_port(),
            publish_port: default_publish_port(),
            timeout_secs: default_timeout_secs(),
            publish_idle_timeout_secs: default_publish_idle_timeout_secs(),
            max_message_mb: default_max_message_mb(),
            static_dir: None,
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

/// Values given on the command line; they win over file and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub work_dir: Option<PathBuf>,
    pub bind_addr: Option<String>,
    pub port: Option<u16>,
    pub publish_port: Option<u16>,
    pub static_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
}

impl ServerConfig {
    /// Load configuration from an optional `porfavor.{toml,yaml,json}` file,
    /// `PORFAVOR_*` environment variables, then command line overrides.
    pub fn load(overrides: ConfigOverrides) -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::with_name("porfavor").required(false))
            // Override with environment variables
            .add_source(config::Environment::with_prefix("PORFAVOR").separator("__"));
        Self::build(builder, overrides)
    }

    /// Apply command line overrides on top of `builder`'s sources.
    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
        overrides: ConfigOverrides,
    ) -> anyhow::Result<Self> {
        let path_value = |p: PathBuf| p.to_string_lossy().into_owned();

        let builder = builder
            .set_override_option("work_dir", overrides.work_dir.map(path_value))?
            .set_override_option("bind_addr", overrides.bind_addr)?
            .set_override_option("port", overrides.port.map(i64::from))?
            .set_override_option("publish_port", overrides.publish_port.map(i64::from))?
            .set_override_option("static_dir", overrides.static_dir.map(path_value))?
            .set_override_option("log_level", overrides.log_level)?
            .set_override_option("log_file", overrides.log_file.map(path_value))?;

        let config: ServerConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// HTTP socket address
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        resolve_addr(&self.bind_addr, self.port)
    }

    /// Publish endpoint socket address
    pub fn publish_socket_addr(&self) -> anyhow::Result<SocketAddr> {
        resolve_addr(&self.bind_addr, self.publish_port)
    }

    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn publish_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_idle_timeout_secs)
    }

    /// Get max publish message size in bytes
    pub fn max_message_bytes(&self) -> usize {
        self.max_message_mb.saturating_mul(1024 * 1024)
    }
}

fn resolve_addr(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow::anyhow!("host {host:?} did not resolve to any address"))
}

fn default_work_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_publish_port() -> u16 {
    DEFAULT_PUBLISH_PORT
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_publish_idle_timeout_secs() -> u64 {
    300
}

fn default_max_message_mb() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}
