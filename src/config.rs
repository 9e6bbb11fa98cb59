use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment, Provider,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Command-line flags. Only flags the user actually passed are serialized,
/// so unset ones never shadow the TOML file or environment.
#[derive(Parser, Serialize, Clone, Debug, Default)]
#[command(name = "forum-server", version, about = "Forum server with realtime updates")]
pub struct CliArgs {
    /// Port to listen on
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file (default: ./forum.toml)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long)]
    #[serde(skip_serializing_if = "is_false")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip_serializing_if = "is_false")]
    pub generate_config: bool,

    /// Data directory for the SQLite database
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Resolved server configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub config: String,
    #[serde(default)]
    pub json_logs: bool,
    #[serde(default)]
    pub generate_config: bool,
    pub data_dir: String,

    /// Realtime gateway tuning (loaded from [realtime] section in TOML)
    #[serde(default)]
    pub realtime: Option<RealtimeConfig>,
}

/// Heartbeat, buffering and queueing limits for realtime connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Seconds between server pings (default: 30)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Seconds without a pong or any inbound frame before the connection
    /// is dropped (default: 60)
    #[serde(default = "default_liveness_timeout")]
    pub liveness_timeout_secs: u64,

    /// Outbound frames buffered per connection before it counts as too
    /// slow and is dropped (default: 64)
    #[serde(default = "default_send_buffer")]
    pub send_buffer: usize,

    /// Upper bound on a single socket write, in seconds (default: 10)
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    /// Capacity of the broadcast work queue (default: 1024)
    #[serde(default = "default_dispatch_queue")]
    pub dispatch_queue: usize,
}

impl RealtimeConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_secs(self.liveness_timeout_secs.max(1))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs.max(1))
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: 30,
            liveness_timeout_secs: 60,
            send_buffer: 64,
            write_timeout_secs: 10,
            dispatch_queue: 1024,
        }
    }
}

fn default_ping_interval() -> u64 {
    30
}

fn default_liveness_timeout() -> u64 {
    60
}

fn default_send_buffer() -> usize {
    64
}

fn default_write_timeout() -> u64 {
    10
}

fn default_dispatch_queue() -> usize {
    1024
}

const DEFAULT_CONFIG_PATH: &str = "./forum.toml";

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_address: "0.0.0.0".to_string(),
            config: DEFAULT_CONFIG_PATH.to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            realtime: Some(RealtimeConfig::default()),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (FORUM_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = CliArgs::parse();
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        Self::layered(Toml::file(config_path), &cli).extract()
    }

    /// Stack the layers over an arbitrary file provider.
    pub fn layered(file: impl Provider, cli: &CliArgs) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(file)
            .merge(Env::prefixed("FORUM_"))
            .merge(Serialized::defaults(cli))
    }

    pub fn realtime(&self) -> RealtimeConfig {
        self.realtime.clone().unwrap_or_default()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Forum Server Configuration
# Place this file at ./forum.toml or specify with --config <path>
# All settings can be overridden via environment variables (FORUM_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 8080)
# port = 8080

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database
# data_dir = "./data"

# ---- Realtime (WebSocket) ----
# [realtime]

# Seconds between server pings
# ping_interval_secs = 30

# Seconds without a pong before a connection is dropped
# liveness_timeout_secs = 60

# Frames buffered per connection before it is treated as a slow consumer
# send_buffer = 64

# Upper bound on a single socket write, in seconds
# write_timeout_secs = 10

# Broadcast work queue capacity
# dispatch_queue = 1024
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_from(toml: &str) -> Config {
        load_with_args(toml, &["forum-server"])
    }

    fn load_with_args(toml: &str, args: &[&str]) -> Config {
        let cli = CliArgs::parse_from(args);
        Config::layered(Toml::string(toml), &cli)
            .extract()
            .expect("config extracts")
    }

    #[test]
    fn test_template_yields_defaults() {
        let config = load_from(&generate_config_template());
        assert_eq!(config.port, 8080);
        assert_eq!(config.realtime(), RealtimeConfig::default());
    }

    #[test]
    fn test_partial_realtime_section() {
        let config = load_from(
            r#"
port = 9000

[realtime]
ping_interval_secs = 5
"#,
        );
        let realtime = config.realtime();
        assert_eq!(config.port, 9000);
        assert_eq!(realtime.ping_interval(), Duration::from_secs(5));
        assert_eq!(realtime.liveness_timeout(), Duration::from_secs(60));
        assert_eq!(realtime.send_buffer, 64);
    }

    #[test]
    fn test_file_values_survive_absent_flags() {
        let config = load_from(
            r#"
port = 9000
data_dir = "/srv/forum"

[realtime]
ping_interval_secs = 5
send_buffer = 16
"#,
        );
        assert_eq!(config.port, 9000);
        assert_eq!(config.data_dir, "/srv/forum");
        assert_eq!(config.bind_address, "0.0.0.0");
        assert!(!config.json_logs);

        let realtime = config.realtime();
        assert_eq!(realtime.ping_interval_secs, 5);
        assert_eq!(realtime.send_buffer, 16);
        assert_eq!(realtime.dispatch_queue, 1024);
    }

    #[test]
    fn test_explicit_flags_override_file() {
        let config = load_with_args(
            r#"
port = 9000
data_dir = "/srv/forum"
json_logs = false

[realtime]
liveness_timeout_secs = 90
"#,
            &["forum-server", "--port", "7000", "--json-logs"],
        );
        assert_eq!(config.port, 7000);
        assert!(config.json_logs);
        assert_eq!(config.data_dir, "/srv/forum");
        assert_eq!(config.realtime().liveness_timeout_secs, 90);
    }

    #[test]
    fn test_unset_flags_serialize_to_nothing() {
        let cli = CliArgs::parse_from(["forum-server"]);
        let value = serde_json::to_value(&cli).unwrap();
        assert_eq!(value, serde_json::json!({}));
    }

    #[test]
    fn test_zero_durations_are_clamped() {
        let realtime = RealtimeConfig {
            ping_interval_secs: 0,
            liveness_timeout_secs: 0,
            write_timeout_secs: 0,
            ..RealtimeConfig::default()
        };
        assert_eq!(realtime.ping_interval(), Duration::from_secs(1));
        assert_eq!(realtime.liveness_timeout(), Duration::from_secs(1));
        assert_eq!(realtime.write_timeout(), Duration::from_secs(1));
    }
}
