//! Configuration management

use crate::obfuscation::{AmbiguousBlockPolicy, DirectionPolicy, ObfuscationCode};
use crate::protocol::{DEFAULT_DECOY_DOMAIN, DEFAULT_DECOY_PORT, HANDSHAKE_TIMEOUT, IDLE_TIMEOUT};
use crate::transport::TransportConfig;
use crate::tunnel::RelayOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: Option<ServerConfig>,
    /// Client configuration
    pub client: Option<ClientConfig>,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, crate::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), crate::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| crate::Error::Config(format!("Failed to write config: {}", e)))
    }

    /// Reject values the relays cannot run with
    pub fn validate(&self) -> Result<(), crate::Error> {
        if let Some(server) = &self.server {
            if server.max_connections == 0 {
                return Err(crate::Error::Config(
                    "server.max_connections must be positive".into(),
                ));
            }
            server.relay.validate("server")?;
        }
        if let Some(client) = &self.client {
            if let Some(domain) = client.decoy_domains.iter().find(|d| d.len() > 255) {
                return Err(crate::Error::Config(format!(
                    "client.decoy_domains entry is longer than 255 bytes: {}",
                    domain
                )));
            }
            client.relay.validate("client")?;
        }
        Ok(())
    }
}

/// Timeouts and stream policy shared by both relays
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    pub connect_timeout_secs: u64,
    /// TCP keep-alive on outbound dials (0 disables)
    pub keepalive_secs: u64,
    pub idle_timeout_secs: u64,
    pub handshake_timeout_secs: u64,
    pub obfuscate_upstream: bool,
    pub obfuscate_downstream: bool,
    /// `abort` or `skip`
    pub on_ambiguous: AmbiguousBlockPolicy,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            keepalive_secs: 5,
            idle_timeout_secs: IDLE_TIMEOUT,
            handshake_timeout_secs: HANDSHAKE_TIMEOUT,
            obfuscate_upstream: true,
            obfuscate_downstream: true,
            on_ambiguous: AmbiguousBlockPolicy::Abort,
        }
    }
}

impl RelaySettings {
    fn validate(&self, section: &str) -> Result<(), crate::Error> {
        for (name, value) in [
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("idle_timeout_secs", self.idle_timeout_secs),
            ("handshake_timeout_secs", self.handshake_timeout_secs),
        ] {
            if value == 0 {
                return Err(crate::Error::Config(format!("{}.{} must be positive", section, name)));
            }
        }
        Ok(())
    }

    pub fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            transport: TransportConfig {
                connect_timeout: self.connect_timeout_secs,
                keepalive_interval: self.keepalive_secs,
                idle_timeout: self.idle_timeout_secs,
                handshake_timeout: self.handshake_timeout_secs,
            },
            directions: DirectionPolicy {
                upstream: self.obfuscate_upstream,
                downstream: self.obfuscate_downstream,
            },
            on_ambiguous: self.on_ambiguous,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub listen: String,
    /// Maximum concurrent tunnel connections
    pub max_connections: usize,
    #[serde(flatten)]
    pub relay: RelaySettings,
    /// Unix socket of the socket-protection service
    pub protect_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:17789".to_string(),
            max_connections: 1000,
            relay: RelaySettings::default(),
            protect_path: None,
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Local listen address for client applications
    pub listen: String,
    /// Remote relay address
    pub server: String,
    /// Marker polarity, 0 or 1
    pub code: ObfuscationCode,
    /// One is picked at random per connection
    pub decoy_domains: Vec<String>,
    pub decoy_port: u16,
    #[serde(flatten)]
    pub relay: RelaySettings,
    /// Unix socket of the socket-protection service
    pub protect_path: Option<String>,
    /// Unix socket receiving the raw traffic counters
    pub stats_socket: Option<String>,
    pub stats_interval_secs: u64,
    /// How often the counters are logged
    pub report_interval_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:7789".to_string(),
            server: "127.0.0.1:17789".to_string(),
            code: ObfuscationCode::Direct,
            decoy_domains: vec![DEFAULT_DECOY_DOMAIN.to_string()],
            decoy_port: DEFAULT_DECOY_PORT,
            relay: RelaySettings::default(),
            protect_path: None,
            stats_socket: None,
            stats_interval_secs: 1,
            report_interval_secs: 10,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Generate example configuration
pub fn generate_example_config() -> Config {
    Config {
        server: Some(ServerConfig::default()),
        client: Some(ClientConfig::default()),
        logging: LoggingConfig::default(),
    }
}
