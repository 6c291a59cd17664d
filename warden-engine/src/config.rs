//! Configuration types for the tunnel engine

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::params::ConnectParams;

/// Main configuration structure
///
/// # Example Configuration
///
/// ```toml
/// log_level = "info"
///
/// [backend]
/// binary = "/usr/bin/wg-quick"
/// config_dir = "/etc/tunwarden"
/// interface = "wgwarden"
///
/// [tunnel]
/// client_ip = "10.5.0.2"
/// private_key = "..."
/// host_ip = "198.51.100.7"
/// host_port = 2049
/// host_public_key = "..."
/// host_local_ip = "10.5.0.1"
///
/// [dns]
/// manual = "10.0.0.1"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Backend process settings
    #[serde(default)]
    pub backend: BackendConfig,

    /// Tunnel endpoint settings
    pub tunnel: TunnelConfig,

    /// DNS settings
    #[serde(default)]
    pub dns: DnsConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.backend.validate()?;
        self.tunnel.validate()?;
        Ok(())
    }

    /// Build the parameters for one connect call
    pub fn connect_params(&self) -> ConnectParams {
        ConnectParams {
            client_ip: self.tunnel.client_ip,
            client_private_key: self.tunnel.private_key.clone(),
            host_local_ip: self.tunnel.host_local_ip,
            host_ip: self.tunnel.host_ip,
            host_port: self.tunnel.host_port,
            host_public_key: self.tunnel.host_public_key.clone(),
            binary_path: self.backend.binary.clone(),
            config_path: self.backend.config_path(),
        }
    }

    /// Generate a sample configuration
    pub fn sample() -> String {
        r#"# tunwarden configuration

# Log level: "error", "warn", "info", "debug", "trace"
log_level = "info"

[backend]
# wg-quick compatible binary, run as `<binary> up|down <config>`
binary = "/usr/bin/wg-quick"

# Directory for the generated backend configuration (kept private)
config_dir = "/etc/tunwarden"

# Tunnel interface name; the generated file is <config_dir>/<interface>.conf
interface = "wgwarden"

# How often to check that the tunnel interface still exists (default: 500)
poll_interval_ms = 500

[tunnel]
# Local tunnel address and key
client_ip = "10.5.0.2"
private_key = "your-private-key-here"

# Remote host
host_ip = "198.51.100.7"
host_port = 2049
host_public_key = "host-public-key-here"

# Gateway address inside the tunnel, used as DNS unless dns.manual is set
host_local_ip = "10.5.0.1"

[dns]
# Manual DNS server (optional). A server on a local LAN is also pushed to
# the LAN interface that can reach it.
# manual = "10.0.0.1"

# Native DNS helpers library (Windows only)
# helper_path = 'C:\Program Files\tunwarden\helpers.dll'
"#
        .to_string()
    }
}

/// Backend process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend binary
    #[serde(default = "default_binary")]
    pub binary: PathBuf,

    /// Directory that receives the generated configuration
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Tunnel interface name
    #[serde(default = "default_interface")]
    pub interface: String,

    /// Interface liveness poll interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            config_dir: default_config_dir(),
            interface: default_interface(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl BackendConfig {
    /// Validate backend configuration
    pub fn validate(&self) -> Result<()> {
        if self.interface.is_empty() {
            return Err(Error::Config("backend.interface is required".into()));
        }
        // Linux IFNAMSIZ minus the terminator
        if self.interface.len() > 15 {
            return Err(Error::Config(format!(
                "interface name '{}' is too long (maximum 15 characters)",
                self.interface
            )));
        }
        if !self
            .interface
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::Config(format!(
                "interface name '{}' contains invalid characters",
                self.interface
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be positive".into()));
        }
        Ok(())
    }

    /// Path of the generated backend configuration
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(format!("{}.conf", self.interface))
    }

    /// Interface liveness poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Tunnel endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Local tunnel address
    pub client_ip: Ipv4Addr,

    /// Local private key
    pub private_key: String,

    /// Remote host address
    pub host_ip: Ipv4Addr,

    /// Remote host port
    pub host_port: u16,

    /// Remote host public key
    pub host_public_key: String,

    /// Gateway address inside the tunnel
    pub host_local_ip: Ipv4Addr,
}

impl TunnelConfig {
    /// Validate tunnel configuration
    pub fn validate(&self) -> Result<()> {
        if self.private_key.is_empty() {
            return Err(Error::Config("tunnel.private_key is required".into()));
        }
        if self.host_public_key.is_empty() {
            return Err(Error::Config("tunnel.host_public_key is required".into()));
        }
        if self.host_port == 0 {
            return Err(Error::Config("tunnel.host_port must be positive".into()));
        }
        if self.client_ip == self.host_local_ip {
            return Err(Error::Config(
                "tunnel.client_ip and tunnel.host_local_ip must differ".into(),
            ));
        }
        Ok(())
    }
}

/// DNS settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Manual DNS server overriding the tunnel gateway
    pub manual: Option<Ipv4Addr>,

    /// Native helpers library (Windows)
    pub helper_path: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_binary() -> PathBuf {
    PathBuf::from("wg-quick")
}

fn default_config_dir() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(r"C:\ProgramData\tunwarden")
    } else {
        PathBuf::from("/etc/tunwarden")
    }
}

fn default_interface() -> String {
    "wgwarden".to_string()
}

fn default_poll_interval_ms() -> u64 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[tunnel]
client_ip = "10.5.0.2"
private_key = "client-key"
host_ip = "198.51.100.7"
host_port = 2049
host_public_key = "host-key"
host_local_ip = "10.5.0.1"
"#;

    #[test]
    fn test_parse_minimal_config() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.backend.interface, "wgwarden");
        assert_eq!(config.backend.poll_interval(), Duration::from_millis(500));
        assert!(config.dns.manual.is_none());
    }

    #[test]
    fn test_connect_params() {
        let toml = format!(
            "[backend]\nbinary = \"/opt/wg/wg-quick\"\nconfig_dir = \"/run/tw\"\ninterface = \"wgtest\"\n{}",
            MINIMAL
        );
        let params = Config::from_toml(&toml).unwrap().connect_params();

        assert_eq!(params.config_path, PathBuf::from("/run/tw/wgtest.conf"));
        assert_eq!(params.interface_name(), "wgtest");
        assert_eq!(params.binary_path, PathBuf::from("/opt/wg/wg-quick"));
        assert_eq!(params.host_local_ip, Ipv4Addr::new(10, 5, 0, 1));
        assert_eq!(params.host_port, 2049);
    }

    #[test]
    fn test_manual_dns() {
        let toml = format!("{}\n[dns]\nmanual = \"10.0.0.1\"\n", MINIMAL);
        let config = Config::from_toml(&toml).unwrap();
        assert_eq!(config.dns.manual, Some(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn test_missing_tunnel_fails() {
        let result = Config::from_toml("log_level = \"debug\"\n");
        assert!(result.is_err());
        assert!(result.unwrap_err().is_config_error());
    }

    #[test]
    fn test_invalid_interface_name_fails() {
        let toml = format!("[backend]\ninterface = \"wg/../../x\"\n{}", MINIMAL);
        assert!(matches!(Config::from_toml(&toml), Err(Error::Config(_))));

        let toml = format!("[backend]\ninterface = \"a-very-long-interface\"\n{}", MINIMAL);
        assert!(matches!(Config::from_toml(&toml), Err(Error::Config(_))));
    }

    #[test]
    fn test_same_client_and_gateway_fails() {
        let toml = MINIMAL.replace("10.5.0.1", "10.5.0.2");
        assert!(matches!(Config::from_toml(&toml), Err(Error::Config(_))));
    }

    #[test]
    fn test_sample_config_parses() {
        let config = Config::from_toml(&Config::sample()).unwrap();
        assert_eq!(config.tunnel.host_port, 2049);
        assert!(config.dns.helper_path.is_none());
    }
}
