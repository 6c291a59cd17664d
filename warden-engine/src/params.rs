//! Per-connection tunnel parameters

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

/// Immutable descriptor of one connect attempt
///
/// Built once when `connect` starts and shared by every iteration of the
/// pause/resume loop. The backend interface is named after the stem of the
/// generated configuration file, so `/etc/tunwarden/wgwarden.conf` brings
/// up `wgwarden`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    /// Address assigned to the local end of the tunnel
    pub client_ip: Ipv4Addr,
    /// Private key of the local end
    pub client_private_key: String,
    /// Tunnel-side gateway address, used as DNS when no override is set
    pub host_local_ip: Ipv4Addr,
    /// Public address of the remote host
    pub host_ip: Ipv4Addr,
    /// UDP port of the remote host
    pub host_port: u16,
    /// Public key of the remote host
    pub host_public_key: String,
    /// Backend binary (e.g. `wg-quick`)
    pub binary_path: PathBuf,
    /// Where the backend configuration is written
    pub config_path: PathBuf,
}

impl ConnectParams {
    /// Name of the OS interface the backend creates
    pub fn interface_name(&self) -> String {
        interface_name_for(&self.config_path)
    }
}

/// Derive the backend interface name from a configuration path
pub fn interface_name_for(config_path: &Path) -> String {
    config_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
