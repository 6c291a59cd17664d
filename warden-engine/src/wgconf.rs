//! Backend configuration artifact
//!
//! The backend reads a WireGuard-style INI file. It holds the private key,
//! so it is written with owner-only permissions and removed once the tunnel
//! is finally torn down.

use std::fmt::Write as _;
use std::path::Path;

use crate::error::{Error, Result};
use crate::params::ConnectParams;

/// Render the backend configuration for `params`
pub fn render(params: &ConnectParams) -> String {
    let mut out = String::new();

    // Writing into a String cannot fail
    let _ = writeln!(out, "[Interface]");
    let _ = writeln!(out, "PrivateKey = {}", params.client_private_key);
    let _ = writeln!(out, "Address = {}/32", params.client_ip);
    if cfg!(target_os = "linux") {
        let _ = writeln!(out, "SaveConfig = true");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[Peer]");
    let _ = writeln!(out, "PublicKey = {}", params.host_public_key);
    let _ = writeln!(out, "Endpoint = {}:{}", params.host_ip, params.host_port);
    let _ = writeln!(out, "AllowedIPs = 0.0.0.0/0");

    out
}

/// Write `params`' configuration to its private path
pub async fn write(params: &ConnectParams) -> Result<()> {
    write_private(&params.config_path, &render(params)).await
}

/// Write `content` to `path`, readable only by the owner
pub async fn write_private(path: &Path, content: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            tokio::fs::create_dir_all(dir).await.map_err(Error::ConfigWrite)?;
        }
    }

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await.map_err(Error::ConfigWrite)?;
    tokio::io::AsyncWriteExt::write_all(&mut file, content.as_bytes())
        .await
        .map_err(Error::ConfigWrite)?;

    // The file may predate this run with wider permissions
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(Error::ConfigWrite)?;
    }

    log::debug!("Backend configuration written to {}", path.display());
    Ok(())
}

/// Remove the configuration artifact, ignoring a missing file
pub async fn remove(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => log::debug!("Removed backend configuration {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
    }
}
