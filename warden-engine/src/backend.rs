//! External tunnel backend
//!
//! The encrypted tunnel itself is run by an external binary. The engine
//! only starts it, stops it, watches for its interface and, when the
//! backend does not clean up after itself, tears the interface down.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::params::ConnectParams;
use crate::shell;

/// Process-level control of a tunnel backend
#[async_trait]
pub trait TunnelBackend: Send + Sync {
    /// Start the backend with `up <config-path>`
    ///
    /// Returns [`Error::ProcessStart`] with the captured output when the
    /// backend exits unsuccessfully.
    async fn up(&self, params: &ConnectParams) -> Result<()>;

    /// Stop the backend with `down <config-path>`
    async fn down(&self, params: &ConnectParams) -> Result<()>;

    /// Check if the OS interface `name` exists
    async fn interface_exists(&self, name: &str) -> Result<bool>;

    /// Bring the OS interface `name` down and delete it
    async fn remove_interface(&self, name: &str) -> Result<()>;
}

/// Backend driven by a `wg-quick` compatible binary
#[derive(Debug, Clone, Copy, Default)]
pub struct WgQuickBackend;

impl WgQuickBackend {
    /// Create a new backend
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TunnelBackend for WgQuickBackend {
    async fn up(&self, params: &ConnectParams) -> Result<()> {
        let output = shell::exec(
            &params.binary_path,
            [std::ffi::OsStr::new("up"), params.config_path.as_os_str()],
        )
        .await?;

        if !output.success {
            return Err(Error::ProcessStart {
                output: output.combined.trim().to_string(),
            });
        }
        Ok(())
    }

    async fn down(&self, params: &ConnectParams) -> Result<()> {
        shell::exec_checked(
            &params.binary_path,
            [std::ffi::OsStr::new("down"), params.config_path.as_os_str()],
        )
        .await
    }

    async fn interface_exists(&self, name: &str) -> Result<bool> {
        interface_exists(name).await
    }

    async fn remove_interface(&self, name: &str) -> Result<()> {
        remove_interface(name).await
    }
}

#[cfg(unix)]
async fn interface_exists(name: &str) -> Result<bool> {
    let name = std::ffi::CString::new(name)
        .map_err(|_| Error::Config(format!("invalid interface name: {:?}", name)))?;

    // SAFETY: `name` is a valid NUL-terminated string for the whole call.
    let index = unsafe { libc::if_nametoindex(name.as_ptr()) };
    if index != 0 {
        return Ok(true);
    }

    let err = std::io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::ENXIO) | Some(libc::ENODEV) | Some(libc::ENOENT) => Ok(false),
        _ => Err(Error::Io(err)),
    }
}

#[cfg(windows)]
async fn interface_exists(name: &str) -> Result<bool> {
    let name_arg = format!("name={}", name);
    let output = shell::exec("netsh", ["interface", "show", "interface", name_arg.as_str()]).await?;
    Ok(output.success)
}

#[cfg(target_os = "linux")]
async fn remove_interface(name: &str) -> Result<()> {
    shell::exec_checked("ip", ["link", "set", "down", name]).await?;
    shell::exec_checked("ip", ["link", "delete", name]).await
}

#[cfg(target_os = "macos")]
async fn remove_interface(name: &str) -> Result<()> {
    shell::exec_checked("ifconfig", [name, "down"]).await?;
    shell::exec_checked("ifconfig", [name, "destroy"]).await
}

#[cfg(windows)]
async fn remove_interface(name: &str) -> Result<()> {
    // Deleting the adapter is left to the backend
    shell::exec_checked(
        "netsh",
        ["interface", "set", "interface", name, "admin=disabled"],
    )
    .await
}

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
async fn remove_interface(name: &str) -> Result<()> {
    Err(Error::Shell(format!(
        "interface teardown not supported on this platform: {}",
        name
    )))
}
