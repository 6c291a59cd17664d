//! Error types for the tunnel engine

use thiserror::Error;

/// Result type alias for tunnel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing a tunnel
#[derive(Debug, Error)]
pub enum Error {
    /// Writing the backend configuration artifact failed
    #[error("failed to write backend configuration: {0}")]
    ConfigWrite(#[source] std::io::Error),

    /// The backend process exited unsuccessfully
    #[error("failed to start backend: {output}")]
    ProcessStart {
        /// Combined stdout and stderr of the backend process
        output: String,
    },

    /// Applying DNS after the tunnel came up failed
    #[error("failed to apply DNS: {0}")]
    DnsApply(#[source] warden_dns::Error),

    /// Restoring default DNS failed
    #[error("failed to restore DNS: {0}")]
    DnsRestore(#[source] warden_dns::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to parse configuration file
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A system command could not be run or failed
    #[error("command failed: {0}")]
    Shell(String),

    /// A connect call is already in progress
    #[error("tunnel is already running")]
    AlreadyRunning,
}

impl Error {
    /// Check if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_) | Error::ConfigParse(_))
    }

    /// Check if this error happened while bringing the tunnel up
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Error::ConfigWrite(_) | Error::ProcessStart { .. } | Error::DnsApply(_)
        )
    }
}
