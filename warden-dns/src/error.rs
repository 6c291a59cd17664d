//! Error types for warden-dns

use std::io;
use thiserror::Error;

/// Result type alias for DNS control operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while changing system DNS configuration
#[derive(Debug, Error)]
pub enum Error {
    /// The set of local network interfaces could not be enumerated
    #[error("error receiving local V4 addresses: {0}")]
    TopologyEnumeration(#[source] io::Error),

    /// The native helper returned a nonzero code
    #[error("DNS change error: 0x{0:X}")]
    NativeCall(u32),

    /// The native helper could not be located or loaded
    #[error("DNS helper unavailable: {0}")]
    HelperUnavailable(String),

    /// A panic escaped the native-call boundary and was caught
    #[error("internal fault: {0}")]
    Internal(String),

    /// Applying a DNS value failed
    #[error("failed to set DNS: {0}")]
    SetFailed(#[source] Box<Error>),

    /// Restoring default DNS failed
    #[error("failed to reset DNS: {0}")]
    ResetFailed(#[source] Box<Error>),
}

impl Error {
    /// The native helper code behind this error, if any
    pub fn native_code(&self) -> Option<u32> {
        match self {
            Error::NativeCall(code) => Some(*code),
            Error::SetFailed(inner) | Error::ResetFailed(inner) => inner.native_code(),
            _ => None,
        }
    }

    /// Check if this error was converted from a caught panic
    pub fn is_internal(&self) -> bool {
        match self {
            Error::Internal(_) => true,
            Error::SetFailed(inner) | Error::ResetFailed(inner) => inner.is_internal(),
            _ => false,
        }
    }

    pub(crate) fn set_failed(self) -> Self {
        Error::SetFailed(Box::new(self))
    }

    pub(crate) fn reset_failed(self) -> Self {
        Error::ResetFailed(Box::new(self))
    }
}
