//! Warden DNS
//!
//! Manual DNS control for VPN tunnel interfaces.
//!
//! A manual DNS server is applied to the tunnel interface and, when the
//! server lives on a local LAN, to every other interface whose subnet
//! contains it. All OS-level changes go through a privileged platform
//! helper that is called one request at a time.
//!
//! ```text
//! DnsController ──> topology::matching_interfaces ──> InterfaceSource
//!       │
//!       └─────────> helper::call_by_* (process-wide lock) ──> DnsHelper
//!                                                              │
//!                               ┌──────────────────────────────┼─────────────────────┐
//!                               ▼                              ▼                     ▼
//!                        ResolvectlHelper              NetworksetupHelper        DllHelper
//!                            (Linux)                        (macOS)              (Windows)
//! ```

pub mod controller;
pub mod error;
pub mod helper;
pub mod topology;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "macos")]
mod macos;

#[cfg(target_os = "windows")]
mod windows;

pub use controller::DnsController;
pub use error::{Error, Result};
pub use helper::{DnsHelper, DnsOperation};
pub use topology::{InterfaceRecord, InterfaceSource, SystemInterfaces};

#[cfg(target_os = "linux")]
pub use linux::ResolvectlHelper;

#[cfg(target_os = "macos")]
pub use macos::NetworksetupHelper;

#[cfg(target_os = "windows")]
pub use windows::DllHelper;

pub use mac_address::MacAddress;
