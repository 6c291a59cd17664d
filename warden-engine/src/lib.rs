//! Warden Engine
//!
//! Lifecycle control for one VPN tunnel run by an external backend
//! process, with DNS redirection through [`warden_dns`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Service Layer                            │
//! │  ┌─────────────────┐          ┌──────────────────────────┐  │
//! │  │   warden-cli    │          │  EventHandler (status)   │  │
//! │  └────────┬────────┘          └────────────▲─────────────┘  │
//! │           ▼                                │                │
//! │  ┌────────────────────────────────────────────────────────┐ │
//! │  │                  warden-engine                          │ │
//! │  │  - TunnelController (connect/pause/resume/disconnect)  │ │
//! │  │  - Config (TOML configuration)                         │ │
//! │  │  - TunnelBackend (external process)                    │ │
//! │  └───────────────────────────┬────────────────────────────┘ │
//! └──────────────────────────────┼──────────────────────────────┘
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  warden-dns: DnsController, topology, native helpers        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod mailbox;
pub mod params;
pub mod shell;
pub mod wgconf;

pub use backend::{TunnelBackend, WgQuickBackend};
pub use config::{BackendConfig, Config, DnsConfig, TunnelConfig};
pub use controller::{TunnelController, DEFAULT_POLL_INTERVAL};
pub use error::{Error, Result};
pub use event::{ChannelEventHandler, EventHandler, LoggingEventHandler, TunnelEvent, TunnelState};
pub use mailbox::ControlSignal;
pub use params::ConnectParams;
