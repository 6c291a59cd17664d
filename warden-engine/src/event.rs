//! Tunnel events and state

use std::net::Ipv4Addr;

use tokio::sync::mpsc;

/// Tunnel lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    /// No connect call is active
    NotRunning,
    /// The tunnel is up, or being brought up
    Running,
    /// The backend is stopped but the connection is kept for a resume
    Paused,
}

impl TunnelState {
    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            TunnelState::NotRunning => "Not running",
            TunnelState::Running => "Running",
            TunnelState::Paused => "Paused",
        }
    }
}

impl std::fmt::Display for TunnelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Events emitted by the tunnel controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelEvent {
    /// The backend is being started
    Connecting,

    /// The backend is up and DNS is applied
    Connected {
        /// Local tunnel address
        client_ip: Ipv4Addr,
        /// Remote host address
        host_ip: Ipv4Addr,
    },

    /// The backend was stopped for a pause
    Paused,

    /// The connect call finished
    Disconnected {
        /// Reason for disconnection
        reason: String,
    },
}

/// Status sink for tunnel events
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle a tunnel event
    async fn on_event(&self, event: TunnelEvent);
}

/// Simple event handler that logs events
pub struct LoggingEventHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingEventHandler {
    async fn on_event(&self, event: TunnelEvent) {
        match event {
            TunnelEvent::Connecting => log::info!("Connecting..."),
            TunnelEvent::Connected { client_ip, host_ip } => {
                log::info!("Connected: client={}, host={}", client_ip, host_ip);
            }
            TunnelEvent::Paused => log::info!("Paused"),
            TunnelEvent::Disconnected { reason } => log::info!("Disconnected: {}", reason),
        }
    }
}

/// Event handler that forwards events to a channel
///
/// Used by an outer service that consumes state changes as a stream.
pub struct ChannelEventHandler {
    tx: mpsc::UnboundedSender<TunnelEvent>,
}

impl ChannelEventHandler {
    /// Create a handler and the receiving end of its stream
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TunnelEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait::async_trait]
impl EventHandler for ChannelEventHandler {
    async fn on_event(&self, event: TunnelEvent) {
        // A closed receiver means nobody is listening anymore
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_handler_forwards_in_order() {
        let (handler, mut rx) = ChannelEventHandler::new();
        handler.on_event(TunnelEvent::Connecting).await;
        handler.on_event(TunnelEvent::Paused).await;

        assert_eq!(rx.recv().await, Some(TunnelEvent::Connecting));
        assert_eq!(rx.recv().await, Some(TunnelEvent::Paused));
    }

    #[tokio::test]
    async fn test_channel_handler_survives_closed_receiver() {
        let (handler, rx) = ChannelEventHandler::new();
        drop(rx);
        handler.on_event(TunnelEvent::Connecting).await;
    }

    #[test]
    fn test_state_display() {
        assert_eq!(TunnelState::Paused.to_string(), "Paused");
    }
}
