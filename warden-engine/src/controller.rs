//! Tunnel lifecycle controller
//!
//! [`TunnelController::connect`] owns one tunnel for its whole lifetime:
//!
//! ```text
//!            ┌──────────────────────────────────────────────┐
//!            ▼                                              │ Resume
//!  write config ─> backend up ─> apply DNS ─> Connected ─> wait ─> restore DNS
//!                                                                   │
//!                                              paused? ── yes ──> mailbox
//!                                                │                  │ Disconnect
//!                                                no                 ▼
//!                                                └──────────> remove config, Disconnected
//! ```
//!
//! `pause`, `resume` and `disconnect` are called from other tasks. They flip
//! the paused flag, stop the backend, and offer a signal to the single-slot
//! mailbox read by the connect loop.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use warden_dns::DnsController;

use crate::backend::TunnelBackend;
use crate::error::{Error, Result};
use crate::event::{EventHandler, LoggingEventHandler, TunnelEvent, TunnelState};
use crate::mailbox::{mailbox, ControlMailbox, ControlReceiver, ControlSignal};
use crate::params::ConnectParams;
use crate::wgconf;

/// Default interval between interface liveness checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// State of the active connect call, shared with the control methods
struct Session {
    params: ConnectParams,
    mailbox: ControlMailbox,
}

struct ControllerState {
    running: bool,
    paused: bool,
    manual_dns: Option<Ipv4Addr>,
    session: Option<Session>,
}

/// Why the connected wait ended
enum WaitOutcome {
    /// The tunnel interface is gone or a pause was observed
    Stopped,
    /// A control signal arrived while connected
    Signal(ControlSignal),
}

/// Lifecycle controller for one tunnel
pub struct TunnelController {
    backend: Arc<dyn TunnelBackend>,
    dns: Arc<DnsController>,
    event_handler: Arc<dyn EventHandler>,
    interface: String,
    poll_interval: Duration,
    state: Mutex<ControllerState>,
}

impl TunnelController {
    /// Create a controller for the tunnel interface `interface`
    pub fn new(
        backend: Arc<dyn TunnelBackend>,
        dns: Arc<DnsController>,
        interface: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            dns,
            event_handler: Arc::new(LoggingEventHandler),
            interface: interface.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            state: Mutex::new(ControllerState {
                running: false,
                paused: false,
                manual_dns: None,
                session: None,
            }),
        }
    }

    /// Set a custom event handler
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = handler;
        self
    }

    /// Set the interface liveness poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check if a connect call is active
    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Check if the active tunnel is paused
    pub fn is_paused(&self) -> bool {
        let state = self.lock();
        state.running && state.paused
    }

    /// Get the current state
    pub fn state(&self) -> TunnelState {
        let state = self.lock();
        match (state.running, state.paused) {
            (false, _) => TunnelState::NotRunning,
            (true, false) => TunnelState::Running,
            (true, true) => TunnelState::Paused,
        }
    }

    /// The manual DNS override, if any
    pub fn manual_dns(&self) -> Option<Ipv4Addr> {
        self.lock().manual_dns
    }

    /// Remove a tunnel interface left over from an earlier run
    ///
    /// Errors are logged only.
    pub async fn init(&self) {
        match self.backend.interface_exists(&self.interface).await {
            Ok(true) => {
                log::warn!(
                    "Stale interface '{}' found, removing it",
                    self.interface
                );
                if let Err(e) = self.backend.remove_interface(&self.interface).await {
                    log::error!("Failed to remove stale interface '{}': {}", self.interface, e);
                }
            }
            Ok(false) => {}
            Err(e) => log::error!("Failed to check interface '{}': {}", self.interface, e),
        }
    }

    /// Bring the tunnel up and keep it until it is finally torn down
    ///
    /// Returns only after the tunnel is gone. Setup failures (configuration
    /// write, backend start, DNS apply) are returned; teardown failures are
    /// logged.
    pub async fn connect(&self, params: ConnectParams) -> Result<()> {
        let receiver = {
            let mut state = self.lock();
            if state.running {
                return Err(Error::AlreadyRunning);
            }
            let (tx, rx) = mailbox();
            state.running = true;
            state.paused = false;
            state.session = Some(Session {
                params: params.clone(),
                mailbox: tx,
            });
            rx
        };

        log::info!(
            "Connecting to {}:{} (interface {})",
            params.host_ip,
            params.host_port,
            params.interface_name()
        );

        let result = self.run(&params, receiver).await;

        wgconf::remove(&params.config_path).await;
        {
            let mut state = self.lock();
            state.running = false;
            state.paused = false;
            state.session = None;
        }

        let reason = match &result {
            Ok(()) => "tunnel stopped".to_string(),
            Err(e) => e.to_string(),
        };
        self.event_handler
            .on_event(TunnelEvent::Disconnected { reason })
            .await;

        result
    }

    async fn run(&self, params: &ConnectParams, mut receiver: ControlReceiver) -> Result<()> {
        let interface = params.interface_name();

        loop {
            self.event_handler.on_event(TunnelEvent::Connecting).await;

            wgconf::write(params).await?;
            self.backend.up(params).await?;

            let dns = self.manual_dns().unwrap_or(params.host_local_ip);
            if let Err(e) = self.apply_dns(dns, params.client_ip).await {
                log::error!("Failed to apply DNS {}: {}", dns, e);
                self.restore_dns(&interface, params.client_ip).await;
                if let Err(down_err) = self.backend.down(params).await {
                    log::warn!("Failed to stop backend: {}", down_err);
                }
                return Err(Error::DnsApply(e));
            }

            self.event_handler
                .on_event(TunnelEvent::Connected {
                    client_ip: params.client_ip,
                    host_ip: params.host_ip,
                })
                .await;

            let outcome = self.wait_stopped(&interface, &mut receiver).await;

            // DNS belongs to the backend instance that just went away
            self.restore_dns(&interface, params.client_ip).await;

            let signal = match outcome {
                WaitOutcome::Signal(signal) => Some(signal),
                WaitOutcome::Stopped if self.is_paused() => {
                    log::info!("Tunnel paused");
                    self.event_handler.on_event(TunnelEvent::Paused).await;
                    Some(receiver.recv().await)
                }
                // Covers a resume that raced ahead of the paused check
                WaitOutcome::Stopped => receiver.try_recv(),
            };

            match signal {
                Some(ControlSignal::Resume) => {
                    log::info!("Resuming tunnel");
                    continue;
                }
                Some(ControlSignal::Disconnect) | None => return Ok(()),
            }
        }
    }

    /// Poll until the tunnel interface disappears, a pause is observed, or
    /// a control signal arrives
    async fn wait_stopped(&self, interface: &str, receiver: &mut ControlReceiver) -> WaitOutcome {
        loop {
            tokio::select! {
                signal = receiver.recv() => return WaitOutcome::Signal(signal),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            if self.is_paused() {
                return WaitOutcome::Stopped;
            }

            match self.backend.interface_exists(interface).await {
                Ok(true) => {}
                Ok(false) => {
                    log::info!("Interface '{}' is gone", interface);
                    return WaitOutcome::Stopped;
                }
                Err(e) => log::error!("Failed to check interface '{}': {}", interface, e),
            }
        }
    }

    /// Stop the backend but keep the connection for a later resume
    ///
    /// Does nothing unless the tunnel is running and not paused.
    pub async fn pause(&self) -> Result<()> {
        let params = {
            let mut state = self.lock();
            let Some(session) = state.session.as_ref().filter(|_| state.running && !state.paused)
            else {
                return Ok(());
            };
            let params = session.params.clone();
            state.paused = true;
            params
        };

        log::info!("Pausing tunnel");
        let result = self.stop_backend(&params).await;
        if let Err(e) = self.run_dns(|dns| dns.pause()).await {
            log::warn!("DNS pause failed: {}", e);
        }
        result
    }

    /// Restart a paused tunnel
    ///
    /// Does nothing unless the tunnel is running and paused.
    pub async fn resume(&self) -> Result<()> {
        {
            let mut state = self.lock();
            if !(state.running && state.paused) {
                return Ok(());
            }
            state.paused = false;
            if let Some(session) = &state.session {
                session.mailbox.offer(ControlSignal::Resume);
            }
        }

        if let Err(e) = self.run_dns(|dns| dns.resume()).await {
            log::warn!("DNS resume failed: {}", e);
        }
        Ok(())
    }

    /// Tear the tunnel down and make `connect` return
    ///
    /// A paused tunnel is woken with a disconnect instead of being restarted.
    pub async fn disconnect(&self) -> Result<()> {
        let (params, mailbox) = {
            let mut state = self.lock();
            if !state.running {
                return Ok(());
            }
            let Some(session) = &state.session else {
                return Ok(());
            };
            let params = session.params.clone();
            let mailbox = session.mailbox.clone();

            if state.paused {
                state.paused = false;
                mailbox.offer(ControlSignal::Disconnect);
                return Ok(());
            }
            (params, mailbox)
        };

        log::info!("Disconnecting");
        let result = self.stop_backend(&params).await;
        mailbox.offer(ControlSignal::Disconnect);
        result
    }

    /// Stop the backend, then force the interface down if it survived
    async fn stop_backend(&self, params: &ConnectParams) -> Result<()> {
        if let Err(e) = self.backend.down(params).await {
            log::warn!("Backend stop failed: {}", e);
        }

        let interface = params.interface_name();
        match self.backend.interface_exists(&interface).await {
            Ok(true) => {
                log::info!("Interface '{}' still exists, removing it", interface);
                self.backend.remove_interface(&interface).await.map_err(|e| {
                    log::error!("Failed to remove interface '{}': {}", interface, e);
                    e
                })
            }
            Ok(false) => Ok(()),
            Err(e) => {
                log::error!("Failed to check interface '{}': {}", interface, e);
                Ok(())
            }
        }
    }

    /// Set the manual DNS override
    ///
    /// Applied immediately while connected; while paused it is picked up by
    /// the next connect iteration.
    pub async fn set_manual_dns(&self, dns: Ipv4Addr) -> Result<()> {
        let client_ip = {
            let mut state = self.lock();
            state.manual_dns = Some(dns);
            self.active_client_ip(&state)
        };

        if let Some(client_ip) = client_ip {
            self.apply_dns(dns, client_ip).await.map_err(Error::DnsApply)?;
        }
        Ok(())
    }

    /// Clear the manual DNS override
    ///
    /// While connected the tunnel gateway becomes the DNS server again. While
    /// not running any manual DNS left on the system is removed.
    pub async fn reset_manual_dns(&self) -> Result<()> {
        let (running, target) = {
            let mut state = self.lock();
            state.manual_dns = None;
            let target = state
                .session
                .as_ref()
                .filter(|_| state.running && !state.paused)
                .map(|s| (s.params.host_local_ip, s.params.client_ip));
            (state.running, target)
        };

        match (running, target) {
            (_, Some((gateway, client_ip))) => {
                self.apply_dns(gateway, client_ip).await.map_err(Error::DnsApply)
            }
            (false, None) => self
                .run_dns(|dns| dns.delete_manual(None))
                .await
                .map_err(Error::DnsRestore),
            (true, None) => Ok(()),
        }
    }

    fn active_client_ip(&self, state: &ControllerState) -> Option<Ipv4Addr> {
        state
            .session
            .as_ref()
            .filter(|_| state.running && !state.paused)
            .map(|s| s.params.client_ip)
    }

    async fn apply_dns(&self, dns: Ipv4Addr, client_ip: Ipv4Addr) -> warden_dns::Result<()> {
        self.run_dns(move |ctl| ctl.set_manual(dns, Some(client_ip)))
            .await
    }

    /// Best-effort DNS restore after a backend instance
    ///
    /// The tunnel interface is reset only while it still exists; once it is
    /// gone only the entries on other interfaces are removed.
    async fn restore_dns(&self, interface: &str, client_ip: Ipv4Addr) {
        let local = match self.backend.interface_exists(interface).await {
            Ok(false) => None,
            Ok(true) => Some(client_ip),
            Err(e) => {
                log::warn!("Failed to check interface '{}': {}", interface, e);
                Some(client_ip)
            }
        };

        if let Err(e) = self
            .run_dns(move |ctl| ctl.delete_manual(local))
            .await
        {
            log::warn!("{}", Error::DnsRestore(e));
        }
    }

    /// Run a blocking DNS controller call off the async runtime
    async fn run_dns<F>(&self, op: F) -> warden_dns::Result<()>
    where
        F: FnOnce(&DnsController) -> warden_dns::Result<()> + Send + 'static,
    {
        let dns = self.dns.clone();
        match tokio::task::spawn_blocking(move || op(dns.as_ref())).await {
            Ok(result) => result,
            Err(e) => Err(warden_dns::Error::Internal(e.to_string())),
        }
    }
}
