//! Manual DNS controller
//!
//! Applies a DNS server address to the tunnel interface and to every other
//! local interface that shares a subnet with it, and removes it again.
//! The last applied value is tracked so repeated requests are free and the
//! removal knows which entries to delete.

use std::net::Ipv4Addr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use crate::error::{Error, Result};
use crate::helper::{call_by_hardware_address, call_by_local_address, DnsHelper, DnsOperation};
use crate::topology::{matching_interfaces, InterfaceSource, SystemInterfaces};

/// Cross-platform manual DNS controller
///
/// One instance tracks one "currently applied" DNS value. Independent
/// tunnels use independent controllers; the native calls of all of them are
/// still serialized through the process-wide helper lock.
pub struct DnsController {
    helper: Arc<dyn DnsHelper>,
    interfaces: Arc<dyn InterfaceSource>,
    last_dns: Mutex<Option<Ipv4Addr>>,
}

impl DnsController {
    /// Create a controller over an explicit helper and interface source
    pub fn new(helper: Arc<dyn DnsHelper>, interfaces: Arc<dyn InterfaceSource>) -> Self {
        Self {
            helper,
            interfaces,
            last_dns: Mutex::new(None),
        }
    }

    /// Create a controller for the current platform
    ///
    /// `helper_path` points at the native helpers library and is only
    /// required on Windows.
    #[allow(unused_variables)]
    pub fn system(helper_path: Option<&std::path::Path>) -> Result<Self> {
        #[cfg(target_os = "linux")]
        let helper: Arc<dyn DnsHelper> = Arc::new(crate::linux::ResolvectlHelper::new());

        #[cfg(target_os = "macos")]
        let helper: Arc<dyn DnsHelper> = Arc::new(crate::macos::NetworksetupHelper::new());

        #[cfg(target_os = "windows")]
        let helper: Arc<dyn DnsHelper> = {
            let path = helper_path.ok_or_else(|| {
                Error::HelperUnavailable("helpers dll path not initialized".into())
            })?;
            Arc::new(crate::windows::DllHelper::load(path)?)
        };

        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        return Err(Error::HelperUnavailable(
            "DNS control is not supported on this platform".into(),
        ));

        #[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
        Ok(Self::new(helper, Arc::new(SystemInterfaces)))
    }

    /// The DNS value currently applied by this controller
    pub fn current(&self) -> Option<Ipv4Addr> {
        *self.last_dns.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `dns` to the tunnel interface and matching local interfaces
    ///
    /// `local_interface` is the tunnel's local address. When it is `None`
    /// only non-tunnel interfaces on the DNS server's subnet are touched.
    pub fn set_manual(&self, dns: Ipv4Addr, local_interface: Option<Ipv4Addr>) -> Result<()> {
        self.guarded(|last| self.set_manual_locked(last, dns, local_interface))
    }

    /// Remove the applied DNS value and restore default resolution
    pub fn delete_manual(&self, local_interface: Option<Ipv4Addr>) -> Result<()> {
        self.guarded(|last| self.delete_manual_locked(last, local_interface))
    }

    /// Called when the tunnel is paused
    ///
    /// Nothing is changed here. The lifecycle controller already removed
    /// the applied entries when the backend went away.
    pub fn pause(&self) -> Result<()> {
        log::debug!("DNS pause: nothing to do");
        Ok(())
    }

    /// Called when the tunnel is resumed
    ///
    /// The lifecycle controller reapplies DNS on each connect iteration.
    pub fn resume(&self) -> Result<()> {
        log::debug!("DNS resume: nothing to do");
        Ok(())
    }

    /// Run `op` with the tracked value locked, turning panics into errors
    fn guarded<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&mut Option<Ipv4Addr>) -> Result<()>,
    {
        let mut last = self.last_dns.lock().unwrap_or_else(PoisonError::into_inner);

        match panic::catch_unwind(AssertUnwindSafe(|| op(&mut *last))) {
            Ok(result) => result,
            Err(payload) => {
                let message = if let Some(s) = payload.downcast_ref::<&str>() {
                    (*s).to_string()
                } else if let Some(s) = payload.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "unknown panic".to_string()
                };
                log::error!("PANIC (recovered): {}", message);
                Err(Error::Internal(message))
            }
        }
    }

    fn set_manual_locked(
        &self,
        last: &mut Option<Ipv4Addr>,
        dns: Ipv4Addr,
        local_interface: Option<Ipv4Addr>,
    ) -> Result<()> {
        if *last == Some(dns) {
            return Ok(());
        }

        if last.is_some() {
            // The tunnel interface gets overwritten below, so only the
            // non-tunnel interfaces are cleaned up here.
            self.delete_manual_locked(last, None)
                .map_err(Error::set_failed)?;
        }

        let to_update = matching_interfaces(self.interfaces.as_ref(), Some(dns), local_interface)?;

        if local_interface.is_none() && to_update.is_empty() {
            return Ok(());
        }

        let start = Instant::now();
        log::info!("Changing DNS to {} ...", dns);

        let result = (|| -> Result<()> {
            if let Some(local) = local_interface {
                call_by_local_address(self.helper.as_ref(), local, Some(dns), DnsOperation::Set)
                    .map_err(Error::set_failed)?;
            }

            for mac in &to_update {
                call_by_hardware_address(self.helper.as_ref(), mac, Some(dns), DnsOperation::Add)
                    .map_err(Error::set_failed)?;
            }
            Ok(())
        })();

        match &result {
            Ok(()) => {
                *last = Some(dns);
                log::info!(
                    "Changing DNS to {}: done ({}ms)",
                    dns,
                    start.elapsed().as_millis()
                );
            }
            Err(e) => log::info!(
                "Changing DNS to {} done ({}ms) with error: {}",
                dns,
                start.elapsed().as_millis(),
                e
            ),
        }

        result
    }

    fn delete_manual_locked(
        &self,
        last: &mut Option<Ipv4Addr>,
        local_interface: Option<Ipv4Addr>,
    ) -> Result<()> {
        let previous = *last;
        let to_update = matching_interfaces(self.interfaces.as_ref(), previous, local_interface)?;

        let start = Instant::now();
        let touches_anything = local_interface.is_some() || !to_update.is_empty();
        if touches_anything {
            log::info!("Restoring default DNS...");
        }

        let result = (|| -> Result<()> {
            if let Some(local) = local_interface {
                call_by_local_address(self.helper.as_ref(), local, None, DnsOperation::Set)
                    .map_err(Error::reset_failed)?;
            }

            for mac in &to_update {
                call_by_hardware_address(self.helper.as_ref(), mac, previous, DnsOperation::Del)
                    .map_err(Error::reset_failed)?;
            }
            Ok(())
        })();

        // Cleared even if a per-interface removal failed partway.
        *last = None;

        if touches_anything {
            match &result {
                Ok(()) => log::info!(
                    "Restoring default DNS: done ({}ms)",
                    start.elapsed().as_millis()
                ),
                Err(e) => log::info!(
                    "Restoring default DNS done ({}ms) with error: {}",
                    start.elapsed().as_millis(),
                    e
                ),
            }
        }

        result
    }
}
