//! Linux DNS helper built on systemd-resolved
//!
//! Per-link DNS servers are managed with `resolvectl`:
//!
//! - `resolvectl dns <link>` prints the current servers
//! - `resolvectl dns <link> <addr>...` replaces them
//! - `resolvectl revert <link>` drops every per-link setting
//!
//! Requires root or `CAP_NET_ADMIN` (or a polkit rule for
//! `org.freedesktop.resolve1`).

use std::net::Ipv4Addr;
use std::process::Command;

use mac_address::MacAddress;

use crate::helper::{
    exit_code, merge_servers, missing_link_code, parse_ipv4_list, DnsHelper, DnsOperation, HELPER_ERR_EXEC,
    HELPER_ERR_INTERFACE_NOT_FOUND, HELPER_OK,
};
use crate::topology::{
    interface_name_by_address, interface_name_by_hardware_address, InterfaceSource,
    SystemInterfaces,
};

const RESOLVECTL: &str = "resolvectl";

/// DNS helper that drives `resolvectl`
pub struct ResolvectlHelper {
    interfaces: Box<dyn InterfaceSource>,
}

impl Default for ResolvectlHelper {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolvectlHelper {
    /// Create a helper that looks interfaces up on the running system
    pub fn new() -> Self {
        Self {
            interfaces: Box::new(SystemInterfaces),
        }
    }

    /// Create a helper over an explicit interface source
    pub fn with_interfaces(interfaces: Box<dyn InterfaceSource>) -> Self {
        Self { interfaces }
    }

    /// Check whether `resolvectl` can be executed
    pub fn is_available() -> bool {
        Command::new(RESOLVECTL)
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    fn current_servers(&self, link: &str) -> Result<Vec<Ipv4Addr>, u32> {
        let output = Command::new(RESOLVECTL)
            .args(["dns", link])
            .output()
            .map_err(|e| {
                log::error!("Failed to run {}: {}", RESOLVECTL, e);
                HELPER_ERR_EXEC
            })?;

        let code = exit_code(output.status);
        if code != HELPER_OK {
            log::error!(
                "{} dns {} failed: {}",
                RESOLVECTL,
                link,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Err(code);
        }

        Ok(parse_ipv4_list(&String::from_utf8_lossy(&output.stdout)))
    }

    fn run(&self, args: &[String]) -> u32 {
        log::debug!("Shell exec: {} {}", RESOLVECTL, args.join(" "));
        match Command::new(RESOLVECTL).args(args).output() {
            Ok(output) => {
                let code = exit_code(output.status);
                if code != HELPER_OK {
                    log::error!(
                        "{} {} failed: {}",
                        RESOLVECTL,
                        args.join(" "),
                        String::from_utf8_lossy(&output.stderr).trim()
                    );
                }
                code
            }
            Err(e) => {
                log::error!("Failed to run {}: {}", RESOLVECTL, e);
                HELPER_ERR_EXEC
            }
        }
    }

    fn apply(&self, link: &str, dns: Option<Ipv4Addr>, op: DnsOperation) -> u32 {
        let current = if op == DnsOperation::Set {
            Vec::new()
        } else {
            match self.current_servers(link) {
                Ok(servers) => servers,
                Err(code) => return code,
            }
        };

        match merge_servers(&current, dns, op) {
            None => self.run(&["revert".to_string(), link.to_string()]),
            Some(servers) => {
                let mut args = vec!["dns".to_string(), link.to_string()];
                args.extend(servers.iter().map(|s| s.to_string()));
                self.run(&args)
            }
        }
    }
}

impl DnsHelper for ResolvectlHelper {
    fn set_dns_by_hardware_address(
        &self,
        hw: &MacAddress,
        dns: Option<Ipv4Addr>,
        op: DnsOperation,
    ) -> u32 {
        match interface_name_by_hardware_address(self.interfaces.as_ref(), hw) {
            Ok(Some(link)) => self.apply(&link, dns, op),
            Ok(None) => HELPER_ERR_INTERFACE_NOT_FOUND,
            Err(e) => {
                log::error!("Failed to enumerate interfaces: {}", e);
                HELPER_ERR_INTERFACE_NOT_FOUND
            }
        }
    }

    fn set_dns_by_local_address(
        &self,
        local: Ipv4Addr,
        dns: Option<Ipv4Addr>,
        op: DnsOperation,
    ) -> u32 {
        match interface_name_by_address(self.interfaces.as_ref(), local) {
            Ok(Some(link)) => self.apply(&link, dns, op),
            Ok(None) => {
                log::debug!("No interface owns {}", local);
                missing_link_code(dns, op)
            }
            Err(e) => {
                log::error!("Failed to enumerate interfaces: {}", e);
                HELPER_ERR_INTERFACE_NOT_FOUND
            }
        }
    }
}
