//! macOS DNS helper built on `networksetup`
//!
//! DNS on macOS is configured per network *service* ("Wi-Fi",
//! "USB 10/100/1000 LAN"), not per BSD device. The helper maps a device
//! (`en0`) to its hardware port name with `-listallhardwareports` and then
//! uses `-getdnsservers` / `-setdnsservers`. Setting the literal value
//! `Empty` reverts the service to DHCP-provided servers.
//!
//! Requires root.

use std::net::Ipv4Addr;
use std::process::Command;

use mac_address::MacAddress;

use crate::helper::{
    exit_code, merge_servers, missing_link_code, parse_ipv4_list, DnsHelper, DnsOperation, HELPER_ERR_EXEC,
    HELPER_ERR_INTERFACE_NOT_FOUND, HELPER_ERR_PARSE, HELPER_OK,
};
use crate::topology::{
    interface_name_by_address, interface_name_by_hardware_address, InterfaceSource,
    SystemInterfaces,
};

const NETWORKSETUP: &str = "/usr/sbin/networksetup";

/// DNS helper that drives `networksetup`
pub struct NetworksetupHelper {
    interfaces: Box<dyn InterfaceSource>,
}

impl Default for NetworksetupHelper {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworksetupHelper {
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

    fn output(&self, args: &[&str]) -> Result<String, u32> {
        let output = Command::new(NETWORKSETUP).args(args).output().map_err(|e| {
            log::error!("Failed to run networksetup: {}", e);
            HELPER_ERR_EXEC
        })?;

        let code = exit_code(output.status);
        if code != HELPER_OK {
            log::error!(
                "networksetup {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Err(code);
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Find the network service bound to a BSD device name
    fn service_for_device(&self, device: &str) -> Result<String, u32> {
        let listing = self.output(&["-listallhardwareports"])?;
        parse_hardware_port(&listing, device).ok_or(HELPER_ERR_PARSE)
    }

    fn apply(&self, device: &str, dns: Option<Ipv4Addr>, op: DnsOperation) -> u32 {
        let service = match self.service_for_device(device) {
            Ok(service) => service,
            Err(code) => return code,
        };

        let current = if op == DnsOperation::Set {
            Vec::new()
        } else {
            match self.output(&["-getdnsservers", &service]) {
                Ok(out) => parse_ipv4_list(&out),
                Err(code) => return code,
            }
        };

        let servers: Vec<String> = match merge_servers(&current, dns, op) {
            None => vec!["Empty".to_string()],
            Some(list) => list.iter().map(|s| s.to_string()).collect(),
        };

        let mut args = vec!["-setdnsservers", service.as_str()];
        args.extend(servers.iter().map(String::as_str));
        log::debug!("Shell exec: {} {}", NETWORKSETUP, args.join(" "));

        match self.output(&args) {
            Ok(_) => HELPER_OK,
            Err(code) => code,
        }
    }
}

/// Extract the "Hardware Port" name that owns `device`
///
/// The listing is a sequence of blocks:
///
/// ```text
/// Hardware Port: Wi-Fi
/// Device: en0
/// Ethernet Address: aa:bb:cc:dd:ee:ff
/// ```
fn parse_hardware_port(listing: &str, device: &str) -> Option<String> {
    let mut port: Option<&str> = None;
    for line in listing.lines() {
        let line = line.trim();
        if let Some(name) = line.strip_prefix("Hardware Port:") {
            port = Some(name.trim());
        } else if let Some(dev) = line.strip_prefix("Device:") {
            if dev.trim() == device {
                return port.map(str::to_string);
            }
        }
    }
    None
}

impl DnsHelper for NetworksetupHelper {
    fn set_dns_by_hardware_address(
        &self,
        hw: &MacAddress,
        dns: Option<Ipv4Addr>,
        op: DnsOperation,
    ) -> u32 {
        match interface_name_by_hardware_address(self.interfaces.as_ref(), hw) {
            Ok(Some(device)) => self.apply(&device, dns, op),
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
            Ok(Some(device)) => self.apply(&device, dns, op),
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
