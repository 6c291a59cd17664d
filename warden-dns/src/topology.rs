//! Local network topology resolution
//!
//! Answers one question for the DNS controller: which local interfaces
//! (other than the tunnel) sit on a subnet that contains a given DNS
//! address? A DNS server on the local LAN is only reachable through such an
//! interface, so the manual DNS value has to be pushed there as well.

use std::io;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use mac_address::MacAddress;

use crate::error::{Error, Result};

/// One IPv4 attachment of a local network interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceRecord {
    /// OS interface name (e.g. `eth0`, `en0`)
    pub name: String,
    /// Local address assigned to the interface
    pub address: Ipv4Addr,
    /// Subnet the address belongs to
    pub network: Ipv4Net,
}

impl InterfaceRecord {
    /// Build a record from an address and its netmask
    pub fn new(name: impl Into<String>, address: Ipv4Addr, netmask: Ipv4Addr) -> Option<Self> {
        let network = Ipv4Net::with_netmask(address, netmask).ok()?.trunc();
        Some(Self {
            name: name.into(),
            address,
            network,
        })
    }

    /// Check if `addr` is on this interface's subnet
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.network.contains(&addr)
    }
}

/// Source of local interface information
///
/// The system implementation queries the OS; tests supply a fixed table.
pub trait InterfaceSource: Send + Sync {
    /// Enumerate every local IPv4 attachment
    fn ipv4_networks(&self) -> io::Result<Vec<InterfaceRecord>>;

    /// Resolve the hardware address of the interface behind `record`
    fn hardware_address(&self, record: &InterfaceRecord) -> io::Result<Option<MacAddress>>;
}

/// Interface information read from the running system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn ipv4_networks(&self) -> io::Result<Vec<InterfaceRecord>> {
        let mut records = Vec::new();
        for iface in get_if_addrs::get_if_addrs()? {
            if iface.is_loopback() {
                continue;
            }
            if let get_if_addrs::IfAddr::V4(ref v4) = iface.addr {
                if let Some(record) = InterfaceRecord::new(iface.name.clone(), v4.ip, v4.netmask) {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }

    fn hardware_address(&self, record: &InterfaceRecord) -> io::Result<Option<MacAddress>> {
        mac_address::mac_address_by_name(&record.name)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }
}

/// Find the name of the interface carrying a local address
#[cfg_attr(windows, allow(dead_code))]
pub(crate) fn interface_name_by_address(
    source: &dyn InterfaceSource,
    address: Ipv4Addr,
) -> io::Result<Option<String>> {
    Ok(source
        .ipv4_networks()?
        .into_iter()
        .find(|r| r.address == address)
        .map(|r| r.name))
}

/// Find the name of the interface carrying a hardware address
#[cfg_attr(windows, allow(dead_code))]
pub(crate) fn interface_name_by_hardware_address(
    source: &dyn InterfaceSource,
    hw: &MacAddress,
) -> io::Result<Option<String>> {
    for record in source.ipv4_networks()? {
        if let Ok(Some(mac)) = source.hardware_address(&record) {
            if mac.bytes() == hw.bytes() {
                return Ok(Some(record.name));
            }
        }
    }
    Ok(None)
}

/// Hardware addresses of the interfaces whose subnet contains `target`
///
/// The interface whose local address equals `exclude` (normally the tunnel
/// interface) is skipped. An absent target yields an empty list. Failure to
/// enumerate interfaces is an error; failure to resolve a single interface's
/// hardware address only drops that interface from the result.
pub fn matching_interfaces(
    source: &dyn InterfaceSource,
    target: Option<Ipv4Addr>,
    exclude: Option<Ipv4Addr>,
) -> Result<Vec<MacAddress>> {
    let Some(target) = target else {
        return Ok(Vec::new());
    };

    let networks = source
        .ipv4_networks()
        .map_err(Error::TopologyEnumeration)?;

    let mut matched = Vec::new();
    for record in networks {
        if Some(record.address) == exclude {
            continue;
        }
        if !record.contains(target) {
            continue;
        }

        match source.hardware_address(&record) {
            Ok(Some(mac)) => matched.push(mac),
            Ok(None) => {
                log::debug!("Interface {} ({}) has no hardware address", record.name, record.address);
            }
            Err(e) => {
                log::error!(
                    "Failed to get interface for address {}: {}",
                    record.address,
                    e
                );
            }
        }
    }

    Ok(matched)
}
