//! Windows DNS helper backed by the native helpers library
//!
//! The privileged helpers DLL ships with the service and exports:
//!
//! ```c
//! DWORD _cdecl SetDNSByMAC(const char* interfaceMAC, const char* dnsIP, byte operation);
//! DWORD _cdecl SetDNSByLocalIP(const char* interfaceLocalAddr, const char* dnsIP, byte operation);
//! ```
//!
//! An empty `dnsIP` restores the interface default. A zero return is
//! success; anything else is a helper-specific error code.

use std::ffi::{c_char, CString};
use std::net::Ipv4Addr;
use std::path::Path;

use libloading::Library;
use mac_address::MacAddress;

use crate::error::{Error, Result};
use crate::helper::{dns_value_string, DnsHelper, DnsOperation, HELPER_ERR_PARSE};

type SetDnsFn = unsafe extern "C" fn(*const c_char, *const c_char, u8) -> u32;

/// DNS helper that calls into the native helpers DLL
pub struct DllHelper {
    set_by_mac: SetDnsFn,
    set_by_local_ip: SetDnsFn,
    // Keeps the function pointers above valid
    _library: Library,
}

impl DllHelper {
    /// Load the helpers DLL from `path`
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::HelperUnavailable(format!(
                "helpers dll not found: '{}'",
                path.display()
            )));
        }

        // SAFETY: the helpers DLL is part of the installation and has no
        // initialization routines with preconditions.
        let library = unsafe { Library::new(path) }
            .map_err(|e| Error::HelperUnavailable(format!("{}: {}", path.display(), e)))?;

        // SAFETY: both exports have the signature described in the module docs.
        let (set_by_mac, set_by_local_ip) = unsafe {
            let by_mac = *library
                .get::<SetDnsFn>(b"SetDNSByMAC\0")
                .map_err(|e| Error::HelperUnavailable(format!("SetDNSByMAC: {}", e)))?;
            let by_local = *library
                .get::<SetDnsFn>(b"SetDNSByLocalIP\0")
                .map_err(|e| Error::HelperUnavailable(format!("SetDNSByLocalIP: {}", e)))?;
            (by_mac, by_local)
        };

        log::info!("Loaded DNS helpers from {}", path.display());

        Ok(Self {
            set_by_mac,
            set_by_local_ip,
            _library: library,
        })
    }

    fn invoke(func: SetDnsFn, target: String, dns: Option<Ipv4Addr>, op: DnsOperation) -> u32 {
        let (Ok(target), Ok(dns)) = (CString::new(target), CString::new(dns_value_string(dns)))
        else {
            return HELPER_ERR_PARSE;
        };

        // SAFETY: both pointers reference NUL-terminated strings that outlive the call.
        unsafe { func(target.as_ptr(), dns.as_ptr(), op.code()) }
    }
}

/// Format a hardware address as lowercase colon-separated hex
fn hardware_address_string(hw: &MacAddress) -> String {
    hw.bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

impl DnsHelper for DllHelper {
    fn set_dns_by_hardware_address(
        &self,
        hw: &MacAddress,
        dns: Option<Ipv4Addr>,
        op: DnsOperation,
    ) -> u32 {
        Self::invoke(self.set_by_mac, hardware_address_string(hw), dns, op)
    }

    fn set_dns_by_local_address(
        &self,
        local: Ipv4Addr,
        dns: Option<Ipv4Addr>,
        op: DnsOperation,
    ) -> u32 {
        Self::invoke(self.set_by_local_ip, local.to_string(), dns, op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hardware_address_format() {
        let hw = MacAddress::new([0xaa, 0xbb, 0xcc, 0x0d, 0xee, 0xff]);
        assert_eq!(hardware_address_string(&hw), "aa:bb:cc:0d:ee:ff");
    }

    #[test]
    fn test_missing_dll() {
        let result = DllHelper::load(Path::new(r"C:\nonexistent\helpers.dll"));
        assert!(matches!(result, Err(Error::HelperUnavailable(_))));
    }
}
