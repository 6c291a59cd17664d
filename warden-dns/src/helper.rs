//! Native DNS helper boundary
//!
//! Every OS-level DNS change goes through a [`DnsHelper`]. The helper
//! contract is fixed: two entry points, an operation code, an optional DNS
//! value where `None` is the empty-string sentinel for "restore default /
//! remove", and a numeric return code where `0` means success.
//!
//! The privileged helpers are not safe for concurrent invocation, so all
//! calls in the process are funneled through [`call_by_hardware_address`]
//! and [`call_by_local_address`], which hold one process-wide lock.

use std::net::Ipv4Addr;
use std::sync::{Mutex, PoisonError};

use mac_address::MacAddress;

use crate::error::{Error, Result};

/// Return code for a successful helper call
pub const HELPER_OK: u32 = 0;

/// The helper could not map the address to an OS interface
pub const HELPER_ERR_INTERFACE_NOT_FOUND: u32 = 0xE000_0001;

/// The helper could not run the underlying system tool
pub const HELPER_ERR_EXEC: u32 = 0xE000_0002;

/// The system tool produced output the helper could not parse
pub const HELPER_ERR_PARSE: u32 = 0xE000_0003;

/// The system tool exited unsuccessfully without an exit code
pub const HELPER_ERR_TOOL_FAILED: u32 = 0xE000_0004;

/// DNS operation codes understood by the native helpers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DnsOperation {
    /// Replace all DNS servers of the interface
    Set = 0,
    /// Append a DNS server, keeping existing entries
    Add = 1,
    /// Remove one DNS server, keeping the others
    Del = 2,
}

impl DnsOperation {
    /// Numeric code passed across the native boundary
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for DnsOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DnsOperation::Set => write!(f, "Set"),
            DnsOperation::Add => write!(f, "Add"),
            DnsOperation::Del => write!(f, "Del"),
        }
    }
}

/// Render a DNS value the way the native helpers expect it
pub fn dns_value_string(dns: Option<Ipv4Addr>) -> String {
    match dns {
        Some(addr) if !addr.is_unspecified() => addr.to_string(),
        _ => String::new(),
    }
}

/// Privileged platform component that performs OS-level DNS changes
///
/// Implementations return the raw helper code; the caller turns nonzero
/// codes into [`Error::NativeCall`].
pub trait DnsHelper: Send + Sync {
    /// Change DNS on the interface with the given hardware address
    fn set_dns_by_hardware_address(
        &self,
        hw: &MacAddress,
        dns: Option<Ipv4Addr>,
        op: DnsOperation,
    ) -> u32;

    /// Change DNS on the interface that owns the given local address
    fn set_dns_by_local_address(
        &self,
        local: Ipv4Addr,
        dns: Option<Ipv4Addr>,
        op: DnsOperation,
    ) -> u32;
}

static NATIVE_CALL_LOCK: Mutex<()> = Mutex::new(());

fn check_code(code: u32) -> Result<()> {
    if code != HELPER_OK {
        return Err(Error::NativeCall(code));
    }
    Ok(())
}

/// Call the helper by hardware address under the process-wide lock
pub fn call_by_hardware_address(
    helper: &dyn DnsHelper,
    hw: &MacAddress,
    dns: Option<Ipv4Addr>,
    op: DnsOperation,
) -> Result<()> {
    let _guard = NATIVE_CALL_LOCK
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    log::debug!("SetDNSByMAC({}, '{}', {})", hw, dns_value_string(dns), op);
    check_code(helper.set_dns_by_hardware_address(hw, dns, op))
}

/// Call the helper by local address under the process-wide lock
pub fn call_by_local_address(
    helper: &dyn DnsHelper,
    local: Ipv4Addr,
    dns: Option<Ipv4Addr>,
    op: DnsOperation,
) -> Result<()> {
    let _guard = NATIVE_CALL_LOCK
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    log::debug!("SetDNSByLocalIP({}, '{}', {})", local, dns_value_string(dns), op);
    check_code(helper.set_dns_by_local_address(local, dns, op))
}

/// Compute an interface's new DNS server list for an operation
///
/// Used by the helpers that drive command-line tools, which can only
/// replace the whole list. `None` from this function means "revert the
/// interface to its default servers".
#[cfg_attr(windows, allow(dead_code))]
pub(crate) fn merge_servers(
    current: &[Ipv4Addr],
    dns: Option<Ipv4Addr>,
    op: DnsOperation,
) -> Option<Vec<Ipv4Addr>> {
    match (op, dns) {
        (DnsOperation::Set, None) => None,
        (DnsOperation::Set, Some(addr)) => Some(vec![addr]),
        (DnsOperation::Add, None) => Some(current.to_vec()),
        (DnsOperation::Add, Some(addr)) => {
            let mut servers = current.to_vec();
            if !servers.contains(&addr) {
                servers.push(addr);
            }
            Some(servers)
        }
        (DnsOperation::Del, None) => Some(current.to_vec()),
        (DnsOperation::Del, Some(addr)) => {
            let servers: Vec<Ipv4Addr> = current.iter().copied().filter(|s| *s != addr).collect();
            if servers.is_empty() {
                None
            } else {
                Some(servers)
            }
        }
    }
}

/// Pull every IPv4 address out of a tool's free-form output
#[cfg_attr(windows, allow(dead_code))]
pub(crate) fn parse_ipv4_list(text: &str) -> Vec<Ipv4Addr> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter_map(|token| token.trim().parse::<Ipv4Addr>().ok())
        .collect()
}

/// Helper code for a local address that no longer maps to an interface
///
/// Resetting DNS on a link that is already gone leaves nothing to undo, so
/// that case succeeds. Every other operation needs the link.
#[cfg_attr(windows, allow(dead_code))]
pub(crate) fn missing_link_code(dns: Option<Ipv4Addr>, op: DnsOperation) -> u32 {
    if op == DnsOperation::Set && dns_value_string(dns).is_empty() {
        HELPER_OK
    } else {
        HELPER_ERR_INTERFACE_NOT_FOUND
    }
}

/// Map a finished tool invocation to a helper code
#[cfg_attr(windows, allow(dead_code))]
pub(crate) fn exit_code(status: std::process::ExitStatus) -> u32 {
    if status.success() {
        return HELPER_OK;
    }
    match status.code() {
        Some(code) if code != 0 => code as u32,
        _ => HELPER_ERR_TOOL_FAILED,
    }
}
