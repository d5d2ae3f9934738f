//! Local interface enumeration
//!
//! Produces the IPv4 addresses a discovery run binds its listeners to. Only
//! interfaces that are up and are neither loopback, virtual (bridge, tunnel,
//! alias) nor point-to-point contribute addresses.

use std::collections::BTreeSet;
use std::io;
use std::net::{IpAddr, Ipv4Addr};

use tracing::{debug, warn};

use super::error::DiscoveryError;

/// Interface state relevant to SSDP discovery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceFlags {
    pub up: bool,
    pub loopback: bool,
    pub virtual_device: bool,
    pub point_to_point: bool,
}

/// One inspected interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub flags: InterfaceFlags,
    pub addresses: Vec<IpAddr>,
}

impl InterfaceInfo {
    /// Whether listeners may be bound to this interface's addresses
    pub fn is_usable(&self) -> bool {
        self.flags.up
            && !self.flags.loopback
            && !self.flags.virtual_device
            && !self.flags.point_to_point
    }

    /// IPv4 addresses of this interface, in reported order
    pub fn ipv4_addresses(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.addresses.iter().filter_map(|addr| match addr {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
    }
}

/// Platform view of network interfaces
///
/// Listing and inspection are separate so that one unreadable interface can
/// be skipped without losing the rest.
pub trait InterfaceSource: Send + Sync {
    /// Names of all interfaces visible to the host
    fn interface_names(&self) -> io::Result<Vec<String>>;

    /// Flags and addresses of one interface
    fn inspect(&self, name: &str) -> io::Result<InterfaceInfo>;
}

/// Addresses found by one enumeration, plus what had to be skipped
#[derive(Debug, Default)]
pub struct EnumerationReport {
    pub addresses: Vec<Ipv4Addr>,
    pub errors: Vec<DiscoveryError>,
}

impl EnumerationReport {
    /// True when the interface list itself could not be read
    pub fn failed_entirely(&self) -> bool {
        self.errors
            .iter()
            .any(|e| matches!(e, DiscoveryError::Enumeration(_)))
    }
}

/// Enumerate usable IPv4 addresses from `source`, logging and collecting failures
pub fn enumerate(source: &dyn InterfaceSource) -> EnumerationReport {
    let mut report = EnumerationReport::default();

    let names = match source.interface_names() {
        Ok(names) => names,
        Err(e) => {
            warn!("Failed to list network interfaces: {}", e);
            report.errors.push(DiscoveryError::Enumeration(e));
            return report;
        }
    };

    let mut seen = BTreeSet::new();
    for name in names {
        let info = match source.inspect(&name) {
            Ok(info) => info,
            Err(e) => {
                warn!("Skipping interface {}: {}", name, e);
                report.errors.push(DiscoveryError::InterfaceInspection {
                    interface: name,
                    source: e,
                });
                continue;
            }
        };

        if !info.is_usable() {
            debug!("Ignoring interface {} ({:?})", info.name, info.flags);
            continue;
        }

        for addr in info.ipv4_addresses() {
            if seen.insert(addr) {
                debug!("Using {} on interface {}", addr, info.name);
                report.addresses.push(addr);
            }
        }
    }

    report
}

/// Usable local IPv4 addresses of this host; empty when none qualify
pub fn list_usable_ipv4_addresses() -> Vec<Ipv4Addr> {
    enumerate(&SystemInterfaces).addresses
}

/// Interfaces of the running host
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn interface_names(&self) -> io::Result<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        for iface in if_addrs::get_if_addrs()? {
            if !names.contains(&iface.name) {
                names.push(iface.name);
            }
        }
        Ok(names)
    }

    fn inspect(&self, name: &str) -> io::Result<InterfaceInfo> {
        let entries: Vec<_> = if_addrs::get_if_addrs()?
            .into_iter()
            .filter(|iface| iface.name == name)
            .collect();

        if entries.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("interface {} disappeared", name),
            ));
        }

        let addresses: Vec<IpAddr> = entries.iter().map(|iface| iface.ip()).collect();
        let reports_loopback = entries.iter().any(|iface| iface.is_loopback());

        let mut flags = platform_flags(name)?;
        flags.loopback |= reports_loopback;
        flags.virtual_device |= is_alias(name);

        Ok(InterfaceInfo {
            name: name.to_string(),
            flags,
            addresses,
        })
    }
}

/// Alias labels such as `eth0:1` are sub-interfaces of a physical device
fn is_alias(name: &str) -> bool {
    name.contains(':')
}

// SIOCGIFFLAGS bits, identical on Linux and the BSDs
#[cfg_attr(not(unix), allow(dead_code))]
const IFF_UP: u32 = 0x1;
#[cfg_attr(not(unix), allow(dead_code))]
const IFF_LOOPBACK: u32 = 0x8;
#[cfg_attr(not(unix), allow(dead_code))]
const IFF_POINTOPOINT: u32 = 0x10;

/// Decode kernel interface flag bits; virtual detection is left to the caller
#[cfg_attr(not(unix), allow(dead_code))]
fn flags_from_bits(bits: u32) -> InterfaceFlags {
    InterfaceFlags {
        up: bits & IFF_UP != 0,
        loopback: bits & IFF_LOOPBACK != 0,
        virtual_device: false,
        point_to_point: bits & IFF_POINTOPOINT != 0,
    }
}

#[cfg(target_os = "linux")]
fn platform_flags(name: &str) -> io::Result<InterfaceFlags> {
    use std::path::Path;

    let device = name.split(':').next().unwrap_or(name);
    let dir = Path::new("/sys/class/net").join(device);

    let raw = std::fs::read_to_string(dir.join("flags"))?;
    let mut flags = flags_from_bits(parse_sysfs_flags(&raw)?);
    flags.virtual_device = dir.join("bridge").exists() || dir.join("tun_flags").exists();
    Ok(flags)
}

/// Reads `ifa_flags` of the first `getifaddrs` entry named `name`
#[cfg(all(unix, not(target_os = "linux")))]
fn platform_flags(name: &str) -> io::Result<InterfaceFlags> {
    use std::ffi::CStr;

    let device = name.split(':').next().unwrap_or(name);
    let mut bits = None;

    // SAFETY: the list is only walked between a successful getifaddrs and
    // the matching freeifaddrs, and names are NUL-terminated C strings.
    unsafe {
        let mut ifaddrs: *mut libc::ifaddrs = std::ptr::null_mut();
        if libc::getifaddrs(&mut ifaddrs) != 0 {
            return Err(io::Error::last_os_error());
        }

        let mut current = ifaddrs;
        while !current.is_null() {
            let ifa = &*current;
            current = ifa.ifa_next;

            if ifa.ifa_name.is_null() {
                continue;
            }
            if CStr::from_ptr(ifa.ifa_name).to_bytes() == device.as_bytes() {
                bits = Some(ifa.ifa_flags as u32);
                break;
            }
        }

        libc::freeifaddrs(ifaddrs);
    }

    let bits = bits.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no flags reported for interface {}", name),
        )
    })?;

    let mut flags = flags_from_bits(bits);
    flags.virtual_device = is_bsd_virtual_name(device);
    Ok(flags)
}

/// Bridge and tap devices report NIC-like flags; match them by name
#[cfg(all(unix, not(target_os = "linux")))]
fn is_bsd_virtual_name(device: &str) -> bool {
    ["bridge", "tap", "vmnet", "vboxnet"]
        .iter()
        .any(|prefix| device.starts_with(prefix))
}

// No flag source wired up: addresses reported by the OS count as up.
#[cfg(not(unix))]
fn platform_flags(_name: &str) -> io::Result<InterfaceFlags> {
    Ok(InterfaceFlags {
        up: true,
        ..InterfaceFlags::default()
    })
}

/// Parse `/sys/class/net/<if>/flags` content such as `0x1003`
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_sysfs_flags(raw: &str) -> io::Result<u32> {
    let trimmed = raw.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    u32::from_str_radix(hex, 16).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("bad interface flags {:?}: {}", trimmed, e),
        )
    })
}
