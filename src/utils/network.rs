//! Address classification and resolution helpers.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, ToSocketAddrs};

pub fn is_ipv4(host: &str) -> bool {
    host.parse::<Ipv4Addr>().is_ok()
}

pub fn is_ipv6(host: &str) -> bool {
    host.parse::<Ipv6Addr>().is_ok()
}

/// Resolve a hostname to its first A/AAAA record, preferring IPv4.
///
/// Used by the Surge emitter for `external` SSR entries when hostname
/// resolution is enabled; the lookup is synchronous.
pub fn hostname_to_ip_addr(host: &str) -> Option<String> {
    let addrs: Vec<IpAddr> = (host, 0)
        .to_socket_addrs()
        .ok()?
        .map(|sa| sa.ip())
        .collect();
    addrs
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addrs.first())
        .map(|ip| ip.to_string())
}
