//! Co-location detection
//!
//! Decides whether an observer runs on the same host as the daemon, which
//! selects the shared-file fast path over wire streaming. The check is a
//! fallback chain kept in its legacy order for compatibility:
//!
//! 1. host strings equal
//! 2. both resolve to a loopback-class address (127.0.0.1 / 127.0.1.1)
//! 3. the resolved address sets intersect (stands in for canonical
//!    reverse-lookup equality)
//! 4. last resort: one side is loopback and the other matches this
//!    machine's best-guess LAN address
//!
//! The chain is known to produce false negatives (an observer on this host
//! can still be classified remote and get the slower streamed path); that
//! only costs speed, never correctness, so the order is reproduced rather
//! than improved.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs, UdpSocket};

use tracing::debug;

/// True when `observer` and `local` are judged to be the same machine.
pub fn same_host_addrs(observer: &SocketAddr, local: &SocketAddr) -> bool {
    same_host(&observer.ip().to_string(), &local.ip().to_string())
}

/// Host-string variant of the check; accepts hostnames or IP literals.
pub fn same_host(host_a: &str, host_b: &str) -> bool {
    if host_a == host_b {
        return true;
    }

    let a = resolve(host_a);
    let b = resolve(host_b);

    if a.is_empty() || b.is_empty() {
        debug!(host_a, host_b, "co-location check could not resolve a host");
        return subnet_probe(&a, &b);
    }

    if is_loopback_set(&a) && is_loopback_set(&b) {
        return true;
    }

    if a.intersection(&b).next().is_some() {
        return true;
    }

    subnet_probe(&a, &b)
}

/// Resolve a host string to its address set. An unbound wildcard bind
/// address counts as loopback for this purpose: the daemon is local to
/// itself.
fn resolve(host: &str) -> HashSet<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        if ip.is_unspecified() {
            return HashSet::from([IpAddr::from([127, 0, 0, 1])]);
        }
        return HashSet::from([ip]);
    }

    match (host, 0u16).to_socket_addrs() {
        Ok(addrs) => addrs.map(|a| a.ip()).collect(),
        Err(_) => HashSet::new(),
    }
}

fn is_loopback_set(addrs: &HashSet<IpAddr>) -> bool {
    !addrs.is_empty() && addrs.iter().all(|a| a.is_loopback())
}

/// Last-resort probe: if exactly one side resolves to loopback and the
/// other equals this machine's best-guess LAN address, they share a host.
fn subnet_probe(a: &HashSet<IpAddr>, b: &HashSet<IpAddr>) -> bool {
    let Some(lan) = local_subnet_guess() else {
        return false;
    };

    (is_loopback_set(a) && b.contains(&lan)) || (is_loopback_set(b) && a.contains(&lan))
}

/// Best-guess LAN address: connect a UDP socket toward a routable address
/// and read back the chosen source. No packet leaves the host.
fn local_subnet_guess() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("192.0.2.1:9").ok()?;
    Some(socket.local_addr().ok()?.ip())
}
