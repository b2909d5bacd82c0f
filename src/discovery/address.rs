use std::net::{IpAddr, UdpSocket};

use tracing::{debug, warn};

const HOSTS_FILE: &str = "/etc/hosts";
const FALLBACK_ADDRESS: &str = "127.0.0.1";

/// Address other services can reach this instance on.
///
/// Tries this host's entry in `/etc/hosts` (how container runtimes publish it), then the
/// address of the interface used for outbound traffic, then loopback.
pub fn resolve_address() -> String {
    if let Some(address) = from_hosts_file() {
        debug!(%address, "Resolved instance address from hosts file");
        return address;
    }
    if let Some(address) = outbound_address() {
        debug!(%address, "Resolved instance address from outbound interface");
        return address.to_string();
    }
    warn!("Could not resolve instance address, falling back to {}", FALLBACK_ADDRESS);
    FALLBACK_ADDRESS.to_string()
}

fn from_hosts_file() -> Option<String> {
    let host = hostname::get().ok()?.into_string().ok()?;
    let contents = std::fs::read_to_string(HOSTS_FILE).ok()?;
    lookup_host(&contents, &host)
}

/// Find the first non-loopback address mapped to `host` in hosts-file `contents`
pub fn lookup_host(contents: &str, host: &str) -> Option<String> {
    contents
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default())
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let ip: IpAddr = fields.next()?.parse().ok()?;
            let mut names = fields;
            if ip.is_loopback() || !names.any(|name| name.eq_ignore_ascii_case(host)) {
                return None;
            }
            Some(ip.to_string())
        })
        .next()
}

/// No packet is sent; connecting a UDP socket only selects the route
fn outbound_address() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("10.255.255.255:1").ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}
