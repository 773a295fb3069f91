use http::HeaderMap;
use std::net::SocketAddr;

/// Resolves the real client address for forwarding-header injection.
///
/// Trusts `x-real-ip` first (set by an outer edge layer), then the first
/// hop of `x-forwarded-for`, and finally falls back to the socket peer.
pub fn resolve_client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    if let Some(ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let ip = ip.trim();
        if !ip.is_empty() {
            return ip.to_string();
        }
    }

    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    peer.ip().to_string()
}
