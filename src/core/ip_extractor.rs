//! Client IP extraction for rate limiting and security logging
//!
//! Forwarded headers are honoured only when the direct peer is a configured
//! trusted proxy; otherwise a client could pick its own rate-limit bucket.

use log::{debug, warn};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use warp::http::HeaderMap;

use crate::config::ServerConfig;

/// Headers checked, in order, when the peer is a trusted proxy
const FORWARDED_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

/// Configuration for IP extraction behavior
#[derive(Debug, Clone, Default)]
pub struct IpExtractionConfig {
    /// Whether to trust proxy headers at all
    pub trust_proxy_headers: bool,
    /// Peers whose forwarded headers are believed
    pub trusted_proxies: Vec<IpAddr>,
}

impl IpExtractionConfig {
    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self {
            trust_proxy_headers: config.trust_proxy,
            trusted_proxies: config.trusted_proxies.clone(),
        }
    }
}

/// Extract the client IP address from headers and connection info
pub fn extract_client_ip(
    headers: &HeaderMap,
    remote_addr: Option<SocketAddr>,
    config: &IpExtractionConfig,
) -> IpAddr {
    let direct_ip = remote_addr.map(|addr| addr.ip());

    let from_trusted_proxy = config.trust_proxy_headers
        && direct_ip
            .map(|ip| config.trusted_proxies.contains(&ip))
            .unwrap_or(false);

    if from_trusted_proxy {
        for name in FORWARDED_HEADERS {
            if let Some(ip) = header_ip(headers, name) {
                debug!("Extracted client IP {} from {}", ip, name);
                return ip;
            }
        }
        warn!("Trusted proxy sent no usable forwarding header, using proxy IP");
    }

    // Unknown peers (in-process test requests) share the loopback bucket
    direct_ip.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Leftmost valid address of a forwarding header
fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    let value = headers.get(name)?.to_str().ok()?;
    let candidate = value.split(',').next()?.trim();
    match candidate.parse::<IpAddr>() {
        Ok(ip) if !is_reserved_ip(ip) => Some(ip),
        Ok(ip) => {
            warn!("Reserved address {} in {} ignored", ip, name);
            None
        }
        Err(_) => {
            warn!("Invalid IP format in {} header: {}", name, candidate);
            None
        }
    }
}

/// Addresses that can never be a real client
fn is_reserved_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_unspecified() || ipv4.is_broadcast() || ipv4.is_multicast() || ipv4.octets()[0] >= 240
        }
        IpAddr::V6(ipv6) => ipv6.is_unspecified() || ipv6.is_multicast(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warp::http::HeaderValue;

    fn proxy_config() -> IpExtractionConfig {
        IpExtractionConfig {
            trust_proxy_headers: true,
            trusted_proxies: vec!["10.0.0.1".parse().unwrap()],
        }
    }

    #[test]
    fn test_direct_connection() {
        let headers = HeaderMap::new();
        let remote = Some("203.0.113.1:12345".parse().unwrap());
        let ip = extract_client_ip(&headers, remote, &IpExtractionConfig::default());
        assert_eq!(ip, "203.0.113.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_forwarded_header_from_trusted_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.7, 10.0.0.1"));
        let remote = Some("10.0.0.1:443".parse().unwrap());
        let ip = extract_client_ip(&headers, remote, &proxy_config());
        assert_eq!(ip, "198.51.100.7".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_forwarded_header_from_untrusted_peer_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.7"));
        let remote = Some("203.0.113.9:443".parse().unwrap());
        let ip = extract_client_ip(&headers, remote, &proxy_config());
        assert_eq!(ip, "203.0.113.9".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_reserved_forwarded_address_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("0.0.0.0"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.8"));
        let remote = Some("10.0.0.1:443".parse().unwrap());
        let ip = extract_client_ip(&headers, remote, &proxy_config());
        assert_eq!(ip, "198.51.100.8".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_missing_peer_falls_back_to_loopback() {
        let ip = extract_client_ip(&HeaderMap::new(), None, &IpExtractionConfig::default());
        assert_eq!(ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
}
