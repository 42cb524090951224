//! Input URL safety checks

use crate::error::ValidationError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Reject URLs that are not plain public http(s) links
///
/// Only the literal host is inspected; hostnames are not resolved.
///
/// # Errors
///
/// Returns the first [`ValidationError`] the URL trips.
pub fn assert_valid_url(url: &str) -> Result<(), ValidationError> {
    let parsed = Url::parse(url).map_err(|e| ValidationError::Unparseable(e.to_string()))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ValidationError::InvalidScheme);
    }

    match parsed.host() {
        None => Err(ValidationError::MissingHostname),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            if domain.is_empty() {
                Err(ValidationError::MissingHostname)
            } else if domain == "localhost" || domain.ends_with(".localhost") {
                Err(ValidationError::Localhost)
            } else {
                Ok(())
            }
        }
        Some(Host::Ipv4(ip)) => check_ip(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => check_ip(IpAddr::V6(ip)),
    }
}

fn check_ip(ip: IpAddr) -> Result<(), ValidationError> {
    let public = match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => is_public_v6(v6),
    };
    if public {
        Ok(())
    } else {
        Err(ValidationError::NonPublicAddress(ip))
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    let [a, b, c, _] = ip.octets();
    !(ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_multicast()
        || a == 0
        // shared address space 100.64.0.0/10
        || (a == 100 && (64..=127).contains(&b))
        // IETF protocol assignments 192.0.0.0/24
        || (a == 192 && b == 0 && c == 0)
        // benchmarking 198.18.0.0/15
        || (a == 198 && (b == 18 || b == 19))
        // reserved 240.0.0.0/4
        || a >= 240)
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_public_v4(v4);
    }
    let first = ip.segments()[0];
    !(ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_multicast()
        // unique local fc00::/7
        || (first & 0xfe00) == 0xfc00
        // link-local fe80::/10
        || (first & 0xffc0) == 0xfe80
        // documentation 2001:db8::/32
        || (first == 0x2001 && ip.segments()[1] == 0x0db8))
}
