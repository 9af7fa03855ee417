use std::net::IpAddr;

use crate::error::ValidationError;

/// Check if a hostname/IP is a private or reserved address.
///
/// Covers: RFC 1918, CGNAT (100.64/10), loopback, link-local,
/// IPv6 ULA/link-local, IPv4-mapped IPv6.
pub fn is_private_ip(host: &str) -> bool {
    match host.parse::<IpAddr>() {
        Ok(addr) => is_private_addr(addr),
        Err(_) => false,
    }
}

fn is_private_addr(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            a == 0 // 0.0.0.0/8
                || a == 10
                || (a == 172 && (16..=31).contains(&b))
                || (a == 192 && b == 168)
                || a == 127
                || (a == 169 && b == 254)
                || (a == 100 && (64..=127).contains(&b)) // CGNAT, RFC 6598
        }
        IpAddr::V6(v6) => {
            if v6.is_loopback() {
                return true;
            }
            let first = v6.segments()[0];
            // fc00::/7 (ULA), fe80::/10 (link-local)
            if first & 0xfe00 == 0xfc00 || first & 0xffc0 == 0xfe80 {
                return true;
            }
            match v6.to_ipv4_mapped() {
                Some(v4) => is_private_addr(IpAddr::V4(v4)),
                None => false,
            }
        }
    }
}

/// Validate and normalize the API base URL every request (and its key) is sent to.
///
/// Returns the base without trailing slashes, or an error for:
///   - Non-HTTPS URLs (except localhost)
///   - Private/reserved IP addresses
///   - Embedded credentials, query strings or fragments
///   - Malformed URLs
pub fn validate_base_url(base: &str) -> Result<String, ValidationError> {
    let base = base.trim();
    if base.is_empty() {
        return Err(ValidationError::BaseUrl("base URL is required".into()));
    }

    let url = parse_authority(base)?;
    let is_localhost = url.host == "localhost" || url.host == "127.0.0.1" || url.host == "::1";

    if url.scheme != "https" && !(url.scheme == "http" && is_localhost) {
        return Err(ValidationError::BaseUrl(format!(
            "must use HTTPS; plain HTTP is only allowed for localhost: {base}"
        )));
    }
    if url.has_credentials {
        return Err(ValidationError::BaseUrl(
            "must not contain credentials".into(),
        ));
    }
    if base.contains('?') || base.contains('#') {
        return Err(ValidationError::BaseUrl(format!(
            "must not carry a query or fragment: {base}"
        )));
    }
    if !is_localhost && is_private_ip(&url.host) {
        return Err(ValidationError::BaseUrl(format!(
            "must not point to a private or internal IP address: {}",
            url.host
        )));
    }

    Ok(base.trim_end_matches('/').to_string())
}

struct Authority {
    scheme: String,
    host: String,
    has_credentials: bool,
}

fn parse_authority(base: &str) -> Result<Authority, ValidationError> {
    let malformed = || ValidationError::BaseUrl(format!("malformed URL: {base}"));

    let (scheme, rest) = base.split_once("://").ok_or_else(malformed)?;
    if scheme.is_empty() {
        return Err(malformed());
    }

    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    let has_credentials = authority.contains('@');
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);

    let host = if let Some(bracketed) = host_port.strip_prefix('[') {
        // IPv6: [::1]:8080
        bracketed.split(']').next().unwrap_or(bracketed)
    } else {
        host_port.split(':').next().unwrap_or(host_port)
    };

    if host.is_empty() {
        return Err(malformed());
    }

    Ok(Authority {
        scheme: scheme.to_lowercase(),
        host: host.to_lowercase(),
        has_credentials,
    })
}
