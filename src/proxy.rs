//! PROXY protocol v1 header parsing, per §6's "PROXY v1" interface.
//!
//! A connection may be prefixed with a single human-readable header line
//! identifying the original client before any SMTP traffic begins. Per
//! §9's resolution, only the v1 text header is supported; a malformed
//! header aborts the session silently rather than producing an SMTP
//! error reply, since the peer speaking PROXY may not expect one.

use std::net::{IpAddr, SocketAddr};

/// The replacement remote endpoint parsed out of a PROXY v1 header.
pub struct ProxiedEndpoint {
    pub source: SocketAddr,
}

/// Parses a single PROXY v1 line (without the trailing CRLF). Returns
/// `None` if `line` is not a PROXY header at all, so the caller can fall
/// through to ordinary SMTP parsing; returns `Err` if it is a PROXY
/// header but malformed.
pub fn parse_line(line: &str) -> Option<Result<ProxiedEndpoint, &'static str>> {
    let rest = line.strip_prefix("PROXY ")?;
    Some(parse_body(rest))
}

fn parse_body(rest: &str) -> Result<ProxiedEndpoint, &'static str> {
    let mut parts = rest.split(' ');
    let protocol = parts.next().ok_or("missing protocol field")?;
    if protocol == "UNKNOWN" {
        return Err("UNKNOWN proxy protocol carries no usable endpoint");
    }
    if protocol != "TCP4" && protocol != "TCP6" {
        return Err("unsupported PROXY protocol field");
    }

    let source_ip: IpAddr = parts.next().ok_or("missing source address")?.parse().map_err(|_| "invalid source address")?;
    let _dest_ip: IpAddr = parts.next().ok_or("missing destination address")?.parse().map_err(|_| "invalid destination address")?;
    let source_port: u16 = parts.next().ok_or("missing source port")?.parse().map_err(|_| "invalid source port")?;
    let _dest_port: u16 = parts.next().ok_or("missing destination port")?.parse().map_err(|_| "invalid destination port")?;

    if parts.next().is_some() {
        return Err("trailing fields after destination port");
    }

    match (protocol, source_ip) {
        ("TCP4", IpAddr::V4(_)) | ("TCP6", IpAddr::V6(_)) => {}
        _ => return Err("protocol field does not match address family"),
    }

    Ok(ProxiedEndpoint { source: SocketAddr::new(source_ip, source_port) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp4_header() {
        let result = parse_line("PROXY TCP4 192.0.2.1 192.0.2.2 56324 25").unwrap().unwrap();
        assert_eq!(result.source.to_string(), "192.0.2.1:56324");
    }

    #[test]
    fn parses_tcp6_header() {
        let result = parse_line("PROXY TCP6 ::1 ::1 443 25").unwrap().unwrap();
        assert_eq!(result.source.ip().to_string(), "::1");
    }

    #[test]
    fn non_proxy_line_returns_none() {
        assert!(parse_line("EHLO example.com").is_none());
    }

    #[test]
    fn unknown_protocol_is_an_error() {
        assert!(parse_line("PROXY UNKNOWN").unwrap().is_err());
    }

    #[test]
    fn mismatched_family_is_rejected() {
        assert!(parse_line("PROXY TCP4 ::1 ::1 1 2").unwrap().is_err());
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        assert!(parse_line("PROXY TCP4 192.0.2.1 192.0.2.2 1 2 extra").unwrap().is_err());
    }
}
