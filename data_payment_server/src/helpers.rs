use std::{net::IpAddr, str::FromStr};

use actix_web::{http::header::HeaderMap, HttpRequest};
use log::{debug, trace, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::integrations::RawCallback;

/// Get the remote IP address from the request. It uses 3 sources to determine the IP address, in decreasing order
/// of preference:
/// 1. The `X-Forwarded-For` header, iif `use_x_forwarded_for` is set to true in the configuration. When a proxy chain
///    appends several addresses, the first (client) address is used.
/// 2. The `Forwarded` header, iif `use_forwarded` is set to true in the configuration.
/// 3. The peer address from the connection info.
pub fn get_remote_ip(req: &HttpRequest, use_x_forwarded_for: bool, use_forwarded: bool) -> Option<IpAddr> {
    let mut result = None;
    if use_x_forwarded_for {
        trace!("Checking X-Forwarded-For header");
        result = req
            .headers()
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| IpAddr::from_str(s.trim()).ok());
        if let Some(ip) = result {
            debug!("Using X-Forwarded-For header for remote address: {ip}");
        }
    }
    if use_forwarded && result.is_none() {
        trace!("Checking Forwarded header");
        result = req.headers().get("Forwarded").and_then(|v| v.to_str().ok()).and_then(ip_from_forwarded);
        if let Some(ip) = result {
            debug!("Using Forwarded header for remote address: {ip}");
        }
    }
    result.or_else(|| {
        let peer_addr = req.peer_addr().map(|a| a.ip());
        trace!("Using Peer address for remote address: {:?}", peer_addr);
        peer_addr
    })
}

static FORWARDED_FOR: Lazy<Option<Regex>> = Lazy::new(|| match Regex::new(r#"for="?\[?(?P<ip>[^;,"\]]+)"#) {
    Ok(re) => Some(re),
    Err(e) => {
        warn!("Forwarded header pattern did not compile. {e}");
        None
    },
});

fn ip_from_forwarded(header: &str) -> Option<IpAddr> {
    let caps = FORWARDED_FOR.as_ref()?.captures(header)?;
    caps.name("ip").and_then(|m| IpAddr::from_str(m.as_str()).ok())
}

/// Copies the headers and the untouched body of a callback request, so that signatures can be checked against the
/// exact bytes that were sent.
pub fn raw_callback(headers: &HeaderMap, body: bytes::Bytes) -> RawCallback {
    let headers = headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_ascii_lowercase(), v.to_string())))
        .collect();
    RawCallback { headers, body }
}

#[cfg(test)]
mod test {
    use actix_web::test::TestRequest;

    use super::*;

    #[test]
    fn remote_ip_sources() {
        let req = TestRequest::default()
            .peer_addr("10.0.0.9:4000".parse().unwrap())
            .insert_header(("X-Forwarded-For", "203.0.113.7, 10.0.0.1"))
            .insert_header(("Forwarded", "for=198.51.100.17;proto=https"))
            .to_http_request();
        assert_eq!(get_remote_ip(&req, true, true), Some("203.0.113.7".parse().unwrap()));
        assert_eq!(get_remote_ip(&req, false, true), Some("198.51.100.17".parse().unwrap()));
        assert_eq!(get_remote_ip(&req, false, false), Some("10.0.0.9".parse().unwrap()));
    }

    #[test]
    fn forwarded_ipv6() {
        assert_eq!(ip_from_forwarded(r#"for="[2001:db8::1]:4711""#), Some("2001:db8::1".parse().unwrap()));
        assert_eq!(ip_from_forwarded("proto=https"), None);
    }
}
