//! Security headers for HTTP responses
//!
//! Every API response carries the same strict header set; the service serves
//! JSON only, so the content security policy denies everything.

use warp::http::header::{HeaderMap, HeaderName, HeaderValue};

/// Strict Content Security Policy for API endpoints
const STRICT_CSP: &str = "default-src 'none'; frame-ancestors 'none';";

const PERMISSIONS_POLICY: &str =
    "geolocation=(), microphone=(), camera=(), payment=(), usb=(), magnetometer=(), gyroscope=(), accelerometer=()";

/// Header set applied to every API response
pub fn api_security_headers() -> HeaderMap {
    let pairs: [(&str, &str); 8] = [
        ("x-frame-options", "DENY"),
        ("x-content-type-options", "nosniff"),
        ("x-xss-protection", "0"),
        ("referrer-policy", "no-referrer"),
        ("content-security-policy", STRICT_CSP),
        ("cache-control", "no-store"),
        ("strict-transport-security", "max-age=31536000; includeSubDomains"),
        ("permissions-policy", PERMISSIONS_POLICY),
    ];

    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_csp_for_api() {
        assert!(STRICT_CSP.contains("default-src 'none'"));
        assert!(STRICT_CSP.contains("frame-ancestors 'none'"));
        assert!(!STRICT_CSP.contains("unsafe-inline"));
    }

    #[test]
    fn test_api_header_set() {
        let headers = api_security_headers();
        assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
        assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
        assert_eq!(headers.get("cache-control").unwrap(), "no-store");
        assert!(headers.contains_key("content-security-policy"));
    }
}
