//! Session identifier derivation.
//!
//! The identifier is an opaque string the client pins in one of a few
//! request headers. It is never parsed or validated; two different
//! headers carrying the same string land in the same session.

use axum::http::HeaderMap;

/// Application-defined ephemeral session header. Checked first.
pub const EPHEMERAL_HEADER: &str = "x-ephemeral";

/// CDN request identifier header. Checked second.
pub const CDN_RAY_HEADER: &str = "cf-ray";

/// CDN client-IP header. Checked last, and also consulted by the
/// admission filter.
pub const CDN_CLIENT_IP_HEADER: &str = "cf-connecting-ip";

/// Derive the session identifier from request headers.
///
/// Takes the first non-empty value of [`EPHEMERAL_HEADER`],
/// [`CDN_RAY_HEADER`], [`CDN_CLIENT_IP_HEADER`], in that order. Returns
/// `None` when all three are absent or empty.
pub fn derive_session_id(headers: &HeaderMap) -> Option<String> {
    [EPHEMERAL_HEADER, CDN_RAY_HEADER, CDN_CLIENT_IP_HEADER]
        .iter()
        .find_map(|name| {
            headers
                .get(*name)
                .and_then(|value| value.to_str().ok())
                .filter(|value| !value.is_empty())
                .map(str::to_owned)
        })
}

/// Shorten an identifier for log lines.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_ephemeral_wins() {
        let map = headers(&[
            ("x-ephemeral", "abc"),
            ("cf-ray", "ray-1"),
            ("cf-connecting-ip", "1.2.3.4"),
        ]);
        assert_eq!(derive_session_id(&map).as_deref(), Some("abc"));
    }

    #[test]
    fn test_ray_beats_client_ip() {
        let map = headers(&[("cf-ray", "ray-1"), ("cf-connecting-ip", "1.2.3.4")]);
        assert_eq!(derive_session_id(&map).as_deref(), Some("ray-1"));
    }

    #[test]
    fn test_client_ip_is_last_resort() {
        let map = headers(&[("cf-connecting-ip", "1.2.3.4")]);
        assert_eq!(derive_session_id(&map).as_deref(), Some("1.2.3.4"));
    }

    #[test]
    fn test_empty_value_falls_through() {
        let map = headers(&[("x-ephemeral", ""), ("cf-ray", "ray-2")]);
        assert_eq!(derive_session_id(&map).as_deref(), Some("ray-2"));
    }

    #[test]
    fn test_all_missing() {
        let map = HeaderMap::new();
        assert_eq!(derive_session_id(&map), None);
    }

    #[test]
    fn test_short_ids() {
        assert_eq!(short_id("abcdefghij"), "abcdefgh");
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(short_id(""), "");
    }
}
