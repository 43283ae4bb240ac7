//! Request tracking middleware.
//!
//! Derives a client key for each inbound request and reports it to the
//! detector before the request reaches its handler.

use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;

use crate::api::state::AppState;
use crate::detect::{RequestEvent, UNKNOWN_KEY};

pub async fn track_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    // Read from extensions so the router still works when served without
    // connect info (e.g. in tests).
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let key = client_key(
        request.headers(),
        peer,
        state.config.server.trust_forwarded_headers,
    );

    let mut event = RequestEvent::new(key)
        .with_method(request.method().as_str())
        .with_path(request.uri().path());
    if let Some(ua) = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
    {
        event = event.with_user_agent(ua);
    }

    state.detector.record_event(&event);

    next.run(request).await
}

/// Client identity for aggregation: first `X-Forwarded-For` hop, then
/// `X-Real-IP` (when forwarded headers are trusted), then the socket peer.
pub fn client_key(headers: &HeaderMap, peer: Option<IpAddr>, trust_forwarded: bool) -> String {
    if trust_forwarded {
        if let Some(forwarded) = headers.get("x-forwarded-for") {
            if let Ok(value) = forwarded.to_str() {
                if let Some(first) = value.split(',').next().map(str::trim) {
                    if !first.is_empty() {
                        return first.to_string();
                    }
                }
            }
        }

        if let Some(real_ip) = headers.get("x-real-ip") {
            if let Ok(value) = real_ip.to_str() {
                let value = value.trim();
                if !value.is_empty() {
                    return value.to_string();
                }
            }
        }
    }

    peer.map(|ip| ip.to_string())
        .unwrap_or_else(|| UNKNOWN_KEY.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn peer() -> Option<IpAddr> {
        Some("192.0.2.10".parse().unwrap())
    }

    #[test]
    fn test_forwarded_for_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.5, 10.0.0.1"),
        );
        assert_eq!(client_key(&headers, peer(), true), "203.0.113.5");
    }

    #[test]
    fn test_real_ip_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static(" 203.0.113.8 "));
        assert_eq!(client_key(&headers, peer(), true), "203.0.113.8");
    }

    #[test]
    fn test_untrusted_headers_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.5"));
        assert_eq!(client_key(&headers, peer(), false), "192.0.2.10");
    }

    #[test]
    fn test_no_identity_is_unknown() {
        let headers = HeaderMap::new();
        assert_eq!(client_key(&headers, None, true), UNKNOWN_KEY);
    }
}
