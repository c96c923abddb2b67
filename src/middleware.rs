use axum::extract::{ConnectInfo, Request};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;
use tracing::info;

/// Logging middleware for request/response tracking
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_ip = client_ip(request.headers(), peer_addr(&request))
        .unwrap_or_else(|| "unknown".to_string());

    info!(
        target: "captioner::middleware",
        method = %method,
        uri = %uri,
        client_ip = %client_ip,
        "Incoming request"
    );

    let response = next.run(request).await;

    let status = response.status();
    info!(
        target: "captioner::middleware",
        method = %method,
        uri = %uri,
        status = %status,
        "Request completed"
    );

    response
}

/// Best-effort client address: proxy headers first, then the connection peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        if let Ok(forwarded_str) = forwarded.to_str() {
            if let Some(first_ip) = forwarded_str.split(',').next() {
                let first_ip = first_ip.trim();
                if !first_ip.is_empty() {
                    return Some(first_ip.to_string());
                }
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return Some(ip_str.to_string());
        }
    }

    peer.map(|addr| addr.ip().to_string())
}

fn peer_addr(request: &Request) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("192.168.1.1, 10.0.0.1"),
        );

        assert_eq!(client_ip(&headers, None), Some("192.168.1.1".to_string()));
    }

    #[test]
    fn real_ip_header_used_without_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("203.0.113.1"));

        assert_eq!(client_ip(&headers, None), Some("203.0.113.1".to_string()));
    }

    #[test]
    fn falls_back_to_peer_address() {
        let headers = HeaderMap::new();
        let peer: SocketAddr = "127.0.0.1:5000".parse().unwrap();

        assert_eq!(client_ip(&headers, Some(peer)), Some("127.0.0.1".to_string()));
        assert_eq!(client_ip(&headers, None), None);
    }
}
