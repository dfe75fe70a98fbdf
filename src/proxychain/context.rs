//! Inbound request context.
//!
//! # Responsibilities
//! - Carry what the pipeline needs from the inbound request: method, URI,
//!   headers, peer address and the (not yet consumed) body
//! - Know the proxy's own origin, configured or derived from the `Host`
//! - Hold the client-facing response header map that modifiers edit

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Method, Request, Uri};

/// Per-request view of the inbound HTTP request.
#[derive(Debug)]
pub struct InboundContext {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    peer: Option<SocketAddr>,
    body: Option<Body>,
    proxy_origin: Option<String>,
    response_headers: HeaderMap,
}

impl InboundContext {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Body) -> Self {
        Self {
            method,
            uri,
            headers,
            peer: None,
            body: Some(body),
            proxy_origin: None,
            response_headers: HeaderMap::new(),
        }
    }

    /// Build a context from an axum request, picking up `ConnectInfo` if set.
    pub fn from_request(request: Request<Body>) -> Self {
        let (parts, body) = request.into_parts();
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0);
        let mut ctx = Self::new(parts.method, parts.uri, parts.headers, body);
        ctx.peer = peer;
        ctx
    }

    /// Fix the proxy origin instead of deriving it from `Host`.
    pub fn with_proxy_origin(mut self, origin: impl Into<String>) -> Self {
        self.proxy_origin = Some(origin.into().trim_end_matches('/').to_string());
        self
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Header value as a string, if present and valid.
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn referer(&self) -> Option<&str> {
        self.header(header::REFERER)
    }

    /// `Host` header, falling back to the URI authority.
    pub fn host(&self) -> Option<&str> {
        self.header(header::HOST)
            .or_else(|| self.uri.authority().map(|a| a.as_str()))
    }

    /// Host without port, lowercased.
    pub fn host_name(&self) -> Option<String> {
        let host = self.host()?;
        let name = if host.starts_with('[') {
            host.split_once(']').map_or(host, |(addr, _)| addr).trim_start_matches('[')
        } else {
            host.rsplit_once(':').map_or(host, |(name, _)| name)
        };
        Some(name.to_ascii_lowercase())
    }

    /// Path and query after the leading `/`.
    pub fn path_remainder(&self) -> &str {
        self.uri
            .path_and_query()
            .map_or("", |pq| pq.as_str())
            .trim_start_matches('/')
    }

    /// Scheme and authority the client used to reach the proxy.
    pub fn proxy_origin(&self) -> String {
        if let Some(origin) = &self.proxy_origin {
            return origin.clone();
        }
        let scheme = self
            .header("x-forwarded-proto")
            .or_else(|| self.uri.scheme_str())
            .unwrap_or("http");
        match self.host() {
            Some(host) => format!("{}://{}", scheme, host),
            None => String::new(),
        }
    }

    /// The origin set with [`with_proxy_origin`](Self::with_proxy_origin).
    pub fn configured_proxy_origin(&self) -> Option<&str> {
        self.proxy_origin.as_deref()
    }

    /// Take the request body; later calls get `None`.
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    /// Headers that will be sent to the client.
    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.response_headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn ctx(uri: &str, host: &str) -> InboundContext {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_str(host).unwrap());
        InboundContext::new(Method::GET, uri.parse().unwrap(), headers, Body::empty())
    }

    #[test]
    fn test_host_name_strips_port() {
        assert_eq!(ctx("/", "Example.COM:8080").host_name().as_deref(), Some("example.com"));
        assert_eq!(ctx("/", "[::1]:8080").host_name().as_deref(), Some("::1"));
        assert_eq!(ctx("/", "localhost").host_name().as_deref(), Some("localhost"));
    }

    #[test]
    fn test_path_remainder_keeps_query() {
        let c = ctx("/https://example.com/a?b=1", "localhost:8080");
        assert_eq!(c.path_remainder(), "https://example.com/a?b=1");
    }

    #[test]
    fn test_proxy_origin_from_host_and_forwarded_proto() {
        let mut c = ctx("/", "proxy.example.org");
        assert_eq!(c.proxy_origin(), "http://proxy.example.org");
        c.headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        assert_eq!(c.proxy_origin(), "https://proxy.example.org");
        let c = c.with_proxy_origin("https://ladder.local/");
        assert_eq!(c.proxy_origin(), "https://ladder.local");
    }

    #[test]
    fn test_body_taken_once() {
        let mut c = ctx("/", "localhost");
        assert!(c.take_body().is_some());
        assert!(c.take_body().is_none());
    }
}
