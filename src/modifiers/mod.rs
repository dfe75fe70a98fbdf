//! Built-in modifier library.
//!
//! # Data Flow
//! ```text
//! [[modifiers.request]] / [[modifiers.response]] in config
//!     → catalog.rs (name + params → Arc<dyn RequestModifier/ResponseModifier>)
//!     → ChainTemplate (persistent lists shared by every pooled chain)
//!
//! request/   edits to the outbound request: headers, referrer, user agent,
//!            crawler identities, URL rewrites, archives, cookies, DNS
//! response/  edits to the client response: headers, cookies, and HTML
//!            strategies queued for the streaming rewriter
//! ```
//!
//! # Design Decisions
//! - Parameters are validated when a modifier is built, not when it runs
//! - Composite modifiers (crawler identities, search referrers) enqueue
//!   their parts as once-only modifiers for the current request

pub mod catalog;
pub mod request;
pub mod response;

pub use catalog::{Arity, CatalogError, ModifierCatalog, ModifierKind};

use axum::http::HeaderName;

use crate::proxychain::ModifierError;

/// Parse a header name supplied as a modifier parameter.
pub(crate) fn header_name(name: &str) -> Result<HeaderName, ModifierError> {
    HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|_| ModifierError::InvalidHeader(name.to_string()))
}

/// `value` as a JavaScript string literal.
pub(crate) fn js_string(value: &str) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| String::from("\"\""))
        .replace("</", "<\\/")
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, HeaderMap, HeaderValue, Method, Response, StatusCode};
    use reqwest::cookie::Jar;
    use url::Url;

    use crate::proxychain::{
        DispatchError, DohResolver, InboundContext, OutboundRequest, ProxyChain, RequestModifier,
        ResponseModifier, UpstreamClient, UpstreamResponse,
    };

    /// Canned upstream response.
    #[derive(Clone)]
    pub struct Upstream {
        status: StatusCode,
        headers: HeaderMap,
        body: String,
    }

    impl Upstream {
        pub fn new(content_type: &str, body: &str) -> Self {
            let mut headers = HeaderMap::new();
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
            Self {
                status: StatusCode::OK,
                headers,
                body: body.to_string(),
            }
        }

        pub fn html(body: &str) -> Self {
            Self::new("text/html; charset=utf-8", body)
        }

        pub fn header(mut self, name: &'static str, value: &str) -> Self {
            self.headers.append(name, HeaderValue::from_str(value).unwrap());
            self
        }

        pub fn status(mut self, status: u16) -> Self {
            self.status = StatusCode::from_u16(status).unwrap();
            self
        }
    }

    #[async_trait]
    impl UpstreamClient for Upstream {
        async fn execute(&self, request: OutboundRequest) -> Result<UpstreamResponse, DispatchError> {
            Ok(UpstreamResponse {
                url: request.url,
                status: self.status,
                headers: self.headers.clone(),
                body: Body::from(self.body.clone()),
            })
        }
        fn cookie_jar(&self) -> Arc<Jar> {
            Arc::new(Jar::default())
        }
        fn set_cookie_jar(&self, _jar: Arc<Jar>) -> Result<(), DispatchError> {
            Ok(())
        }
        fn cookies(&self, _url: &Url) -> Option<String> {
            None
        }
        fn set_cookies(&self, _url: &Url, _cookies: &[String]) {}
        fn proxy(&self) -> Option<Url> {
            None
        }
        fn set_proxy(&self, _proxy: Option<Url>) -> Result<(), DispatchError> {
            Ok(())
        }
        fn follow_redirects(&self) -> bool {
            true
        }
        fn set_follow_redirects(&self, _follow: bool) -> Result<(), DispatchError> {
            Ok(())
        }
        fn close_idle_connections(&self) {}
        fn with_dns_resolver(
            &self,
            _resolver: Arc<DohResolver>,
        ) -> Result<Arc<dyn UpstreamClient>, DispatchError> {
            Ok(Arc::new(self.clone()))
        }
    }

    fn inbound(path: &str, headers: &[(&'static str, &str)]) -> InboundContext {
        let mut map = HeaderMap::new();
        map.insert(header::HOST, HeaderValue::from_static("localhost:8080"));
        for (name, value) in headers {
            map.append(*name, HeaderValue::from_str(value).unwrap());
        }
        InboundContext::new(Method::GET, path.parse().unwrap(), map, Body::empty())
    }

    /// A chain bound to `path` on `localhost:8080`, answering with an empty page.
    pub fn bound_chain(path: &str, headers: &[(&'static str, &str)]) -> ProxyChain {
        let mut chain = ProxyChain::new(Arc::new(Upstream::html("")));
        chain.bind(inbound(path, headers));
        chain
    }

    /// Apply one request modifier directly.
    pub fn run_request(chain: &mut ProxyChain, modifier: &Arc<dyn RequestModifier>) {
        modifier.apply(chain).unwrap();
    }

    /// Execute the chain and return the request as it was dispatched.
    pub async fn run_request_queue(chain: &mut ProxyChain) -> &OutboundRequest {
        chain.execute().await.unwrap();
        chain.request().unwrap()
    }

    /// Run `modifiers` against `upstream` and return the client response.
    pub async fn respond(
        path: &str,
        upstream: Upstream,
        modifiers: Vec<Arc<dyn ResponseModifier>>,
    ) -> Response<Body> {
        let mut chain = ProxyChain::new(Arc::new(upstream));
        chain.set_response_modifiers(modifiers);
        chain.bind(inbound(path, &[]));
        chain.execute().await.unwrap()
    }

    pub async fn body_text(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }
}
