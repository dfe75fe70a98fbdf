//! Upstream HTTP client.
//!
//! # Responsibilities
//! - Define the capability set the pipeline needs from an upstream client
//! - Provide the default reqwest-backed implementation
//! - Stream request and response bodies without buffering them
//!
//! # Design Decisions
//! - The reqwest client lives in an `ArcSwap`: setters build a new client
//!   and swap it in while in-flight requests finish on the old one
//! - The cookie jar is a store modifiers read and seed explicitly; it is
//!   never attached to reqwest, so upstream `Set-Cookie` headers are not
//!   remembered and outgoing cookies are exactly the request's `Cookie` header
//! - `timeout` bounds dispatch up to response headers, not the body, so a
//!   slow reader can take as long as it needs
//! - One `HttpClient` is shared by every chain; it is `Send + Sync`

use std::sync::{Arc, Mutex};
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Method, StatusCode};
use futures_util::TryStreamExt;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::redirect::Policy;
use url::Url;

use super::doh::DohResolver;
use super::error::DispatchError;
use crate::config::UpstreamConfig;

/// The request the pipeline sends upstream.
#[derive(Debug)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Body,
}

/// Status, headers and streaming body received from upstream.
#[derive(Debug)]
pub struct UpstreamResponse {
    /// Final URL, after any redirects the client followed.
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Body,
}

/// Tunables used to build the reqwest client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub follow_redirects: bool,
    pub max_redirects: usize,
    pub proxy: Option<Url>,
    pub user_agent: Option<String>,
    pub pool_idle_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::from(&UpstreamConfig::default())
    }
}

impl From<&UpstreamConfig> for ClientSettings {
    fn from(config: &UpstreamConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            follow_redirects: config.follow_redirects,
            max_redirects: config.max_redirects,
            proxy: config.proxy_url.as_deref().and_then(|p| Url::parse(p).ok()),
            user_agent: config.user_agent.clone(),
            pool_idle_timeout: Duration::from_secs(config.pool_idle_timeout_secs),
        }
    }
}

/// Capabilities the pipeline needs from an upstream client.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Send the request and return as soon as response headers arrive.
    async fn execute(&self, request: OutboundRequest) -> Result<UpstreamResponse, DispatchError>;

    fn cookie_jar(&self) -> Arc<Jar>;

    fn set_cookie_jar(&self, jar: Arc<Jar>) -> Result<(), DispatchError>;

    /// `Cookie` header value the jar holds for `url`.
    fn cookies(&self, url: &Url) -> Option<String>;

    /// Store `Set-Cookie` strings as if `url` had sent them.
    fn set_cookies(&self, url: &Url, cookies: &[String]);

    fn proxy(&self) -> Option<Url>;

    fn set_proxy(&self, proxy: Option<Url>) -> Result<(), DispatchError>;

    fn follow_redirects(&self) -> bool;

    fn set_follow_redirects(&self, follow: bool) -> Result<(), DispatchError>;

    /// Drop pooled keep-alive connections.
    fn close_idle_connections(&self);

    /// A client with the same settings and cookie jar that resolves
    /// hostnames through `resolver`.
    fn with_dns_resolver(
        &self,
        resolver: Arc<DohResolver>,
    ) -> Result<Arc<dyn UpstreamClient>, DispatchError>;
}

/// Default client backed by reqwest.
pub struct HttpClient {
    inner: ArcSwap<reqwest::Client>,
    settings: Mutex<ClientSettings>,
    jar: ArcSwap<Jar>,
    resolver: Option<Arc<DohResolver>>,
}

impl HttpClient {
    pub fn new(settings: ClientSettings) -> Result<Self, DispatchError> {
        Self::build_with(settings, None)
    }

    /// A client that resolves hostnames through `resolver`.
    pub fn with_resolver(
        settings: ClientSettings,
        resolver: Arc<DohResolver>,
    ) -> Result<Self, DispatchError> {
        Self::build_with(settings, Some(resolver))
    }

    fn build_with(
        settings: ClientSettings,
        resolver: Option<Arc<DohResolver>>,
    ) -> Result<Self, DispatchError> {
        let client = build_client(&settings, resolver.clone())?;
        Ok(Self {
            inner: ArcSwap::from_pointee(client),
            settings: Mutex::new(settings),
            jar: ArcSwap::from_pointee(Jar::default()),
            resolver,
        })
    }

    /// Current settings.
    pub fn settings(&self) -> ClientSettings {
        self.lock_settings().clone()
    }

    /// A fresh client with the same settings but a different resolver.
    pub fn clone_with_resolver(&self, resolver: Arc<DohResolver>) -> Result<Self, DispatchError> {
        let client = Self::with_resolver(self.settings(), resolver)?;
        client.jar.store(self.jar.load_full());
        Ok(client)
    }

    fn lock_settings(&self) -> std::sync::MutexGuard<'_, ClientSettings> {
        self.settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply `edit` to the settings and swap in a rebuilt client.
    fn rebuild(&self, edit: impl FnOnce(&mut ClientSettings)) -> Result<(), DispatchError> {
        let mut settings = self.lock_settings();
        let mut next = settings.clone();
        edit(&mut next);
        let client = build_client(&next, self.resolver.clone())?;
        self.inner.store(Arc::new(client));
        *settings = next;
        Ok(())
    }
}

fn build_client(
    settings: &ClientSettings,
    resolver: Option<Arc<DohResolver>>,
) -> Result<reqwest::Client, DispatchError> {
    let redirect = if settings.follow_redirects {
        Policy::limited(settings.max_redirects)
    } else {
        Policy::none()
    };
    let mut builder = reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout)
        .pool_idle_timeout(settings.pool_idle_timeout)
        .redirect(redirect);
    if let Some(proxy) = &settings.proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy.as_str()).map_err(DispatchError::Build)?);
    }
    if let Some(user_agent) = &settings.user_agent {
        builder = builder.user_agent(user_agent.as_str());
    }
    if let Some(resolver) = resolver {
        builder = builder.dns_resolver(resolver);
    }
    builder.build().map_err(DispatchError::Build)
}

#[async_trait]
impl UpstreamClient for HttpClient {
    async fn execute(&self, request: OutboundRequest) -> Result<UpstreamResponse, DispatchError> {
        let client = self.inner.load_full();
        let timeout = self.lock_settings().timeout;
        let OutboundRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut builder = client.request(method.clone(), url).headers(headers);
        if carries_body(&method) {
            builder = builder.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }
        let response = tokio::time::timeout(timeout, builder.send())
            .await
            .map_err(|_| DispatchError::Timeout(None))??;

        let url = response.url().clone();
        let status = response.status();
        let headers = response.headers().clone();
        let source = url.clone();
        let body = Body::from_stream(response.bytes_stream().inspect_err(move |err| {
            tracing::warn!(target_url = %source, error = %err, "Upstream body failed mid-stream");
        }));
        Ok(UpstreamResponse {
            url,
            status,
            headers,
            body,
        })
    }

    fn cookie_jar(&self) -> Arc<Jar> {
        self.jar.load_full()
    }

    fn set_cookie_jar(&self, jar: Arc<Jar>) -> Result<(), DispatchError> {
        self.jar.store(jar);
        Ok(())
    }

    fn cookies(&self, url: &Url) -> Option<String> {
        self.jar
            .load()
            .cookies(url)
            .and_then(|value| value.to_str().ok().map(str::to_string))
    }

    fn set_cookies(&self, url: &Url, cookies: &[String]) {
        let jar = self.jar.load();
        for cookie in cookies {
            jar.add_cookie_str(cookie, url);
        }
    }

    fn proxy(&self) -> Option<Url> {
        self.lock_settings().proxy.clone()
    }

    fn set_proxy(&self, proxy: Option<Url>) -> Result<(), DispatchError> {
        self.rebuild(|settings| settings.proxy = proxy)
    }

    fn follow_redirects(&self) -> bool {
        self.lock_settings().follow_redirects
    }

    fn set_follow_redirects(&self, follow: bool) -> Result<(), DispatchError> {
        self.rebuild(|settings| settings.follow_redirects = follow)
    }

    fn close_idle_connections(&self) {
        if let Err(err) = self.rebuild(|_| {}) {
            tracing::warn!(error = %err, "Failed to recycle upstream connection pool");
        }
    }

    fn with_dns_resolver(
        &self,
        resolver: Arc<DohResolver>,
    ) -> Result<Arc<dyn UpstreamClient>, DispatchError> {
        Ok(Arc::new(self.clone_with_resolver(resolver)?))
    }
}

/// Methods whose body is forwarded upstream.
pub fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
}
