//! The per-request modification pipeline.
//!
//! # Responsibilities
//! - Bind an inbound request and resolve its target URL
//! - Run persistent, then once-only, request modifiers
//! - Dispatch exactly once through the default or a one-shot client
//! - Run persistent, then once-only, response modifiers
//! - Wrap HTML bodies in the streaming rewriter and hand back the response
//!
//! # Data Flow
//! ```text
//! bind(ctx) ── resolve target ──▶ ContextBound
//! execute():
//!     preflight
//!     → request modifiers (persistent, then once queue)   ▶ RequestModified
//!     → client.execute(outbound)                          ▶ Dispatched
//!     → response modifiers (persistent, then once queue)  ▶ ResponseModified
//!     → HtmlRewriter over body (text/html only)
//!     → Response<Body>                                    ▶ Completed
//! any failure ─────────────────────────────────────────── ▶ Aborted
//! ```
//!
//! # Design Decisions
//! - A chain is exclusively owned by one request at a time (`&mut self`)
//! - Once-only queues, the one-shot client and queued token rewriters are
//!   cleared at the end of every `execute`, success or abort
//! - Persistent modifier lists are iterated over a snapshot, so a modifier
//!   that edits the chain's configuration cannot disturb the current run
//! - The outbound request stays readable after dispatch (its body is moved
//!   out), so response modifiers can see the final target URL

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, Response};
use url::Url;

use super::client::{carries_body, OutboundRequest, UpstreamClient, UpstreamResponse};
use super::context::InboundContext;
use super::error::{AbortError, ChainError, ModifierError, ResolveError};
use super::modifier::{RequestModifier, ResponseModifier};
use super::queue::ModifierQueue;
use super::resolver::TargetResolver;
use crate::observability::metrics;
use crate::rewriter::{HtmlRewriter, TokenRewriter};

/// Lifecycle position of a chain within one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainState {
    Idle,
    ContextBound,
    RequestModified,
    Dispatched,
    ResponseModified,
    Completed,
    Aborted,
}

/// Methods the pipeline forwards upstream.
pub const SUPPORTED_METHODS: &[Method] = &[
    Method::GET,
    Method::HEAD,
    Method::OPTIONS,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
];

/// Per-request orchestrator. Not shareable across concurrent requests.
pub struct ProxyChain {
    context: Option<InboundContext>,
    client: Arc<dyn UpstreamClient>,
    once_client: Option<Arc<dyn UpstreamClient>>,
    request: Option<OutboundRequest>,
    response: Option<UpstreamResponse>,
    request_modifiers: Vec<Arc<dyn RequestModifier>>,
    response_modifiers: Vec<Arc<dyn ResponseModifier>>,
    once_request_modifiers: ModifierQueue<dyn RequestModifier>,
    once_response_modifiers: ModifierQueue<dyn ResponseModifier>,
    html_rewriters: Vec<Arc<dyn TokenRewriter>>,
    resolver: TargetResolver,
    debug: bool,
    state: ChainState,
    bind_error: Option<ChainError>,
}

impl ProxyChain {
    pub fn new(client: Arc<dyn UpstreamClient>) -> Self {
        Self {
            context: None,
            client,
            once_client: None,
            request: None,
            response: None,
            request_modifiers: Vec::new(),
            response_modifiers: Vec::new(),
            once_request_modifiers: ModifierQueue::new(),
            once_response_modifiers: ModifierQueue::new(),
            html_rewriters: Vec::new(),
            resolver: TargetResolver::default(),
            debug: false,
            state: ChainState::Idle,
            bind_error: None,
        }
    }

    // --- Configuration ---

    /// Replace the persistent request modifiers.
    pub fn set_request_modifiers(&mut self, modifiers: Vec<Arc<dyn RequestModifier>>) -> &mut Self {
        self.request_modifiers = modifiers;
        self
    }

    /// Append persistent request modifiers.
    pub fn add_request_modifiers(
        &mut self,
        modifiers: impl IntoIterator<Item = Arc<dyn RequestModifier>>,
    ) -> &mut Self {
        self.request_modifiers.extend(modifiers);
        self
    }

    /// Queue request modifiers for the next `execute` only.
    pub fn add_once_request_modifiers(
        &mut self,
        modifiers: impl IntoIterator<Item = Arc<dyn RequestModifier>>,
    ) -> &mut Self {
        self.once_request_modifiers.extend(modifiers);
        self
    }

    /// Replace the persistent response modifiers.
    pub fn set_response_modifiers(
        &mut self,
        modifiers: Vec<Arc<dyn ResponseModifier>>,
    ) -> &mut Self {
        self.response_modifiers = modifiers;
        self
    }

    /// Append persistent response modifiers.
    pub fn add_response_modifiers(
        &mut self,
        modifiers: impl IntoIterator<Item = Arc<dyn ResponseModifier>>,
    ) -> &mut Self {
        self.response_modifiers.extend(modifiers);
        self
    }

    /// Queue response modifiers for the next `execute` only.
    pub fn add_once_response_modifiers(
        &mut self,
        modifiers: impl IntoIterator<Item = Arc<dyn ResponseModifier>>,
    ) -> &mut Self {
        self.once_response_modifiers.extend(modifiers);
        self
    }

    /// Replace the default client used by every `execute`.
    pub fn set_client(&mut self, client: Arc<dyn UpstreamClient>) -> &mut Self {
        self.client = client;
        self
    }

    /// Use `client` for the next dispatch only.
    pub fn set_once_client(&mut self, client: Arc<dyn UpstreamClient>) -> &mut Self {
        self.once_client = Some(client);
        self
    }

    pub fn set_resolver(&mut self, resolver: TargetResolver) -> &mut Self {
        self.resolver = resolver;
        self
    }

    /// Path prefix stripped before the target URL is extracted.
    pub fn set_api_prefix(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.resolver.set_api_prefix(prefix);
        self
    }

    pub fn set_debug(&mut self, debug: bool) -> &mut Self {
        self.debug = debug;
        self
    }

    /// Queue a token rewriter for the HTML pass of this request.
    pub fn add_html_token_rewriter(&mut self, rewriter: Arc<dyn TokenRewriter>) -> &mut Self {
        self.html_rewriters.push(rewriter);
        self
    }

    // --- State accessors for modifiers ---

    pub fn state(&self) -> ChainState {
        self.state
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn context(&self) -> Option<&InboundContext> {
        self.context.as_ref()
    }

    pub fn context_mut(&mut self) -> Option<&mut InboundContext> {
        self.context.as_mut()
    }

    pub fn client(&self) -> &Arc<dyn UpstreamClient> {
        &self.client
    }

    pub fn request(&self) -> Option<&OutboundRequest> {
        self.request.as_ref()
    }

    pub fn request_mut(&mut self) -> Result<&mut OutboundRequest, ModifierError> {
        self.request.as_mut().ok_or(ModifierError::NoRequest)
    }

    /// Target URL of the outbound request.
    pub fn target(&self) -> Option<&Url> {
        self.request.as_ref().map(|r| &r.url)
    }

    /// URL the response came from: the last redirect hop, else the target.
    pub fn document_url(&self) -> Option<&Url> {
        self.response.as_ref().map(|r| &r.url).or_else(|| self.target())
    }

    pub fn response(&self) -> Option<&UpstreamResponse> {
        self.response.as_ref()
    }

    pub fn response_mut(&mut self) -> Result<&mut UpstreamResponse, ModifierError> {
        self.response.as_mut().ok_or(ModifierError::NoResponse)
    }

    /// Scheme and host the client used to reach the proxy.
    pub fn proxy_origin(&self) -> String {
        self.context
            .as_ref()
            .map(InboundContext::proxy_origin)
            .unwrap_or_default()
    }

    /// Apply `edit` to the upstream response headers and to the headers that
    /// will be sent to the client.
    pub fn edit_response_headers(&mut self, edit: impl Fn(&mut HeaderMap)) {
        if let Some(response) = self.response.as_mut() {
            edit(&mut response.headers);
        }
        if let Some(ctx) = self.context.as_mut() {
            edit(ctx.response_headers_mut());
        }
    }

    /// True when the upstream response is an HTML document.
    pub fn is_html_response(&self) -> bool {
        self.response
            .as_ref()
            .and_then(|r| r.headers.get(header::CONTENT_TYPE))
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("text/html"))
    }

    // --- Lifecycle ---

    /// Attach an inbound request and resolve its target.
    ///
    /// A resolution failure aborts the chain; the next `execute` returns it.
    pub fn bind(&mut self, mut ctx: InboundContext) -> &mut Self {
        self.state = ChainState::ContextBound;
        self.bind_error = None;
        match self.prepare_request(&mut ctx) {
            Ok(request) => {
                if self.debug {
                    tracing::debug!(target_url = %request.url, method = %request.method, "Target resolved");
                }
                self.request = Some(request);
            }
            Err(err) => {
                self.state = ChainState::Aborted;
                tracing::warn!(
                    path = %ctx.uri(),
                    stage = err.stage(),
                    error = %err,
                    "Proxy chain aborted"
                );
                metrics::record_abort(err.stage());
                self.bind_error = Some(err);
            }
        }
        self.context = Some(ctx);
        self
    }

    fn prepare_request(&self, ctx: &mut InboundContext) -> Result<OutboundRequest, ChainError> {
        let method = ctx.method().clone();
        if !SUPPORTED_METHODS.contains(&method) {
            return Err(ResolveError::UnsupportedMethod(method.to_string()).into());
        }
        let url = self.resolver.resolve(ctx)?;
        let body = if carries_body(&method) {
            ctx.take_body().unwrap_or_else(Body::empty)
        } else {
            Body::empty()
        };
        Ok(OutboundRequest {
            method,
            url,
            headers: HeaderMap::new(),
            body,
        })
    }

    /// Run the pipeline once and produce the client response.
    pub async fn execute(&mut self) -> Result<Response<Body>, AbortError> {
        let started = Instant::now();

        if let Some(cause) = self.bind_error.take() {
            self.clear_once_state();
            metrics::record_chain("aborted", started);
            return Err(AbortError {
                target: None,
                cause,
            });
        }

        let result = self.run().await;
        self.clear_once_state();

        match result {
            Ok(response) => {
                self.state = ChainState::Completed;
                metrics::record_chain("completed", started);
                Ok(response)
            }
            Err(cause) => {
                self.state = ChainState::Aborted;
                let target = self.target().map(Url::to_string);
                tracing::warn!(
                    target_url = target.as_deref().unwrap_or("-"),
                    stage = cause.stage(),
                    error = %cause,
                    "Proxy chain aborted"
                );
                metrics::record_abort(cause.stage());
                metrics::record_chain("aborted", started);
                Err(AbortError { target, cause })
            }
        }
    }

    async fn run(&mut self) -> Result<Response<Body>, ChainError> {
        self.preflight()?;

        let persistent = self.request_modifiers.clone();
        for modifier in &persistent {
            self.apply_request_modifier(modifier.as_ref())?;
        }
        while let Some(modifier) = self.once_request_modifiers.pop() {
            self.apply_request_modifier(modifier.as_ref())?;
        }
        self.state = ChainState::RequestModified;

        let outbound = self.take_outbound()?;
        let client = self.once_client.take().unwrap_or_else(|| self.client.clone());
        if self.debug {
            tracing::debug!(target_url = %outbound.url, method = %outbound.method, "Dispatching upstream");
        }
        let response = client.execute(outbound).await?;
        tracing::debug!(status = %response.status, "Upstream responded");
        self.response = Some(response);
        self.state = ChainState::Dispatched;

        let persistent = self.response_modifiers.clone();
        for modifier in &persistent {
            self.apply_response_modifier(modifier.as_ref())?;
        }
        while let Some(modifier) = self.once_response_modifiers.pop() {
            self.apply_response_modifier(modifier.as_ref())?;
        }
        self.state = ChainState::ResponseModified;

        self.finish_response()
    }

    fn preflight(&self) -> Result<(), ChainError> {
        if self.context.is_none() {
            return Err(ChainError::NoContext);
        }
        let request = self.request.as_ref().ok_or(ChainError::NotInitialized)?;
        if !matches!(request.url.scheme(), "http" | "https") || !request.url.has_host() {
            return Err(ChainError::MissingScheme(request.url.to_string()));
        }
        Ok(())
    }

    fn apply_request_modifier(&mut self, modifier: &dyn RequestModifier) -> Result<(), ChainError> {
        if self.debug {
            tracing::debug!(modifier = modifier.name(), "Applying request modifier");
        }
        modifier
            .apply(self)
            .map_err(|source| ChainError::RequestModifier {
                name: modifier.name().to_string(),
                source,
            })
    }

    fn apply_response_modifier(&mut self, modifier: &dyn ResponseModifier) -> Result<(), ChainError> {
        if self.debug {
            tracing::debug!(modifier = modifier.name(), "Applying response modifier");
        }
        modifier
            .apply(self)
            .map_err(|source| ChainError::ResponseModifier {
                name: modifier.name().to_string(),
                source,
            })
    }

    /// Move the body out for dispatch, leaving method, URL and headers.
    fn take_outbound(&mut self) -> Result<OutboundRequest, ChainError> {
        let request = self.request.as_mut().ok_or(ChainError::NotInitialized)?;
        Ok(OutboundRequest {
            method: request.method.clone(),
            url: request.url.clone(),
            headers: request.headers.clone(),
            body: std::mem::take(&mut request.body),
        })
    }

    fn finish_response(&mut self) -> Result<Response<Body>, ChainError> {
        let is_html = self.is_html_response();
        let upstream = self.response.take().ok_or(ChainError::NotInitialized)?;
        let ctx = self.context.as_mut().ok_or(ChainError::NoContext)?;
        let mut headers = std::mem::take(ctx.response_headers_mut());

        if !headers.contains_key(header::CONTENT_TYPE) {
            if let Some(content_type) = upstream.headers.get(header::CONTENT_TYPE) {
                headers.insert(header::CONTENT_TYPE, content_type.clone());
            }
        }

        let rewriters = std::mem::take(&mut self.html_rewriters);
        let body = if is_html && !rewriters.is_empty() {
            headers.remove(header::CONTENT_LENGTH);
            Body::from_stream(HtmlRewriter::new(upstream.body.into_data_stream(), rewriters))
        } else {
            upstream.body
        };

        let mut response = Response::new(body);
        *response.status_mut() = upstream.status;
        *response.headers_mut() = headers;
        Ok(response)
    }

    fn clear_once_state(&mut self) {
        self.once_request_modifiers.clear();
        self.once_response_modifiers.clear();
        self.once_client = None;
        self.html_rewriters.clear();
    }

    /// Clear per-request state, keeping persistent modifiers and the client.
    pub fn reset(&mut self) {
        self.context = None;
        self.request = None;
        self.response = None;
        self.bind_error = None;
        self.clear_once_state();
        self.state = ChainState::Idle;
    }
}

/// Header value from a string, as a modifier error on failure.
pub fn header_value(value: &str) -> Result<HeaderValue, ModifierError> {
    HeaderValue::from_str(value).map_err(|_| ModifierError::InvalidHeader(value.to_string()))
}
