//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the default upstream client and the chain pool from config
//! - Create the Axum Router (`/` and `/{*path}`, any method)
//! - Wire up middleware (request ID, tracing, timeout)
//! - Hand every request to a pooled `ProxyChain`
//! - Graceful shutdown on Ctrl+C

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{ModifiersConfig, ProxyConfig};
use crate::http::request::{make_request_span, propagate_request_id_layer, set_request_id_layer};
use crate::modifiers::{CatalogError, ModifierCatalog};
use crate::proxychain::{
    ChainPool, ChainTemplate, ClientSettings, DispatchError, HttpClient, InboundContext,
    RequestModifier, ResponseModifier, TargetResolver,
};

/// Failures while assembling the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to build upstream client: {0}")]
    Client(#[from] DispatchError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<ChainPool>,
    pub public_url: Option<String>,
}

/// HTTP server for the ladder proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    pool: Arc<ChainPool>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig, catalog: &ModifierCatalog) -> Result<Self, ServerError> {
        let client = Arc::new(HttpClient::new(ClientSettings::from(&config.upstream))?);

        let (request_modifiers, response_modifiers) = build_modifiers(&config.modifiers, catalog)?;
        let mut template = ChainTemplate::new(client);
        template.request_modifiers = request_modifiers;
        template.response_modifiers = response_modifiers;
        template.resolver = TargetResolver::new("", config.proxy.api_prefixes.clone());
        template.debug = config.proxy.debug;

        let pool = ChainPool::new(template, config.proxy.pool_size);
        let state = AppState {
            pool: pool.clone(),
            public_url: config.proxy.public_url.clone(),
        };

        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            config,
            pool,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        config.timeouts.request_secs,
                    )))
                    .layer(propagate_request_id_layer()),
            )
    }

    /// The router, for serving on a custom transport or in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            pool_size = self.config.proxy.pool_size,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!(idle_chains = self.pool.idle(), "HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

type ModifierLists = (
    Vec<Arc<dyn RequestModifier>>,
    Vec<Arc<dyn ResponseModifier>>,
);

/// Instantiate the configured persistent modifiers from the catalog.
pub fn build_modifiers(
    config: &ModifiersConfig,
    catalog: &ModifierCatalog,
) -> Result<ModifierLists, CatalogError> {
    let request = config
        .request
        .iter()
        .map(|spec| catalog.build_request(&spec.name, &spec.params))
        .collect::<Result<Vec<_>, _>>()?;
    let response = config
        .response
        .iter()
        .map(|spec| catalog.build_response(&spec.name, &spec.params))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((request, response))
}

/// Main proxy handler.
/// Binds the request to a pooled chain and streams back its result.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let mut ctx = InboundContext::from_request(request);
    if let Some(origin) = &state.public_url {
        ctx = ctx.with_proxy_origin(origin.clone());
    }

    let mut chain = state.pool.acquire();
    match chain.bind(ctx).execute().await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
