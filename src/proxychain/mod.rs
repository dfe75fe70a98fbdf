//! Request/response modification pipeline.
//!
//! # Data Flow
//! ```text
//! axum request
//!     → context.rs   (InboundContext: method, uri, headers, peer, body)
//!     → pool.rs      (PooledChain on loan for this request)
//!     → chain.rs     (bind → resolver.rs → modifiers → client.rs → modifiers)
//!     → rewriter::HtmlRewriter over text/html bodies
//!     → axum response, or AbortError (error.rs) as an error response
//! ```

pub mod chain;
pub mod client;
pub mod context;
pub mod doh;
pub mod error;
pub mod modifier;
pub mod pool;
pub mod queue;
pub mod resolver;

pub use chain::{header_value, ChainState, ProxyChain, SUPPORTED_METHODS};
pub use client::{ClientSettings, HttpClient, OutboundRequest, UpstreamClient, UpstreamResponse};
pub use context::InboundContext;
pub use doh::{DohError, DohResolver};
pub use error::{AbortError, ChainError, DispatchError, ModifierError, ResolveError};
pub use modifier::{request_modifier, response_modifier, RequestModifier, ResponseModifier};
pub use pool::{ChainPool, ChainTemplate, PooledChain};
pub use queue::ModifierQueue;
pub use resolver::{ExtractionMode, TargetResolver};
