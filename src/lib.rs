//! Ladder: a self-hosted rewriting forward proxy.
//!
//! A request for `/<target url>` is resolved to its target, passed through
//! request modifiers, fetched upstream, passed through response modifiers and
//! streamed back with HTML resource URLs rewritten to route through the proxy.

pub mod config;
pub mod http;
pub mod modifiers;
pub mod observability;
pub mod proxychain;
pub mod rewriter;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use modifiers::ModifierCatalog;
pub use proxychain::{ChainPool, ProxyChain};
