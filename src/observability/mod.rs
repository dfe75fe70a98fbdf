//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! proxychain, rewriter, http produce:
//!     → logging.rs (structured tracing events, pretty or JSON)
//!     → metrics.rs (chain outcomes, latency, aborts by stage)
//!
//! Consumers:
//!     → stdout log lines
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Request ID (x-request-id) is attached to the tower-http request span
//! - Aborts are logged once, where they happen

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
