//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, modifier names against the catalog)
//!     → ProxyConfig (validated, immutable)
//!     → HttpServer builds the client, chain template and pool from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    ListenerConfig, LogFormat, ModifierSpec, ModifiersConfig, ObservabilityConfig, ProxyConfig,
    ProxySettings, TimeoutConfig, UpstreamConfig,
};
pub use validation::{validate_config, ValidationError};
