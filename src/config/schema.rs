//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the ladder proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Proxy identity and chain pool settings.
    pub proxy: ProxySettings,

    /// Upstream client settings.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Modifiers applied to every request.
    pub modifiers: ModifiersConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// How the proxy sees itself.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Public origin of the proxy (e.g., "https://ladder.example.org").
    /// Derived from the `Host` header when unset.
    pub public_url: Option<String>,

    /// Path prefixes stripped before the target URL is extracted.
    pub api_prefixes: Vec<String>,

    /// Log every modifier as it runs.
    pub debug: bool,

    /// Idle chains kept for reuse.
    pub pool_size: usize,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            public_url: None,
            api_prefixes: vec![
                "api/content/".to_string(),
                "api/outline/".to_string(),
                "api/raw/".to_string(),
                "raw/".to_string(),
                "outline/".to_string(),
            ],
            debug: false,
            pool_size: 64,
        }
    }
}

/// Upstream HTTP client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Total time allowed for one upstream request, in seconds.
    pub timeout_secs: u64,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Follow upstream redirects instead of passing them to the client.
    pub follow_redirects: bool,

    /// Redirect hops followed before giving up.
    pub max_redirects: usize,

    /// Optional outbound proxy (http, https or socks5 URL).
    pub proxy_url: Option<String>,

    /// User agent sent when no modifier sets one.
    pub user_agent: Option<String>,

    /// Idle keep-alive connections are closed after this many seconds.
    pub pool_idle_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            connect_timeout_secs: 5,
            follow_redirects: true,
            max_redirects: 10,
            proxy_url: None,
            user_agent: None,
            pool_idle_timeout_secs: 90,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Time allowed to produce the response head, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// One modifier by catalog name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ModifierSpec {
    pub name: String,

    #[serde(default)]
    pub params: Vec<String>,
}

impl ModifierSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            params: Vec::new(),
        }
    }
}

/// Persistent modifier lists.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModifiersConfig {
    pub request: Vec<ModifierSpec>,
    pub response: Vec<ModifierSpec>,
}

impl Default for ModifiersConfig {
    fn default() -> Self {
        Self {
            request: vec![ModifierSpec::new("ForwardRequestHeaders")],
            response: vec![
                ModifierSpec::new("ForwardResponseHeaders"),
                ModifierSpec::new("RewriteHtmlResourceUrls"),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: ProxyConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert!(config.upstream.follow_redirects);
        assert_eq!(config.proxy.pool_size, 64);
        assert_eq!(config.modifiers.response.len(), 2);
    }

    #[test]
    fn test_full_config_parses() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [proxy]
            public_url = "https://ladder.example.org"
            api_prefixes = ["api/raw/"]
            debug = true

            [upstream]
            follow_redirects = false
            proxy_url = "socks5://127.0.0.1:9050"

            [observability]
            log_format = "json"

            [[modifiers.request]]
            name = "SpoofUserAgent"
            params = ["Mozilla/5.0"]

            [[modifiers.request]]
            name = "ForwardRequestHeaders"

            [[modifiers.response]]
            name = "BypassCors"
            "#,
        )
        .unwrap();
        assert_eq!(config.proxy.public_url.as_deref(), Some("https://ladder.example.org"));
        assert!(config.proxy.debug);
        assert!(!config.upstream.follow_redirects);
        assert_eq!(config.upstream.timeout_secs, 15);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.modifiers.request[0].params, vec!["Mozilla/5.0"]);
        assert!(config.modifiers.request[1].params.is_empty());
        assert_eq!(config.modifiers.response, vec![ModifierSpec::new("BypassCors")]);
    }
}
