//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that every configured modifier exists with the right parameters
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use url::Url;

use crate::config::schema::{ModifierSpec, ProxyConfig};
use crate::modifiers::{CatalogError, ModifierCatalog, ModifierKind};

/// Upper bound on `upstream.max_redirects`.
pub const MAX_REDIRECTS_LIMIT: usize = 50;

/// One semantic problem, keyed by the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check `config` against value ranges and the modifier `catalog`.
pub fn validate_config(
    config: &ProxyConfig,
    catalog: &ModifierCatalog,
) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if let Some(public_url) = &config.proxy.public_url {
        match Url::parse(public_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
            _ => errors.push(ValidationError::new(
                "proxy.public_url",
                format!("'{}' is not an absolute http(s) URL", public_url),
            )),
        }
    }
    if config.proxy.pool_size == 0 {
        errors.push(ValidationError::new("proxy.pool_size", "must be greater than 0"));
    }

    let upstream = &config.upstream;
    if upstream.timeout_secs == 0 {
        errors.push(ValidationError::new("upstream.timeout_secs", "must be greater than 0"));
    }
    if upstream.connect_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "upstream.connect_timeout_secs",
            "must be greater than 0",
        ));
    }
    if upstream.max_redirects > MAX_REDIRECTS_LIMIT {
        errors.push(ValidationError::new(
            "upstream.max_redirects",
            format!("must be at most {}", MAX_REDIRECTS_LIMIT),
        ));
    }
    if let Some(proxy_url) = &upstream.proxy_url {
        if Url::parse(proxy_url).is_err() {
            errors.push(ValidationError::new(
                "upstream.proxy_url",
                format!("'{}' is not a URL", proxy_url),
            ));
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    check_modifiers(&config.modifiers.request, ModifierKind::Request, catalog, &mut errors);
    check_modifiers(&config.modifiers.response, ModifierKind::Response, catalog, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_modifiers(
    specs: &[ModifierSpec],
    kind: ModifierKind,
    catalog: &ModifierCatalog,
    errors: &mut Vec<ValidationError>,
) {
    for (index, spec) in specs.iter().enumerate() {
        let result: Result<(), CatalogError> = match kind {
            ModifierKind::Request => catalog.build_request(&spec.name, &spec.params).map(|_| ()),
            ModifierKind::Response => catalog.build_response(&spec.name, &spec.params).map(|_| ()),
        };
        if let Err(err) = result {
            errors.push(ValidationError::new(
                format!("modifiers.{}[{}]", kind, index),
                err.to_string(),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let catalog = ModifierCatalog::builtin();
        assert!(validate_config(&ProxyConfig::default(), &catalog).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let catalog = ModifierCatalog::builtin();
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "nope".into();
        config.proxy.public_url = Some("ftp://files.example".into());
        config.upstream.max_redirects = 99;
        config.timeouts.request_secs = 0;
        config.modifiers.request.push(ModifierSpec::new("NoSuchModifier"));
        config.modifiers.response.push(ModifierSpec {
            name: "SetResponseHeader".into(),
            params: vec!["x-only".into()],
        });

        let errors = validate_config(&config, &catalog).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "proxy.public_url",
                "upstream.max_redirects",
                "timeouts.request_secs",
                "modifiers.request[1]",
                "modifiers.response[2]",
            ]
        );
        assert!(errors[4].message.contains("unknown request modifier 'NoSuchModifier'"));
    }

    #[test]
    fn test_metrics_address_checked_only_when_enabled() {
        let catalog = ModifierCatalog::builtin();
        let mut config = ProxyConfig::default();
        config.observability.metrics_address = "bad".into();
        assert!(validate_config(&config, &catalog).is_ok());
        config.observability.metrics_enabled = true;
        assert!(validate_config(&config, &catalog).is_err());
    }
}
