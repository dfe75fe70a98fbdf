//! Pipeline error taxonomy.
//!
//! # Design Decisions
//! - Each stage has its own error enum; `ChainError` aggregates them and
//!   knows which stage failed and which status code the caller sees
//! - `AbortError` is what `execute` returns: the cause plus the resolved
//!   target when one was known

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Target URL could not be derived from the inbound request.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("malformed target url '{url}': {source}")]
    MalformedUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported target scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("cannot resolve relative path '{path}': {reason}")]
    UnresolvableRelativeUrl { path: String, reason: &'static str },

    #[error("unsupported method {0}")]
    UnsupportedMethod(String),

    #[error("no target url in request")]
    MissingTarget,

    #[error("target url keeps pointing back at the proxy")]
    RecursiveTarget,
}

/// A modifier could not apply its change.
#[derive(Debug, Error)]
pub enum ModifierError {
    #[error("no inbound request is bound")]
    NoContext,

    #[error("outbound request is not initialized")]
    NoRequest,

    #[error("upstream response is not available yet")]
    NoResponse,

    #[error("invalid header '{0}'")]
    InvalidHeader(String),

    #[error("invalid regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error(transparent)]
    Client(#[from] DispatchError),

    #[error("{0}")]
    Other(String),
}

/// Upstream request failed or the client could not be built.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to connect upstream: {0}")]
    Connect(#[source] reqwest::Error),

    /// No response headers within the dispatch timeout.
    #[error("upstream request timed out")]
    Timeout(#[source] Option<reqwest::Error>),

    #[error("failed to build upstream client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("upstream request failed: {0}")]
    Other(#[source] reqwest::Error),
}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DispatchError::Timeout(Some(err))
        } else if err.is_connect() {
            DispatchError::Connect(err)
        } else if err.is_builder() {
            DispatchError::Build(err)
        } else {
            DispatchError::Other(err)
        }
    }
}

/// Everything that can abort a pipeline run.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("no inbound request bound to the chain")]
    NoContext,

    #[error("outbound request not initialized")]
    NotInitialized,

    #[error("outbound url '{0}' has no usable scheme and host")]
    MissingScheme(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("request modifier '{name}' failed: {source}")]
    RequestModifier {
        name: String,
        #[source]
        source: ModifierError,
    },

    #[error("response modifier '{name}' failed: {source}")]
    ResponseModifier {
        name: String,
        #[source]
        source: ModifierError,
    },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl ChainError {
    /// Status code reported to the inbound caller.
    pub fn status(&self) -> StatusCode {
        match self {
            ChainError::Resolve(ResolveError::UnsupportedMethod(_)) => {
                StatusCode::METHOD_NOT_ALLOWED
            }
            ChainError::Resolve(_) => StatusCode::BAD_REQUEST,
            ChainError::Dispatch(DispatchError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ChainError::Dispatch(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Metric label for the stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            ChainError::NoContext | ChainError::NotInitialized | ChainError::MissingScheme(_) => {
                "configuration"
            }
            ChainError::Resolve(_) => "resolve",
            ChainError::RequestModifier { .. } => "request_modifier",
            ChainError::ResponseModifier { .. } => "response_modifier",
            ChainError::Dispatch(_) => "dispatch",
        }
    }
}

/// Terminal error of one `execute` call.
#[derive(Debug)]
pub struct AbortError {
    pub target: Option<String>,
    pub cause: ChainError,
}

impl std::error::Error for AbortError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

impl std::fmt::Display for AbortError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.target {
            Some(target) => write!(f, "proxy chain error for '{}': {}", target, self.cause),
            None => write!(f, "proxy chain error: {}", self.cause),
        }
    }
}

impl AbortError {
    pub fn status(&self) -> StatusCode {
        self.cause.status()
    }
}

impl IntoResponse for AbortError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
