//! Streaming HTML rewriting subsystem.
//!
//! # Data Flow
//! ```text
//! upstream body chunks
//!     → stream.rs (lol_html parser; runs every attached TokenRewriter on
//!       each opening tag)
//!         → url_rewriter.rs     (resource URLs → proxy paths)
//!         → script_injector.rs  (<script> appended after <head>)
//!         → third_party.rs      (foreign <script src> disabled)
//!     → token.rs (attribute edits replayed on the element)
//!     → client body stream
//! ```
//!
//! # Design Decisions
//! - Strategies receive the token by value and hand back the edited token
//!   together with text to write before and after it
//! - Strategies are immutable after construction and shared across requests
//! - Text, comments and closing tags are never touched

pub mod escape;
pub mod script_injector;
pub mod stream;
pub mod third_party;
pub mod token;
pub mod url_rewriter;

pub use script_injector::{ExecTime, ScriptInjector};
pub use stream::{rewrite_str, HtmlRewriter, RewriteError};
pub use third_party::ThirdPartyScriptBlocker;
pub use token::{Attribute, Token};
pub use url_rewriter::{UrlClass, UrlRewriter};

/// Output of a strategy for one token.
#[derive(Debug, Clone)]
pub struct Rewrite {
    /// The (possibly edited) token.
    pub token: Token,
    /// Written immediately before the token.
    pub prepend: String,
    /// Written immediately after the token.
    pub append: String,
}

impl Rewrite {
    /// Pass the token on with nothing around it.
    pub fn token(token: Token) -> Self {
        Self {
            token,
            prepend: String::new(),
            append: String::new(),
        }
    }

    /// Pass the token on followed by `append`.
    pub fn append(token: Token, append: impl Into<String>) -> Self {
        Self {
            token,
            prepend: String::new(),
            append: append.into(),
        }
    }
}

/// A per-tag rewrite strategy.
pub trait TokenRewriter: Send + Sync {
    /// Whether `rewrite` should be called for this opening tag.
    fn should_rewrite(&self, token: &Token) -> bool;

    /// Transform the token.
    fn rewrite(&self, token: Token) -> Rewrite;
}
