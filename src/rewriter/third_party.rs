//! Disables `<script src>` tags that load from a foreign origin.
//!
//! The `src` attribute is renamed to `blocked`, which keeps the markup intact
//! (and visible in the served page) while the browser never fetches it.
//! Sources that were already rewritten into proxy paths are judged by the
//! target URL they carry, so the strategy gives the same answer whether it
//! runs before or after URL rewriting.

use url::Url;

use super::escape;
use super::url_rewriter::{UrlClass, UrlRewriter};
use super::{Rewrite, Token, TokenRewriter};

#[derive(Debug, Clone)]
pub struct ThirdPartyScriptBlocker {
    urls: UrlRewriter,
}

impl ThirdPartyScriptBlocker {
    pub fn new(target: Url, proxy_origin: impl Into<String>) -> Self {
        Self {
            urls: UrlRewriter::new(target, proxy_origin),
        }
    }

    fn is_third_party(&self, src: &str) -> bool {
        let src = src.trim();
        let absolute = match self.urls.classify(src) {
            UrlClass::Absolute => Url::parse(src).ok(),
            UrlClass::ProtocolRelative => self.urls.base().join(src).ok(),
            UrlClass::AlreadyProxied => self.embedded_target(src),
            _ => None,
        };
        match absolute {
            Some(url) => url.host_str() != self.urls.base().host_str(),
            None => false,
        }
    }

    fn embedded_target(&self, src: &str) -> Option<Url> {
        let origin = self.urls.proxy_origin();
        let path = match src.get(..origin.len()) {
            Some(head) if !origin.is_empty() && head.eq_ignore_ascii_case(origin) => &src[origin.len()..],
            _ => src,
        };
        Url::parse(&escape::unescape(path.strip_prefix('/')?)).ok()
    }
}

impl TokenRewriter for ThirdPartyScriptBlocker {
    fn should_rewrite(&self, token: &Token) -> bool {
        token.name() == "script"
            && token.attr("src").is_some_and(|src| self.is_third_party(src))
    }

    fn rewrite(&self, mut token: Token) -> Rewrite {
        if let Some(index) = token.attrs().iter().position(|a| a.key == "src") {
            tracing::debug!(
                src = %token.attrs()[index].value,
                target = %self.urls.base(),
                "Blocking third-party script"
            );
            token.rename_attr(index, "blocked");
        }
        Rewrite::token(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::rewriter::stream::rewrite_str;

    fn blocker() -> ThirdPartyScriptBlocker {
        ThirdPartyScriptBlocker::new(
            Url::parse("https://news.example.com/story").unwrap(),
            "http://localhost:8080",
        )
    }

    fn script(src: &str) -> Token {
        Token::from_source("script", [("src", src)])
    }

    #[test]
    fn test_foreign_script_is_blocked() {
        let out = rewrite_str(
            "<script async src=\"https://tracker.io/t.js\"></script>",
            vec![Arc::new(blocker())],
        )
        .unwrap();
        assert_eq!(out, "<script async blocked=\"https://tracker.io/t.js\"></script>");
    }

    #[test]
    fn test_protocol_relative_foreign_script_is_blocked() {
        assert!(blocker().should_rewrite(&script("//cdn.tracker.io/t.js")));
    }

    #[test]
    fn test_first_party_and_proxied_scripts_are_kept() {
        let b = blocker();
        assert!(!b.should_rewrite(&script("/app.js")));
        assert!(!b.should_rewrite(&script("https://news.example.com/app.js")));
        assert!(!b.should_rewrite(&script("/https://news.example.com/a.js")));
        assert!(!b.should_rewrite(&Token::from_source("script", [("type", "module")])));
        assert!(!b.should_rewrite(&Token::from_source("img", [("src", "https://tracker.io/p.gif")])));
    }

    #[test]
    fn test_proxied_foreign_script_is_blocked() {
        let b = blocker();
        assert!(b.should_rewrite(&script("/https://tracker.io/t.js")));
        assert!(b.should_rewrite(&script("http://localhost:8080/https://tracker.io/t.js%3Fv=1")));
    }
}
