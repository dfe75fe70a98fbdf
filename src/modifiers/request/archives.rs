//! Fetch a cached copy of the target from a public archive instead.

use std::sync::Arc;

use url::Url;

use super::dns::resolve_with_google_doh;
use crate::modifiers::response::html::inject_script;
use crate::proxychain::{request_modifier, ModifierError, RequestModifier};
use crate::rewriter::ExecTime;

pub const ARCHIVE_IS_URL: &str = "https://archive.is/latest/";
pub const WAYBACK_MACHINE_URL: &str = "https://web.archive.org/web/";
pub const GOOGLE_CACHE_URL: &str = "https://webcache.googleusercontent.com/search?q=cache:";

const ARCHIVE_IS_CLEANUP_JS: &str = r#"[...document.querySelector("body > center").childNodes].filter(e => e.id != "SOLID").forEach(e => e.remove())"#;
const WAYBACK_CLEANUP_JS: &str = r#"["wm-ipp-print", "wm-ipp-base"].forEach(id => { try { document.getElementById(id).remove() } catch { } })"#;

fn parse(candidate: String) -> Result<Url, ModifierError> {
    Url::parse(&candidate).map_err(|source| ModifierError::InvalidUrl {
        url: candidate,
        source,
    })
}

/// `https://archive.is/<digits>/<url>` → `<url>`.
fn unwrap_archived(url: &str, prefix: &str, marker: &str) -> Option<String> {
    let rest = url.strip_prefix(prefix)?;
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let inner = rest[digits..].strip_prefix('/')?.strip_prefix(marker)?;
    (inner.starts_with("http://") || inner.starts_with("https://")).then(|| inner.to_string())
}

/// Request the latest archive.is snapshot of the target.
pub fn request_archive_is() -> Arc<dyn RequestModifier> {
    request_modifier("RequestArchiveIs", |chain| {
        let request = chain.request_mut()?;
        let current = request.url.to_string();
        let inner = unwrap_archived(&current, "https://archive.is/", "")
            .or_else(|| unwrap_archived(&current, "http://archive.is/", ""))
            .unwrap_or(current);
        request.url = parse(format!("{}{}", ARCHIVE_IS_URL, inner))?;

        // archive.is refuses some public resolvers
        chain.add_once_request_modifiers([resolve_with_google_doh()]);
        chain.add_once_response_modifiers([inject_script(
            ARCHIVE_IS_CLEANUP_JS,
            ExecTime::AfterDomContentLoaded,
        )]);
        Ok(())
    })
}

/// Request the Wayback Machine's copy of the target, without its query.
pub fn request_wayback_machine() -> Arc<dyn RequestModifier> {
    request_modifier("RequestWaybackMachine", |chain| {
        let request = chain.request_mut()?;
        request.url.set_query(None);
        let current = request.url.to_string();
        let inner = unwrap_archived(&current, WAYBACK_MACHINE_URL, "*").unwrap_or(current);
        request.url = parse(format!("{}{}", WAYBACK_MACHINE_URL, inner))?;

        chain.add_once_response_modifiers([inject_script(
            WAYBACK_CLEANUP_JS,
            ExecTime::AfterDomContentLoaded,
        )]);
        Ok(())
    })
}

/// Request Google's cached copy of the target.
pub fn request_google_cache() -> Arc<dyn RequestModifier> {
    request_modifier("RequestGoogleCache", |chain| {
        let request = chain.request_mut()?;
        let encoded = urlencoding::encode(request.url.as_str()).into_owned();
        request.url = parse(format!("{}{}", GOOGLE_CACHE_URL, encoded))?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modifiers::test_support::{bound_chain, run_request};

    #[test]
    fn test_unwrap_archived() {
        assert_eq!(
            unwrap_archived("https://archive.is/20200421201055/https://rt.live/", "https://archive.is/", "")
                .as_deref(),
            Some("https://rt.live/")
        );
        assert_eq!(
            unwrap_archived(
                "https://web.archive.org/web/2021/*https://e.com/a",
                WAYBACK_MACHINE_URL,
                "*"
            )
            .as_deref(),
            Some("https://e.com/a")
        );
        assert_eq!(unwrap_archived("https://archive.is/latest/x", "https://archive.is/", ""), None);
    }

    #[test]
    fn test_archive_is_keeps_query() {
        let mut chain = bound_chain("/https://example.com/a?b=1", &[]);
        run_request(&mut chain, &request_archive_is());
        assert_eq!(
            chain.target().unwrap().as_str(),
            "https://archive.is/latest/https://example.com/a?b=1"
        );
    }

    #[test]
    fn test_wayback_drops_query() {
        let mut chain = bound_chain("/https://example.com/a?b=1", &[]);
        run_request(&mut chain, &request_wayback_machine());
        assert_eq!(
            chain.target().unwrap().as_str(),
            "https://web.archive.org/web/https://example.com/a"
        );
    }

    #[test]
    fn test_google_cache_encodes_target() {
        let mut chain = bound_chain("/https://example.com/a?b=1", &[]);
        run_request(&mut chain, &request_google_cache());
        assert_eq!(
            chain.target().unwrap().as_str(),
            "https://webcache.googleusercontent.com/search?q=cache:https%3A%2F%2Fexample.com%2Fa%3Fb%3D1"
        );
    }
}
