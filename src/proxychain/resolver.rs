//! Target URL resolution.
//!
//! # Responsibilities
//! - Decide whether the target is encoded in the path or in the subdomain
//! - Path mode: strip routing prefixes and self references, decode, parse
//! - Relative paths: rebuild the target from a previously proxied `Referer`
//! - Subdomain mode: reverse the `example--site-com` host encoding
//!
//! # Data Flow
//! ```text
//! /https://example.com/a?b=1          → https://example.com/a?b=1   (path)
//! /api/content/https://example.com/a  → https://example.com/a       (path, prefix)
//! /img/x.png + Referer /https://e.com → https://e.com/img/x.png     (referer)
//! example-com.proxy.io/a              → https://example.com/a       (subdomain)
//! ```
//!
//! # Design Decisions
//! - The raw path is percent-decoded exactly once
//! - Self-reference stripping compares case-insensitively, also matches the
//!   percent-encoded origin, and gives up after `MAX_SELF_STRIPS` rounds
//! - IP-literal hosts and the proxy's own host never use subdomain mode

use std::net::IpAddr;

use url::Url;

use super::context::InboundContext;
use super::error::ResolveError;
use crate::rewriter::escape;

/// Upper bound on self-reference strip rounds.
pub const MAX_SELF_STRIPS: usize = 16;

const SUBDOMAIN_SENTINEL: char = '\u{0}';

/// How the target is encoded in the inbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMode {
    Path,
    Subdomain,
}

/// Resolver configuration shared by all requests of a chain.
#[derive(Debug, Clone, Default)]
pub struct TargetResolver {
    api_prefix: String,
    known_prefixes: Vec<String>,
}

impl TargetResolver {
    /// `api_prefix` is stripped from the path before extraction.
    /// `known_prefixes` force path mode and are stripped the same way.
    pub fn new(api_prefix: impl Into<String>, known_prefixes: Vec<String>) -> Self {
        let normalize = |p: String| p.trim_start_matches('/').to_string();
        Self {
            api_prefix: normalize(api_prefix.into()),
            known_prefixes: known_prefixes
                .into_iter()
                .map(normalize)
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn api_prefix(&self) -> &str {
        &self.api_prefix
    }

    pub fn set_api_prefix(&mut self, prefix: impl Into<String>) {
        self.api_prefix = prefix.into().trim_start_matches('/').to_string();
    }

    /// Resolve the absolute target URL of `ctx`.
    pub fn resolve(&self, ctx: &InboundContext) -> Result<Url, ResolveError> {
        match self.mode(ctx) {
            ExtractionMode::Path => self.resolve_path(ctx),
            ExtractionMode::Subdomain => resolve_subdomain(ctx),
        }
    }

    /// Pick the extraction mode for `ctx`.
    pub fn mode(&self, ctx: &InboundContext) -> ExtractionMode {
        let Some(host) = ctx.host_name() else {
            return ExtractionMode::Path;
        };
        let rest = ctx.path_remainder();
        let under_prefix = (!self.api_prefix.is_empty() && rest.starts_with(&self.api_prefix))
            || self.known_prefixes.iter().any(|p| rest.starts_with(p.as_str()));
        if is_loopback_host(&host) || looks_scheme_like(rest) || under_prefix {
            return ExtractionMode::Path;
        }
        if host.parse::<IpAddr>().is_ok() || is_proxy_host(ctx, &host) {
            return ExtractionMode::Path;
        }
        if host.split('.').count() >= 3 {
            ExtractionMode::Subdomain
        } else {
            ExtractionMode::Path
        }
    }

    fn resolve_path(&self, ctx: &InboundContext) -> Result<Url, ResolveError> {
        let raw = strip_slash_artifact(self.strip_prefix(ctx.path_remainder()));
        let decoded = repair_scheme_separator(&escape::unescape(raw));
        let target = strip_self_references(&decoded, &ctx.proxy_origin())?;
        if target.is_empty() {
            return Err(ResolveError::MissingTarget);
        }

        match Url::parse(&target) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Ok(url),
            Ok(url) => Err(ResolveError::UnsupportedScheme(url.scheme().to_string())),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                reconstruct_from_referer(ctx.referer(), &target)
            }
            Err(source) => Err(ResolveError::MalformedUrl {
                url: target,
                source,
            }),
        }
    }
}

impl TargetResolver {
    /// Drop the API prefix, or else the longest matching known prefix.
    fn strip_prefix<'a>(&self, raw: &'a str) -> &'a str {
        if !self.api_prefix.is_empty() {
            if let Some(rest) = raw.strip_prefix(self.api_prefix.as_str()) {
                return rest;
            }
        }
        self.known_prefixes
            .iter()
            .filter_map(|p| raw.strip_prefix(p.as_str()))
            .min_by_key(|rest| rest.len())
            .unwrap_or(raw)
    }
}

fn is_loopback_host(host: &str) -> bool {
    host == "localhost"
        || host.ends_with(".localhost")
        || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

/// Host of an explicitly configured proxy origin matches `host`.
fn is_proxy_host(ctx: &InboundContext, host: &str) -> bool {
    ctx.configured_proxy_origin()
        .and_then(|origin| Url::parse(origin).ok())
        .and_then(|origin| origin.host_str().map(str::to_ascii_lowercase))
        .is_some_and(|origin_host| origin_host == host)
}

/// `http:`, `https:`, `http%3A` at the start of the path.
fn looks_scheme_like(rest: &str) -> bool {
    let lower = rest.get(..8).unwrap_or(rest).to_ascii_lowercase();
    ["http:", "https:", "http%3a", "https%3a"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
}

/// Drop one leading `/` or `%2F` left over from routing.
fn strip_slash_artifact(raw: &str) -> &str {
    if let Some(rest) = raw.strip_prefix('/') {
        return rest;
    }
    match raw.get(..3) {
        Some(head) if head.eq_ignore_ascii_case("%2f") => &raw[3..],
        _ => raw,
    }
}

/// Turn `https:/host` (a collapsed `//`) back into `https://host`.
fn repair_scheme_separator(value: &str) -> String {
    for scheme in ["https:/", "http:/"] {
        if let Some(head) = value.get(..scheme.len()) {
            if head.eq_ignore_ascii_case(scheme) && !value[scheme.len()..].starts_with('/') {
                return format!("{}/{}", &value[..scheme.len()], &value[scheme.len()..]);
            }
        }
    }
    value.to_string()
}

/// Remove leading restatements of the proxy origin.
fn strip_self_references(value: &str, proxy_origin: &str) -> Result<String, ResolveError> {
    let origin = proxy_origin.trim_end_matches('/');
    if origin.is_empty() {
        return Ok(value.to_string());
    }
    let encoded = urlencoding::encode(origin).into_owned();
    let prefixes = [origin, encoded.as_str()];
    let strip = |value: &str| -> Option<String> {
        prefixes
            .iter()
            .find_map(|prefix| strip_origin_prefix(value, prefix))
            .map(|rest| repair_scheme_separator(&escape::unescape(rest)))
    };

    let mut current = value.to_string();
    for _ in 0..MAX_SELF_STRIPS {
        match strip(&current) {
            Some(rest) => current = rest,
            None => return Ok(current),
        }
    }
    match strip(&current) {
        Some(_) => Err(ResolveError::RecursiveTarget),
        None => Ok(current),
    }
}

fn strip_origin_prefix<'a>(value: &'a str, origin: &str) -> Option<&'a str> {
    let head = value.get(..origin.len())?;
    if !head.eq_ignore_ascii_case(origin) {
        return None;
    }
    let rest = &value[origin.len()..];
    if rest.is_empty() {
        return Some(rest);
    }
    if let Some(rest) = rest.strip_prefix('/') {
        return Some(rest);
    }
    match rest.get(..3) {
        Some(sep) if sep.eq_ignore_ascii_case("%2f") => Some(&rest[3..]),
        _ => None,
    }
}

/// Rebuild an absolute target from a relative path and the proxied page in
/// `Referer`.
pub fn reconstruct_from_referer(referer: Option<&str>, relative: &str) -> Result<Url, ResolveError> {
    let unresolvable = |reason| ResolveError::UnresolvableRelativeUrl {
        path: relative.to_string(),
        reason,
    };
    let referer = referer.ok_or_else(|| unresolvable("no referer header"))?;
    let referer = Url::parse(referer).map_err(|_| unresolvable("referer is not a url"))?;
    let embedded = referer.path().trim_start_matches('/');
    let embedded = repair_scheme_separator(&escape::unescape(embedded));
    let page = Url::parse(&embedded)
        .ok()
        .filter(|page| matches!(page.scheme(), "http" | "https") && page.has_host())
        .ok_or_else(|| unresolvable("referer is not a proxied page"))?;

    let joined = format!("/{}", relative.trim_start_matches('/'));
    page.join(&joined).map_err(|source| ResolveError::MalformedUrl {
        url: joined,
        source,
    })
}

fn resolve_subdomain(ctx: &InboundContext) -> Result<Url, ResolveError> {
    let host = ctx.host_name().ok_or(ResolveError::MissingTarget)?;
    let labels: Vec<&str> = host.split('.').collect();
    let encoded = labels[..labels.len().saturating_sub(2)].join(".");
    let domain = decode_subdomain(&encoded);
    let path = ctx.uri().path_and_query().map_or("/", |pq| pq.as_str());
    let target = format!("https://{}{}", domain, path);
    Url::parse(&target).map_err(|source| ResolveError::MalformedUrl {
        url: target,
        source,
    })
}

/// `example-com` → `example.com`, `my--site-org` → `my-site.org`.
pub fn decode_subdomain(encoded: &str) -> String {
    encoded
        .replace("--", &SUBDOMAIN_SENTINEL.to_string())
        .replace('-', ".")
        .replace(SUBDOMAIN_SENTINEL, "-")
}

/// Inverse of [`decode_subdomain`].
pub fn encode_subdomain(domain: &str) -> String {
    domain.replace('-', "--").replace('.', "-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, HeaderMap, HeaderValue, Method};

    fn ctx(host: &str, uri: &str, referer: Option<&str>) -> InboundContext {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_str(host).unwrap());
        if let Some(r) = referer {
            headers.insert(header::REFERER, HeaderValue::from_str(r).unwrap());
        }
        InboundContext::new(Method::GET, uri.parse().unwrap(), headers, Body::empty())
    }

    fn resolve(host: &str, uri: &str, referer: Option<&str>) -> Result<Url, ResolveError> {
        TargetResolver::default().resolve(&ctx(host, uri, referer))
    }

    #[test]
    fn test_path_mode_preserves_scheme_host_path_query() {
        let cases = [
            ("https", "example.com", "/a/b.html", "x=1&y=2"),
            ("http", "news.example.org", "/", "q=rust"),
            ("https", "sub.domain.example.co.uk", "/deep/path/", "a=%20b"),
        ];
        for (scheme, host, path, query) in cases {
            let uri = format!("/{}://{}{}?{}", scheme, host, path, query);
            let url = resolve("localhost:8080", &uri, None).unwrap();
            assert_eq!(url.scheme(), scheme);
            assert_eq!(url.host_str(), Some(host));
            assert_eq!(url.path(), path);
            assert_eq!(url.query(), Some(query));
        }
    }

    #[test]
    fn test_recursive_origin_is_stripped() {
        let url = resolve(
            "localhost:8080",
            "/http://localhost:8080/http://localhost:8080/https://example.com",
            None,
        )
        .unwrap();
        assert_eq!(url.as_str(), "https://example.com/");
    }

    #[test]
    fn test_recursive_origin_case_and_encoding_variants() {
        let url = resolve(
            "localhost:8080",
            "/HTTP://LocalHost:8080/http%253A%252F%252Flocalhost%253A8080%252Fhttps://example.com/x",
            None,
        )
        .unwrap();
        assert_eq!(url.as_str(), "https://example.com/x");
    }

    #[test]
    fn test_self_strip_is_bounded() {
        let mut path = String::new();
        for _ in 0..(MAX_SELF_STRIPS + 2) {
            path.push_str("/http://localhost:8080");
        }
        path.push_str("/https://example.com");
        assert!(matches!(
            resolve("localhost:8080", &path, None),
            Err(ResolveError::RecursiveTarget)
        ));
    }

    #[test]
    fn test_only_origin_is_missing_target() {
        assert!(matches!(
            resolve("localhost:8080", "/http://localhost:8080/", None),
            Err(ResolveError::MissingTarget)
        ));
    }

    #[test]
    fn test_relative_path_uses_referer() {
        let url = resolve(
            "localhost:8080",
            "/images/logo.png?v=3",
            Some("http://localhost:8080/https://example.com/section/"),
        )
        .unwrap();
        assert_eq!(url.as_str(), "https://example.com/images/logo.png?v=3");
    }

    #[test]
    fn test_relative_path_without_usable_referer_fails() {
        assert!(matches!(
            resolve("localhost:8080", "/images/logo.png", None),
            Err(ResolveError::UnresolvableRelativeUrl { .. })
        ));
        assert!(matches!(
            resolve(
                "localhost:8080",
                "/images/logo.png",
                Some("http://localhost:8080/about")
            ),
            Err(ResolveError::UnresolvableRelativeUrl { .. })
        ));
    }

    #[test]
    fn test_encoded_path_and_slash_artifact() {
        let url = resolve(
            "localhost:8080",
            "/%2Fhttps%3A%2F%2Fexample.com%2Fa%3Fb%3D1",
            None,
        )
        .unwrap();
        assert_eq!(url.as_str(), "https://example.com/a?b=1");
    }

    #[test]
    fn test_collapsed_scheme_separator_is_repaired() {
        let url = resolve("localhost:8080", "/https:/example.com/a", None).unwrap();
        assert_eq!(url.as_str(), "https://example.com/a");
    }

    #[test]
    fn test_api_prefix_is_stripped() {
        let resolver = TargetResolver::new("api/content/", Vec::new());
        let url = resolver
            .resolve(&ctx("localhost:8080", "/api/content/https://example.com/a", None))
            .unwrap();
        assert_eq!(url.as_str(), "https://example.com/a");
    }

    #[test]
    fn test_known_prefix_is_stripped() {
        let resolver = TargetResolver::new(
            "",
            vec!["/api/".to_string(), "/api/content/".to_string()],
        );
        for path in [
            "/api/content/https://example.com/a",
            "/api/https://example.com/a",
        ] {
            let url = resolver.resolve(&ctx("proxy.ladder.io", path, None)).unwrap();
            assert_eq!(url.as_str(), "https://example.com/a", "path {}", path);
        }
    }

    #[test]
    fn test_unsupported_scheme() {
        assert!(matches!(
            resolve("localhost:8080", "/ftp://example.com/file", None),
            Err(ResolveError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_subdomain_mode() {
        let resolver = TargetResolver::default();
        let c = ctx("www-example--site-com.ladder.io", "/story?id=4", None);
        assert_eq!(resolver.mode(&c), ExtractionMode::Subdomain);
        assert_eq!(
            resolver.resolve(&c).unwrap().as_str(),
            "https://www.example-site.com/story?id=4"
        );
    }

    #[test]
    fn test_mode_selection() {
        let resolver = TargetResolver::new("", vec!["api/outline/".into()]);
        let mode = |host: &str, uri: &str| resolver.mode(&ctx(host, uri, None));
        assert_eq!(mode("localhost:8080", "/story"), ExtractionMode::Path);
        assert_eq!(mode("127.0.0.1:8080", "/story"), ExtractionMode::Path);
        assert_eq!(mode("10.0.0.12", "/story"), ExtractionMode::Path);
        assert_eq!(mode("a-b.ladder.io", "/https://e.com/"), ExtractionMode::Path);
        assert_eq!(mode("a-b.ladder.io", "/api/outline/x"), ExtractionMode::Path);
        assert_eq!(mode("ladder.io", "/story"), ExtractionMode::Path);
        assert_eq!(mode("a-b.ladder.io", "/story"), ExtractionMode::Subdomain);
    }

    #[test]
    fn test_configured_proxy_host_skips_subdomain_mode() {
        let c = ctx("ladder.example.org", "/story", None)
            .with_proxy_origin("https://ladder.example.org");
        assert_eq!(TargetResolver::default().mode(&c), ExtractionMode::Path);
    }

    #[test]
    fn test_subdomain_encoding_round_trip() {
        for domain in ["example.com", "my-site.co.uk", "a--b.org"] {
            assert_eq!(decode_subdomain(&encode_subdomain(domain)), domain);
        }
    }
}
