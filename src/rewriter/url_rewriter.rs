//! Resource URL rewriting.
//!
//! # Responsibilities
//! - Know which attributes of which tags carry resource URLs
//! - Classify each URL and resolve it against the target page
//! - Re-express the absolute URL as a path under the proxy origin
//! - Handle the list syntax of `srcset` and the `N;url=...` refresh syntax
//!
//! # Design Decisions
//! - A value that already points into the proxy is left untouched, which
//!   makes rewriting idempotent
//! - Only `http` and `https` targets are rewritten; every other scheme is
//!   treated as blacklisted and passed through
//! - Empty values and pure `#fragment` references are left alone

use url::Url;

use super::escape;
use super::{Rewrite, Token, TokenRewriter};

/// Schemes that are never routed through the proxy.
pub const BLACKLISTED_SCHEMES: &[&str] = &[
    "data",
    "tel",
    "mailto",
    "file",
    "blob",
    "javascript",
    "about",
    "magnet",
    "ws",
    "wss",
    "ftp",
];

/// Attributes that carry resource URLs, per tag.
fn url_attributes(tag: &str) -> &'static [&'static str] {
    match tag {
        "img" => &["src", "srcset", "longdesc", "usemap"],
        "a" | "area" | "base" => &["href"],
        "form" => &["action"],
        "link" => &["href", "manifest", "icon", "imagesrcset"],
        "script" | "audio" | "embed" | "track" => &["src"],
        "video" => &["src", "poster"],
        "iframe" => &["src", "longdesc"],
        "object" => &["data", "codebase"],
        "source" => &["src", "srcset"],
        "blockquote" | "del" | "ins" | "q" => &["cite"],
        "body" => &["background"],
        "button" => &["formaction"],
        "input" => &["src", "formaction"],
        "meta" => &["content"],
        _ => &[],
    }
}

/// Syntactic class of an attribute URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlClass {
    /// `/path`
    RootRelative,
    /// `path`, `?query`, `#fragment`
    DocumentRelative,
    /// `//host/path`
    ProtocolRelative,
    /// `http(s)://host/path`
    Absolute,
    /// Any non-http(s) scheme.
    Blacklisted,
    /// Already points into this proxy.
    AlreadyProxied,
}

/// Rewrites resource URLs of one target page into proxy paths.
#[derive(Debug, Clone)]
pub struct UrlRewriter {
    base: Url,
    proxy_origin: String,
}

impl UrlRewriter {
    /// `base` is the page being proxied; `proxy_origin` is e.g.
    /// `http://localhost:8080`.
    pub fn new(base: Url, proxy_origin: impl Into<String>) -> Self {
        let proxy_origin = proxy_origin.into().trim_end_matches('/').to_ascii_lowercase();
        Self { base, proxy_origin }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Lowercased proxy origin without a trailing slash.
    pub fn proxy_origin(&self) -> &str {
        &self.proxy_origin
    }

    /// Classify an attribute value. Exactly one class applies.
    pub fn classify(&self, value: &str) -> UrlClass {
        let value = value.trim();
        if self.is_proxied(value) {
            return UrlClass::AlreadyProxied;
        }
        if value.starts_with("//") {
            return UrlClass::ProtocolRelative;
        }
        if value.starts_with('/') {
            return UrlClass::RootRelative;
        }
        match scheme_of(value) {
            Some(scheme) if scheme == "http" || scheme == "https" => UrlClass::Absolute,
            Some(_) => UrlClass::Blacklisted,
            None => UrlClass::DocumentRelative,
        }
    }

    fn is_proxied(&self, value: &str) -> bool {
        let lower = value.to_ascii_lowercase();
        if !self.proxy_origin.is_empty() {
            if let Some(rest) = lower.strip_prefix(&self.proxy_origin) {
                if rest.is_empty() || rest.starts_with('/') {
                    return true;
                }
            }
        }
        lower.starts_with("/http://") || lower.starts_with("/https://")
    }

    /// Rewrite a single URL. `None` means the value must stay as it is.
    pub fn rewrite_url(&self, value: &str) -> Option<String> {
        let value = value.trim();
        let resolved = match self.classify(value) {
            UrlClass::AlreadyProxied | UrlClass::Blacklisted => return None,
            UrlClass::DocumentRelative if value.is_empty() || value.starts_with('#') => {
                return None
            }
            UrlClass::Absolute => Url::parse(value).ok()?,
            _ => self.base.join(value).ok()?,
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            return None;
        }
        Some(escape::proxy_path(resolved.as_str()))
    }

    /// Rewrite every candidate URL of a `srcset` list.
    pub fn rewrite_srcset(&self, value: &str) -> Option<String> {
        if value.trim_start().starts_with("data:") {
            return None;
        }
        let mut changed = false;
        let candidates: Vec<String> = value
            .split(',')
            .map(str::trim)
            .filter(|candidate| !candidate.is_empty())
            .map(|candidate| {
                let (url, descriptor) = match candidate.split_once(char::is_whitespace) {
                    Some((url, descriptor)) => (url, descriptor.trim()),
                    None => (candidate, ""),
                };
                let url = match self.rewrite_url(url) {
                    Some(rewritten) => {
                        changed = true;
                        rewritten
                    }
                    None => url.to_string(),
                };
                if descriptor.is_empty() {
                    url
                } else {
                    format!("{} {}", url, descriptor)
                }
            })
            .collect();
        changed.then(|| candidates.join(", "))
    }

    /// Rewrite the URL inside a `N;url=...` refresh directive.
    pub fn rewrite_refresh(&self, value: &str) -> Option<String> {
        let start = refresh_url_start(value)?;
        let rest = &value[start..];
        let body = rest.trim_start_matches(['\'', '"']);
        let prefix_len = start + (rest.len() - body.len());
        let url = body.trim_end_matches(|c: char| c == '\'' || c == '"' || c.is_whitespace());
        let rewritten = self.rewrite_url(url)?;
        Some(format!(
            "{}{}{}",
            &value[..prefix_len],
            rewritten,
            &body[url.len()..]
        ))
    }

    fn rewrite_attribute(&self, tag: &str, key: &str, value: &str) -> Option<String> {
        match (tag, key) {
            ("img" | "source", "srcset") | ("link", "imagesrcset") => self.rewrite_srcset(value),
            ("meta", "content") => self.rewrite_refresh(value),
            _ => self.rewrite_url(value),
        }
    }
}

impl TokenRewriter for UrlRewriter {
    fn should_rewrite(&self, token: &Token) -> bool {
        let wanted = url_attributes(token.name());
        token
            .attrs()
            .iter()
            .any(|attr| wanted.contains(&attr.key.as_str()))
    }

    fn rewrite(&self, mut token: Token) -> Rewrite {
        let wanted = url_attributes(token.name());
        let edits: Vec<(usize, String)> = token
            .attrs()
            .iter()
            .enumerate()
            .filter(|(_, attr)| wanted.contains(&attr.key.as_str()))
            .filter_map(|(index, attr)| {
                self.rewrite_attribute(token.name(), &attr.key, &attr.value)
                    .map(|value| (index, value))
            })
            .collect();
        for (index, value) in edits {
            token.set_attr_value(index, value);
        }
        Rewrite::token(token)
    }
}

/// Lowercased scheme if `value` starts with `scheme:`.
fn scheme_of(value: &str) -> Option<String> {
    let colon = value.find(':')?;
    let scheme = &value[..colon];
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic()
        || !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        return None;
    }
    Some(scheme.to_ascii_lowercase())
}

/// Byte offset of the URL inside `5; url=...`, if the value has that form.
fn refresh_url_start(value: &str) -> Option<usize> {
    let bytes = value.as_bytes();
    let skip_ws = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        i
    };

    let mut i = skip_ws(0);
    let digits = i;
    while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
        i += 1;
    }
    if i == digits {
        return None;
    }
    i = skip_ws(i);
    if !matches!(bytes.get(i), Some(b';' | b',')) {
        return None;
    }
    i = skip_ws(i + 1);
    if !bytes.get(i..i + 3)?.eq_ignore_ascii_case(b"url") {
        return None;
    }
    i = skip_ws(i + 3);
    if bytes.get(i) != Some(&b'=') {
        return None;
    }
    Some(skip_ws(i + 1))
}
