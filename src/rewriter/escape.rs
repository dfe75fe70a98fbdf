//! Proxy path encoding for rewritten URLs.
//!
//! A rewritten resource URL is the absolute target URL placed as a path under
//! the proxy origin: `https://example.com/a b.jpg?x=1` becomes
//! `/https://example.com/a%20b.jpg%3Fx=1`.
//!
//! # Design Decisions
//! - `/` and `:` stay literal so the result is a plain path a browser can
//!   resolve relative references against
//! - `?`, `#` and `%` are escaped so the whole target travels in the path and
//!   a single percent-decode restores it exactly
//! - `,`, `;` and whitespace are escaped so rewritten values can sit inside
//!   `srcset` lists and `refresh` directives without changing their syntax

use std::borrow::Cow;

/// Characters kept literal besides ASCII alphanumerics.
const KEEP: &[u8] = b"-._~/:@!$&'()*+=";

/// Percent-escape `value` for use as a proxy path.
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 8);
    for &byte in value.as_bytes() {
        if byte.is_ascii_alphanumeric() || KEEP.contains(&byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

/// Reverse of [`escape`]. Malformed sequences are left as they are.
pub fn unescape(value: &str) -> Cow<'_, str> {
    match urlencoding::decode(value) {
        Ok(decoded) => decoded,
        Err(_) => Cow::Borrowed(value),
    }
}

/// Proxy-relative path for an absolute target URL.
pub fn proxy_path(absolute: &str) -> String {
    format!("/{}", escape(absolute))
}
