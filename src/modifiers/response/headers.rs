//! Response header modifiers.
//!
//! Headers sent to the client start out empty apart from `Content-Type`;
//! `ForwardResponseHeaders` copies the upstream ones across. Every other
//! modifier here edits both maps, so it works before or after forwarding.

use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::modifiers::header_name;
use crate::proxychain::{header_value, response_modifier, ModifierError, ResponseModifier};
use crate::rewriter::UrlRewriter;

/// Upstream headers never copied to the client.
pub const FORWARD_BLACKLIST: &[&str] = &[
    "content-length",
    "content-encoding",
    "transfer-encoding",
    "strict-transport-security",
    "connection",
    "keep-alive",
    "proxy-connection",
    "trailer",
    "upgrade",
];

const CSP_HEADERS: &[&str] = &[
    "content-security-policy",
    "content-security-policy-report-only",
    "x-content-security-policy",
    "x-webkit-csp",
];

/// Copy upstream headers to the client, routing `Location` back through
/// the proxy.
pub fn forward_response_headers() -> Arc<dyn ResponseModifier> {
    response_modifier("ForwardResponseHeaders", |chain| {
        let upstream = chain.response().ok_or(ModifierError::NoResponse)?;
        let mut forwarded = upstream.headers.clone();
        let base = upstream.url.clone();
        let proxy_origin = chain.proxy_origin();

        for name in FORWARD_BLACKLIST {
            forwarded.remove(*name);
        }
        if let Some(location) = forwarded.get(header::LOCATION).and_then(|v| v.to_str().ok()) {
            let rewriter = UrlRewriter::new(base, proxy_origin.as_str());
            if let Some(path) = rewriter.rewrite_url(location) {
                let proxied = format!("{}{}", proxy_origin, path);
                tracing::debug!(from = %location, to = %proxied, "Rewrote redirect location");
                forwarded.insert(header::LOCATION, header_value(&proxied)?);
            }
        }

        let ctx = chain.context_mut().ok_or(ModifierError::NoContext)?;
        merge(ctx.response_headers_mut(), forwarded);
        Ok(())
    })
}

/// Replace every value of each name in `from`.
fn merge(into: &mut HeaderMap, from: HeaderMap) {
    let mut last: Option<HeaderName> = None;
    for (name, value) in from {
        let name = match name {
            Some(name) => {
                into.remove(&name);
                last = Some(name.clone());
                name
            }
            None => match &last {
                Some(name) => name.clone(),
                None => continue,
            },
        };
        into.append(name, value);
    }
}

pub fn set_response_header(
    name: &str,
    value: &str,
) -> Result<Arc<dyn ResponseModifier>, ModifierError> {
    Ok(set_header(header_name(name)?, header_value(value)?))
}

pub fn delete_response_header(name: &str) -> Result<Arc<dyn ResponseModifier>, ModifierError> {
    Ok(delete_header(header_name(name)?))
}

fn set_header(name: HeaderName, value: HeaderValue) -> Arc<dyn ResponseModifier> {
    response_modifier(format!("SetResponseHeader({})", name), move |chain| {
        chain.edit_response_headers(|headers| {
            headers.insert(name.clone(), value.clone());
        });
        Ok(())
    })
}

fn delete_header(name: HeaderName) -> Arc<dyn ResponseModifier> {
    response_modifier(format!("DeleteResponseHeader({})", name), move |chain| {
        chain.edit_response_headers(|headers| {
            headers.remove(&name);
        });
        Ok(())
    })
}

/// Let any origin read the response and allow framing.
pub fn bypass_cors() -> Arc<dyn ResponseModifier> {
    response_modifier("BypassCors", |chain| {
        chain.edit_response_headers(|headers| {
            let mut set = |name: HeaderName, value: &'static str| {
                headers.insert(name, HeaderValue::from_static(value));
            };
            set(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*");
            set(header::ACCESS_CONTROL_EXPOSE_HEADERS, "*");
            set(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, "true");
            set(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                "GET, PUT, POST, DELETE, HEAD, OPTIONS, PATCH",
            );
            set(header::ACCESS_CONTROL_ALLOW_HEADERS, "*");
            headers.remove(header::X_FRAME_OPTIONS);
        });
        Ok(())
    })
}

/// Remove every Content-Security-Policy variant.
pub fn bypass_content_security_policy() -> Arc<dyn ResponseModifier> {
    response_modifier("BypassContentSecurityPolicy", |chain| {
        chain.edit_response_headers(|headers| {
            for name in CSP_HEADERS {
                headers.remove(*name);
            }
        });
        Ok(())
    })
}

/// Replace the Content-Security-Policy with `csp`.
pub fn set_content_security_policy(csp: &str) -> Result<Arc<dyn ResponseModifier>, ModifierError> {
    let value = header_value(csp)?;
    Ok(response_modifier("SetContentSecurityPolicy", move |chain| {
        chain.edit_response_headers(|headers| {
            headers.insert(header::CONTENT_SECURITY_POLICY, value.clone());
        });
        Ok(())
    }))
}
