//! Outgoing header modifiers.

use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::modifiers::header_name;
use crate::proxychain::{header_value, request_modifier, ModifierError, RequestModifier};

/// Inbound headers never copied to the upstream request.
pub const FORWARD_BLACKLIST: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "upgrade",
    "content-length",
    "content-encoding",
    "transfer-encoding",
    "accept-encoding",
    "referer",
    "x-forwarded-for",
    "x-forwarded-host",
    "x-forwarded-proto",
    "x-real-ip",
    "forwarded",
    "x-request-id",
];

/// Set (replace) an outgoing header.
pub fn set_request_header(
    name: &str,
    value: &str,
) -> Result<Arc<dyn RequestModifier>, ModifierError> {
    Ok(set_header(header_name(name)?, header_value(value)?))
}

/// Remove an outgoing header.
pub fn delete_request_header(name: &str) -> Result<Arc<dyn RequestModifier>, ModifierError> {
    Ok(delete_header(header_name(name)?))
}

pub(crate) fn set_header(name: HeaderName, value: HeaderValue) -> Arc<dyn RequestModifier> {
    request_modifier(format!("SetRequestHeader({})", name), move |chain| {
        chain.request_mut()?.headers.insert(name.clone(), value.clone());
        Ok(())
    })
}

pub(crate) fn delete_header(name: HeaderName) -> Arc<dyn RequestModifier> {
    request_modifier(format!("DeleteRequestHeader({})", name), move |chain| {
        chain.request_mut()?.headers.remove(&name);
        Ok(())
    })
}

/// Copy the client's headers onto the outgoing request.
///
/// Hop-by-hop, framing and forwarding headers are dropped, as is the
/// proxy-facing `Referer`. Multi-valued headers keep every value.
pub fn forward_request_headers() -> Arc<dyn RequestModifier> {
    request_modifier("ForwardRequestHeaders", |chain| {
        let inbound = chain
            .context()
            .ok_or(ModifierError::NoContext)?
            .headers()
            .clone();
        let outbound = &mut chain.request_mut()?.headers;
        copy_forwardable(&inbound, outbound);
        Ok(())
    })
}

fn copy_forwardable(inbound: &HeaderMap, outbound: &mut HeaderMap) {
    for name in inbound.keys() {
        if FORWARD_BLACKLIST.contains(&name.as_str()) {
            continue;
        }
        outbound.remove(name);
        for value in inbound.get_all(name) {
            outbound.append(name.clone(), value.clone());
        }
    }
}

/// Pretend the request comes from `origin`.
pub fn spoof_origin(origin: &str) -> Result<Arc<dyn RequestModifier>, ModifierError> {
    let value = header_value(origin)?;
    Ok(request_modifier("SpoofOrigin", move |chain| {
        chain.request_mut()?.headers.insert(header::ORIGIN, value.clone());
        Ok(())
    }))
}

/// Replace the proxy's origin with the target's own.
pub fn hide_origin() -> Arc<dyn RequestModifier> {
    request_modifier("HideOrigin", |chain| {
        let request = chain.request_mut()?;
        let origin = request.url.origin().ascii_serialization();
        request.headers.insert(header::ORIGIN, header_value(&origin)?);
        Ok(())
    })
}

/// Claim `ip` as the client address in `X-Forwarded-For`.
pub fn spoof_x_forwarded_for(ip: &str) -> Result<Arc<dyn RequestModifier>, ModifierError> {
    Ok(set_header(
        HeaderName::from_static("x-forwarded-for"),
        header_value(ip)?,
    ))
}
