//! Edits to the `Cookie` header sent upstream.

use std::sync::Arc;

use axum::http::{header, HeaderMap};

use crate::proxychain::{header_value, request_modifier, ModifierError, RequestModifier};

/// `(name, value)` pairs of every `Cookie` header.
fn parse_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .filter(|(name, _)| !name.is_empty())
        .collect()
}

fn write_cookies(headers: &mut HeaderMap, cookies: &[(String, String)]) -> Result<(), ModifierError> {
    headers.remove(header::COOKIE);
    if cookies.is_empty() {
        return Ok(());
    }
    let joined = cookies
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("; ");
    headers.insert(header::COOKIE, header_value(&joined)?);
    Ok(())
}

/// Set cookie `name` to `value`, adding it when absent.
pub fn set_outgoing_cookie(name: &str, value: &str) -> Arc<dyn RequestModifier> {
    let name = name.to_string();
    let value = value.to_string();
    request_modifier(format!("SetOutgoingCookie({})", name), move |chain| {
        let headers = &mut chain.request_mut()?.headers;
        let mut cookies = parse_cookies(headers);
        let mut found = false;
        for (existing, current) in cookies.iter_mut() {
            if *existing == name {
                *current = value.clone();
                found = true;
            }
        }
        if !found {
            cookies.push((name.clone(), value.clone()));
        }
        write_cookies(headers, &cookies)
    })
}

/// Drop cookie `name`.
pub fn delete_outgoing_cookie(name: &str) -> Arc<dyn RequestModifier> {
    let name = name.to_string();
    request_modifier(format!("DeleteOutgoingCookie({})", name), move |chain| {
        let headers = &mut chain.request_mut()?.headers;
        let mut cookies = parse_cookies(headers);
        cookies.retain(|(existing, _)| *existing != name);
        write_cookies(headers, &cookies)
    })
}

/// Send no cookies at all.
pub fn delete_outgoing_cookies() -> Arc<dyn RequestModifier> {
    request_modifier("DeleteOutgoingCookies", |chain| {
        chain.request_mut()?.headers.remove(header::COOKIE);
        Ok(())
    })
}

/// Send only the cookies named in `keep`.
pub fn delete_outgoing_cookies_except(keep: &[String]) -> Arc<dyn RequestModifier> {
    let keep = keep.to_vec();
    request_modifier("DeleteOutgoingCookiesExcept", move |chain| {
        let headers = &mut chain.request_mut()?.headers;
        let mut cookies = parse_cookies(headers);
        cookies.retain(|(name, _)| keep.contains(name));
        write_cookies(headers, &cookies)
    })
}
