//! Edits to the `Set-Cookie` headers sent back to the client.

use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderValue};

use crate::proxychain::{header_value, response_modifier, ModifierError, ResponseModifier};

/// Cookie name of a `Set-Cookie` value.
fn cookie_name(set_cookie: &HeaderValue) -> Option<&str> {
    let text = set_cookie.to_str().ok()?;
    let pair = text.split(';').next()?;
    let (name, _) = pair.split_once('=')?;
    Some(name.trim())
}

fn retain_cookies(headers: &mut HeaderMap, keep: impl Fn(&str) -> bool) {
    let kept: Vec<HeaderValue> = headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter(|value| cookie_name(value).is_some_and(&keep))
        .cloned()
        .collect();
    headers.remove(header::SET_COOKIE);
    for value in kept {
        headers.append(header::SET_COOKIE, value);
    }
}

/// Strip every `Set-Cookie` header.
pub fn delete_incoming_cookies() -> Arc<dyn ResponseModifier> {
    response_modifier("DeleteIncomingCookies", |chain| {
        chain.edit_response_headers(|headers| {
            headers.remove(header::SET_COOKIE);
        });
        Ok(())
    })
}

/// Strip every `Set-Cookie` whose name is not in `keep`.
pub fn delete_incoming_cookies_except(keep: &[String]) -> Arc<dyn ResponseModifier> {
    let keep = keep.to_vec();
    response_modifier("DeleteIncomingCookiesExcept", move |chain| {
        chain.edit_response_headers(|headers| {
            retain_cookies(headers, |name| keep.iter().any(|k| k == name));
        });
        Ok(())
    })
}

/// Replace (or add) the cookie `name` with `name=value`.
pub fn set_incoming_cookie(name: &str, value: &str) -> Result<Arc<dyn ResponseModifier>, ModifierError> {
    let cookie = header_value(&format!("{}={}", name, value))?;
    let name = name.to_string();
    Ok(response_modifier(format!("SetIncomingCookie({})", name), move |chain| {
        chain.edit_response_headers(|headers| {
            retain_cookies(headers, |existing| existing != name);
            headers.append(header::SET_COOKIE, cookie.clone());
        });
        Ok(())
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modifiers::response::headers::forward_response_headers;
    use crate::modifiers::test_support::{respond, Upstream};

    fn upstream() -> Upstream {
        Upstream::html("")
            .header("set-cookie", "session=abc; Path=/; HttpOnly")
            .header("set-cookie", "tracker=xyz; Max-Age=9999")
            .header("set-cookie", "pref=dark")
    }

    fn cookies(response: &axum::http::Response<axum::body::Body>) -> Vec<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_delete_all_incoming() {
        let response = respond(
            "/https://example.com/",
            upstream(),
            vec![forward_response_headers(), delete_incoming_cookies()],
        )
        .await;
        assert!(cookies(&response).is_empty());
    }

    #[tokio::test]
    async fn test_whitelist_keeps_named_cookies() {
        let response = respond(
            "/https://example.com/",
            upstream(),
            vec![
                delete_incoming_cookies_except(&["session".to_string(), "pref".to_string()]),
                forward_response_headers(),
            ],
        )
        .await;
        assert_eq!(cookies(&response), vec!["session=abc; Path=/; HttpOnly", "pref=dark"]);
    }

    #[tokio::test]
    async fn test_set_replaces_existing_cookie() {
        let response = respond(
            "/https://example.com/",
            upstream(),
            vec![forward_response_headers(), set_incoming_cookie("tracker", "none").unwrap()],
        )
        .await;
        assert_eq!(
            cookies(&response),
            vec!["session=abc; Path=/; HttpOnly", "pref=dark", "tracker=none"]
        );
    }
}
