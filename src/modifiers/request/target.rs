//! Target URL edits applied before dispatch.

use std::sync::Arc;

use regex::Regex;
use url::Url;

use crate::proxychain::{request_modifier, ModifierError, RequestModifier};

const CACHE_BUSTER_KEY: &str = "ord";
const CACHE_BUSTER_LEN: usize = 15;
const CACHE_BUSTER_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789.";

/// Set query parameter `key` to `value`; an empty `value` removes it.
pub fn modify_query_params(key: &str, value: &str) -> Arc<dyn RequestModifier> {
    let key = key.to_string();
    let value = value.to_string();
    request_modifier(format!("ModifyQueryParams({})", key), move |chain| {
        set_query_param(&mut chain.request_mut()?.url, &key, &value);
        Ok(())
    })
}

fn set_query_param(url: &mut Url, key: &str, value: &str) {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !value.is_empty() {
        pairs.push((key.to_string(), value.to_string()));
    }
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
}

fn compile(pattern: &str) -> Result<Regex, ModifierError> {
    Regex::new(pattern).map_err(|source| ModifierError::InvalidRegex {
        pattern: pattern.to_string(),
        source,
    })
}

/// Rewrite the target host with a regex substitution.
pub fn modify_domain_with_regex(
    pattern: &str,
    replacement: &str,
) -> Result<Arc<dyn RequestModifier>, ModifierError> {
    let re = compile(pattern)?;
    let replacement = replacement.to_string();
    Ok(request_modifier("ModifyDomainWithRegex", move |chain| {
        let url = &mut chain.request_mut()?.url;
        let host = url.host_str().unwrap_or_default().to_string();
        let next = re.replace_all(&host, replacement.as_str());
        if next != host {
            url.set_host(Some(next.as_ref()))
                .map_err(|source| ModifierError::InvalidUrl {
                    url: next.to_string(),
                    source,
                })?;
        }
        Ok(())
    }))
}

/// Rewrite the target path with a regex substitution.
pub fn modify_path_with_regex(
    pattern: &str,
    replacement: &str,
) -> Result<Arc<dyn RequestModifier>, ModifierError> {
    let re = compile(pattern)?;
    let replacement = replacement.to_string();
    Ok(request_modifier("ModifyPathWithRegex", move |chain| {
        let url = &mut chain.request_mut()?.url;
        let path = url.path().to_string();
        let next = re.replace_all(&path, replacement.as_str());
        url.set_path(&next);
        Ok(())
    }))
}

/// Add a random `ord` parameter so caches along the way miss.
pub fn add_cache_buster_query() -> Arc<dyn RequestModifier> {
    request_modifier("AddCacheBusterQuery", |chain| {
        let token = random_token(CACHE_BUSTER_LEN);
        chain.add_once_request_modifiers([modify_query_params(CACHE_BUSTER_KEY, &token)]);
        Ok(())
    })
}

fn random_token(len: usize) -> String {
    (0..len)
        .map(|_| CACHE_BUSTER_CHARSET[fastrand::usize(..CACHE_BUSTER_CHARSET.len())] as char)
        .collect()
}
