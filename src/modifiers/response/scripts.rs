//! Response modifiers that replace or edit JavaScript bodies.
//!
//! Some pages wait for a tracker's globals before they render. Requests for
//! those trackers are answered with inert stand-ins that expose the same
//! API, so the page loads and nothing is reported.

use std::sync::{Arc, LazyLock};

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use bytes::Bytes;
use futures_util::stream;
use regex::bytes::Regex;

use crate::proxychain::{response_modifier, ModifierError, ProxyChain, ResponseModifier};

/// Largest script body buffered for a regex edit.
const MAX_SCRIPT_BYTES: usize = 16 * 1024 * 1024;

const ANALYTICS_JS: &str = include_str!("assets/surrogates/analytics.js");
const GTAG_JS: &str = include_str!("assets/surrogates/gtag.js");
const GPT_JS: &str = include_str!("assets/surrogates/gpt.js");
const FBEVENTS_JS: &str = include_str!("assets/surrogates/fbevents.js");
const NOOP_JS: &str = include_str!("assets/surrogates/noop.js");

struct Surrogate {
    pattern: regex::Regex,
    name: &'static str,
    script: &'static str,
}

static SURROGATES: LazyLock<Vec<Surrogate>> = LazyLock::new(|| {
    [
        (r"^https?://(www\.|ssl\.)?google-analytics\.com/(analytics|ga)\.js", "analytics.js", ANALYTICS_JS),
        (r"^https?://(www\.)?googletagmanager\.com/(gtag/js|gtm\.js)", "gtag.js", GTAG_JS),
        (r"^https?://(www\.)?googletagservices\.com/tag/js/gpt\.js", "gpt.js", GPT_JS),
        (r"^https?://securepubads\.g\.doubleclick\.net/tag/js/gpt\.js", "gpt.js", GPT_JS),
        (r"^https?://connect\.facebook\.net/[^/]+/fbevents\.js", "fbevents.js", FBEVENTS_JS),
        (r"^https?://s?b\.scorecardresearch\.com/beacon\.js", "noop.js", NOOP_JS),
        (r"^https?://static\.chartbeat\.com/js/chartbeat(_mab)?\.js", "noop.js", NOOP_JS),
    ]
    .into_iter()
    .filter_map(|(pattern, name, script)| match regex::Regex::new(pattern) {
        Ok(pattern) => Some(Surrogate {
            pattern,
            name,
            script,
        }),
        Err(err) => {
            tracing::error!(pattern, error = %err, "Skipping invalid tracker pattern");
            None
        }
    })
    .collect()
});

/// Answer with `script` as a successful JavaScript response.
fn serve_script(chain: &mut ProxyChain, script: &'static str) -> Result<(), ModifierError> {
    let response = chain.response_mut()?;
    response.status = StatusCode::OK;
    response.body = Body::from(script);
    chain.edit_response_headers(|headers| {
        headers.remove(header::CONTENT_LENGTH);
        headers.remove(header::CONTENT_ENCODING);
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/javascript"));
    });
    Ok(())
}

fn is_javascript(chain: &ProxyChain) -> bool {
    let by_type = chain
        .response()
        .and_then(|r| r.headers.get(header::CONTENT_TYPE))
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .is_some_and(|ct| {
            matches!(
                ct.as_str(),
                "text/javascript" | "application/javascript" | "application/x-javascript"
            )
        });
    let by_path = chain
        .target()
        .is_some_and(|url| url.path().ends_with(".js") || url.path().ends_with(".mjs"));
    by_type || by_path
}

/// Serve an inert stand-in for well-known tracker scripts.
pub fn patch_tracker_scripts() -> Arc<dyn ResponseModifier> {
    response_modifier("PatchTrackerScripts", |chain| {
        let Some(target) = chain.target() else {
            return Ok(());
        };
        let Some(surrogate) = SURROGATES.iter().find(|s| s.pattern.is_match(target.as_str())) else {
            return Ok(());
        };
        tracing::debug!(target_url = %target, surrogate = surrogate.name, "Serving tracker surrogate");
        serve_script(chain, surrogate.script)
    })
}

/// Serve a no-op `ga()` for Google Analytics.
pub fn patch_google_analytics() -> Arc<dyn ResponseModifier> {
    response_modifier("PatchGoogleAnalytics", |chain| {
        let is_analytics = chain.target().is_some_and(|url| {
            matches!(url.host_str(), Some("www.google-analytics.com" | "google-analytics.com"))
                || url.path().ends_with("analytics.js")
        });
        if !is_analytics {
            return Ok(());
        }
        serve_script(chain, ANALYTICS_JS)
    })
}

/// Apply a regex substitution to JavaScript responses.
///
/// The body is buffered (up to 16 MiB) because a match may span chunks.
/// `replacement` may refer to capture groups as `$1` or `${name}`.
pub fn modify_incoming_scripts_with_regex(
    pattern: &str,
    replacement: &str,
) -> Result<Arc<dyn ResponseModifier>, ModifierError> {
    let regex = Regex::new(pattern).map_err(|source| ModifierError::InvalidRegex {
        pattern: pattern.to_string(),
        source,
    })?;
    let replacement = replacement.to_string();
    Ok(response_modifier("ModifyIncomingScriptsWithRegex", move |chain| {
        if !is_javascript(chain) {
            return Ok(());
        }
        let response = chain.response_mut()?;
        let body = std::mem::take(&mut response.body);
        let regex = regex.clone();
        let replacement = replacement.clone();
        response.body = Body::from_stream(stream::once(async move {
            let script = axum::body::to_bytes(body, MAX_SCRIPT_BYTES).await?;
            let edited = regex.replace_all(&script, replacement.as_bytes());
            Ok::<_, axum::Error>(Bytes::from(edited.into_owned()))
        }));
        chain.edit_response_headers(|headers| {
            headers.remove(header::CONTENT_LENGTH);
        });
        Ok(())
    }))
}
