//! Referrer spoofing.
//!
//! Sites that let search engines or social networks through a paywall often
//! decide by `Referer`. These modifiers set the header and, where a page
//! script could notice, patch `document.referrer` as well.

use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue};

use super::headers::set_header;
use super::target::modify_query_params;
use crate::modifiers::js_string;
use crate::modifiers::response::html::inject_script;
use crate::proxychain::{header_value, request_modifier, ModifierError, RequestModifier};
use crate::rewriter::ExecTime;

/// Send `url` as the referrer. An empty `url` removes the header.
pub fn spoof_referrer(url: &str) -> Result<Arc<dyn RequestModifier>, ModifierError> {
    let value = if url.is_empty() {
        None
    } else {
        Some(header_value(url)?)
    };
    let script = format!(
        "Object.defineProperty(document, 'referrer', {{ get: () => {} }});",
        js_string(url)
    );
    Ok(request_modifier("SpoofReferrer", move |chain| {
        chain.add_once_response_modifiers([inject_script(
            &script,
            ExecTime::BeforeDomContentLoaded,
        )]);
        let headers = &mut chain.request_mut()?.headers;
        match &value {
            Some(value) => headers.insert(header::REFERER, value.clone()),
            None => headers.remove(header::REFERER),
        };
        Ok(())
    }))
}

/// Use the target URL itself as the referrer instead of the proxy's.
pub fn hide_referrer() -> Arc<dyn RequestModifier> {
    request_modifier("HideReferrer", |chain| {
        let request = chain.request_mut()?;
        let value = header_value(request.url.as_str())?;
        request.headers.insert(header::REFERER, value);
        Ok(())
    })
}

fn navigation_headers() -> [Arc<dyn RequestModifier>; 3] {
    [
        set_header(
            HeaderName::from_static("sec-fetch-site"),
            HeaderValue::from_static("cross-site"),
        ),
        set_header(
            HeaderName::from_static("sec-fetch-dest"),
            HeaderValue::from_static("document"),
        ),
        set_header(
            HeaderName::from_static("sec-fetch-mode"),
            HeaderValue::from_static("navigate"),
        ),
    ]
}

/// Arrive as a cross-site navigation from the URL `referrer` returns,
/// optionally tagging the target with `utm_source`.
fn spoof_navigation_from<R>(
    name: &'static str,
    referrer: R,
    utm_source: Option<&'static str>,
) -> Arc<dyn RequestModifier>
where
    R: Fn() -> String + Send + Sync + 'static,
{
    request_modifier(name, move |chain| {
        let mut follow_ups = vec![spoof_referrer(&referrer())?];
        follow_ups.extend(navigation_headers());
        if let Some(source) = utm_source {
            follow_ups.push(modify_query_params("utm_source", source));
        }
        chain.add_once_request_modifiers(follow_ups);
        Ok(())
    })
}

fn fixed(url: &'static str) -> impl Fn() -> String + Send + Sync + 'static {
    move || url.to_string()
}

pub fn spoof_referrer_from_google_search() -> Arc<dyn RequestModifier> {
    spoof_navigation_from(
        "SpoofReferrerFromGoogleSearch",
        fixed("https://www.google.com/"),
        Some("google"),
    )
}

pub fn spoof_referrer_from_bing_search() -> Arc<dyn RequestModifier> {
    spoof_navigation_from(
        "SpoofReferrerFromBingSearch",
        fixed("https://www.bing.com/"),
        Some("bing"),
    )
}

/// Baidu hands out an opaque redirect link per result click.
pub fn spoof_referrer_from_baidu_search() -> Arc<dyn RequestModifier> {
    spoof_navigation_from("SpoofReferrerFromBaiduSearch", baidu_link, None)
}

fn baidu_link() -> String {
    let token: String = std::iter::repeat_with(fastrand::alphanumeric).take(30).collect();
    format!(
        "https://baidu.com/link?url={}-&wd=&eqid={:016x}",
        token,
        fastrand::u64(..)
    )
}

pub fn spoof_referrer_from_reddit_post() -> Arc<dyn RequestModifier> {
    spoof_navigation_from("SpoofReferrerFromRedditPost", fixed("https://www.reddit.com/"), None)
}

pub fn spoof_referrer_from_twitter_post() -> Arc<dyn RequestModifier> {
    spoof_navigation_from("SpoofReferrerFromTwitterPost", fixed("https://t.co/"), None)
}

pub fn spoof_referrer_from_pinterest_post() -> Arc<dyn RequestModifier> {
    spoof_navigation_from(
        "SpoofReferrerFromPinterestPost",
        fixed("https://www.pinterest.com/"),
        None,
    )
}

/// VK routes outbound links through its `away` interstitial.
pub fn spoof_referrer_from_vkontakte_post() -> Arc<dyn RequestModifier> {
    spoof_navigation_from("SpoofReferrerFromVkontaktePost", fixed("https://away.vk.com/"), None)
}

pub fn spoof_referrer_from_weibo_post() -> Arc<dyn RequestModifier> {
    spoof_navigation_from(
        "SpoofReferrerFromWeiboPost",
        || format!("http://weibo.com/u/{}", fastrand::u32(0..=90000)),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modifiers::test_support::{bound_chain, run_request, run_request_queue};

    #[test]
    fn test_spoof_and_clear_referrer() {
        let mut chain = bound_chain("/https://example.com/", &[]);
        run_request(&mut chain, &spoof_referrer("https://news.example/").unwrap());
        assert_eq!(
            chain.request().unwrap().headers[header::REFERER],
            "https://news.example/"
        );
        run_request(&mut chain, &spoof_referrer("").unwrap());
        assert!(chain.request().unwrap().headers.get(header::REFERER).is_none());
    }

    #[test]
    fn test_hide_referrer_points_at_target() {
        let mut chain = bound_chain("/https://example.com/story", &[]);
        run_request(&mut chain, &hide_referrer());
        assert_eq!(
            chain.request().unwrap().headers[header::REFERER],
            "https://example.com/story"
        );
    }

    #[tokio::test]
    async fn test_google_search_navigation() {
        let mut chain = bound_chain("/https://example.com/story?id=3", &[]);
        chain.add_once_request_modifiers([spoof_referrer_from_google_search()]);
        let request = run_request_queue(&mut chain).await;
        assert_eq!(request.headers[header::REFERER], "https://www.google.com/");
        assert_eq!(request.headers["sec-fetch-site"], "cross-site");
        assert_eq!(request.headers["sec-fetch-mode"], "navigate");
        assert_eq!(request.url.as_str(), "https://example.com/story?id=3&utm_source=google");
    }

    #[tokio::test]
    async fn test_social_post_navigation() {
        for (modifier, referrer) in [
            (spoof_referrer_from_pinterest_post(), "https://www.pinterest.com/"),
            (spoof_referrer_from_vkontakte_post(), "https://away.vk.com/"),
        ] {
            let mut chain = bound_chain("/https://example.com/story", &[]);
            chain.add_once_request_modifiers([modifier]);
            let request = run_request_queue(&mut chain).await;
            assert_eq!(request.headers[header::REFERER], referrer);
            assert_eq!(request.headers["sec-fetch-dest"], "document");
            assert_eq!(request.url.as_str(), "https://example.com/story");
        }
    }

    #[tokio::test]
    async fn test_randomized_referrers_vary_per_request() {
        let baidu = spoof_referrer_from_baidu_search();
        let mut seen = Vec::new();
        for _ in 0..2 {
            let mut chain = bound_chain("/https://example.com/", &[]);
            chain.add_once_request_modifiers([baidu.clone()]);
            let request = run_request_queue(&mut chain).await;
            let referrer = request.headers[header::REFERER].to_str().unwrap().to_string();
            let (token, eqid) = referrer
                .strip_prefix("https://baidu.com/link?url=")
                .and_then(|rest| rest.split_once("-&wd=&eqid="))
                .unwrap();
            assert_eq!(token.len(), 30);
            assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
            assert_eq!(eqid.len(), 16);
            seen.push(referrer);
        }
        assert_ne!(seen[0], seen[1]);

        let mut chain = bound_chain("/https://example.com/", &[]);
        chain.add_once_request_modifiers([spoof_referrer_from_weibo_post()]);
        let request = run_request_queue(&mut chain).await;
        let user: u32 = request.headers[header::REFERER]
            .to_str()
            .unwrap()
            .strip_prefix("http://weibo.com/u/")
            .unwrap()
            .parse()
            .unwrap();
        assert!(user <= 90000);
    }
}
