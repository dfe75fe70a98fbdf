//! Name → factory table of the built-in modifiers.
//!
//! Built once at startup and shared by reference: config validation checks
//! names and arities against it, and the server builds the configured
//! modifier lists from it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::{request, response};
use crate::proxychain::{ModifierError, RequestModifier, ResponseModifier};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unknown {kind} modifier '{name}'")]
    UnknownModifier { kind: ModifierKind, name: String },

    #[error("modifier '{name}' takes {expected} parameter(s), got {got}")]
    WrongArity {
        name: String,
        expected: Arity,
        got: usize,
    },

    #[error("modifier '{name}': {source}")]
    InvalidParam {
        name: String,
        #[source]
        source: ModifierError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierKind {
    Request,
    Response,
}

impl fmt::Display for ModifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModifierKind::Request => f.write_str("request"),
            ModifierKind::Response => f.write_str("response"),
        }
    }
}

/// Number of string parameters a modifier accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Variadic,
}

impl Arity {
    fn accepts(self, got: usize) -> bool {
        match self {
            Arity::Exact(n) => n == got,
            Arity::Variadic => true,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{}", n),
            Arity::Variadic => f.write_str("any number of"),
        }
    }
}

type RequestFactory = fn(&[String]) -> Result<Arc<dyn RequestModifier>, ModifierError>;
type ResponseFactory = fn(&[String]) -> Result<Arc<dyn ResponseModifier>, ModifierError>;

struct Entry<F> {
    arity: Arity,
    build: F,
}

/// Immutable registry of modifier factories.
pub struct ModifierCatalog {
    request: BTreeMap<&'static str, Entry<RequestFactory>>,
    response: BTreeMap<&'static str, Entry<ResponseFactory>>,
}

impl ModifierCatalog {
    fn empty() -> Self {
        Self {
            request: BTreeMap::new(),
            response: BTreeMap::new(),
        }
    }

    fn request(&mut self, name: &'static str, arity: Arity, build: RequestFactory) -> &mut Self {
        self.request.insert(name, Entry { arity, build });
        self
    }

    fn response(&mut self, name: &'static str, arity: Arity, build: ResponseFactory) -> &mut Self {
        self.response.insert(name, Entry { arity, build });
        self
    }

    /// Every modifier shipped with the crate.
    pub fn builtin() -> Self {
        use Arity::{Exact, Variadic};

        let mut catalog = Self::empty();
        catalog
            .request("SetRequestHeader", Exact(2), |p| request::set_request_header(&p[0], &p[1]))
            .request("DeleteRequestHeader", Exact(1), |p| request::delete_request_header(&p[0]))
            .request("ForwardRequestHeaders", Exact(0), |_| Ok(request::forward_request_headers()))
            .request("SpoofUserAgent", Exact(1), |p| request::spoof_user_agent(&p[0]))
            .request("SpoofReferrer", Exact(1), |p| request::spoof_referrer(&p[0]))
            .request("HideReferrer", Exact(0), |_| Ok(request::hide_referrer()))
            .request("SpoofReferrerFromGoogleSearch", Exact(0), |_| {
                Ok(request::spoof_referrer_from_google_search())
            })
            .request("SpoofReferrerFromBingSearch", Exact(0), |_| {
                Ok(request::spoof_referrer_from_bing_search())
            })
            .request("SpoofReferrerFromRedditPost", Exact(0), |_| {
                Ok(request::spoof_referrer_from_reddit_post())
            })
            .request("SpoofReferrerFromTwitterPost", Exact(0), |_| {
                Ok(request::spoof_referrer_from_twitter_post())
            })
            .request("SpoofReferrerFromPinterestPost", Exact(0), |_| {
                Ok(request::spoof_referrer_from_pinterest_post())
            })
            .request("SpoofReferrerFromBaiduSearch", Exact(0), |_| {
                Ok(request::spoof_referrer_from_baidu_search())
            })
            .request("SpoofReferrerFromVkontaktePost", Exact(0), |_| {
                Ok(request::spoof_referrer_from_vkontakte_post())
            })
            .request("SpoofReferrerFromWeiboPost", Exact(0), |_| {
                Ok(request::spoof_referrer_from_weibo_post())
            })
            .request("SpoofOrigin", Exact(1), |p| request::spoof_origin(&p[0]))
            .request("HideOrigin", Exact(0), |_| Ok(request::hide_origin()))
            .request("SpoofXForwardedFor", Exact(1), |p| request::spoof_x_forwarded_for(&p[0]))
            .request("MasqueradeAsGoogleBot", Exact(0), |_| Ok(request::masquerade_as_google_bot()))
            .request("MasqueradeAsBingBot", Exact(0), |_| Ok(request::masquerade_as_bing_bot()))
            .request("MasqueradeAsWaybackMachineBot", Exact(0), |_| {
                Ok(request::masquerade_as_wayback_machine_bot())
            })
            .request("ModifyQueryParams", Exact(2), |p| Ok(request::modify_query_params(&p[0], &p[1])))
            .request("ModifyDomainWithRegex", Exact(2), |p| {
                request::modify_domain_with_regex(&p[0], &p[1])
            })
            .request("ModifyPathWithRegex", Exact(2), |p| request::modify_path_with_regex(&p[0], &p[1]))
            .request("AddCacheBusterQuery", Exact(0), |_| Ok(request::add_cache_buster_query()))
            .request("RequestArchiveIs", Exact(0), |_| Ok(request::request_archive_is()))
            .request("RequestWaybackMachine", Exact(0), |_| Ok(request::request_wayback_machine()))
            .request("RequestGoogleCache", Exact(0), |_| Ok(request::request_google_cache()))
            .request("ResolveWithGoogleDoH", Exact(0), |_| Ok(request::resolve_with_google_doh()))
            .request("SetOutgoingCookie", Exact(2), |p| Ok(request::set_outgoing_cookie(&p[0], &p[1])))
            .request("DeleteOutgoingCookie", Exact(1), |p| Ok(request::delete_outgoing_cookie(&p[0])))
            .request("DeleteOutgoingCookies", Exact(0), |_| Ok(request::delete_outgoing_cookies()))
            .request("DeleteOutgoingCookiesExcept", Variadic, |p| {
                Ok(request::delete_outgoing_cookies_except(p))
            });

        catalog
            .response("ForwardResponseHeaders", Exact(0), |_| Ok(response::forward_response_headers()))
            .response("SetResponseHeader", Exact(2), |p| response::set_response_header(&p[0], &p[1]))
            .response("DeleteResponseHeader", Exact(1), |p| response::delete_response_header(&p[0]))
            .response("BypassCors", Exact(0), |_| Ok(response::bypass_cors()))
            .response("BypassContentSecurityPolicy", Exact(0), |_| {
                Ok(response::bypass_content_security_policy())
            })
            .response("SetContentSecurityPolicy", Exact(1), |p| {
                response::set_content_security_policy(&p[0])
            })
            .response("DeleteIncomingCookies", Exact(0), |_| Ok(response::delete_incoming_cookies()))
            .response("DeleteIncomingCookiesExcept", Variadic, |p| {
                Ok(response::delete_incoming_cookies_except(p))
            })
            .response("SetIncomingCookie", Exact(2), |p| response::set_incoming_cookie(&p[0], &p[1]))
            .response("RewriteHtmlResourceUrls", Exact(0), |_| Ok(response::rewrite_html_resource_urls()))
            .response("InjectScriptBeforeDomContentLoaded", Exact(1), |p| {
                Ok(response::inject_script_before_dom_content_loaded(&p[0]))
            })
            .response("InjectScriptAfterDomContentLoaded", Exact(1), |p| {
                Ok(response::inject_script_after_dom_content_loaded(&p[0]))
            })
            .response("InjectScriptAfterDomIdle", Exact(1), |p| {
                Ok(response::inject_script_after_dom_idle(&p[0]))
            })
            .response("BlockThirdPartyScripts", Exact(0), |_| Ok(response::block_third_party_scripts()))
            .response("DeleteLocalStorageData", Exact(0), |_| Ok(response::delete_local_storage_data()))
            .response("DeleteSessionStorageData", Exact(0), |_| {
                Ok(response::delete_session_storage_data())
            })
            .response("BlockElementRemoval", Exact(1), |p| response::block_element_removal(&p[0]))
            .response("PatchDynamicResourceUrls", Exact(0), |_| {
                Ok(response::patch_dynamic_resource_urls())
            })
            .response("ModifyIncomingScriptsWithRegex", Exact(2), |p| {
                response::modify_incoming_scripts_with_regex(&p[0], &p[1])
            })
            .response("PatchTrackerScripts", Exact(0), |_| Ok(response::patch_tracker_scripts()))
            .response("PatchGoogleAnalytics", Exact(0), |_| Ok(response::patch_google_analytics()));

        catalog
    }

    pub fn request_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.request.keys().copied()
    }

    pub fn response_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.response.keys().copied()
    }

    /// Build request modifier `name` from `params`.
    pub fn build_request(
        &self,
        name: &str,
        params: &[String],
    ) -> Result<Arc<dyn RequestModifier>, CatalogError> {
        let entry = self
            .request
            .get(name)
            .ok_or_else(|| CatalogError::UnknownModifier {
                kind: ModifierKind::Request,
                name: name.to_string(),
            })?;
        check_arity(name, entry.arity, params)?;
        (entry.build)(params).map_err(|source| CatalogError::InvalidParam {
            name: name.to_string(),
            source,
        })
    }

    /// Build response modifier `name` from `params`.
    pub fn build_response(
        &self,
        name: &str,
        params: &[String],
    ) -> Result<Arc<dyn ResponseModifier>, CatalogError> {
        let entry = self
            .response
            .get(name)
            .ok_or_else(|| CatalogError::UnknownModifier {
                kind: ModifierKind::Response,
                name: name.to_string(),
            })?;
        check_arity(name, entry.arity, params)?;
        (entry.build)(params).map_err(|source| CatalogError::InvalidParam {
            name: name.to_string(),
            source,
        })
    }
}

fn check_arity(name: &str, arity: Arity, params: &[String]) -> Result<(), CatalogError> {
    if arity.accepts(params.len()) {
        Ok(())
    } else {
        Err(CatalogError::WrongArity {
            name: name.to_string(),
            expected: arity,
            got: params.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_every_builtin_builds_with_sample_params() {
        let catalog = ModifierCatalog::builtin();
        let sample = |arity: Arity| match arity {
            Arity::Exact(0) | Arity::Variadic => Vec::new(),
            Arity::Exact(n) => (0..n).map(|i| format!("x{}", i)).collect(),
        };
        for name in catalog.request_names() {
            let arity = catalog.request[name].arity;
            let built = catalog.build_request(name, &sample(arity)).unwrap();
            assert!(!built.name().is_empty());
        }
        for name in catalog.response_names() {
            let arity = catalog.response[name].arity;
            catalog.build_response(name, &sample(arity)).unwrap();
        }
        assert_eq!(catalog.request_names().count(), 32);
        assert_eq!(catalog.response_names().count(), 21);
    }

    #[test]
    fn test_unknown_name() {
        let catalog = ModifierCatalog::builtin();
        let err = catalog.build_request("RewriteHtmlResourceUrls", &[]).err().unwrap();
        assert!(matches!(err, CatalogError::UnknownModifier { kind: ModifierKind::Request, .. }));
        assert_eq!(err.to_string(), "unknown request modifier 'RewriteHtmlResourceUrls'");
    }

    #[test]
    fn test_wrong_arity() {
        let catalog = ModifierCatalog::builtin();
        let err = catalog
            .build_request("SetRequestHeader", &params(&["x-only-name"]))
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "modifier 'SetRequestHeader' takes 2 parameter(s), got 1"
        );
    }

    #[test]
    fn test_invalid_param_reported() {
        let catalog = ModifierCatalog::builtin();
        let err = catalog
            .build_request("ModifyPathWithRegex", &params(&["(", ""]))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            CatalogError::InvalidParam {
                source: ModifierError::InvalidRegex { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_variadic_accepts_any_count() {
        let catalog = ModifierCatalog::builtin();
        assert!(catalog
            .build_response("DeleteIncomingCookiesExcept", &params(&["a", "b", "c"]))
            .is_ok());
        assert!(catalog.build_request("DeleteOutgoingCookiesExcept", &[]).is_ok());
    }
}
