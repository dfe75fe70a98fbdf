//! Response modifiers that rewrite HTML documents.
//!
//! None of these touch the body directly. Each queues a token strategy on
//! the chain, and all queued strategies run in one streaming pass once the
//! response modifiers are done. Non-HTML responses are left alone.

use std::sync::Arc;

use crate::modifiers::js_string;
use crate::proxychain::{response_modifier, ModifierError, ProxyChain, ResponseModifier};
use crate::rewriter::{ExecTime, ScriptInjector, ThirdPartyScriptBlocker, UrlRewriter};

const BLOCK_ELEMENT_REMOVAL_JS: &str = include_str!("assets/block_element_removal.js");
const PATCH_DYNAMIC_RESOURCE_URLS_JS: &str = include_str!("assets/patch_dynamic_resource_urls.js");

/// Base URL and proxy origin for strategies that rewrite URLs.
fn document_base(chain: &ProxyChain) -> Result<(url::Url, String), ModifierError> {
    let base = chain.document_url().ok_or(ModifierError::NoResponse)?.clone();
    Ok((base, chain.proxy_origin()))
}

/// Route every resource URL in the document back through the proxy.
pub fn rewrite_html_resource_urls() -> Arc<dyn ResponseModifier> {
    response_modifier("RewriteHtmlResourceUrls", |chain| {
        if !chain.is_html_response() {
            return Ok(());
        }
        let (base, proxy_origin) = document_base(chain)?;
        chain.add_html_token_rewriter(Arc::new(UrlRewriter::new(base, proxy_origin)));
        Ok(())
    })
}

/// Disable `<script src>` elements loaded from another host.
pub fn block_third_party_scripts() -> Arc<dyn ResponseModifier> {
    response_modifier("BlockThirdPartyScripts", |chain| {
        if !chain.is_html_response() {
            return Ok(());
        }
        let (base, proxy_origin) = document_base(chain)?;
        chain.add_html_token_rewriter(Arc::new(ThirdPartyScriptBlocker::new(base, proxy_origin)));
        Ok(())
    })
}

/// Inject `script` into the document, run at `exec_time`.
pub fn inject_script(script: &str, exec_time: ExecTime) -> Arc<dyn ResponseModifier> {
    let injector = Arc::new(ScriptInjector::new(script, exec_time));
    let name = match exec_time {
        ExecTime::BeforeDomContentLoaded => "InjectScriptBeforeDomContentLoaded",
        ExecTime::AfterDomContentLoaded => "InjectScriptAfterDomContentLoaded",
        ExecTime::AfterDomIdle => "InjectScriptAfterDomIdle",
    };
    response_modifier(name, move |chain| {
        if chain.is_html_response() {
            chain.add_html_token_rewriter(injector.clone());
        }
        Ok(())
    })
}

pub fn inject_script_before_dom_content_loaded(script: &str) -> Arc<dyn ResponseModifier> {
    inject_script(script, ExecTime::BeforeDomContentLoaded)
}

pub fn inject_script_after_dom_content_loaded(script: &str) -> Arc<dyn ResponseModifier> {
    inject_script(script, ExecTime::AfterDomContentLoaded)
}

pub fn inject_script_after_dom_idle(script: &str) -> Arc<dyn ResponseModifier> {
    inject_script(script, ExecTime::AfterDomIdle)
}

/// Put back elements matching `selector` when page scripts remove them.
///
/// Useful when a page flashes its content and then swaps it for a paywall.
pub fn block_element_removal(selector: &str) -> Result<Arc<dyn ResponseModifier>, ModifierError> {
    if selector.trim().is_empty() {
        return Err(ModifierError::Other("empty CSS selector".into()));
    }
    let injector = Arc::new(ScriptInjector::with_params(
        BLOCK_ELEMENT_REMOVAL_JS,
        ExecTime::BeforeDomContentLoaded,
        &[("{{CSS_SELECTOR}}", &js_string(selector.trim()))],
    ));
    Ok(response_modifier("BlockElementRemoval", move |chain| {
        if chain.is_html_response() {
            chain.add_html_token_rewriter(injector.clone());
        }
        Ok(())
    }))
}

/// Route URLs built by page scripts through the proxy.
///
/// Hooks `fetch`, `XMLHttpRequest`, `sendBeacon`, service worker
/// registration and the URL-carrying element properties.
pub fn patch_dynamic_resource_urls() -> Arc<dyn ResponseModifier> {
    response_modifier("PatchDynamicResourceUrls", |chain| {
        if !chain.is_html_response() {
            return Ok(());
        }
        let (base, proxy_origin) = document_base(chain)?;
        let injector = ScriptInjector::with_params(
            PATCH_DYNAMIC_RESOURCE_URLS_JS,
            ExecTime::BeforeDomContentLoaded,
            &[
                ("{{PROXY_ORIGIN}}", &js_string(&proxy_origin)),
                ("{{BASE_URL}}", &js_string(base.as_str())),
            ],
        );
        chain.add_html_token_rewriter(Arc::new(injector));
        Ok(())
    })
}

fn clear_storage(name: &'static str, script: &'static str) -> Arc<dyn ResponseModifier> {
    response_modifier(name, move |chain| {
        chain.add_once_response_modifiers([
            inject_script_before_dom_content_loaded(script),
            inject_script_after_dom_content_loaded(script),
        ]);
        Ok(())
    })
}

/// Clear `localStorage` before and after the page scripts run.
pub fn delete_local_storage_data() -> Arc<dyn ResponseModifier> {
    clear_storage("DeleteLocalStorageData", "window.localStorage.clear()")
}

/// Clear `sessionStorage` before and after the page scripts run.
pub fn delete_session_storage_data() -> Arc<dyn ResponseModifier> {
    clear_storage("DeleteSessionStorageData", "window.sessionStorage.clear()")
}
