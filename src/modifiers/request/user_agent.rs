//! User-agent spoofing on the wire and in the page.

use std::sync::Arc;

use axum::http::header;

use crate::modifiers::js_string;
use crate::modifiers::response::html::inject_script;
use crate::proxychain::{header_value, request_modifier, ModifierError, RequestModifier};
use crate::rewriter::ExecTime;

const SPOOF_USER_AGENT_JS: &str = include_str!("assets/spoof_user_agent.js");
const USER_AGENT_SLOT: &str = "'{{USER_AGENT}}'";

/// Send `ua` as the `User-Agent` and patch `navigator` to report it too.
pub fn spoof_user_agent(ua: &str) -> Result<Arc<dyn RequestModifier>, ModifierError> {
    let value = header_value(ua)?;
    let script = SPOOF_USER_AGENT_JS.replacen(USER_AGENT_SLOT, &js_string(ua), 1);
    Ok(request_modifier("SpoofUserAgent", move |chain| {
        chain
            .request_mut()?
            .headers
            .insert(header::USER_AGENT, value.clone());
        chain.add_once_response_modifiers([inject_script(
            &script,
            ExecTime::BeforeDomContentLoaded,
        )]);
        Ok(())
    }))
}
