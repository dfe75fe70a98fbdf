//! Crawler impersonation.
//!
//! Many paywalls serve full articles to search-engine crawlers. These
//! modifiers present a crawler's user agent and source address and drop
//! the headers that would give the proxy away.

use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue};

use super::headers::{delete_header, set_header};
use super::user_agent::spoof_user_agent;
use crate::proxychain::{request_modifier, RequestModifier};

/// User agent and a source address from the crawler's published ranges.
#[derive(Debug, Clone, Copy)]
pub struct TrustedBot {
    pub name: &'static str,
    pub user_agent: &'static str,
    pub ip: &'static str,
}

pub const GOOGLE_BOT: TrustedBot = TrustedBot {
    name: "MasqueradeAsGoogleBot",
    user_agent: "Mozilla/5.0 AppleWebKit/537.36 (KHTML, like Gecko; compatible; Googlebot/2.1; http://www.google.com/bot.html) Chrome/79.0.3945.120 Safari/537.36",
    ip: "66.249.78.8",
};

pub const BING_BOT: TrustedBot = TrustedBot {
    name: "MasqueradeAsBingBot",
    user_agent: "Mozilla/5.0 AppleWebKit/537.36 (KHTML, like Gecko; compatible; bingbot/2.0; +http://www.bing.com/bingbot.htm) Chrome/79.0.3945.120 Safari/537.36",
    ip: "13.66.144.9",
};

pub const WAYBACK_MACHINE_BOT: TrustedBot = TrustedBot {
    name: "MasqueradeAsWaybackMachineBot",
    user_agent: "Mozilla/5.0 (compatible; archive.org_bot +http://www.archive.org/details/archive.org_bot)",
    ip: "207.241.235.164",
};

/// Present the request as coming from `bot`.
pub fn masquerade_as(bot: TrustedBot) -> Arc<dyn RequestModifier> {
    request_modifier(bot.name, move |chain| {
        chain.add_once_request_modifiers([
            spoof_user_agent(bot.user_agent)?,
            set_header(
                HeaderName::from_static("x-forwarded-for"),
                HeaderValue::from_static(bot.ip),
            ),
            delete_header(header::REFERER),
            delete_header(header::ORIGIN),
        ]);
        Ok(())
    })
}

pub fn masquerade_as_google_bot() -> Arc<dyn RequestModifier> {
    masquerade_as(GOOGLE_BOT)
}

pub fn masquerade_as_bing_bot() -> Arc<dyn RequestModifier> {
    masquerade_as(BING_BOT)
}

pub fn masquerade_as_wayback_machine_bot() -> Arc<dyn RequestModifier> {
    masquerade_as(WAYBACK_MACHINE_BOT)
}
