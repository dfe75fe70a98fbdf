//! Request modifiers: edits applied to the outbound request before dispatch.

pub mod archives;
pub mod bots;
pub mod cookies;
pub mod dns;
pub mod headers;
pub mod referrer;
pub mod target;
pub mod user_agent;

pub use archives::{request_archive_is, request_google_cache, request_wayback_machine};
pub use bots::{masquerade_as_bing_bot, masquerade_as_google_bot, masquerade_as_wayback_machine_bot};
pub use cookies::{
    delete_outgoing_cookie, delete_outgoing_cookies, delete_outgoing_cookies_except,
    set_outgoing_cookie,
};
pub use dns::resolve_with_google_doh;
pub use headers::{
    delete_request_header, forward_request_headers, hide_origin, set_request_header, spoof_origin,
    spoof_x_forwarded_for,
};
pub use referrer::{
    hide_referrer, spoof_referrer, spoof_referrer_from_baidu_search,
    spoof_referrer_from_bing_search, spoof_referrer_from_google_search,
    spoof_referrer_from_pinterest_post, spoof_referrer_from_reddit_post,
    spoof_referrer_from_twitter_post, spoof_referrer_from_vkontakte_post,
    spoof_referrer_from_weibo_post,
};
pub use target::{
    add_cache_buster_query, modify_domain_with_regex, modify_path_with_regex, modify_query_params,
};
pub use user_agent::spoof_user_agent;
