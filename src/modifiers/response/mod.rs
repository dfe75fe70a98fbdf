//! Response modifiers: edits applied after the upstream responded.

pub mod cookies;
pub mod headers;
pub mod html;
pub mod scripts;

pub use cookies::{delete_incoming_cookies, delete_incoming_cookies_except, set_incoming_cookie};
pub use headers::{
    bypass_content_security_policy, bypass_cors, delete_response_header, forward_response_headers,
    set_content_security_policy, set_response_header,
};
pub use html::{
    block_element_removal, block_third_party_scripts, delete_local_storage_data,
    delete_session_storage_data, inject_script, inject_script_after_dom_content_loaded,
    inject_script_after_dom_idle, inject_script_before_dom_content_loaded,
    patch_dynamic_resource_urls, rewrite_html_resource_urls,
};
pub use scripts::{
    modify_incoming_scripts_with_regex, patch_google_analytics, patch_tracker_scripts,
};
