//! Host environment helpers.

use std::env;

/// Detect the system proxy from the conventional environment variables.
/// Returns an empty string when none is set.
pub fn get_system_proxy() -> String {
    for key in [
        "ALL_PROXY",
        "all_proxy",
        "HTTPS_PROXY",
        "https_proxy",
        "HTTP_PROXY",
        "http_proxy",
    ] {
        if let Ok(value) = env::var(key) {
            if !value.is_empty() {
                return value;
            }
        }
    }
    String::new()
}
