use std::collections::HashMap;

use case_insensitive_string::CaseInsensitiveString;

use crate::models::RegexMatchConfigs;
use crate::utils::http::ProxyConfig;

/// Per-request knobs threaded through `add_nodes`.
#[derive(Debug, Clone, Default)]
pub struct ParseSettings {
    /// Proxy used for fetching subscriptions.
    pub proxy: ProxyConfig,
    /// Cache TTL for fetched subscriptions, seconds.
    pub cache_ttl: u32,
    /// Remarks to include; empty means include everything.
    pub include_remarks: Vec<String>,
    /// Remarks to exclude.
    pub exclude_remarks: Vec<String>,
    /// Stream-accounting remark rules.
    pub stream_rules: RegexMatchConfigs,
    /// Expiry remark rules.
    pub time_rules: RegexMatchConfigs,
    /// Extra headers to send upstream.
    pub request_header: HashMap<CaseInsensitiveString, String>,
    /// Whether local paths and scripts may be touched.
    pub authorized: bool,
    /// Overrides the parsed port on every produced node.
    pub custom_port: Option<u16>,
    /// Subscription traffic info collected while parsing.
    pub sub_info: String,
}
