use super::RegexMatchConfigs;

/// Settings for subscription export operations
#[derive(Debug, Clone)]
pub struct ExtraSettings {
    /// Whether to enable the rule generator
    pub enable_rule_generator: bool,
    /// Whether to overwrite original rules
    pub overwrite_original_rules: bool,
    /// Rename operations to apply
    pub rename_array: RegexMatchConfigs,
    /// Emoji operations to apply
    pub emoji_array: RegexMatchConfigs,
    /// Whether to add emoji
    pub add_emoji: bool,
    /// Whether to remove emoji
    pub remove_emoji: bool,
    /// Whether to append proxy type
    pub append_proxy_type: bool,
    /// Whether to output as node list
    pub nodelist: bool,
    /// Whether to sort nodes
    pub sort_flag: bool,
    /// Whether to filter deprecated nodes
    pub filter_deprecated: bool,
    /// Whether to use new field names in Clash
    pub clash_new_field_name: bool,
    /// Path to Surge SSR binary
    pub surge_ssr_path: String,
    /// Whether to resolve hostnames for Surge external SSR entries
    pub surge_resolve_hostname: bool,
    /// Prefix for managed configs
    pub managed_config_prefix: String,
    /// QuantumultX device ID
    pub quanx_dev_id: String,
    /// UDP support flag
    pub udp: Option<bool>,
    /// TCP Fast Open support flag
    pub tfo: Option<bool>,
    /// Skip certificate verification flag
    pub skip_cert_verify: Option<bool>,
    /// TLS 1.3 support flag
    pub tls13: Option<bool>,
    /// Script for sorting nodes (parsed but not executed; scripting is disabled)
    pub sort_script: String,
    /// Upper bound on emitted rules across all rulesets, 0 = unlimited
    pub max_allowed_rules: usize,
    /// Whether the export is authorized
    pub authorized: bool,
}

impl Default for ExtraSettings {
    fn default() -> Self {
        ExtraSettings {
            enable_rule_generator: true,
            overwrite_original_rules: true,
            rename_array: Vec::new(),
            emoji_array: Vec::new(),
            add_emoji: false,
            remove_emoji: false,
            append_proxy_type: false,
            nodelist: false,
            sort_flag: false,
            filter_deprecated: false,
            clash_new_field_name: true,
            surge_ssr_path: String::new(),
            surge_resolve_hostname: false,
            managed_config_prefix: String::new(),
            quanx_dev_id: String::new(),
            udp: None,
            tfo: None,
            skip_cert_verify: None,
            tls13: None,
            sort_script: String::new(),
            max_allowed_rules: 0,
            authorized: false,
        }
    }
}
