//! Serde mirror of the YAML preference file.

use serde::Deserialize;
use std::collections::HashMap;

use crate::models::{RegexMatchConfig, RulesetConfig};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommonSettings {
    #[serde(default)]
    pub api_mode: bool,
    #[serde(default)]
    pub api_access_token: String,
    #[serde(default)]
    pub default_url: Vec<String>,
    #[serde(default)]
    pub enable_insert: bool,
    #[serde(default)]
    pub insert_url: Vec<String>,
    #[serde(default = "default_true")]
    pub prepend_insert_url: bool,
    #[serde(default)]
    pub exclude_remarks: Vec<String>,
    #[serde(default)]
    pub include_remarks: Vec<String>,
    #[serde(default)]
    pub default_external_config: String,
    #[serde(default)]
    pub base_path: String,
    #[serde(default)]
    pub clash_rule_base: String,
    #[serde(default)]
    pub surge_rule_base: String,
    #[serde(default)]
    pub surfboard_rule_base: String,
    #[serde(default)]
    pub mellow_rule_base: String,
    #[serde(default)]
    pub quan_rule_base: String,
    #[serde(default)]
    pub quanx_rule_base: String,
    #[serde(default)]
    pub loon_rule_base: String,
    #[serde(default)]
    pub sssub_rule_base: String,
    #[serde(default)]
    pub proxy_config: String,
    #[serde(default)]
    pub proxy_ruleset: String,
    #[serde(default)]
    pub proxy_subscription: String,
    #[serde(default)]
    pub append_proxy_type: bool,
    #[serde(default)]
    pub reload_conf_on_request: bool,
}

// manual impls so an absent section keeps the same defaults serde applies to
// absent fields
impl Default for CommonSettings {
    fn default() -> Self {
        serde_yaml::from_str("{}").unwrap()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UserInfoSettings {
    #[serde(default)]
    pub stream_rule: Vec<RegexMatchConfig>,
    #[serde(default)]
    pub time_rule: Vec<RegexMatchConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodePrefSettings {
    #[serde(default)]
    pub udp_flag: Option<bool>,
    #[serde(default)]
    pub tcp_fast_open_flag: Option<bool>,
    #[serde(default)]
    pub skip_cert_verify_flag: Option<bool>,
    #[serde(default)]
    pub tls13_flag: Option<bool>,
    #[serde(default)]
    pub sort_flag: bool,
    #[serde(default)]
    pub filter_deprecated_nodes: bool,
    #[serde(default = "default_true")]
    pub append_sub_userinfo: bool,
    #[serde(default = "default_true")]
    pub clash_use_new_field_name: bool,
    #[serde(default)]
    pub rename_node: Vec<RegexMatchConfig>,
}

impl Default for NodePrefSettings {
    fn default() -> Self {
        serde_yaml::from_str("{}").unwrap()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManagedConfigSettings {
    #[serde(default = "default_true")]
    pub write_managed_config: bool,
    #[serde(default)]
    pub managed_config_prefix: String,
    #[serde(default)]
    pub config_update_interval: u32,
    #[serde(default)]
    pub config_update_strict: bool,
    #[serde(default)]
    pub quanx_device_id: String,
}

impl Default for ManagedConfigSettings {
    fn default() -> Self {
        serde_yaml::from_str("{}").unwrap()
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SurgeExternalProxySettings {
    #[serde(default)]
    pub surge_ssr_path: String,
    #[serde(default)]
    pub resolve_hostname: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmojiSettings {
    #[serde(default)]
    pub add_emoji: bool,
    #[serde(default = "default_true")]
    pub remove_old_emoji: bool,
    #[serde(default)]
    pub rules: Vec<RegexMatchConfig>,
}

impl Default for EmojiSettings {
    fn default() -> Self {
        serde_yaml::from_str("{}").unwrap()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RulesetEntry {
    pub group: String,
    #[serde(default, alias = "rule")]
    pub ruleset: String,
    #[serde(default)]
    pub interval: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RulesetSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub overwrite_original_rules: bool,
    #[serde(default)]
    pub update_ruleset_on_request: bool,
    #[serde(default, alias = "surge_ruleset")]
    pub rulesets: Vec<RulesetEntry>,
}

impl Default for RulesetSettings {
    fn default() -> Self {
        serde_yaml::from_str("{}").unwrap()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyGroupEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub group_type: String,
    #[serde(default)]
    pub rule: Vec<String>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub interval: u32,
    #[serde(default)]
    pub timeout: u32,
    #[serde(default)]
    pub tolerance: u32,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProxyGroupSettings {
    #[serde(default)]
    pub custom_proxy_group: Vec<ProxyGroupEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateVariable {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TemplateSettings {
    #[serde(default)]
    pub template_path: String,
    #[serde(default)]
    pub globals: Vec<TemplateVariable>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ServerSettings {
    #[serde(default)]
    pub listen: String,
    #[serde(default)]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvancedSettings {
    #[serde(default)]
    pub max_pending_connections: u32,
    #[serde(default)]
    pub max_concurrent_threads: u32,
    #[serde(default, alias = "max_rule_count")]
    pub max_allowed_rules: usize,
    #[serde(default = "default_true")]
    pub enable_cache: bool,
    #[serde(default)]
    pub cache_subscription: u32,
    #[serde(default)]
    pub cache_config: u32,
    #[serde(default)]
    pub cache_ruleset: u32,
    #[serde(default)]
    pub async_fetch_ruleset: bool,
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        serde_yaml::from_str("{}").unwrap()
    }
}

/// Top-level YAML preferences document.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct YamlSettings {
    #[serde(default)]
    pub common: CommonSettings,
    #[serde(default)]
    pub userinfo: UserInfoSettings,
    #[serde(default)]
    pub node_pref: NodePrefSettings,
    #[serde(default)]
    pub managed_config: ManagedConfigSettings,
    #[serde(default)]
    pub surge_external_proxy: SurgeExternalProxySettings,
    #[serde(default)]
    pub emojis: EmojiSettings,
    #[serde(default)]
    pub rulesets: RulesetSettings,
    #[serde(default)]
    pub proxy_groups: ProxyGroupSettings,
    #[serde(default)]
    pub template: TemplateSettings,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub advanced: AdvancedSettings,
}

impl RulesetEntry {
    pub fn to_config(&self) -> RulesetConfig {
        RulesetConfig {
            group: self.group.clone(),
            url: self.ruleset.clone(),
            interval: self.interval,
        }
    }
}

pub fn template_globals_to_map(globals: &[TemplateVariable]) -> HashMap<String, String> {
    globals
        .iter()
        .map(|v| (v.key.clone(), v.value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_yaml() {
        let content = r#"
common:
  api_mode: true
  api_access_token: secret
  default_url:
    - https://example.com/sub
server:
  listen: 0.0.0.0
  port: 25500
advanced:
  max_rule_count: 1500
"#;
        let settings: YamlSettings = serde_yaml::from_str(content).unwrap();
        assert!(settings.common.api_mode);
        assert_eq!(settings.common.api_access_token, "secret");
        assert_eq!(settings.server.port, 25500);
        // legacy alias for the rule cap
        assert_eq!(settings.advanced.max_allowed_rules, 1500);
    }

    #[test]
    fn test_parse_rulesets_and_groups() {
        let content = r#"
rulesets:
  enabled: true
  rulesets:
    - {group: Proxy, ruleset: "https://example.com/rules.list", interval: 86400}
    - {group: Direct, rule: "[]FINAL"}
proxy_groups:
  custom_proxy_group:
    - name: Auto
      type: url-test
      rule:
        - ".*"
      url: http://www.gstatic.com/generate_204
      interval: 300
"#;
        let settings: YamlSettings = serde_yaml::from_str(content).unwrap();
        assert_eq!(settings.rulesets.rulesets.len(), 2);
        assert_eq!(settings.rulesets.rulesets[1].ruleset, "[]FINAL");
        assert_eq!(settings.proxy_groups.custom_proxy_group.len(), 1);
        assert_eq!(settings.proxy_groups.custom_proxy_group[0].interval, 300);
    }

    #[test]
    fn test_parse_emoji_rules_alias() {
        let content = r#"
emojis:
  add_emoji: true
  rules:
    - {match: "(?i)japan", emoji: "🇯🇵"}
"#;
        let settings: YamlSettings = serde_yaml::from_str(content).unwrap();
        assert_eq!(settings.emojis.rules[0].replace, "🇯🇵");
    }
}
