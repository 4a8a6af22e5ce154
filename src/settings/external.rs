//! External per-request configuration (`config=` query parameter).

use std::collections::HashMap;

use serde::Deserialize;

use crate::models::{
    proxy_groups_from_ini, regex_match_configs_from_list, rulesets_from_ini, ProxyGroupConfigs,
    RegexMatchConfig, RegexMatchConfigs, RulesetConfigs, SubError, SubResult,
};
use crate::utils::http::{fetch_file, ProxyConfig};
use crate::utils::ini_reader::IniReader;

#[derive(Debug, Clone, Default)]
pub struct ExternalSettings {
    pub clash_rule_base: String,
    pub surge_rule_base: String,
    pub surfboard_rule_base: String,
    pub mellow_rule_base: String,
    pub quan_rule_base: String,
    pub quanx_rule_base: String,
    pub loon_rule_base: String,
    pub sssub_rule_base: String,
    pub custom_rulesets: RulesetConfigs,
    pub custom_proxy_groups: ProxyGroupConfigs,
    pub rename_nodes: RegexMatchConfigs,
    pub emojis: RegexMatchConfigs,
    pub include_remarks: Vec<String>,
    pub exclude_remarks: Vec<String>,
    pub add_emoji: Option<bool>,
    pub remove_old_emoji: Option<bool>,
    pub enable_rule_generator: Option<bool>,
    pub overwrite_original_rules: Option<bool>,
    pub tpl_args: HashMap<String, String>,
}

/// YAML shape of an external config (top-level `custom:` section).
#[derive(Debug, Clone, Deserialize, Default)]
struct YamlExternalCustom {
    #[serde(default)]
    clash_rule_base: String,
    #[serde(default)]
    surge_rule_base: String,
    #[serde(default)]
    surfboard_rule_base: String,
    #[serde(default)]
    mellow_rule_base: String,
    #[serde(default)]
    quan_rule_base: String,
    #[serde(default)]
    quanx_rule_base: String,
    #[serde(default)]
    loon_rule_base: String,
    #[serde(default)]
    sssub_rule_base: String,
    #[serde(default, alias = "surge_ruleset")]
    rulesets: Vec<super::yaml_settings::RulesetEntry>,
    #[serde(default)]
    custom_proxy_group: Vec<super::yaml_settings::ProxyGroupEntry>,
    #[serde(default)]
    rename_node: Vec<RegexMatchConfig>,
    #[serde(default)]
    emojis: Vec<RegexMatchConfig>,
    #[serde(default)]
    include_remarks: Vec<String>,
    #[serde(default)]
    exclude_remarks: Vec<String>,
    #[serde(default)]
    add_emoji: Option<bool>,
    #[serde(default)]
    remove_old_emoji: Option<bool>,
    #[serde(default)]
    enable_rule_generator: Option<bool>,
    #[serde(default)]
    overwrite_original_rules: Option<bool>,
    #[serde(default)]
    tpl_args: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct YamlExternal {
    #[serde(default)]
    custom: YamlExternalCustom,
}

impl ExternalSettings {
    /// Load an external config from a URL or local path (authorization
    /// gates local paths), sniffing YAML against legacy INI.
    pub fn load(
        path: &str,
        proxy: &ProxyConfig,
        cache_ttl: u32,
        authorized: bool,
    ) -> SubResult<Self> {
        let content = fetch_file(path, proxy, cache_ttl, authorized)?;
        Self::load_from_content(&content)
    }

    pub fn load_from_content(content: &str) -> SubResult<Self> {
        if content.contains("custom:") {
            let parsed: YamlExternal = serde_yaml::from_str(content)
                .map_err(|e| SubError::Config(format!("invalid external config: {}", e)))?;
            let custom = parsed.custom;
            return Ok(ExternalSettings {
                clash_rule_base: custom.clash_rule_base,
                surge_rule_base: custom.surge_rule_base,
                surfboard_rule_base: custom.surfboard_rule_base,
                mellow_rule_base: custom.mellow_rule_base,
                quan_rule_base: custom.quan_rule_base,
                quanx_rule_base: custom.quanx_rule_base,
                loon_rule_base: custom.loon_rule_base,
                sssub_rule_base: custom.sssub_rule_base,
                custom_rulesets: custom.rulesets.iter().map(|r| r.to_config()).collect(),
                custom_proxy_groups: super::groups_from_entries(&custom.custom_proxy_group),
                rename_nodes: custom.rename_node,
                emojis: custom.emojis,
                include_remarks: custom.include_remarks,
                exclude_remarks: custom.exclude_remarks,
                add_emoji: custom.add_emoji,
                remove_old_emoji: custom.remove_old_emoji,
                enable_rule_generator: custom.enable_rule_generator,
                overwrite_original_rules: custom.overwrite_original_rules,
                tpl_args: custom.tpl_args,
            });
        }

        // legacy INI with a [custom] section
        let mut ini = IniReader::new();
        ini.parse(content)
            .map_err(|e| SubError::Config(format!("invalid external config: {}", e)))?;
        let mut settings = ExternalSettings::default();

        settings.clash_rule_base = ini.get("custom", "clash_rule_base");
        settings.surge_rule_base = ini.get("custom", "surge_rule_base");
        settings.surfboard_rule_base = ini.get("custom", "surfboard_rule_base");
        settings.mellow_rule_base = ini.get("custom", "mellow_rule_base");
        settings.quan_rule_base = ini.get("custom", "quan_rule_base");
        settings.quanx_rule_base = ini.get("custom", "quanx_rule_base");
        settings.loon_rule_base = ini.get("custom", "loon_rule_base");
        settings.sssub_rule_base = ini.get("custom", "sssub_rule_base");

        let rulesets = ini.get_all("custom", "ruleset");
        if !rulesets.is_empty() {
            settings.custom_rulesets = rulesets_from_ini(&rulesets);
        }
        let groups = ini.get_all("custom", "custom_proxy_group");
        if !groups.is_empty() {
            settings.custom_proxy_groups = proxy_groups_from_ini(&groups);
        }
        let renames = ini.get_all("custom", "rename_node");
        if !renames.is_empty() {
            settings.rename_nodes = regex_match_configs_from_list(&renames, "@");
        }
        let emoji_rules = ini.get_all("custom", "emoji");
        if !emoji_rules.is_empty() {
            settings.emojis = emoji_rules
                .iter()
                .filter_map(|line| {
                    line.rsplit_once(',')
                        .map(|(m, e)| RegexMatchConfig::new(m, e))
                })
                .collect();
        }
        settings.include_remarks = ini.get_all("custom", "include_remarks");
        settings.exclude_remarks = ini.get_all("custom", "exclude_remarks");
        match ini.get("custom", "add_emoji").as_str() {
            "" => {}
            value => settings.add_emoji = Some(value == "true"),
        }
        match ini.get("custom", "remove_old_emoji").as_str() {
            "" => {}
            value => settings.remove_old_emoji = Some(value == "true"),
        }
        match ini.get("custom", "enable_rule_generator").as_str() {
            "" => {}
            value => settings.enable_rule_generator = Some(value == "true"),
        }
        match ini.get("custom", "overwrite_original_rules").as_str() {
            "" => {}
            value => settings.overwrite_original_rules = Some(value == "true"),
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProxyGroupType;

    #[test]
    fn test_load_yaml_external() {
        let content = r#"
custom:
  clash_rule_base: base/custom_clash.tpl
  rulesets:
    - {group: Proxy, ruleset: "https://example.com/rules.list"}
  custom_proxy_group:
    - name: Pick
      type: select
      rule: ["[]DIRECT", ".*"]
  exclude_remarks: ["^EXPIRE"]
  overwrite_original_rules: true
"#;
        let settings = ExternalSettings::load_from_content(content).unwrap();
        assert_eq!(settings.clash_rule_base, "base/custom_clash.tpl");
        assert_eq!(settings.custom_rulesets.len(), 1);
        assert_eq!(settings.custom_proxy_groups.len(), 1);
        assert_eq!(
            settings.custom_proxy_groups[0].group_type,
            ProxyGroupType::Select
        );
        assert_eq!(settings.overwrite_original_rules, Some(true));
    }

    #[test]
    fn test_load_ini_external() {
        let content = r#"
[custom]
clash_rule_base=base/custom_clash.tpl
ruleset=Direct,[]GEOIP,CN
custom_proxy_group=Pick`select`.*
enable_rule_generator=false
"#;
        let settings = ExternalSettings::load_from_content(content).unwrap();
        assert_eq!(settings.clash_rule_base, "base/custom_clash.tpl");
        assert_eq!(settings.custom_rulesets[0].url, "[]GEOIP,CN");
        assert_eq!(settings.custom_proxy_groups[0].name, "Pick");
        assert_eq!(settings.enable_rule_generator, Some(false));
    }

    #[test]
    fn test_load_invalid_external() {
        assert!(ExternalSettings::load_from_content("custom:\n  - [broken").is_err());
    }
}
