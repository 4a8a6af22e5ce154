//! Legacy INI preference loader.
//!
//! INI preferences are the backward-compatible shape of the YAML file; keys
//! that can repeat (`exclude_remarks`, `ruleset`, `custom_proxy_group`, …)
//! appear multiple times inside their section.

use crate::models::{
    proxy_groups_from_ini, regex_match_configs_from_list, rulesets_from_ini, RegexMatchConfig,
};
use crate::settings::Settings;
use crate::utils::ini_reader::IniReader;
use crate::utils::string::to_int;
use crate::utils::tribool::parse_tribool;

fn get_bool(ini: &IniReader, section: &str, key: &str, default: bool) -> bool {
    match ini.get(section, key).as_str() {
        "" => default,
        value => value == "true",
    }
}

/// Apply an INI preferences document on top of defaults.
pub fn load_ini_settings(content: &str, settings: &mut Settings) -> Result<(), String> {
    let mut ini = IniReader::new();
    ini.parse(content).map_err(|e| e.to_string())?;

    settings.api_mode = get_bool(&ini, "common", "api_mode", settings.api_mode);
    let token = ini.get("common", "api_access_token");
    if !token.is_empty() {
        settings.api_access_token = token;
    }
    let urls = ini.get_all("common", "default_url");
    if !urls.is_empty() {
        settings.default_urls = urls;
    }
    settings.enable_insert = get_bool(&ini, "common", "enable_insert", settings.enable_insert);
    let insert_urls = ini.get_all("common", "insert_url");
    if !insert_urls.is_empty() {
        settings.insert_urls = insert_urls;
    }
    settings.prepend_insert = get_bool(
        &ini,
        "common",
        "prepend_insert_url",
        settings.prepend_insert,
    );
    let excludes = ini.get_all("common", "exclude_remarks");
    if !excludes.is_empty() {
        settings.exclude_remarks = excludes;
    }
    let includes = ini.get_all("common", "include_remarks");
    if !includes.is_empty() {
        settings.include_remarks = includes;
    }
    let ext_conf = ini.get("common", "default_external_config");
    if !ext_conf.is_empty() {
        settings.default_ext_config = ext_conf;
    }
    let base_path = ini.get("common", "base_path");
    if !base_path.is_empty() {
        settings.base_path = base_path;
    }
    fn set_if_present(ini: &IniReader, key: &str, target: &mut String) {
        let value = ini.get("common", key);
        if !value.is_empty() {
            *target = value;
        }
    }
    set_if_present(&ini, "clash_rule_base", &mut settings.clash_base);
    set_if_present(&ini, "surge_rule_base", &mut settings.surge_base);
    set_if_present(&ini, "surfboard_rule_base", &mut settings.surfboard_base);
    set_if_present(&ini, "mellow_rule_base", &mut settings.mellow_base);
    set_if_present(&ini, "quan_rule_base", &mut settings.quan_base);
    set_if_present(&ini, "quanx_rule_base", &mut settings.quanx_base);
    set_if_present(&ini, "loon_rule_base", &mut settings.loon_base);
    set_if_present(&ini, "sssub_rule_base", &mut settings.ssub_base);
    let proxy_config = ini.get("common", "proxy_config");
    if !proxy_config.is_empty() {
        settings.proxy_config = proxy_config;
    }
    let proxy_ruleset = ini.get("common", "proxy_ruleset");
    if !proxy_ruleset.is_empty() {
        settings.proxy_ruleset = proxy_ruleset;
    }
    let proxy_subscription = ini.get("common", "proxy_subscription");
    if !proxy_subscription.is_empty() {
        settings.proxy_subscription = proxy_subscription;
    }
    settings.append_type = get_bool(&ini, "common", "append_proxy_type", settings.append_type);
    settings.reload_conf_on_request = get_bool(
        &ini,
        "common",
        "reload_conf_on_request",
        settings.reload_conf_on_request,
    );

    let stream_rules = ini.get_all("userinfo", "stream_rule");
    if !stream_rules.is_empty() {
        settings.stream_rules = regex_match_configs_from_list(&stream_rules, "|");
    }
    let time_rules = ini.get_all("userinfo", "time_rule");
    if !time_rules.is_empty() {
        settings.time_rules = regex_match_configs_from_list(&time_rules, "|");
    }

    settings.udp_flag = parse_tribool(&ini.get("node_pref", "udp_flag")).or(settings.udp_flag);
    settings.tfo_flag =
        parse_tribool(&ini.get("node_pref", "tcp_fast_open_flag")).or(settings.tfo_flag);
    settings.skip_cert_verify =
        parse_tribool(&ini.get("node_pref", "skip_cert_verify_flag")).or(settings.skip_cert_verify);
    settings.tls13_flag = parse_tribool(&ini.get("node_pref", "tls13_flag")).or(settings.tls13_flag);
    settings.enable_sort = get_bool(&ini, "node_pref", "sort_flag", settings.enable_sort);
    settings.filter_deprecated = get_bool(
        &ini,
        "node_pref",
        "filter_deprecated_nodes",
        settings.filter_deprecated,
    );
    settings.append_userinfo = get_bool(
        &ini,
        "node_pref",
        "append_sub_userinfo",
        settings.append_userinfo,
    );
    settings.clash_use_new_field = get_bool(
        &ini,
        "node_pref",
        "clash_use_new_field_name",
        settings.clash_use_new_field,
    );
    let renames = ini.get_all("node_pref", "rename_node");
    if !renames.is_empty() {
        settings.renames = regex_match_configs_from_list(&renames, "@");
    }

    settings.write_managed_config = get_bool(
        &ini,
        "managed_config",
        "write_managed_config",
        settings.write_managed_config,
    );
    let prefix = ini.get("managed_config", "managed_config_prefix");
    if !prefix.is_empty() {
        settings.managed_config_prefix = prefix;
    }
    let interval = ini.get("managed_config", "config_update_interval");
    if !interval.is_empty() {
        settings.update_interval = to_int(&interval, settings.update_interval);
    }
    settings.update_strict = get_bool(
        &ini,
        "managed_config",
        "config_update_strict",
        settings.update_strict,
    );
    let dev_id = ini.get("managed_config", "quanx_device_id");
    if !dev_id.is_empty() {
        settings.quanx_dev_id = dev_id;
    }

    let ssr_path = ini.get("surge_external_proxy", "surge_ssr_path");
    if !ssr_path.is_empty() {
        settings.surge_ssr_path = ssr_path;
    }
    settings.surge_resolve_hostname = get_bool(
        &ini,
        "surge_external_proxy",
        "resolve_hostname",
        settings.surge_resolve_hostname,
    );

    settings.add_emoji = get_bool(&ini, "emojis", "add_emoji", settings.add_emoji);
    settings.remove_emoji = get_bool(&ini, "emojis", "remove_old_emoji", settings.remove_emoji);
    let emoji_rules = ini.get_all("emojis", "rule");
    if !emoji_rules.is_empty() {
        // the match pattern may itself contain commas, the emoji cannot
        settings.emojis = emoji_rules
            .iter()
            .filter_map(|line| {
                line.rsplit_once(',')
                    .map(|(m, e)| RegexMatchConfig::new(m, e))
            })
            .collect();
    }

    settings.enable_rule_gen = get_bool(&ini, "ruleset", "enabled", settings.enable_rule_gen);
    settings.overwrite_original_rules = get_bool(
        &ini,
        "ruleset",
        "overwrite_original_rules",
        settings.overwrite_original_rules,
    );
    settings.update_ruleset_on_request = get_bool(
        &ini,
        "ruleset",
        "update_ruleset_on_request",
        settings.update_ruleset_on_request,
    );
    let rulesets = ini.get_all("ruleset", "ruleset");
    if !rulesets.is_empty() {
        settings.custom_rulesets = rulesets_from_ini(&rulesets);
    }

    let groups = ini.get_all("proxy_group", "custom_proxy_group");
    if !groups.is_empty() {
        settings.custom_proxy_groups = proxy_groups_from_ini(&groups);
    }

    let template_path = ini.get("template", "template_path");
    if !template_path.is_empty() {
        settings.template_path = template_path;
    }
    for (key, value) in ini.get_items("template") {
        if key != "template_path" && key != crate::utils::ini_reader::NONAME {
            settings.template_vars.insert(key, value);
        }
    }

    let listen = ini.get("server", "listen");
    if !listen.is_empty() {
        settings.listen_address = listen;
    }
    let port = ini.get("server", "port");
    if !port.is_empty() {
        settings.listen_port = to_int(&port, settings.listen_port);
    }

    let max_pending = ini.get("advanced", "max_pending_connections");
    if !max_pending.is_empty() {
        settings.max_pending_conns = to_int(&max_pending, settings.max_pending_conns);
    }
    let max_threads = ini.get("advanced", "max_concurrent_threads");
    if !max_threads.is_empty() {
        settings.max_concur_threads = to_int(&max_threads, settings.max_concur_threads);
    }
    // canonical name first, then the legacy alias
    let max_rules = {
        let canonical = ini.get("advanced", "max_allowed_rules");
        if canonical.is_empty() {
            ini.get("advanced", "max_rule_count")
        } else {
            canonical
        }
    };
    if !max_rules.is_empty() {
        settings.max_allowed_rules = to_int(&max_rules, settings.max_allowed_rules);
    }
    if !get_bool(&ini, "advanced", "enable_cache", true) {
        settings.cache_subscription = 0;
        settings.cache_config = 0;
        settings.cache_ruleset = 0;
    } else {
        let cache_sub = ini.get("advanced", "cache_subscription");
        if !cache_sub.is_empty() {
            settings.cache_subscription = to_int(&cache_sub, settings.cache_subscription);
        }
        let cache_conf = ini.get("advanced", "cache_config");
        if !cache_conf.is_empty() {
            settings.cache_config = to_int(&cache_conf, settings.cache_config);
        }
        let cache_ruleset = ini.get("advanced", "cache_ruleset");
        if !cache_ruleset.is_empty() {
            settings.cache_ruleset = to_int(&cache_ruleset, settings.cache_ruleset);
        }
    }
    settings.async_fetch_ruleset = get_bool(
        &ini,
        "advanced",
        "async_fetch_ruleset",
        settings.async_fetch_ruleset,
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_ini_settings() {
        let content = r#"
[common]
api_mode=true
api_access_token=secret
default_url=https://example.com/sub
exclude_remarks=(到期|剩余)
exclude_remarks=^EXPIRE
clash_rule_base=base/all_base.tpl

[node_pref]
udp_flag=true
clash_use_new_field_name=true

[managed_config]
write_managed_config=true
managed_config_prefix=http://127.0.0.1:25500

[ruleset]
enabled=true
ruleset=Direct,[]GEOIP,CN
ruleset=Proxy,https://example.com/rules.list,86400

[proxy_group]
custom_proxy_group=Proxy`select`[]DIRECT`.*

[server]
listen=0.0.0.0
port=25500

[advanced]
max_rule_count=1500
"#;
        let mut settings = Settings::default();
        load_ini_settings(content, &mut settings).unwrap();
        assert!(settings.api_mode);
        assert_eq!(settings.api_access_token, "secret");
        assert_eq!(settings.exclude_remarks.len(), 2);
        assert_eq!(settings.custom_rulesets.len(), 2);
        assert_eq!(settings.custom_rulesets[0].url, "[]GEOIP,CN");
        assert_eq!(settings.custom_rulesets[1].interval, 86400);
        assert_eq!(settings.custom_proxy_groups.len(), 1);
        assert_eq!(settings.listen_port, 25500);
        assert_eq!(settings.udp_flag, Some(true));
        // alias accepted for the rule cap
        assert_eq!(settings.max_allowed_rules, 1500);
    }
}
