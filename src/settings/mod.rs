//! Process-wide configuration with atomic snapshot swaps.
//!
//! Workers call `Settings::current()` once per request and keep the returned
//! `Arc` for the whole request; the reloader swaps the global behind an
//! `RwLock` so readers never observe a half-applied config.

pub mod external;
pub mod ini_settings;
pub mod yaml_settings;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

use log::{error, info};

use crate::models::{
    ProxyGroupConfig, ProxyGroupConfigs, ProxyGroupType, RegexMatchConfigs, RulesetConfigs,
    RulesetContent,
};
use crate::rulesets::refresh_rulesets;
use crate::utils::file::file_get;
use crate::utils::http::{parse_proxy, web_get};

pub use external::ExternalSettings;
pub use ini_settings::load_ini_settings;
pub use yaml_settings::{template_globals_to_map, ProxyGroupEntry, YamlSettings};

/// Settings structure to hold global configuration
#[derive(Debug, Clone)]
pub struct Settings {
    pub pref_path: String,

    pub api_mode: bool,
    pub api_access_token: String,
    pub default_urls: Vec<String>,
    pub insert_urls: Vec<String>,
    pub enable_insert: bool,
    pub prepend_insert: bool,
    pub exclude_remarks: Vec<String>,
    pub include_remarks: Vec<String>,
    pub default_ext_config: String,
    pub base_path: String,
    pub reload_conf_on_request: bool,

    pub clash_base: String,
    pub surge_base: String,
    pub surfboard_base: String,
    pub mellow_base: String,
    pub quan_base: String,
    pub quanx_base: String,
    pub loon_base: String,
    pub ssub_base: String,

    pub proxy_config: String,
    pub proxy_ruleset: String,
    pub proxy_subscription: String,

    pub stream_rules: RegexMatchConfigs,
    pub time_rules: RegexMatchConfigs,
    pub renames: RegexMatchConfigs,
    pub emojis: RegexMatchConfigs,
    pub add_emoji: bool,
    pub remove_emoji: bool,
    pub append_type: bool,
    pub filter_deprecated: bool,
    pub append_userinfo: bool,
    pub enable_sort: bool,
    pub clash_use_new_field: bool,

    pub udp_flag: Option<bool>,
    pub tfo_flag: Option<bool>,
    pub skip_cert_verify: Option<bool>,
    pub tls13_flag: Option<bool>,

    pub write_managed_config: bool,
    pub managed_config_prefix: String,
    pub update_interval: u32,
    pub update_strict: bool,
    pub quanx_dev_id: String,

    pub surge_ssr_path: String,
    pub surge_resolve_hostname: bool,

    pub enable_rule_gen: bool,
    pub overwrite_original_rules: bool,
    pub update_ruleset_on_request: bool,
    pub async_fetch_ruleset: bool,
    pub custom_rulesets: RulesetConfigs,
    pub custom_proxy_groups: ProxyGroupConfigs,
    /// Startup-resolved ruleset bodies shared across worker snapshots.
    pub rulesets_content: Vec<RulesetContent>,

    pub template_path: String,
    pub template_vars: HashMap<String, String>,

    pub listen_address: String,
    pub listen_port: u16,
    pub max_pending_conns: u32,
    pub max_concur_threads: u32,

    pub max_allowed_rules: usize,
    pub cache_subscription: u32,
    pub cache_config: u32,
    pub cache_ruleset: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            pref_path: String::new(),
            api_mode: false,
            api_access_token: String::new(),
            default_urls: Vec::new(),
            insert_urls: Vec::new(),
            enable_insert: false,
            prepend_insert: true,
            exclude_remarks: Vec::new(),
            include_remarks: Vec::new(),
            default_ext_config: String::new(),
            base_path: "base".to_string(),
            reload_conf_on_request: false,
            clash_base: String::new(),
            surge_base: String::new(),
            surfboard_base: String::new(),
            mellow_base: String::new(),
            quan_base: String::new(),
            quanx_base: String::new(),
            loon_base: String::new(),
            ssub_base: String::new(),
            proxy_config: String::new(),
            proxy_ruleset: String::new(),
            proxy_subscription: String::new(),
            stream_rules: Vec::new(),
            time_rules: Vec::new(),
            renames: Vec::new(),
            emojis: Vec::new(),
            add_emoji: false,
            remove_emoji: true,
            append_type: false,
            filter_deprecated: false,
            append_userinfo: true,
            enable_sort: false,
            clash_use_new_field: true,
            udp_flag: None,
            tfo_flag: None,
            skip_cert_verify: None,
            tls13_flag: None,
            write_managed_config: false,
            managed_config_prefix: String::new(),
            update_interval: 86400,
            update_strict: false,
            quanx_dev_id: String::new(),
            surge_ssr_path: String::new(),
            surge_resolve_hostname: false,
            enable_rule_gen: true,
            overwrite_original_rules: false,
            update_ruleset_on_request: false,
            async_fetch_ruleset: false,
            custom_rulesets: Vec::new(),
            custom_proxy_groups: Vec::new(),
            rulesets_content: Vec::new(),
            template_path: "template".to_string(),
            template_vars: HashMap::new(),
            listen_address: "127.0.0.1".to_string(),
            listen_port: 25500,
            max_pending_conns: 10,
            max_concur_threads: 4,
            max_allowed_rules: 0,
            cache_subscription: 60,
            cache_config: 300,
            cache_ruleset: 21600,
        }
    }
}

/// Convert YAML group entries into the runtime group model.
pub fn groups_from_entries(entries: &[ProxyGroupEntry]) -> ProxyGroupConfigs {
    entries
        .iter()
        .filter_map(|entry| {
            let group_type = ProxyGroupType::from_str(&entry.group_type)?;
            Some(ProxyGroupConfig {
                name: entry.name.clone(),
                group_type,
                proxies: entry.rule.clone(),
                using_provider: Vec::new(),
                url: entry.url.clone(),
                interval: entry.interval,
                timeout: entry.timeout,
                tolerance: entry.tolerance,
            })
        })
        .collect()
}

impl Settings {
    pub fn current() -> Arc<Settings> {
        GLOBAL.read().unwrap().clone()
    }

    fn load_from_content(content: &str) -> Result<Self, String> {
        let mut settings = Settings::default();

        // YAML preferred, INI for backward compatibility
        if content.contains("common:") {
            let yaml: YamlSettings =
                serde_yaml::from_str(content).map_err(|e| e.to_string())?;
            settings.apply_yaml(yaml);
        } else {
            load_ini_settings(content, &mut settings)?;
        }
        Ok(settings)
    }

    fn apply_yaml(&mut self, yaml: YamlSettings) {
        let common = yaml.common;
        self.api_mode = common.api_mode;
        self.api_access_token = common.api_access_token;
        self.default_urls = common.default_url;
        self.enable_insert = common.enable_insert;
        self.insert_urls = common.insert_url;
        self.prepend_insert = common.prepend_insert_url;
        self.exclude_remarks = common.exclude_remarks;
        self.include_remarks = common.include_remarks;
        self.default_ext_config = common.default_external_config;
        if !common.base_path.is_empty() {
            self.base_path = common.base_path;
        }
        self.clash_base = common.clash_rule_base;
        self.surge_base = common.surge_rule_base;
        self.surfboard_base = common.surfboard_rule_base;
        self.mellow_base = common.mellow_rule_base;
        self.quan_base = common.quan_rule_base;
        self.quanx_base = common.quanx_rule_base;
        self.loon_base = common.loon_rule_base;
        self.ssub_base = common.sssub_rule_base;
        self.proxy_config = common.proxy_config;
        self.proxy_ruleset = common.proxy_ruleset;
        self.proxy_subscription = common.proxy_subscription;
        self.append_type = common.append_proxy_type;
        self.reload_conf_on_request = common.reload_conf_on_request;

        self.stream_rules = yaml.userinfo.stream_rule;
        self.time_rules = yaml.userinfo.time_rule;

        let node_pref = yaml.node_pref;
        self.udp_flag = node_pref.udp_flag;
        self.tfo_flag = node_pref.tcp_fast_open_flag;
        self.skip_cert_verify = node_pref.skip_cert_verify_flag;
        self.tls13_flag = node_pref.tls13_flag;
        self.enable_sort = node_pref.sort_flag;
        self.filter_deprecated = node_pref.filter_deprecated_nodes;
        self.append_userinfo = node_pref.append_sub_userinfo;
        self.clash_use_new_field = node_pref.clash_use_new_field_name;
        self.renames = node_pref.rename_node;

        let managed = yaml.managed_config;
        self.write_managed_config = managed.write_managed_config;
        self.managed_config_prefix = managed.managed_config_prefix;
        if managed.config_update_interval > 0 {
            self.update_interval = managed.config_update_interval;
        }
        self.update_strict = managed.config_update_strict;
        self.quanx_dev_id = managed.quanx_device_id;

        self.surge_ssr_path = yaml.surge_external_proxy.surge_ssr_path;
        self.surge_resolve_hostname = yaml.surge_external_proxy.resolve_hostname;

        self.add_emoji = yaml.emojis.add_emoji;
        self.remove_emoji = yaml.emojis.remove_old_emoji;
        self.emojis = yaml.emojis.rules;

        self.enable_rule_gen = yaml.rulesets.enabled;
        self.overwrite_original_rules = yaml.rulesets.overwrite_original_rules;
        self.update_ruleset_on_request = yaml.rulesets.update_ruleset_on_request;
        self.custom_rulesets = yaml
            .rulesets
            .rulesets
            .iter()
            .map(|entry| entry.to_config())
            .collect();

        self.custom_proxy_groups = groups_from_entries(&yaml.proxy_groups.custom_proxy_group);

        if !yaml.template.template_path.is_empty() {
            self.template_path = yaml.template.template_path;
        }
        self.template_vars = template_globals_to_map(&yaml.template.globals);

        if !yaml.server.listen.is_empty() {
            self.listen_address = yaml.server.listen;
        }
        if yaml.server.port > 0 {
            self.listen_port = yaml.server.port;
        }

        let advanced = yaml.advanced;
        if advanced.max_pending_connections > 0 {
            self.max_pending_conns = advanced.max_pending_connections;
        }
        if advanced.max_concurrent_threads > 0 {
            self.max_concur_threads = advanced.max_concurrent_threads;
        }
        self.max_allowed_rules = advanced.max_allowed_rules;
        if advanced.enable_cache {
            if advanced.cache_subscription > 0 {
                self.cache_subscription = advanced.cache_subscription;
            }
            if advanced.cache_config > 0 {
                self.cache_config = advanced.cache_config;
            }
            if advanced.cache_ruleset > 0 {
                self.cache_ruleset = advanced.cache_ruleset;
            }
        } else {
            self.cache_subscription = 0;
            self.cache_config = 0;
            self.cache_ruleset = 0;
        }
        self.async_fetch_ruleset = advanced.async_fetch_ruleset;
    }

    fn load_from_file(path: &str) -> Result<Self, String> {
        let content = if path.starts_with("http://") || path.starts_with("https://") {
            let (data, _) = web_get(path, &Default::default(), 0, None).map_err(|e| e.to_string())?;
            data
        } else {
            file_get(path, None).map_err(|e| e.to_string())?
        };
        let mut settings = Self::load_from_content(&content)?;
        settings.pref_path = path.to_owned();
        Ok(settings)
    }
}

/// Global settings instance.
static GLOBAL: LazyLock<RwLock<Arc<Settings>>> =
    LazyLock::new(|| RwLock::new(Arc::new(Settings::default())));

/// Load the preference file and swap the global snapshot. Startup rulesets
/// are resolved as part of the swap.
pub fn update_settings_from_file(path: &str) -> Result<(), String> {
    let mut settings = Settings::load_from_file(path)?;
    info!("Loaded preferences from '{}'.", path);
    resolve_startup_rulesets(&mut settings);
    *GLOBAL.write().unwrap() = Arc::new(settings);
    Ok(())
}

/// Swap the global snapshot from raw preference content (tests, embedding).
pub fn update_settings_from_content(content: &str) -> Result<(), String> {
    let mut settings = Settings::load_from_content(content)?;
    resolve_startup_rulesets(&mut settings);
    *GLOBAL.write().unwrap() = Arc::new(settings);
    Ok(())
}

fn resolve_startup_rulesets(settings: &mut Settings) {
    if !settings.enable_rule_gen || settings.custom_rulesets.is_empty() {
        return;
    }
    let proxy = parse_proxy(&settings.proxy_ruleset);
    settings.rulesets_content = refresh_rulesets(
        &settings.custom_rulesets,
        &proxy,
        settings.cache_ruleset,
        settings.async_fetch_ruleset,
        true,
    );
}

/// Re-read the preference file currently in effect.
pub fn refresh_configuration() {
    let path = Settings::current().pref_path.clone();
    if path.is_empty() {
        return;
    }
    if let Err(e) = update_settings_from_file(&path) {
        error!("Failed to refresh configuration from '{}': {}", path, e);
    }
}
