pub mod error;
pub mod extra_settings;
pub mod proxy;
pub mod proxy_group_config;
pub mod regex_match_config;
pub mod ruleset;

pub use error::{SubError, SubResult};
pub use extra_settings::ExtraSettings;
pub use proxy::{
    Proxy, ProxyType, HTTP_DEFAULT_GROUP, SNELL_DEFAULT_GROUP, SOCKS_DEFAULT_GROUP,
    SSR_DEFAULT_GROUP, SS_DEFAULT_GROUP, TROJAN_DEFAULT_GROUP, V2RAY_DEFAULT_GROUP,
};
pub use proxy_group_config::{
    parse_group_times, proxy_groups_from_ini, ProxyGroupConfig, ProxyGroupConfigs, ProxyGroupType,
};
pub use regex_match_config::{regex_match_configs_from_list, RegexMatchConfig, RegexMatchConfigs};
pub use ruleset::{
    rulesets_from_ini, split_ruleset_type, RulesetConfig, RulesetConfigs, RulesetContent,
    RulesetType,
};
