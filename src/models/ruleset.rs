use std::sync::Arc;

use log::warn;

/// Flavour of a fetched ruleset body, decided by a `type:` prefix on the
/// declared path or left at the default (Surge-flavoured lines).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RulesetType {
    #[default]
    Surge,
    Quanx,
    ClashDomain,
    ClashIpCidr,
    ClashClassic,
}

/// Path prefixes that force a ruleset type.
pub const RULESET_TYPES: &[(&str, RulesetType)] = &[
    ("surge:", RulesetType::Surge),
    ("quanx:", RulesetType::Quanx),
    ("clash-domain:", RulesetType::ClashDomain),
    ("clash-ipcidr:", RulesetType::ClashIpCidr),
    ("clash-classic:", RulesetType::ClashClassic),
];

/// Strip a recognised type prefix from `url`, returning the bare path and the
/// detected type.
pub fn split_ruleset_type(url: &str) -> (&str, RulesetType) {
    for (prefix, rule_type) in RULESET_TYPES {
        if let Some(stripped) = url.strip_prefix(prefix) {
            return (stripped, *rule_type);
        }
    }
    (url, RulesetType::default())
}

/// A user-declared ruleset reference: `group,path[,interval]`.
#[derive(Debug, Clone, Default)]
pub struct RulesetConfig {
    pub group: String,
    pub url: String,
    pub interval: u32,
}

impl RulesetConfig {
    /// Parse one declaration line. Inline rules keep their `[]` prefix in
    /// `url` and never carry an interval.
    pub fn from_ini_line(line: &str) -> Option<Self> {
        let (group, rest) = line.split_once(',')?;
        if group.is_empty() || rest.is_empty() {
            warn!("Ignoring incomplete ruleset declaration '{}'", line);
            return None;
        }
        if rest.starts_with("[]") {
            return Some(RulesetConfig {
                group: group.to_string(),
                url: rest.to_string(),
                interval: 0,
            });
        }
        let (url, interval) = match rest.rsplit_once(',') {
            Some((url, interval_str)) => match interval_str.parse::<u32>() {
                Ok(interval) => (url, interval),
                Err(_) => (rest, 0),
            },
            None => (rest, 0),
        };
        Some(RulesetConfig {
            group: group.to_string(),
            url: url.to_string(),
            interval,
        })
    }
}

pub type RulesetConfigs = Vec<RulesetConfig>;

/// Parse a batch of `group,path[,interval]` lines, dropping malformed ones.
pub fn rulesets_from_ini(lines: &[String]) -> RulesetConfigs {
    lines
        .iter()
        .filter_map(|line| RulesetConfig::from_ini_line(line))
        .collect()
}

/// A resolved ruleset: declaration plus the fetched body.
///
/// The body is behind an `Arc` so startup-registered rulesets can be shared
/// across worker snapshots without copying; once resolved it is immutable.
#[derive(Debug, Clone)]
pub struct RulesetContent {
    pub group: String,
    /// Bare path with any type prefix removed; empty for inline rules.
    pub rule_path: String,
    /// Path as originally declared, type prefix included.
    pub rule_path_typed: String,
    pub rule_type: RulesetType,
    pub update_interval: u32,
    content: Arc<str>,
}

impl Default for RulesetContent {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl RulesetContent {
    pub fn new(path: &str, group: &str) -> Self {
        RulesetContent {
            group: group.to_string(),
            rule_path: path.to_string(),
            rule_path_typed: path.to_string(),
            rule_type: RulesetType::default(),
            update_interval: 0,
            content: Arc::from(""),
        }
    }

    pub fn set_rule_content(&mut self, content: &str) {
        self.content = Arc::from(content);
    }

    pub fn get_rule_content(&self) -> &str {
        &self.content
    }
}
