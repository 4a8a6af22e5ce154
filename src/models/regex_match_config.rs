use serde::Deserialize;

/// Configuration for regex-based matching operations
///
/// `_match` may carry a `!!GROUP=` / `!!GROUPID=` / `!!INSERT=` gate prefix;
/// see `utils::matcher::apply_matcher` for the grammar.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RegexMatchConfig {
    #[serde(rename = "match", default)]
    pub _match: String,
    #[serde(default, alias = "emoji")]
    pub replace: String,
}

impl RegexMatchConfig {
    pub fn new(m: &str, replace: &str) -> Self {
        RegexMatchConfig {
            _match: m.to_string(),
            replace: replace.to_string(),
        }
    }
}

/// Collection of regex match configurations
pub type RegexMatchConfigs = Vec<RegexMatchConfig>;

/// Parse `match<delimiter>replace` entries, e.g. the `rename` query parameter
/// (backtick-separated list of `pattern@replacement`).
pub fn regex_match_configs_from_list(entries: &[String], delimiter: &str) -> RegexMatchConfigs {
    let mut configs = Vec::new();
    for entry in entries {
        if entry.is_empty() {
            continue;
        }
        match entry.find(delimiter) {
            Some(pos) => configs.push(RegexMatchConfig::new(
                &entry[..pos],
                &entry[pos + delimiter.len()..],
            )),
            None => configs.push(RegexMatchConfig::new(entry, "")),
        }
    }
    configs
}
