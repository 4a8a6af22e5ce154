//! Group generation utilities.

use log::warn;

use crate::models::{ExtraSettings, Proxy};
use crate::utils::matcher::{apply_matcher, reg_find};

/// Expand one selector against the node list, appending matching remarks.
///
/// Selectors starting with `[]` contribute a literal member (only when
/// `add_direct` is set); `script:` selectors are not supported and log a
/// warning. Matches already present in the list are skipped so the first
/// selector that picks a node wins.
pub fn group_generate(
    rule: &str,
    nodelist: &[Proxy],
    filtered_nodelist: &mut Vec<String>,
    add_direct: bool,
    ext: &ExtraSettings,
) {
    if let Some(literal) = rule.strip_prefix("[]") {
        if add_direct && !filtered_nodelist.iter().any(|r| r == literal) {
            filtered_nodelist.push(literal.to_string());
        }
        return;
    }

    if rule.starts_with("script:") {
        if ext.authorized {
            warn!("Script selectors are not supported, ignoring '{}'", rule);
        }
        return;
    }

    for node in nodelist {
        let mut real_rule = String::new();
        if apply_matcher(rule, &mut real_rule, node)
            && (real_rule.is_empty() || reg_find(&node.remark, &real_rule))
            && !filtered_nodelist.contains(&node.remark)
        {
            filtered_nodelist.push(node.remark.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProxyType;

    fn node(remark: &str, group_id: i32) -> Proxy {
        Proxy {
            proxy_type: ProxyType::Shadowsocks,
            remark: remark.to_string(),
            group_id,
            ..Default::default()
        }
    }

    #[test]
    fn test_group_generate_regex() {
        let nodes = vec![node("US-01", 1), node("HK-01", 1), node("US-02", 1)];
        let mut filtered = Vec::new();
        group_generate("^US", &nodes, &mut filtered, true, &ExtraSettings::default());
        assert_eq!(filtered, vec!["US-01", "US-02"]);
    }

    #[test]
    fn test_group_generate_literal() {
        let nodes = vec![node("US-01", 1)];
        let mut filtered = Vec::new();
        group_generate("[]DIRECT", &nodes, &mut filtered, true, &ExtraSettings::default());
        assert_eq!(filtered, vec!["DIRECT"]);

        // literals are ignored when add_direct is off
        let mut filtered = Vec::new();
        group_generate("[]DIRECT", &nodes, &mut filtered, false, &ExtraSettings::default());
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_group_generate_first_wins() {
        let nodes = vec![node("US-01", 1), node("HK-01", 1)];
        let mut filtered = Vec::new();
        group_generate("^US", &nodes, &mut filtered, true, &ExtraSettings::default());
        group_generate(".*", &nodes, &mut filtered, true, &ExtraSettings::default());
        assert_eq!(filtered, vec!["US-01", "HK-01"]);
    }

    #[test]
    fn test_group_generate_insert_matcher() {
        let nodes = vec![node("Inserted", -1), node("Normal", 1)];
        let mut filtered = Vec::new();
        group_generate(
            "!!INSERT=1",
            &nodes,
            &mut filtered,
            true,
            &ExtraSettings::default(),
        );
        assert_eq!(filtered, vec!["Inserted"]);
    }

    #[test]
    fn test_group_generate_group_matcher_with_remark_filter() {
        let mut a = node("US Premium", 1);
        a.group = "AirportA".to_string();
        let mut b = node("US Basic", 1);
        b.group = "AirportB".to_string();
        let nodes = vec![a, b];
        let mut filtered = Vec::new();
        group_generate(
            "!!GROUP=AirportA!!US",
            &nodes,
            &mut filtered,
            true,
            &ExtraSettings::default(),
        );
        assert_eq!(filtered, vec!["US Premium"]);
    }
}
