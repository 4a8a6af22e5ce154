//! Ruleset normalisation and per-target rule emission.
//!
//! Every fetched ruleset body is first converted to Surge-flavoured lines;
//! the emitters then filter by their target's rule-type whitelist and place
//! the group name (swapping `no-resolve` back to last position where the
//! target keeps trailing options).

use lazy_static::lazy_static;
use log::warn;
use regex::Regex;

use crate::models::{RulesetContent, RulesetType};
use crate::utils::base64::url_safe_base64_encode;
use crate::utils::ini_reader::{IniReader, NONAME};
use crate::utils::string::{get_line_break, replace_all_distinct};
use crate::utils::url::is_link;

const BASIC_TYPES: &[&str] = &[
    "DOMAIN",
    "DOMAIN-SUFFIX",
    "DOMAIN-KEYWORD",
    "IP-CIDR",
    "SRC-IP-CIDR",
    "GEOIP",
    "MATCH",
    "FINAL",
];

lazy_static! {
    pub static ref CLASH_RULE_TYPES: Vec<&'static str> = [
        BASIC_TYPES,
        &["IP-CIDR6", "SRC-PORT", "DST-PORT", "PROCESS-NAME"]
    ]
    .concat();
    pub static ref SURGE2_RULE_TYPES: Vec<&'static str> = [
        BASIC_TYPES,
        &["IP-CIDR6", "USER-AGENT", "URL-REGEX", "PROCESS-NAME", "IN-PORT", "DEST-PORT", "SRC-IP"]
    ]
    .concat();
    pub static ref SURGE_RULE_TYPES: Vec<&'static str> = [
        BASIC_TYPES,
        &[
            "IP-CIDR6",
            "USER-AGENT",
            "URL-REGEX",
            "AND",
            "OR",
            "NOT",
            "PROCESS-NAME",
            "IN-PORT",
            "DEST-PORT",
            "SRC-IP"
        ]
    ]
    .concat();
    pub static ref QUANX_RULE_TYPES: Vec<&'static str> = [
        BASIC_TYPES,
        &["USER-AGENT", "HOST", "HOST-SUFFIX", "HOST-KEYWORD"]
    ]
    .concat();
    pub static ref SURFBOARD_RULE_TYPES: Vec<&'static str> = [
        BASIC_TYPES,
        &["IP-CIDR6", "PROCESS-NAME", "IN-PORT", "DEST-PORT", "SRC-IP"]
    ]
    .concat();
    static ref RULE_FIELDS_REGEX: Regex = Regex::new(r"^(.*?,.*?)(,.*)(,.*)$").unwrap();
}

fn starts_with_any(line: &str, types: &[&str]) -> bool {
    types.iter().any(|t| line.starts_with(t))
}

/// Append the group and restore `TYPE,VALUE,GROUP[,no-resolve]` ordering for
/// targets that keep trailing options.
fn transform_rule_with_group(line: &str, group: &str, keep_no_resolve_last: bool) -> String {
    let mut rule = format!("{},{}", line, group);
    if rule.matches(',').count() > 2 {
        if keep_no_resolve_last {
            // swap the option block behind the group
            rule = RULE_FIELDS_REGEX.replace(&rule, "${1}${3}${2}").to_string();
        } else if let Some(caps) = RULE_FIELDS_REGEX.captures(&rule) {
            if &caps[2] == ",no-resolve" {
                rule = format!("{}{}{}", &caps[1], &caps[3], &caps[2]);
            } else {
                // drop options the target cannot carry
                rule = format!("{}{}", &caps[1], &caps[3]);
            }
        }
    }
    replace_all_distinct(&rule, ",,", ",")
}

/// Convert a ruleset body of the given flavour into Surge-flavoured lines.
pub fn convert_ruleset(content: &str, rule_type: RulesetType) -> String {
    match rule_type {
        RulesetType::Surge => content.to_string(),
        RulesetType::Quanx => {
            let mut output = String::new();
            for line in content.lines() {
                let line = line.trim_end_matches('\r').trim();
                if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                    continue;
                }
                let mut fields = line.split(',').map(str::trim);
                let rule_type = match fields.next() {
                    Some(t) => t.to_uppercase(),
                    None => continue,
                };
                let value = match fields.next() {
                    Some(v) => v,
                    None => continue,
                };
                let mapped = match rule_type.as_str() {
                    "HOST" => "DOMAIN",
                    "HOST-SUFFIX" => "DOMAIN-SUFFIX",
                    "HOST-KEYWORD" => "DOMAIN-KEYWORD",
                    "IP-CIDR" => "IP-CIDR",
                    "IP6-CIDR" => "IP-CIDR6",
                    "GEOIP" => "GEOIP",
                    "USER-AGENT" => "USER-AGENT",
                    "FINAL" => {
                        output.push_str("FINAL\n");
                        continue;
                    }
                    _ => continue,
                };
                output.push_str(&format!("{},{}\n", mapped, value));
            }
            output
        }
        RulesetType::ClashDomain | RulesetType::ClashIpCidr | RulesetType::ClashClassic => {
            let payload: serde_yaml::Value = match serde_yaml::from_str(content) {
                Ok(value) => value,
                Err(_) => return String::new(),
            };
            let entries = match payload["payload"].as_sequence() {
                Some(entries) => entries,
                None => return String::new(),
            };
            let mut output = String::new();
            for entry in entries {
                let entry = match entry.as_str() {
                    Some(e) => e,
                    None => continue,
                };
                match rule_type {
                    RulesetType::ClashDomain => {
                        if let Some(suffix) = entry.strip_prefix("+.") {
                            output.push_str(&format!("DOMAIN-SUFFIX,{}\n", suffix));
                        } else {
                            output.push_str(&format!("DOMAIN,{}\n", entry));
                        }
                    }
                    RulesetType::ClashIpCidr => {
                        if entry.contains(':') {
                            output.push_str(&format!("IP-CIDR6,{}\n", entry));
                        } else {
                            output.push_str(&format!("IP-CIDR,{}\n", entry));
                        }
                    }
                    RulesetType::ClashClassic => {
                        output.push_str(entry);
                        output.push('\n');
                    }
                    _ => unreachable!(),
                }
            }
            output
        }
    }
}

fn is_comment_or_empty(line: &str) -> bool {
    line.is_empty() || line.starts_with(';') || line.starts_with('#') || line.starts_with("//")
}

/// Render the rule block for Clash as raw YAML text appended after the base
/// document. Inline `[]` rules convert `FINAL` to `MATCH`; `no-resolve` stays
/// the last field with the group as penultimate.
pub fn ruleset_to_clash_str(
    base_rule: &serde_yaml::Value,
    ruleset_content_array: &[RulesetContent],
    overwrite_original_rules: bool,
    new_field_name: bool,
    max_allowed_rules: usize,
) -> String {
    let field_name = if new_field_name { "rules" } else { "Rule" };
    let mut output = format!("\n{}:\n", field_name);
    let mut total_rules = 0usize;

    if !overwrite_original_rules {
        if let Some(rules) = base_rule[field_name].as_sequence() {
            for rule in rules {
                if let Some(rule) = rule.as_str() {
                    output.push_str(&format!(" - {}\n", rule));
                }
            }
        }
    }

    for ruleset in ruleset_content_array {
        if max_allowed_rules > 0 && total_rules >= max_allowed_rules {
            break;
        }
        let retrieved_rules = ruleset.get_rule_content().to_string();
        if retrieved_rules.is_empty() {
            warn!(
                "Failed to fetch ruleset or ruleset is empty: '{}'!",
                ruleset.rule_path
            );
            continue;
        }

        if let Some(inline) = retrieved_rules.strip_prefix("[]") {
            let mut rule = inline.to_string();
            if let Some(rest) = rule.strip_prefix("FINAL") {
                rule = format!("MATCH{}", rest);
            }
            output.push_str(&format!(
                " - {}\n",
                transform_rule_with_group(&rule, &ruleset.group, true)
            ));
            total_rules += 1;
            continue;
        }

        let converted = convert_ruleset(&retrieved_rules, ruleset.rule_type);
        let delimiter = get_line_break(&converted);
        for line in converted.split(delimiter) {
            if max_allowed_rules > 0 && total_rules >= max_allowed_rules {
                break;
            }
            let line = line.trim_end_matches('\r');
            if is_comment_or_empty(line) {
                continue;
            }
            if !starts_with_any(line, &CLASH_RULE_TYPES) {
                continue;
            }
            let line = if line.starts_with("FINAL") {
                line.replacen("FINAL", "MATCH", 1)
            } else {
                line.to_string()
            };
            output.push_str(&format!(
                " - {}\n",
                transform_rule_with_group(&line, &ruleset.group, true)
            ));
            total_rules += 1;
        }
    }

    output
}

/// Write rules into an INI-flavoured target.
///
/// `surge_ver` selects the dialect: positive = Surge of that version,
/// 0 = Mellow, -1 = Quantumult X, -2 = Quantumult, -3 = Surfboard, -4 = Loon.
pub fn ruleset_to_surge(
    base_rule: &mut IniReader,
    ruleset_content_array: &[RulesetContent],
    surge_ver: i32,
    overwrite_original_rules: bool,
    remote_path_prefix: &str,
    max_allowed_rules: usize,
) {
    match surge_ver {
        0 => base_rule.set_current_section("RoutingRule"),
        -1 => base_rule.set_current_section("filter_local"),
        -2 => base_rule.set_current_section("TCP"),
        _ => base_rule.set_current_section("Rule"),
    }

    if overwrite_original_rules {
        base_rule.erase_section();
        match surge_ver {
            -1 => base_rule.erase_section_by_name("filter_remote"),
            -4 => base_rule.erase_section_by_name("Remote Rule"),
            _ => {}
        }
    }

    let mut all_rules: Vec<String> = Vec::new();
    let mut total_rules = 0usize;

    for ruleset in ruleset_content_array {
        if max_allowed_rules > 0 && total_rules >= max_allowed_rules {
            break;
        }
        let rule_group = &ruleset.group;
        let rule_path = &ruleset.rule_path;

        if rule_path.is_empty() {
            // inline rule
            let mut rule = ruleset
                .get_rule_content()
                .strip_prefix("[]")
                .unwrap_or("")
                .to_string();
            if let Some(rest) = rule.strip_prefix("MATCH") {
                rule = format!("FINAL{}", rest);
            }
            let keep_last = !(surge_ver == -1 || surge_ver == -2);
            let transformed = if !keep_last {
                transform_rule_with_group(&rule, rule_group, false)
            } else if rule.starts_with("AND") || rule.starts_with("OR") || rule.starts_with("NOT") {
                format!("{},{}", rule, rule_group)
            } else {
                transform_rule_with_group(&rule, rule_group, true)
            };
            all_rules.push(transformed);
            total_rules += 1;
            continue;
        }

        // remote-referencing forms
        if surge_ver == -1 && ruleset.rule_type == RulesetType::Quanx && is_link(rule_path) {
            let line = format!(
                "{}, tag={}, force-policy={}, enabled=true",
                rule_path, rule_group, rule_group
            );
            base_rule.set("filter_remote", NONAME, &line);
            continue;
        }

        let local = crate::utils::file::file_exists(rule_path);
        if !local && !is_link(rule_path) {
            continue;
        }

        if local {
            if surge_ver > 2 && !remote_path_prefix.is_empty() {
                let mut line = format!(
                    "RULE-SET,{}/getruleset?type=1&url={},{}",
                    remote_path_prefix,
                    url_safe_base64_encode(&ruleset.rule_path_typed),
                    rule_group
                );
                if ruleset.update_interval > 0 {
                    line.push_str(&format!(",update-interval={}", ruleset.update_interval));
                }
                all_rules.push(line);
                continue;
            } else if surge_ver == -1 && !remote_path_prefix.is_empty() {
                let line = format!(
                    "{}/getruleset?type=2&url={}&group={}, tag={}, enabled=true",
                    remote_path_prefix,
                    url_safe_base64_encode(&ruleset.rule_path_typed),
                    url_safe_base64_encode(rule_group),
                    rule_group
                );
                base_rule.set("filter_remote", NONAME, &line);
                continue;
            } else if surge_ver == -4 && !remote_path_prefix.is_empty() {
                let line = format!(
                    "{}/getruleset?type=1&url={},{}",
                    remote_path_prefix,
                    url_safe_base64_encode(&ruleset.rule_path_typed),
                    rule_group
                );
                base_rule.set("Remote Rule", NONAME, &line);
                continue;
            }
            // no indirection available, expand the file contents below
        } else if surge_ver > 2 {
            let line = if ruleset.rule_type == RulesetType::Surge {
                format!("RULE-SET,{},{}", rule_path, rule_group)
            } else if !remote_path_prefix.is_empty() {
                format!(
                    "RULE-SET,{}/getruleset?type=1&url={},{}",
                    remote_path_prefix,
                    url_safe_base64_encode(&ruleset.rule_path_typed),
                    rule_group
                )
            } else {
                continue;
            };
            let line = if ruleset.update_interval > 0 {
                format!("{},update-interval={}", line, ruleset.update_interval)
            } else {
                line
            };
            all_rules.push(line);
            continue;
        } else if surge_ver == -1 && !remote_path_prefix.is_empty() {
            let line = format!(
                "{}/getruleset?type=2&url={}&group={}, tag={}, enabled=true",
                remote_path_prefix,
                url_safe_base64_encode(&ruleset.rule_path_typed),
                url_safe_base64_encode(rule_group),
                rule_group
            );
            base_rule.set("filter_remote", NONAME, &line);
            continue;
        } else if surge_ver == -4 {
            let line = format!("{},{}", rule_path, rule_group);
            base_rule.set("Remote Rule", NONAME, &line);
            continue;
        }

        let retrieved_rules = ruleset.get_rule_content().to_string();
        if retrieved_rules.is_empty() {
            warn!(
                "Failed to fetch ruleset or ruleset is empty: '{}'!",
                ruleset.rule_path
            );
            continue;
        }

        let converted = convert_ruleset(&retrieved_rules, ruleset.rule_type);
        let delimiter = get_line_break(&converted);
        for line in converted.split(delimiter) {
            if max_allowed_rules > 0 && total_rules >= max_allowed_rules {
                break;
            }
            let mut line = line.trim_end_matches('\r').to_string();
            if is_comment_or_empty(&line) {
                continue;
            }

            let allowed = match surge_ver {
                -2 => !line.starts_with("IP-CIDR6") && starts_with_any(&line, &QUANX_RULE_TYPES),
                -1 => starts_with_any(&line, &QUANX_RULE_TYPES),
                -3 => starts_with_any(&line, &SURFBOARD_RULE_TYPES),
                v if v > 2 => starts_with_any(&line, &SURGE_RULE_TYPES),
                _ => starts_with_any(&line, &SURGE2_RULE_TYPES),
            };
            if !allowed {
                continue;
            }

            if surge_ver == -1 || surge_ver == -2 {
                if line.starts_with("IP-CIDR6") {
                    line = line.replacen("IP-CIDR6", "IP6-CIDR", 1);
                }
                all_rules.push(transform_rule_with_group(&line, rule_group, false));
            } else if line.starts_with("AND") || line.starts_with("OR") || line.starts_with("NOT") {
                all_rules.push(format!("{},{}", line, rule_group));
            } else {
                all_rules.push(transform_rule_with_group(&line, rule_group, true));
            }
            total_rules += 1;
        }
    }

    for rule in all_rules {
        base_rule.set_current(NONAME, &rule);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RulesetContent;

    fn inline_ruleset(group: &str, rule: &str) -> RulesetContent {
        let mut ruleset = RulesetContent::new("", group);
        ruleset.set_rule_content(rule);
        ruleset
    }

    fn fetched_ruleset(group: &str, path: &str, content: &str) -> RulesetContent {
        let mut ruleset = RulesetContent::new(path, group);
        ruleset.set_rule_content(content);
        ruleset
    }

    #[test]
    fn test_convert_quanx_ruleset() {
        let content = "host, example.com, Proxy\nhost-suffix, example.org, Proxy\nip6-cidr, 2001:db8::/32, Proxy\n";
        let converted = convert_ruleset(content, RulesetType::Quanx);
        assert!(converted.contains("DOMAIN,example.com"));
        assert!(converted.contains("DOMAIN-SUFFIX,example.org"));
        assert!(converted.contains("IP-CIDR6,2001:db8::/32"));
    }

    #[test]
    fn test_convert_clash_domain_ruleset() {
        let content = "payload:\n  - '+.example.com'\n  - 'bare.example.org'\n";
        let converted = convert_ruleset(content, RulesetType::ClashDomain);
        assert_eq!(
            converted,
            "DOMAIN-SUFFIX,example.com\nDOMAIN,bare.example.org\n"
        );
    }

    #[test]
    fn test_convert_clash_ipcidr_ruleset() {
        let content = "payload:\n  - '10.0.0.0/8'\n  - '2001:db8::/32'\n";
        let converted = convert_ruleset(content, RulesetType::ClashIpCidr);
        assert_eq!(converted, "IP-CIDR,10.0.0.0/8\nIP-CIDR6,2001:db8::/32\n");
    }

    #[test]
    fn test_ruleset_to_clash_no_resolve_position() {
        let base: serde_yaml::Value = serde_yaml::from_str("{}").unwrap();
        let rulesets = vec![fetched_ruleset(
            "Proxy",
            "https://example.com/rules.list",
            "IP-CIDR,10.0.0.0/8,no-resolve\nDOMAIN,example.com\n",
        )];
        let output = ruleset_to_clash_str(&base, &rulesets, true, true, 0);
        assert!(output.contains(" - IP-CIDR,10.0.0.0/8,Proxy,no-resolve\n"));
        assert!(output.contains(" - DOMAIN,example.com,Proxy\n"));
    }

    #[test]
    fn test_ruleset_to_clash_inline_final_becomes_match() {
        let base: serde_yaml::Value = serde_yaml::from_str("{}").unwrap();
        let rulesets = vec![inline_ruleset("Direct", "[]FINAL")];
        let output = ruleset_to_clash_str(&base, &rulesets, true, true, 0);
        assert!(output.contains(" - MATCH,Direct\n"));
    }

    #[test]
    fn test_ruleset_to_clash_rule_cap_spans_rulesets() {
        let base: serde_yaml::Value = serde_yaml::from_str("{}").unwrap();
        let body_a: String = (0..10).map(|i| format!("DOMAIN,a{}.com\n", i)).collect();
        let body_b: String = (0..10).map(|i| format!("DOMAIN,b{}.com\n", i)).collect();
        let rulesets = vec![
            fetched_ruleset("A", "https://example.com/a.list", &body_a),
            fetched_ruleset("B", "https://example.com/b.list", &body_b),
        ];
        let output = ruleset_to_clash_str(&base, &rulesets, true, true, 15);
        assert_eq!(output.matches(" - DOMAIN,").count(), 15);
        assert_eq!(output.matches(" - DOMAIN,a").count(), 10);
        assert_eq!(output.matches(" - DOMAIN,b").count(), 5);
    }

    #[test]
    fn test_ruleset_to_clash_keeps_base_rules_when_not_overwriting() {
        let base: serde_yaml::Value =
            serde_yaml::from_str("rules:\n  - 'GEOIP,CN,DIRECT'\n").unwrap();
        let rulesets = vec![inline_ruleset("Direct", "[]FINAL")];
        let output = ruleset_to_clash_str(&base, &rulesets, false, true, 0);
        assert!(output.contains(" - GEOIP,CN,DIRECT\n"));
    }

    #[test]
    fn test_ruleset_to_surge_filters_types() {
        let mut ini = IniReader::new();
        ini.store_any_line = true;
        let rulesets = vec![fetched_ruleset(
            "Proxy",
            "https://example.com/rules.list",
            "URL-REGEX,^http://example,Proxy\nDOMAIN,example.com\nAND,((DOMAIN,a.com),(DST-PORT,443))\n",
        )];
        // Surfboard rejects URL-REGEX and AND
        ruleset_to_surge(&mut ini, &rulesets, -3, true, "", 0);
        let rules = ini.get_all("Rule", NONAME);
        assert_eq!(rules.len(), 1);
        assert!(rules[0].starts_with("DOMAIN,example.com"));
    }

    #[test]
    fn test_ruleset_to_surge_remote_ruleset_indirection() {
        let mut ini = IniReader::new();
        ini.store_any_line = true;
        let mut ruleset =
            fetched_ruleset("Proxy", "https://example.com/rules.list", "DOMAIN,a.com\n");
        ruleset.rule_path_typed = "https://example.com/rules.list".to_string();
        ruleset.rule_type = RulesetType::ClashDomain;
        ruleset.update_interval = 86400;
        ruleset_to_surge(&mut ini, &[ruleset], 4, true, "http://127.0.0.1:25500", 0);
        let rules = ini.get_all("Rule", NONAME);
        assert_eq!(rules.len(), 1);
        assert!(rules[0].starts_with("RULE-SET,http://127.0.0.1:25500/getruleset?type=1&url="));
        assert!(rules[0].ends_with(",update-interval=86400"));
    }

    #[test]
    fn test_ruleset_to_surge_quan_drops_options() {
        let mut ini = IniReader::new();
        ini.store_any_line = true;
        let rulesets = vec![fetched_ruleset(
            "Proxy",
            "https://example.com/rules.list",
            "GEOIP,CN,no-resolve\nDOMAIN,example.com\n",
        )];
        ruleset_to_surge(&mut ini, &rulesets, -2, true, "", 0);
        let rules = ini.get_all("TCP", NONAME);
        assert!(rules.contains(&"GEOIP,CN,Proxy,no-resolve".to_string()));
        assert!(rules.contains(&"DOMAIN,example.com,Proxy".to_string()));
    }
}
