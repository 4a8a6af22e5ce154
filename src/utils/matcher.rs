use crate::models::{Proxy, ProxyType};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref GROUPID_REGEX: Regex =
        Regex::new(r"^!!(?:GROUPID|INSERT)=([\d\-+!,]+)(?:!!(.*))?$").unwrap();
    static ref GROUP_REGEX: Regex = Regex::new(r"^!!(?:GROUP)=(.+?)(?:!!(.*))?$").unwrap();
    static ref TYPE_REGEX: Regex = Regex::new(r"^!!(?:TYPE)=(.+?)(?:!!(.*))?$").unwrap();
    static ref PORT_REGEX: Regex = Regex::new(r"^!!(?:PORT)=(.+?)(?:!!(.*))?$").unwrap();
    static ref SERVER_REGEX: Regex = Regex::new(r"^!!(?:SERVER)=(.+?)(?:!!(.*))?$").unwrap();
}

fn proxy_type_tag(proxy_type: ProxyType) -> &'static str {
    match proxy_type {
        ProxyType::Shadowsocks => "SS",
        ProxyType::ShadowsocksR => "SSR",
        ProxyType::VMess => "VMESS",
        ProxyType::Trojan => "TROJAN",
        ProxyType::Snell => "SNELL",
        ProxyType::HTTP => "HTTP",
        ProxyType::HTTPS => "HTTPS",
        ProxyType::Socks5 => "SOCKS5",
        ProxyType::Unknown => "UNKNOWN",
    }
}

/// Match a rule against a proxy node.
///
/// Rules starting with `!!` gate on a node property before the remark regex
/// applies; the remainder after a second `!!` is written to `real_rule` for
/// the caller to match against the remark. Plain rules pass through into
/// `real_rule` untouched.
///
/// Supported gates: `!!GROUP=<re>`, `!!GROUPID=<range>`, `!!INSERT=<range>`
/// (signed group ids, `INSERT` negates), `!!TYPE=<re>`, `!!PORT=<range>`,
/// `!!SERVER=<re>`.
pub fn apply_matcher(rule: &str, real_rule: &mut String, node: &Proxy) -> bool {
    if rule.starts_with("!!GROUP=") {
        if let Some(captures) = GROUP_REGEX.captures(rule) {
            let target = captures.get(1).map_or("", |m| m.as_str());
            *real_rule = captures.get(2).map_or("", |m| m.as_str()).to_string();
            return reg_find(&node.group, target);
        }
    } else if rule.starts_with("!!GROUPID=") || rule.starts_with("!!INSERT=") {
        let dir = if rule.starts_with("!!INSERT=") { -1 } else { 1 };
        if let Some(captures) = GROUPID_REGEX.captures(rule) {
            let target = captures.get(1).map_or("", |m| m.as_str());
            *real_rule = captures.get(2).map_or("", |m| m.as_str()).to_string();
            return match_range(target, dir * node.group_id);
        }
    } else if rule.starts_with("!!TYPE=") {
        if let Some(captures) = TYPE_REGEX.captures(rule) {
            let target = captures.get(1).map_or("", |m| m.as_str());
            *real_rule = captures.get(2).map_or("", |m| m.as_str()).to_string();
            if node.proxy_type == ProxyType::Unknown {
                return false;
            }
            return reg_match(proxy_type_tag(node.proxy_type), target);
        }
    } else if rule.starts_with("!!PORT=") {
        if let Some(captures) = PORT_REGEX.captures(rule) {
            let target = captures.get(1).map_or("", |m| m.as_str());
            *real_rule = captures.get(2).map_or("", |m| m.as_str()).to_string();
            return match_range(target, node.port as i32);
        }
    } else if rule.starts_with("!!SERVER=") {
        if let Some(captures) = SERVER_REGEX.captures(rule) {
            let target = captures.get(1).map_or("", |m| m.as_str());
            *real_rule = captures.get(2).map_or("", |m| m.as_str()).to_string();
            return reg_find(&node.hostname, target);
        }
    } else {
        *real_rule = rule.to_string();
    }

    true
}

/// Match a number against a range specification.
///
/// The grammar accepts single numbers, `lo-hi` ranges, `N+` open ranges,
/// `!`-negated parts and comma-separated alternatives, e.g. `1-3,!4,5+`.
pub fn match_range(range: &str, target: i32) -> bool {
    let mut negate = false;
    let mut matched = false;

    for range_part in range.split(',') {
        let mut part = range_part.trim();

        if let Some(stripped) = part.strip_prefix('!') {
            negate = true;
            part = stripped;
        }

        if let Some(lower) = part.strip_suffix('+') {
            if let Ok(lower) = lower.parse::<i32>() {
                if target >= lower {
                    matched = true;
                    break;
                }
            }
        } else if part.contains('-') && !part.starts_with('-') {
            let bounds: Vec<&str> = part.splitn(2, '-').collect();
            if bounds.len() == 2 {
                let lower = bounds[0].parse::<i32>().unwrap_or(i32::MIN);
                let upper = bounds[1].parse::<i32>().unwrap_or(i32::MAX);
                if target >= lower && target <= upper {
                    matched = true;
                    break;
                }
            }
        } else if let Ok(exact) = part.parse::<i32>() {
            if target == exact {
                matched = true;
                break;
            }
        }
    }

    if negate {
        !matched
    } else {
        matched
    }
}

/// Check whether a case-insensitive pattern is found anywhere in the text.
/// An empty pattern always matches.
pub fn reg_find(text: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return true;
    }

    match Regex::new(&format!("(?i){}", pattern)) {
        Ok(re) => re.is_match(text),
        Err(_) => false,
    }
}

/// Check whether a case-insensitive pattern matches the whole text.
pub fn reg_match(text: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return true;
    }

    match Regex::new(&format!("(?i)^(?:{})$", pattern)) {
        Ok(re) => re.is_match(text),
        Err(_) => false,
    }
}

/// Regex replacement over the whole input. Invalid patterns leave the input
/// untouched.
pub fn reg_replace(text: &str, pattern: &str, replacement: &str, global: bool) -> String {
    match Regex::new(pattern) {
        Ok(re) => {
            if global {
                re.replace_all(text, replacement).to_string()
            } else {
                re.replace(text, replacement).to_string()
            }
        }
        Err(_) => text.to_string(),
    }
}

/// Check that a pattern compiles.
pub fn reg_valid(pattern: &str) -> bool {
    Regex::new(pattern).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_proxy() -> Proxy {
        Proxy {
            id: 1,
            group_id: 2,
            group: "TestGroup".to_string(),
            remark: "TestRemark".to_string(),
            hostname: "example.com".to_string(),
            port: 8080,
            proxy_type: ProxyType::Shadowsocks,
            ..Default::default()
        }
    }

    #[test]
    fn test_match_range_simple() {
        assert!(match_range("5", 5));
        assert!(!match_range("5", 6));
    }

    #[test]
    fn test_match_range_with_ranges() {
        assert!(match_range("1-10", 5));
        assert!(!match_range("1-10", 11));
    }

    #[test]
    fn test_match_range_open_upper() {
        assert!(match_range("5+", 6));
        assert!(match_range("5+", 5));
        assert!(!match_range("5+", 4));
    }

    #[test]
    fn test_match_range_with_negation() {
        assert!(!match_range("!5", 5));
        assert!(match_range("!5", 6));
        assert!(!match_range("!1-10", 5));
        assert!(match_range("!1-10", 11));
    }

    #[test]
    fn test_match_range_with_multiple() {
        assert!(match_range("1-5,10-15", 3));
        assert!(match_range("1-5,10-15", 12));
        assert!(!match_range("1-5,10-15", 7));
    }

    #[test]
    fn test_match_range_negative_target() {
        // insert sources carry negative group ids; !!INSERT negates first
        assert!(match_range("1", -(-1)));
        assert!(!match_range("1", -1));
    }

    #[test]
    fn test_reg_find() {
        assert!(reg_find("This is a test", "test"));
        assert!(reg_find("This is a test", "TEST"));
        assert!(!reg_find("This is a test", "banana"));
        assert!(reg_find("This is a test", ""));
    }

    #[test]
    fn test_reg_match() {
        assert!(reg_match("12345", r"\d+"));
        assert!(!reg_match("12345a", r"\d+"));
        assert!(reg_match("HELLO", "hello"));
    }

    #[test]
    fn test_apply_matcher_group() {
        let node = create_test_proxy();
        let mut real_rule = String::new();

        assert!(apply_matcher("!!GROUP=TestGroup", &mut real_rule, &node));
        assert_eq!(real_rule, "");

        real_rule.clear();
        assert!(!apply_matcher("!!GROUP=OtherGroup", &mut real_rule, &node));
    }

    #[test]
    fn test_apply_matcher_groupid_and_insert() {
        let mut node = create_test_proxy();
        let mut real_rule = String::new();

        assert!(apply_matcher("!!GROUPID=2", &mut real_rule, &node));
        assert!(!apply_matcher("!!INSERT=2", &mut real_rule, &node));

        node.group_id = -1;
        assert!(apply_matcher("!!INSERT=1", &mut real_rule, &node));
        assert!(!apply_matcher("!!GROUPID=1", &mut real_rule, &node));
    }

    #[test]
    fn test_apply_matcher_type() {
        let node = create_test_proxy();
        let mut real_rule = String::new();

        assert!(apply_matcher("!!TYPE=SS", &mut real_rule, &node));
        real_rule.clear();
        assert!(!apply_matcher("!!TYPE=VMess", &mut real_rule, &node));
    }

    #[test]
    fn test_apply_matcher_port() {
        let node = create_test_proxy();
        let mut real_rule = String::new();

        assert!(apply_matcher("!!PORT=8080", &mut real_rule, &node));
        real_rule.clear();
        assert!(apply_matcher("!!PORT=8000-9000", &mut real_rule, &node));
        real_rule.clear();
        assert!(!apply_matcher("!!PORT=443", &mut real_rule, &node));
    }

    #[test]
    fn test_apply_matcher_with_trailing_rule() {
        let node = create_test_proxy();
        let mut real_rule = String::new();

        assert!(apply_matcher("!!GROUP=TestGroup!!.+", &mut real_rule, &node));
        assert_eq!(real_rule, ".+");
    }

    #[test]
    fn test_apply_matcher_plain_rule_passthrough() {
        let node = create_test_proxy();
        let mut real_rule = String::new();

        assert!(apply_matcher("^US", &mut real_rule, &node));
        assert_eq!(real_rule, "^US");
    }
}
