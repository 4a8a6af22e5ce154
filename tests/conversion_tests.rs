//! End-to-end conversion scenarios driven through the public API.

use subforge::generator::config::formats::clash::proxy_to_clash;
use subforge::generator::config::formats::single::{proxy_to_single, TYPE_SS};
use subforge::models::{ExtraSettings, Proxy, ProxyGroupConfig, ProxyGroupType, RulesetContent};
use subforge::parser::explodes::{explode, explode_sub};
use subforge::{subconverter, SubconverterConfig, SubconverterTarget};

fn ss_url_config(target: SubconverterTarget) -> SubconverterConfig {
    SubconverterConfig {
        target: Some(target),
        urls: vec!["ss://YWVzLTEyOC1nY206cGFzc0AxLjIuMy40OjgzODg#Node".to_string()],
        ..Default::default()
    }
}

fn fetched_ruleset(group: &str, content: &str) -> RulesetContent {
    let mut ruleset = RulesetContent::new("https://example.com/rules.list", group);
    ruleset.set_rule_content(content);
    ruleset
}

// S1: SS single URI converts to the expected Clash proxy.
#[test]
fn test_ss_uri_to_clash() {
    let result = subconverter(ss_url_config(SubconverterTarget::Clash)).unwrap();
    assert!(result.content.contains("name: Node"));
    assert!(result.content.contains("type: ss"));
    assert!(result.content.contains("server: 1.2.3.4"));
    assert!(result.content.contains("port: 8388"));
    assert!(result.content.contains("cipher: aes-128-gcm"));
    assert!(result.content.contains("password: pass"));
}

// S2: an SSR node with origin/plain and an SS cipher never emits as SSR in
// plain Clash output.
#[test]
fn test_ssr_downgrade_to_ss() {
    use subforge::utils::base64::url_safe_base64_encode;
    let payload = format!(
        "1.2.3.4:8388:origin:aes-256-gcm:plain:{}",
        url_safe_base64_encode("pass")
    );
    let link = format!("ssr://{}", url_safe_base64_encode(&payload));

    let config = SubconverterConfig {
        target: Some(SubconverterTarget::Clash),
        urls: vec![link],
        ..Default::default()
    };
    let result = subconverter(config).unwrap();
    assert!(result.content.contains("type: ss\n") || result.content.contains("type: ss "));
    assert!(!result.content.contains("type: ssr"));
}

// S3: exclude regex drops matching nodes.
#[test]
fn test_exclude_regex() {
    let mut config = SubconverterConfig {
        target: Some(SubconverterTarget::Clash),
        urls: vec![
            "ss://YWVzLTEyOC1nY206cGFzc0AxLjIuMy40OjgzODg#US-01".to_string(),
            "trojan://pw@5.6.7.8:443#HK-01".to_string(),
        ],
        ..Default::default()
    };
    config.parse_settings.exclude_remarks = vec!["^HK".to_string()];
    let result = subconverter(config).unwrap();
    assert!(result.content.contains("US-01"));
    assert!(!result.content.contains("HK-01"));
}

// S4: emoji rule prepends the flag to the matched remark.
#[test]
fn test_emoji_insertion() {
    use subforge::models::RegexMatchConfig;
    let mut config = ss_url_config(SubconverterTarget::Clash);
    config.urls =
        vec!["ss://YWVzLTEyOC1nY206cGFzc0AxLjIuMy40OjgzODg#Japan Tokyo 01".to_string()];
    config.extra.add_emoji = true;
    config.extra.emoji_array = vec![RegexMatchConfig::new("(?i)japan", "🇯🇵")];
    let result = subconverter(config).unwrap();
    assert!(result.content.contains("🇯🇵 Japan Tokyo 01"));
}

// S5: managed-config preamble for Surge.
#[test]
fn test_managed_config_preamble() {
    let mut config = ss_url_config(SubconverterTarget::Surge(4));
    config.managed_config_prefix = "https://sub.example.com".to_string();
    config.request_query = "target=surge&ver=4&url=xxx".to_string();
    config.update_interval = 86400;
    config.update_strict = true;
    let result = subconverter(config).unwrap();
    assert!(result.content.starts_with(
        "#!MANAGED-CONFIG https://sub.example.com/sub?target=surge&ver=4&url=xxx interval=86400 strict=true\n\n"
    ));
}

// S6: the rule cap spans all rulesets and draws from the first in order.
#[test]
fn test_rule_cap_across_rulesets() {
    let big: String = (0..10_000).map(|i| format!("DOMAIN,a{}.com\n", i)).collect();
    let rulesets = vec![
        fetched_ruleset("A", &big),
        fetched_ruleset("B", &big),
        fetched_ruleset("C", &big),
    ];

    let mut ext = ExtraSettings::default();
    ext.max_allowed_rules = 1500;
    let mut nodes = vec![Proxy::ss_construct(
        "SSProvider",
        "Node",
        "1.2.3.4",
        8388,
        "pass",
        "aes-128-gcm",
        "",
        "",
        None,
        None,
        None,
        None,
    )];
    let output = proxy_to_clash(&mut nodes, "", &rulesets, &vec![], false, &ext).unwrap();
    let rule_count = output.matches(" - DOMAIN,").count();
    assert_eq!(rule_count, 1500);
    // every emitted rule came from the first ruleset
    assert_eq!(output.matches(",A\n").count(), 1500);
    assert_eq!(output.matches(",B\n").count(), 0);
}

// Dedup correctness: every remark in an artifact is unique.
#[test]
fn test_remark_dedup_in_artifact() {
    let mut nodes = vec![
        Proxy::ss_construct(
            "SSProvider", "Same", "1.1.1.1", 1, "p", "aes-128-gcm", "", "", None, None, None,
            None,
        ),
        Proxy::ss_construct(
            "SSProvider", "Same", "2.2.2.2", 2, "p", "aes-128-gcm", "", "", None, None, None,
            None,
        ),
        Proxy::ss_construct(
            "SSProvider", "Same", "3.3.3.3", 3, "p", "aes-128-gcm", "", "", None, None, None,
            None,
        ),
    ];
    let ext = ExtraSettings::default();
    let output = proxy_to_clash(&mut nodes, "", &[], &vec![], false, &ext).unwrap();
    let mut names: Vec<&str> = output
        .lines()
        .filter_map(|l| l.trim().strip_prefix("name: "))
        .collect();
    let total = names.len();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), total);
}

// Group fallback: a group with no matches emits exactly DIRECT.
#[test]
fn test_group_direct_fallback() {
    let mut nodes = vec![Proxy::ss_construct(
        "SSProvider",
        "US-01",
        "1.2.3.4",
        8388,
        "pass",
        "aes-128-gcm",
        "",
        "",
        None,
        None,
        None,
        None,
    )];
    let groups = vec![ProxyGroupConfig {
        name: "NoMatch".to_string(),
        group_type: ProxyGroupType::Select,
        proxies: vec!["^JP".to_string()],
        ..Default::default()
    }];
    let ext = ExtraSettings::default();
    let output = proxy_to_clash(&mut nodes, "", &[], &groups, false, &ext).unwrap();

    let yaml: serde_yaml::Value = serde_yaml::from_str(&output).unwrap();
    let group = &yaml["proxy-groups"][0];
    assert_eq!(group["name"], "NoMatch");
    let members = group["proxies"].as_sequence().unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0], "DIRECT");
}

// Ruleset ordering: output rule order equals declaration order.
#[test]
fn test_ruleset_declaration_order() {
    let rulesets = vec![
        fetched_ruleset("First", "DOMAIN,first.com\n"),
        fetched_ruleset("Second", "DOMAIN,second.com\n"),
        fetched_ruleset("Third", "DOMAIN,third.com\n"),
    ];
    let mut nodes = vec![Proxy::ss_construct(
        "SSProvider", "N", "1.1.1.1", 1, "p", "aes-128-gcm", "", "", None, None, None, None,
    )];
    let ext = ExtraSettings::default();
    let output = proxy_to_clash(&mut nodes, "", &rulesets, &vec![], false, &ext).unwrap();

    let first = output.find("first.com").unwrap();
    let second = output.find("second.com").unwrap();
    let third = output.find("third.com").unwrap();
    assert!(first < second && second < third);
}

// No-resolve placement: group penultimate, option last, exactly once.
#[test]
fn test_no_resolve_placement() {
    let rulesets = vec![fetched_ruleset(
        "Proxy",
        "IP-CIDR,10.0.0.0/8,no-resolve\n",
    )];
    let mut nodes = vec![Proxy::ss_construct(
        "SSProvider", "N", "1.1.1.1", 1, "p", "aes-128-gcm", "", "", None, None, None, None,
    )];
    let ext = ExtraSettings::default();
    let output = proxy_to_clash(&mut nodes, "", &rulesets, &vec![], false, &ext).unwrap();

    let line = output
        .lines()
        .find(|l| l.contains("IP-CIDR,10.0.0.0/8"))
        .unwrap();
    assert!(line.trim().ends_with("IP-CIDR,10.0.0.0/8,Proxy,no-resolve"));
    assert_eq!(line.matches("no-resolve").count(), 1);
}

// Parser idempotence: parse → emit single list → parse again gives the same
// node set.
#[test]
fn test_parser_idempotence() {
    let inputs = [
        "ss://YWVzLTEyOC1nY206cGFzc0AxLjIuMy40OjgzODg#Alpha",
        "ss://YWVzLTI1Ni1nY206b3RoZXJAOS44LjcuNjo0NDM=#Beta",
    ];
    let mut nodes = Vec::new();
    for input in inputs {
        let mut node = Proxy::default();
        assert!(explode(input, &mut node));
        nodes.push(node);
    }

    let ext = ExtraSettings::default();
    let emitted = proxy_to_single(&mut nodes.clone(), TYPE_SS, &ext).unwrap();

    let mut reparsed = Vec::new();
    assert!(explode_sub(&emitted, &mut reparsed));
    assert_eq!(reparsed.len(), nodes.len());
    for (orig, reparse) in nodes.iter().zip(reparsed.iter()) {
        assert_eq!(orig.hostname, reparse.hostname);
        assert_eq!(orig.port, reparse.port);
        assert_eq!(orig.encrypt_method, reparse.encrypt_method);
        assert_eq!(orig.password, reparse.password);
        assert_eq!(orig.remark, reparse.remark);
    }
}

// Insert sources carry negative group ids and `!!INSERT=` matchers see them.
#[test]
fn test_insert_group_ids_negative() {
    let mut config = SubconverterConfig {
        target: Some(SubconverterTarget::Clash),
        urls: vec!["ss://YWVzLTEyOC1nY206cGFzc0AxLjIuMy40OjgzODg#Normal".to_string()],
        insert_urls: vec!["trojan://pw@5.6.7.8:443#Inserted".to_string()],
        prepend_insert: true,
        ..Default::default()
    };
    config.proxy_groups = vec![ProxyGroupConfig {
        name: "InsertOnly".to_string(),
        group_type: ProxyGroupType::Select,
        proxies: vec!["!!INSERT=1".to_string()],
        ..Default::default()
    }];
    let result = subconverter(config).unwrap();

    let yaml: serde_yaml::Value = serde_yaml::from_str(&result.content).unwrap();
    let group = &yaml["proxy-groups"][0];
    let members = group["proxies"].as_sequence().unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0], "Inserted");
}

// Nodelist mode strips groups and rules from the Surge output.
#[test]
fn test_nodelist_mode_surge() {
    let mut config = ss_url_config(SubconverterTarget::Surge(4));
    config.extra.nodelist = true;
    let result = subconverter(config).unwrap();
    assert!(result.content.contains("Node = ss"));
    assert!(!result.content.contains("[Proxy Group]"));
    assert!(!result.content.contains("[Rule]"));
}
