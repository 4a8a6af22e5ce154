//! Node pipeline properties: filtering, renaming, sorting, stability.

use subforge::models::{ExtraSettings, Proxy, ProxyType, RegexMatchConfig};
use subforge::parser::subparser::filter_nodes;
use subforge::utils::node_manip::preprocess_nodes;

fn node(remark: &str) -> Proxy {
    Proxy {
        proxy_type: ProxyType::Shadowsocks,
        remark: remark.to_string(),
        hostname: format!("{}.example.com", remark.to_lowercase()),
        port: 443,
        ..Default::default()
    }
}

// Filter monotonicity: adding an exclude never increases the output count.
#[test]
fn test_filter_monotonicity() {
    let base_nodes = vec![node("US-01"), node("HK-01"), node("JP-01"), node("JP-02")];

    let exclude_sets: Vec<Vec<String>> = vec![
        vec![],
        vec!["^HK".to_string()],
        vec!["^HK".to_string(), "^JP".to_string()],
        vec!["^HK".to_string(), "^JP".to_string(), "^US".to_string()],
    ];

    let mut previous_count = usize::MAX;
    for excludes in exclude_sets {
        let mut nodes = base_nodes.clone();
        filter_nodes(&mut nodes, &excludes, &[], 1);
        assert!(nodes.len() <= previous_count);
        previous_count = nodes.len();
    }
}

// Sort stability: equal remarks keep their input order.
#[test]
fn test_sort_stability() {
    let mut first = node("Same");
    first.hostname = "first.example.com".to_string();
    let mut second = node("Same");
    second.hostname = "second.example.com".to_string();

    let mut nodes = vec![node("ZZZ"), first, second, node("AAA")];
    let mut ext = ExtraSettings::default();
    ext.sort_flag = true;
    preprocess_nodes(&mut nodes, &ext);

    let same_positions: Vec<&Proxy> = nodes.iter().filter(|n| n.remark == "Same").collect();
    assert_eq!(same_positions[0].hostname, "first.example.com");
    assert_eq!(same_positions[1].hostname, "second.example.com");
    assert_eq!(nodes[0].remark, "AAA");
    assert_eq!(nodes.last().unwrap().remark, "ZZZ");
}

// Rename then emoji, in configuration order.
#[test]
fn test_rename_and_emoji_order() {
    let mut nodes = vec![node("JPN Tokyo")];
    let mut ext = ExtraSettings::default();
    ext.rename_array = vec![RegexMatchConfig::new("JPN", "Japan")];
    ext.add_emoji = true;
    ext.emoji_array = vec![RegexMatchConfig::new("(?i)japan", "🇯🇵")];
    preprocess_nodes(&mut nodes, &ext);
    assert_eq!(nodes[0].remark, "🇯🇵 Japan Tokyo");
}

// Old emoji is stripped before the new one is applied.
#[test]
fn test_remove_old_emoji() {
    let mut nodes = vec![node("🇺🇸 Japan 01")];
    let mut ext = ExtraSettings::default();
    ext.remove_emoji = true;
    ext.add_emoji = true;
    ext.emoji_array = vec![RegexMatchConfig::new("(?i)japan", "🇯🇵")];
    preprocess_nodes(&mut nodes, &ext);
    assert_eq!(nodes[0].remark, "🇯🇵 Japan 01");
}

// Dense id assignment after filtering and sorting.
#[test]
fn test_dense_id_assignment() {
    let mut nodes = vec![node("C"), node("A"), node("B")];
    let mut ext = ExtraSettings::default();
    ext.sort_flag = true;
    preprocess_nodes(&mut nodes, &ext);
    let ids: Vec<u32> = nodes.iter().map(|n| n.id).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    assert_eq!(nodes[0].remark, "A");
}

// Gated renames only touch nodes whose group id matches the range.
#[test]
fn test_gated_rename_by_group_id() {
    let mut keep = node("HK keep");
    keep.group_id = 2;
    let mut change = node("HK change");
    change.group_id = 1;

    let mut nodes = vec![keep, change];
    let mut ext = ExtraSettings::default();
    ext.rename_array = vec![RegexMatchConfig::new("!!GROUPID=1!!HK", "HongKong")];
    preprocess_nodes(&mut nodes, &ext);

    assert_eq!(nodes[0].remark, "HK keep");
    assert_eq!(nodes[1].remark, "HongKong change");
}
