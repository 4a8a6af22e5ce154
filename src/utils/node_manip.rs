//! Node pipeline: rename, emoji tagging, sorting and id assignment.

use std::cmp::Ordering;

use log::{debug, info, warn};

use crate::models::{ExtraSettings, Proxy, ProxyType, RegexMatchConfigs};
use crate::utils::matcher::{apply_matcher, reg_find, reg_replace};
use crate::utils::string::{remove_emoji, trim};

/// Applies the ordered rename rules to a node's remark.
///
/// A rule whose match part fails to gate on the node (via `!!` prefixes) is
/// skipped; an emptied remark is rolled back to the original.
fn node_rename(node: &mut Proxy, rename_array: &RegexMatchConfigs) {
    let original_remark = node.remark.clone();

    for pattern in rename_array {
        if pattern._match.starts_with("!!script:") {
            warn!("Script-based rename rules are not supported, skipping");
            continue;
        }
        if pattern._match.is_empty() {
            continue;
        }
        let mut real_rule = String::new();
        if apply_matcher(&pattern._match, &mut real_rule, node) && !real_rule.is_empty() {
            node.remark = reg_replace(&node.remark, &real_rule, &pattern.replace, true);
        }
    }

    if node.remark.is_empty() {
        node.remark = original_remark;
    }
}

/// Returns the remark with the first matching emoji rule's emoji prepended.
fn add_emoji(node: &Proxy, emoji_array: &RegexMatchConfigs) -> String {
    for pattern in emoji_array {
        if pattern.replace.is_empty() {
            continue;
        }

        let mut real_rule = String::new();
        if apply_matcher(&pattern._match, &mut real_rule, node)
            && (real_rule.is_empty() || reg_find(&node.remark, &real_rule))
        {
            return format!("{} {}", pattern.replace, node.remark);
        }
    }

    node.remark.clone()
}

/// Stable sort by remark; nodes of unknown kind sink to the end.
fn sort_nodes(nodes: &mut [Proxy], sort_script: &str) {
    if !sort_script.is_empty() {
        warn!("Sort scripts are not supported, using default remark ordering");
    }
    nodes.sort_by(|a, b| {
        if a.proxy_type == ProxyType::Unknown {
            return Ordering::Greater;
        }
        if b.proxy_type == ProxyType::Unknown {
            return Ordering::Less;
        }
        a.remark.cmp(&b.remark)
    });
}

/// Preprocesses nodes before conversion: emoji strip, rename, emoji insert,
/// optional sort, then dense id assignment.
pub fn preprocess_nodes(nodes: &mut Vec<Proxy>, ext: &ExtraSettings) {
    for node in nodes.iter_mut() {
        if ext.remove_emoji {
            node.remark = trim(&remove_emoji(&node.remark)).to_string();
        }

        node_rename(node, &ext.rename_array);

        if ext.add_emoji {
            node.remark = add_emoji(node, &ext.emoji_array);
        }
    }

    if ext.sort_flag {
        info!("Sorting {} nodes", nodes.len());
        sort_nodes(nodes, &ext.sort_script);
    }

    for (index, node) in nodes.iter_mut().enumerate() {
        node.id = index as u32;
    }

    debug!("Node preprocessing completed for {} nodes", nodes.len());
}
