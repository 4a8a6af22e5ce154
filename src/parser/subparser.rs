//! Subscription acquisition: one link in, nodes out.

use log::{info, warn};

use crate::models::{Proxy, ProxyType, SubError, SubResult};
use crate::parser::explodes::{explode, explode_conf_content};
use crate::parser::infoparser::{get_sub_info_from_nodes, get_sub_info_from_ssd};
use crate::parser::parse_settings::ParseSettings;
use crate::utils::file::{file_exists, file_get};
use crate::utils::http::{get_sub_info_from_header, web_get};
use crate::utils::matcher::reg_find;
use crate::utils::url::{get_url_arg, is_link, url_decode};

enum LinkType {
    Subscription,
    Local,
    Single,
}

/// Fetch `link` and append every node it yields to `all_nodes`.
///
/// `group_id` tags the produced nodes; insert sources pass negative ids.
/// The `tag:<name>,` prefix forces the group name of all produced nodes.
pub fn add_nodes(
    mut link: String,
    all_nodes: &mut Vec<Proxy>,
    group_id: i32,
    parse_settings: &mut ParseSettings,
) -> SubResult<()> {
    let mut custom_group = String::new();

    link = link.replace('"', "");

    if link.starts_with("script:") {
        if !parse_settings.authorized {
            return Err(SubError::Forbidden);
        }
        warn!("Script-processed sources are not supported, skipping '{}'", link);
        return Ok(());
    }

    if link.starts_with("tag:") {
        if let Some(pos) = link.find(',') {
            custom_group = link[4..pos].to_string();
            link = link[pos + 1..].to_string();
        }
    }

    if link == "nullnode" {
        let mut null_node = Proxy::default();
        null_node.group_id = 0;
        all_nodes.push(null_node);
        return Ok(());
    }

    let link_type = if is_link(&link) || link.starts_with("surge:///install-config") {
        LinkType::Subscription
    } else if file_exists(&link) {
        LinkType::Local
    } else {
        LinkType::Single
    };

    let mut nodes: Vec<Proxy> = Vec::new();

    match link_type {
        LinkType::Subscription => {
            if link.starts_with("surge:///install-config") {
                link = url_decode(&get_url_arg(&link, "url"));
            }

            info!("Fetching node data from url '{}'.", link);
            let (sub_content, headers) = web_get(
                &link,
                &parse_settings.proxy,
                parse_settings.cache_ttl,
                Some(&parse_settings.request_header),
            )?;

            if !explode_conf_content(&sub_content, &mut nodes) {
                return Err(SubError::Parse(link));
            }

            if parse_settings.sub_info.is_empty() {
                if sub_content.starts_with("ssd://") {
                    if let Some(info) = get_sub_info_from_ssd(&sub_content) {
                        parse_settings.sub_info = info;
                    }
                } else if let Some(info) = get_sub_info_from_header(&headers) {
                    parse_settings.sub_info = info;
                } else if let Some(info) = get_sub_info_from_nodes(
                    &nodes,
                    &parse_settings.stream_rules,
                    &parse_settings.time_rules,
                ) {
                    parse_settings.sub_info = info;
                }
            }
        }
        LinkType::Local => {
            if !parse_settings.authorized {
                return Err(SubError::Forbidden);
            }
            info!("Parsing configuration file '{}'.", link);
            let content = file_get(&link, None)?;
            if !explode_conf_content(&content, &mut nodes) {
                return Err(SubError::Parse(link));
            }
            if parse_settings.sub_info.is_empty() {
                if let Some(info) = get_sub_info_from_nodes(
                    &nodes,
                    &parse_settings.stream_rules,
                    &parse_settings.time_rules,
                ) {
                    parse_settings.sub_info = info;
                }
            }
        }
        LinkType::Single => {
            let mut node = Proxy::default();
            if !explode(&link, &mut node) || node.proxy_type == ProxyType::Unknown {
                return Err(SubError::Parse(link));
            }
            nodes.push(node);
        }
    }

    if let Some(port) = parse_settings.custom_port {
        for node in &mut nodes {
            node.port = port;
        }
    }

    filter_nodes(
        &mut nodes,
        &parse_settings.exclude_remarks,
        &parse_settings.include_remarks,
        group_id,
    );
    for node in &mut nodes {
        node.group_id = group_id;
        if !custom_group.is_empty() {
            node.group = custom_group.clone();
        }
    }
    all_nodes.append(&mut nodes);
    Ok(())
}

/// Drop nodes the include/exclude rules reject and assign per-source ids.
pub fn filter_nodes(
    nodes: &mut Vec<Proxy>,
    exclude_remarks: &[String],
    include_remarks: &[String],
    group_id: i32,
) {
    let mut node_index = 0u32;
    nodes.retain(|node| !should_ignore(node, exclude_remarks, include_remarks));
    for node in nodes.iter_mut() {
        node.id = node_index;
        node.group_id = group_id;
        node_index += 1;
    }
}

/// A node is kept iff it matches at least one include rule (or the include
/// list is empty) and matches no exclude rule.
fn should_ignore(node: &Proxy, exclude_remarks: &[String], include_remarks: &[String]) -> bool {
    let excluded = exclude_remarks
        .iter()
        .any(|pattern| reg_find(&node.remark, pattern));
    let included = include_remarks.is_empty()
        || include_remarks
            .iter()
            .any(|pattern| reg_find(&node.remark, pattern));

    excluded || !included
}
