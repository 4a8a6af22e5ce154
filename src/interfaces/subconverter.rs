//! The conversion orchestrator: one request in, one artifact out.

use std::collections::HashMap;

use log::{info, warn};

use crate::generator::config::formats::{
    clash::proxy_to_clash,
    loon::proxy_to_loon,
    mellow::proxy_to_mellow,
    quan::proxy_to_quan,
    quanx::proxy_to_quanx,
    single::{proxy_to_single, TYPE_SS, TYPE_SSR, TYPE_TROJAN, TYPE_VMESS},
    ss_sub::proxy_to_ss_sub,
    ssd::proxy_to_ssd,
    surge::proxy_to_surge,
};
use crate::models::{
    ExtraSettings, Proxy, ProxyGroupConfigs, RulesetContent, SubError, SubResult,
};
use crate::parser::{add_nodes, ParseSettings};
use crate::utils::node_manip::preprocess_nodes;

/// The output format for a conversion request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubconverterTarget {
    Clash,
    ClashR,
    Surge(i32),
    Surfboard,
    Mellow,
    SSSub,
    SS,
    SSR,
    V2Ray,
    Trojan,
    Mixed,
    Quantumult,
    QuantumultX,
    Loon,
    SSD,
}

impl SubconverterTarget {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "clash" => Some(SubconverterTarget::Clash),
            "clashr" => Some(SubconverterTarget::ClashR),
            "surge" => Some(SubconverterTarget::Surge(3)),
            "surfboard" => Some(SubconverterTarget::Surfboard),
            "mellow" => Some(SubconverterTarget::Mellow),
            "sssub" => Some(SubconverterTarget::SSSub),
            "ss" => Some(SubconverterTarget::SS),
            "ssr" => Some(SubconverterTarget::SSR),
            "v2ray" => Some(SubconverterTarget::V2Ray),
            "trojan" => Some(SubconverterTarget::Trojan),
            "mixed" => Some(SubconverterTarget::Mixed),
            "quan" => Some(SubconverterTarget::Quantumult),
            "quanx" => Some(SubconverterTarget::QuantumultX),
            "loon" => Some(SubconverterTarget::Loon),
            "ssd" => Some(SubconverterTarget::SSD),
            _ => None,
        }
    }

    pub fn to_str(&self) -> String {
        match self {
            SubconverterTarget::Clash => "clash".to_string(),
            SubconverterTarget::ClashR => "clashr".to_string(),
            SubconverterTarget::Surge(ver) => format!("surge{}", ver),
            SubconverterTarget::Surfboard => "surfboard".to_string(),
            SubconverterTarget::Mellow => "mellow".to_string(),
            SubconverterTarget::SSSub => "sssub".to_string(),
            SubconverterTarget::SS => "ss".to_string(),
            SubconverterTarget::SSR => "ssr".to_string(),
            SubconverterTarget::V2Ray => "v2ray".to_string(),
            SubconverterTarget::Trojan => "trojan".to_string(),
            SubconverterTarget::Mixed => "mixed".to_string(),
            SubconverterTarget::Quantumult => "quan".to_string(),
            SubconverterTarget::QuantumultX => "quanx".to_string(),
            SubconverterTarget::Loon => "loon".to_string(),
            SubconverterTarget::SSD => "ssd".to_string(),
        }
    }

    /// Simple subscription formats carry no rules or groups.
    pub fn is_simple(&self) -> bool {
        matches!(
            self,
            SubconverterTarget::SSSub
                | SubconverterTarget::SS
                | SubconverterTarget::SSR
                | SubconverterTarget::V2Ray
                | SubconverterTarget::Trojan
                | SubconverterTarget::Mixed
                | SubconverterTarget::SSD
        )
    }

    /// Targets whose artifact can carry a `#!MANAGED-CONFIG` first line.
    pub fn supports_managed_config(&self) -> bool {
        matches!(
            self,
            SubconverterTarget::Surge(_) | SubconverterTarget::Surfboard
        )
    }
}

/// Everything one conversion request needs.
#[derive(Debug, Clone, Default)]
pub struct SubconverterConfig {
    pub target: Option<SubconverterTarget>,
    pub urls: Vec<String>,
    pub insert_urls: Vec<String>,
    pub prepend_insert: bool,
    pub group_name: Option<String>,
    /// Base template body per target, prefetched by the request handler.
    pub base_content: HashMap<SubconverterTarget, String>,
    pub ruleset_content: Vec<RulesetContent>,
    pub proxy_groups: ProxyGroupConfigs,
    pub extra: ExtraSettings,
    pub parse_settings: ParseSettings,
    pub filename: Option<String>,
    pub update_interval: u32,
    pub update_strict: bool,
    /// Prefix for the `#!MANAGED-CONFIG` line; empty disables it.
    pub managed_config_prefix: String,
    /// Raw request query echoed into the managed-config URL.
    pub request_query: String,
    pub append_userinfo: bool,
}

/// Result of subscription conversion.
#[derive(Debug, Clone)]
pub struct SubconverterResult {
    pub content: String,
    pub headers: HashMap<String, String>,
}

/// Process a subscription conversion request.
pub fn subconverter(mut config: SubconverterConfig) -> SubResult<SubconverterResult> {
    let target = config.target.clone().ok_or(SubError::UnknownTarget)?;
    let mut response_headers = HashMap::new();
    let mut nodes: Vec<Proxy> = Vec::new();

    info!(
        "Processing subscription conversion request to {}.",
        target.to_str()
    );

    if config.urls.is_empty() && config.insert_urls.is_empty() {
        return Err(SubError::BadRequest("no subscription url provided".to_string()));
    }

    // insert sources first, with negative group ids so matchers can tell
    // them apart
    let mut insert_nodes: Vec<Proxy> = Vec::new();
    for (index, url) in config.insert_urls.iter().enumerate() {
        let group_id = -(index as i32 + 1);
        if let Err(e) = add_nodes(
            url.trim().to_string(),
            &mut insert_nodes,
            group_id,
            &mut config.parse_settings,
        ) {
            warn!("Failed to parse insert URL '{}': {}", url, e);
        }
    }

    for (index, url) in config.urls.iter().enumerate() {
        let group_id = index as i32 + 1;
        add_nodes(
            url.trim().to_string(),
            &mut nodes,
            group_id,
            &mut config.parse_settings,
        )?;
    }

    if nodes.is_empty() && insert_nodes.is_empty() {
        return Err(SubError::Parse("No nodes were found!".to_string()));
    }

    if config.prepend_insert {
        insert_nodes.append(&mut nodes);
        nodes = insert_nodes;
    } else {
        nodes.append(&mut insert_nodes);
    }

    if let Some(group_name) = &config.group_name {
        info!("Setting group name to '{}'.", group_name);
        for node in &mut nodes {
            node.group = group_name.clone();
        }
    }

    preprocess_nodes(&mut nodes, &config.extra);

    let base = |target: &SubconverterTarget| -> String {
        config.base_content.get(target).cloned().unwrap_or_default()
    };

    let ext = &config.extra;
    let output_content = match &target {
        SubconverterTarget::Clash | SubconverterTarget::ClashR => proxy_to_clash(
            &mut nodes,
            &base(&target),
            &config.ruleset_content,
            &config.proxy_groups,
            target == SubconverterTarget::ClashR,
            ext,
        )?,
        SubconverterTarget::Surge(ver) => {
            let output = proxy_to_surge(
                &mut nodes,
                &base(&target),
                &config.ruleset_content,
                &config.proxy_groups,
                *ver,
                ext,
            )?;
            prepend_managed_config_line(output, &config, &target)
        }
        SubconverterTarget::Surfboard => {
            let output = proxy_to_surge(
                &mut nodes,
                &base(&target),
                &config.ruleset_content,
                &config.proxy_groups,
                -3,
                ext,
            )?;
            prepend_managed_config_line(output, &config, &target)
        }
        SubconverterTarget::Mellow => proxy_to_mellow(
            &mut nodes,
            &base(&target),
            &config.ruleset_content,
            &config.proxy_groups,
            ext,
        )?,
        SubconverterTarget::SSSub => proxy_to_ss_sub(&base(&target), &mut nodes, ext)?,
        SubconverterTarget::SS => proxy_to_single(&mut nodes, TYPE_SS, ext)?,
        SubconverterTarget::SSR => proxy_to_single(&mut nodes, TYPE_SSR, ext)?,
        SubconverterTarget::V2Ray => proxy_to_single(&mut nodes, TYPE_VMESS, ext)?,
        SubconverterTarget::Trojan => proxy_to_single(&mut nodes, TYPE_TROJAN, ext)?,
        SubconverterTarget::Mixed => proxy_to_single(
            &mut nodes,
            TYPE_SS | TYPE_SSR | TYPE_VMESS | TYPE_TROJAN,
            ext,
        )?,
        SubconverterTarget::Quantumult => proxy_to_quan(
            &mut nodes,
            &base(&target),
            &config.ruleset_content,
            &config.proxy_groups,
            ext,
        )?,
        SubconverterTarget::QuantumultX => proxy_to_quanx(
            &mut nodes,
            &base(&target),
            &config.ruleset_content,
            &config.proxy_groups,
            ext,
        )?,
        SubconverterTarget::Loon => proxy_to_loon(
            &mut nodes,
            &base(&target),
            &config.ruleset_content,
            &config.proxy_groups,
            ext,
        )?,
        SubconverterTarget::SSD => proxy_to_ssd(
            &mut nodes,
            config.group_name.as_deref().unwrap_or(""),
            &config.parse_settings.sub_info,
            ext,
        )?,
    };

    if config.append_userinfo && !config.parse_settings.sub_info.is_empty() {
        response_headers.insert(
            "Subscription-UserInfo".to_string(),
            config.parse_settings.sub_info.clone(),
        );
    }

    if let Some(filename) = &config.filename {
        response_headers.insert(
            "Content-Disposition".to_string(),
            format!("attachment; filename=\"{}\"", filename),
        );
    }

    info!("Conversion completed.");
    Ok(SubconverterResult {
        content: output_content,
        headers: response_headers,
    })
}

/// Prefix the body with an in-band `#!MANAGED-CONFIG` line when enabled.
fn prepend_managed_config_line(
    output: String,
    config: &SubconverterConfig,
    target: &SubconverterTarget,
) -> String {
    if config.managed_config_prefix.is_empty() || config.extra.nodelist {
        return output;
    }
    debug_assert!(target.supports_managed_config());
    format!(
        "#!MANAGED-CONFIG {}/sub?{} interval={} strict={}\n\n{}",
        config.managed_config_prefix,
        config.request_query,
        config.update_interval,
        if config.update_strict { "true" } else { "false" },
        output
    )
}
