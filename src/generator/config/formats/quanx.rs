use lazy_static::lazy_static;
use log::error;
use regex::Regex;

use crate::generator::config::group::group_generate;
use crate::generator::config::remark::process_remark;
use crate::generator::ruleconvert::ruleset_to_surge;
use crate::models::{
    ExtraSettings, Proxy, ProxyGroupConfigs, ProxyGroupType, ProxyType, RulesetContent, SubError,
    SubResult,
};
use crate::utils::base64::url_safe_base64_encode;
use crate::utils::ini_reader::{IniReader, NONAME};
use crate::utils::string::replace_all_distinct;
use crate::utils::tribool::TriboolExt;
use crate::utils::url::{get_url_arg, is_link};

lazy_static! {
    static ref SCRIPT_PATTERN: Regex = Regex::new(r"^(.*? url script-.*? )(.*?)$").unwrap();
}

/// Convert proxies to the Quantumult X configuration format.
pub fn proxy_to_quanx(
    nodes: &mut Vec<Proxy>,
    base_conf: &str,
    ruleset_content_array: &[RulesetContent],
    extra_proxy_group: &ProxyGroupConfigs,
    ext: &ExtraSettings,
) -> SubResult<String> {
    let mut ini = IniReader::new();
    ini.store_any_line = true;
    for section in [
        "general",
        "dns",
        "rewrite_local",
        "rewrite_remote",
        "task_local",
        "mitm",
        "server_remote",
    ] {
        ini.add_direct_save_section(section);
    }
    if !ext.nodelist && !base_conf.trim().is_empty() {
        if let Err(e) = ini.parse(base_conf) {
            error!("QuantumultX base loader failed with error: {}", e);
            return Err(SubError::Config(format!(
                "invalid Quantumult X base: {}",
                e
            )));
        }
    }

    proxy_to_quanx_ini(
        nodes,
        &mut ini,
        ruleset_content_array,
        extra_proxy_group,
        ext,
    );

    if ext.nodelist {
        return Ok(ini.get_all("server_local", NONAME).join("\n"));
    }
    Ok(ini.to_ini_string())
}

fn proxy_to_quanx_ini(
    nodes: &mut Vec<Proxy>,
    ini: &mut IniReader,
    ruleset_content_array: &[RulesetContent],
    extra_proxy_group: &ProxyGroupConfigs,
    ext: &ExtraSettings,
) {
    let mut nodelist: Vec<Proxy> = Vec::new();
    let mut remarks_list: Vec<String> = Vec::new();

    ini.set_current_section("server_local");
    ini.erase_section();

    for node in nodes.iter_mut() {
        if ext.append_proxy_type {
            node.remark = format!("[{}] {}", node.proxy_type.as_str(), node.remark);
        }
        let mut remark = node.remark.clone();
        process_remark(&mut remark, &remarks_list, true);

        let hostname = node.hostname.clone();
        let port = node.port.to_string();
        let mut method = node.encrypt_method.clone().unwrap_or_default();

        let udp = node.udp.define(ext.udp);
        let tfo = node.tcp_fast_open.define(ext.tfo);
        let scv = node.allow_insecure.define(ext.skip_cert_verify);
        let tls13 = node.tls13.define(ext.tls13);

        let mut proxy_str = match node.proxy_type {
            ProxyType::VMess => {
                let id = node.user_id.clone().unwrap_or_default();
                let host = node.host.clone().unwrap_or_default();
                let path = node.path.clone().unwrap_or_default();
                if method == "auto" {
                    method = "chacha20-ietf-poly1305".to_string();
                }
                let mut line = format!(
                    "vmess = {}:{}, method={}, password={}",
                    hostname, port, method, id
                );
                if node.tls_secure {
                    if let Some(tls13) = tls13 {
                        line.push_str(&format!(", tls13={}", tls13));
                    }
                }
                match node.transfer_protocol.as_deref() {
                    Some("ws") => {
                        if node.tls_secure {
                            line.push_str(", obfs=wss");
                        } else {
                            line.push_str(", obfs=ws");
                        }
                        line.push_str(&format!(", obfs-host={}, obfs-uri={}", host, path));
                    }
                    _ => {
                        if node.tls_secure {
                            line.push_str(&format!(", obfs=over-tls, obfs-host={}", host));
                        }
                    }
                }
                line
            }
            ProxyType::Shadowsocks => {
                let password = node.password.clone().unwrap_or_default();
                let plugin = node.plugin.clone().unwrap_or_default();
                let plugin_opts = node.plugin_option.clone().unwrap_or_default();
                let mut line = format!(
                    "shadowsocks = {}:{}, method={}, password={}",
                    hostname, port, method, password
                );
                match plugin.as_str() {
                    "" => {}
                    "simple-obfs" | "obfs-local" => {
                        if !plugin_opts.is_empty() {
                            line.push_str(&format!(
                                ", {}",
                                replace_all_distinct(&plugin_opts, ";", ", ")
                            ));
                        }
                    }
                    "v2ray-plugin" => {
                        let opts = replace_all_distinct(&plugin_opts, ";", "&");
                        let mut obfs = if get_url_arg(&opts, "mode") == "websocket" {
                            "ws".to_string()
                        } else {
                            String::new()
                        };
                        let host = get_url_arg(&opts, "host");
                        let path = get_url_arg(&opts, "path");
                        if opts.contains("tls") && obfs == "ws" {
                            obfs.push('s');
                            if let Some(tls13) = tls13 {
                                line.push_str(&format!(", tls13={}", tls13));
                            }
                        }
                        line.push_str(&format!(", obfs={}", obfs));
                        if !host.is_empty() {
                            line.push_str(&format!(", obfs-host={}", host));
                        }
                        if !path.is_empty() {
                            line.push_str(&format!(", obfs-uri={}", path));
                        }
                    }
                    _ => continue,
                }
                line
            }
            ProxyType::ShadowsocksR => {
                let password = node.password.clone().unwrap_or_default();
                let protocol = node.protocol.clone().unwrap_or_default();
                let protocol_param = node.protocol_param.clone().unwrap_or_default();
                let obfs = node.obfs.clone().unwrap_or_default();
                let obfs_param = node.obfs_param.clone().unwrap_or_default();
                let mut line = format!(
                    "shadowsocks = {}:{}, method={}, password={}, ssr-protocol={}",
                    hostname, port, method, password, protocol
                );
                if !protocol_param.is_empty() {
                    line.push_str(&format!(", ssr-protocol-param={}", protocol_param));
                }
                line.push_str(&format!(", obfs={}", obfs));
                if !obfs_param.is_empty() {
                    line.push_str(&format!(", obfs-host={}", obfs_param));
                }
                line
            }
            ProxyType::HTTP | ProxyType::HTTPS => {
                let username = node.username.clone().unwrap_or_default();
                let password = node.password.clone().unwrap_or_default();
                let mut line = format!(
                    "http = {}:{}, username={}, password={}",
                    hostname,
                    port,
                    if username.is_empty() { "none" } else { username.as_str() },
                    if password.is_empty() { "none" } else { password.as_str() }
                );
                if node.tls_secure {
                    line.push_str(", over-tls=true");
                    if let Some(tls13) = tls13 {
                        line.push_str(&format!(", tls13={}", tls13));
                    }
                }
                line
            }
            ProxyType::Trojan => {
                let password = node.password.clone().unwrap_or_default();
                let host = node.host.clone().unwrap_or_default();
                let mut line = format!("trojan = {}:{}, password={}", hostname, port, password);
                if node.tls_secure {
                    line.push_str(&format!(", over-tls=true, tls-host={}", host));
                    if let Some(tls13) = tls13 {
                        line.push_str(&format!(", tls13={}", tls13));
                    }
                }
                line
            }
            _ => continue,
        };

        if let Some(tfo) = tfo {
            proxy_str.push_str(&format!(", fast-open={}", tfo));
        }
        if let Some(udp) = udp {
            proxy_str.push_str(&format!(", udp-relay={}", udp));
        }
        if matches!(node.proxy_type, ProxyType::HTTP | ProxyType::HTTPS | ProxyType::Trojan) {
            if let Some(scv) = scv {
                proxy_str.push_str(&format!(", tls-verification={}", !scv));
            }
        }
        proxy_str.push_str(&format!(", tag={}", remark));

        ini.set_current(NONAME, &proxy_str);
        node.remark = remark.clone();
        remarks_list.push(remark);
        nodelist.push(node.clone());
    }

    if ext.nodelist {
        return;
    }

    // existing policies may carry an img-url suffix that must be kept
    let original_groups = ini.get_items("policy");
    ini.erase_section_by_name("policy");
    ini.set_current_section("policy");

    for group in extra_proxy_group {
        let mut filtered_nodelist: Vec<String> = Vec::new();
        let mut group_type = match group.group_type {
            ProxyGroupType::Select => "static",
            ProxyGroupType::URLTest | ProxyGroupType::Fallback => "available",
            ProxyGroupType::LoadBalance => "round-robin",
            ProxyGroupType::SSID => {
                if group.proxies.len() < 2 {
                    continue;
                }
                for item in &group.proxies {
                    filtered_nodelist.push(replace_all_distinct(item, "=", ":"));
                }
                let line = format!("ssid={}, {}", group.name, filtered_nodelist.join(", "));
                ini.set_current(NONAME, &line);
                continue;
            }
            ProxyGroupType::Relay => continue,
        };

        for selector in &group.proxies {
            group_generate(selector, &nodelist, &mut filtered_nodelist, true, ext);
        }
        if filtered_nodelist.is_empty() {
            filtered_nodelist.push("direct".to_string());
        }
        if filtered_nodelist.len() < 2 {
            group_type = "static";
        }

        // preserve the img-url trailer of a replaced policy
        for (key, value) in &original_groups {
            let content = if key == NONAME {
                value.clone()
            } else {
                format!("{}={}", key, value)
            };
            if let Some((name, rest)) = content.split_once(',') {
                if name.split_once('=').map(|(_, n)| n.trim()) == Some(group.name.as_str()) {
                    if let Some(last) = rest.split(',').next_back() {
                        if last.trim().starts_with("img-url") {
                            filtered_nodelist.push(last.trim().to_string());
                        }
                    }
                }
            }
        }

        let line = format!(
            "{}={}, {}",
            group_type,
            group.name,
            filtered_nodelist.join(", ")
        );
        ini.set_current(NONAME, &line);
    }

    if ext.enable_rule_generator {
        ruleset_to_surge(
            ini,
            ruleset_content_array,
            -1,
            ext.overwrite_original_rules,
            &ext.managed_config_prefix,
            ext.max_allowed_rules,
        );
    }

    // re-point rewrite/script remotes through this server to inject the
    // device id
    if ext.quanx_dev_id.is_empty() || ext.managed_config_prefix.is_empty() {
        return;
    }

    let rewrites = ini.get_items("rewrite_local");
    if !rewrites.is_empty() {
        ini.erase_section_by_name("rewrite_local");
        ini.set_current_section("rewrite_local");
        for (key, value) in rewrites {
            let content = if key == NONAME {
                value
            } else {
                format!("{}={}", key, value)
            };
            let content = if let Some(caps) = SCRIPT_PATTERN.captures(&content) {
                let url = &caps[2];
                if is_link(url) {
                    format!(
                        "{}{}/qx-script?id={}&url={}",
                        &caps[1],
                        ext.managed_config_prefix,
                        ext.quanx_dev_id,
                        url_safe_base64_encode(url)
                    )
                } else {
                    content.clone()
                }
            } else {
                content
            };
            ini.set_current(NONAME, &content);
        }
    }

    let remotes = ini.get_items("rewrite_remote");
    if !remotes.is_empty() {
        ini.erase_section_by_name("rewrite_remote");
        ini.set_current_section("rewrite_remote");
        for (key, value) in remotes {
            let content = if key == NONAME {
                value
            } else {
                format!("{}={}", key, value)
            };
            let content = if is_link(&content) {
                let pos = content.find(',');
                let url_part = match pos {
                    Some(pos) => &content[..pos],
                    None => &content[..],
                };
                let mut replaced = format!(
                    "{}/qx-rewrite?id={}&url={}",
                    ext.managed_config_prefix,
                    ext.quanx_dev_id,
                    url_safe_base64_encode(url_part)
                );
                if let Some(pos) = pos {
                    replaced.push_str(&content[pos..]);
                }
                replaced
            } else {
                content
            };
            ini.set_current(NONAME, &content);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::proxy_group_config::ProxyGroupConfig;

    fn ss_node(remark: &str) -> Proxy {
        let mut node = Proxy::ss_construct(
            "SSProvider",
            remark,
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
        );
        node.group_id = 1;
        node
    }

    #[test]
    fn test_proxy_to_quanx_server_local() {
        let mut nodes = vec![ss_node("Node")];
        let ext = ExtraSettings::default();
        let output = proxy_to_quanx(&mut nodes, "", &[], &vec![], &ext).unwrap();
        assert!(output.contains("[server_local]"));
        assert!(output.contains(
            "shadowsocks = 1.2.3.4:8388, method=aes-128-gcm, password=pass, tag=Node"
        ));
    }

    #[test]
    fn test_proxy_to_quanx_policy_types() {
        let mut nodes = vec![ss_node("US-01"), ss_node("US-02")];
        let groups = vec![
            ProxyGroupConfig {
                name: "Picker".to_string(),
                group_type: ProxyGroupType::Select,
                proxies: vec!["^US".to_string()],
                ..Default::default()
            },
            ProxyGroupConfig {
                name: "Auto".to_string(),
                group_type: ProxyGroupType::URLTest,
                proxies: vec!["^US".to_string()],
                url: "http://cp.cloudflare.com/generate_204".to_string(),
                interval: 300,
                ..Default::default()
            },
        ];
        let ext = ExtraSettings::default();
        let output = proxy_to_quanx(&mut nodes, "", &[], &groups, &ext).unwrap();
        assert!(output.contains("static=Picker, US-01, US-02"));
        assert!(output.contains("available=Auto, US-01, US-02"));
    }

    #[test]
    fn test_proxy_to_quanx_single_node_group_forced_static() {
        let mut nodes = vec![ss_node("Lone")];
        let groups = vec![ProxyGroupConfig {
            name: "Auto".to_string(),
            group_type: ProxyGroupType::URLTest,
            proxies: vec!["^Lone".to_string()],
            url: "http://cp.cloudflare.com/generate_204".to_string(),
            interval: 300,
            ..Default::default()
        }];
        let ext = ExtraSettings::default();
        let output = proxy_to_quanx(&mut nodes, "", &[], &groups, &ext).unwrap();
        assert!(output.contains("static=Auto, Lone"));
    }

    #[test]
    fn test_proxy_to_quanx_nodelist() {
        let mut nodes = vec![ss_node("Node")];
        let mut ext = ExtraSettings::default();
        ext.nodelist = true;
        let output = proxy_to_quanx(&mut nodes, "", &[], &vec![], &ext).unwrap();
        assert!(output.starts_with("shadowsocks = 1.2.3.4:8388"));
    }

    #[test]
    fn test_proxy_to_quanx_trojan_tls_verification() {
        let mut trojan = Proxy::trojan_construct(
            "TrojanProvider",
            "T",
            "example.com",
            443,
            "pw",
            "sni.example.com",
            true,
            None,
            None,
            Some(true),
            None,
        );
        trojan.group_id = 1;
        let ext = ExtraSettings::default();
        let output = proxy_to_quanx(&mut vec![trojan], "", &[], &vec![], &ext).unwrap();
        assert!(output.contains("tls-verification=false"));
    }
}
