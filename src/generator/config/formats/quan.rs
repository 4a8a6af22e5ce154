use log::error;

use crate::generator::config::group::group_generate;
use crate::generator::config::remark::process_remark;
use crate::generator::ruleconvert::ruleset_to_surge;
use crate::models::{
    ExtraSettings, Proxy, ProxyGroupConfigs, ProxyGroupType, ProxyType, RulesetContent, SubError,
    SubResult,
};
use crate::utils::base64::{base64_encode, url_safe_base64_encode};
use crate::utils::ini_reader::{IniReader, NONAME};
use crate::utils::matcher::reg_replace;
use crate::utils::string::{replace_all_distinct, trim_of};
use crate::utils::tribool::TriboolExt;
use crate::utils::url::url_encode;

/// Convert proxies to the Quantumult (v1) configuration format.
pub fn proxy_to_quan(
    nodes: &mut Vec<Proxy>,
    base_conf: &str,
    ruleset_content_array: &[RulesetContent],
    extra_proxy_group: &ProxyGroupConfigs,
    ext: &ExtraSettings,
) -> SubResult<String> {
    let mut ini = IniReader::new();
    ini.store_any_line = true;
    if !ext.nodelist && !base_conf.trim().is_empty() {
        if let Err(e) = ini.parse(base_conf) {
            error!("Quantumult base loader failed with error: {}", e);
            return Err(SubError::Config(format!("invalid Quantumult base: {}", e)));
        }
    }

    proxy_to_quan_ini(
        nodes,
        &mut ini,
        ruleset_content_array,
        extra_proxy_group,
        ext,
    );

    if ext.nodelist {
        let all_nodes = ini.get_all("SERVER", NONAME);
        return Ok(base64_encode(&all_nodes.join("\n")));
    }
    Ok(ini.to_ini_string())
}

fn proxy_to_quan_ini(
    nodes: &mut Vec<Proxy>,
    ini: &mut IniReader,
    ruleset_content_array: &[RulesetContent],
    extra_proxy_group: &ProxyGroupConfigs,
    ext: &ExtraSettings,
) {
    let mut nodelist: Vec<Proxy> = Vec::new();
    let mut remarks_list: Vec<String> = Vec::new();

    ini.set_current_section("SERVER");
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
        let password = node.password.clone().unwrap_or_default();

        let scv = node.allow_insecure.define(ext.skip_cert_verify);

        let proxy_str = match node.proxy_type {
            ProxyType::VMess => {
                let id = node.user_id.clone().unwrap_or_default();
                let host = node.host.clone().unwrap_or_default();
                let edge = node.edge.clone().unwrap_or_default();
                let path = node.path.clone().unwrap_or_default();
                if method == "auto" {
                    method = "chacha20-ietf-poly1305".to_string();
                }
                let mut line = format!(
                    "{} = vmess, {}, {}, {}, \"{}\", group={}",
                    remark, hostname, port, method, id, node.group
                );
                if node.tls_secure {
                    line.push_str(&format!(", over-tls=true, tls-host={}", host));
                    if let Some(scv) = scv {
                        line.push_str(&format!(", certificate={}", if scv { "0" } else { "1" }));
                    }
                }
                if node.transfer_protocol.as_deref() == Some("ws") {
                    line.push_str(&format!(
                        ", obfs=ws, obfs-path=\"{}\", obfs-header=\"Host: {}",
                        path, host
                    ));
                    if !edge.is_empty() {
                        line.push_str(&format!("[Rr][Nn]Edge: {}", edge));
                    }
                    line.push('"');
                }

                if ext.nodelist {
                    format!("vmess://{}", url_safe_base64_encode(&line))
                } else {
                    line
                }
            }
            ProxyType::ShadowsocksR => {
                let protocol = node.protocol.clone().unwrap_or_default();
                let protocol_param = node.protocol_param.clone().unwrap_or_default();
                let obfs = node.obfs.clone().unwrap_or_default();
                let obfs_param = node.obfs_param.clone().unwrap_or_default();
                if ext.nodelist {
                    format!(
                        "ssr://{}",
                        url_safe_base64_encode(&format!(
                            "{}:{}:{}:{}:{}:{}/?group={}&remarks={}&obfsparam={}&protoparam={}",
                            hostname,
                            port,
                            protocol,
                            method,
                            obfs,
                            url_safe_base64_encode(&password),
                            url_safe_base64_encode(&node.group),
                            url_safe_base64_encode(&remark),
                            url_safe_base64_encode(&obfs_param),
                            url_safe_base64_encode(&protocol_param)
                        ))
                    )
                } else {
                    let mut line = format!(
                        "{} = shadowsocksr, {}, {}, {}, \"{}\", group={}, protocol={}, obfs={}",
                        remark, hostname, port, method, password, node.group, protocol, obfs
                    );
                    if !protocol_param.is_empty() {
                        line.push_str(&format!(", protocol_param={}", protocol_param));
                    }
                    if !obfs_param.is_empty() {
                        line.push_str(&format!(", obfs_param={}", obfs_param));
                    }
                    line
                }
            }
            ProxyType::Shadowsocks => {
                let plugin = node.plugin.clone().unwrap_or_default();
                let plugin_opts = node.plugin_option.clone().unwrap_or_default();
                if ext.nodelist {
                    let mut line = format!(
                        "ss://{}@{}:{}",
                        url_safe_base64_encode(&format!("{}:{}", method, password)),
                        hostname,
                        port
                    );
                    if !plugin.is_empty() && !plugin_opts.is_empty() {
                        line.push_str(&format!(
                            "/?plugin={}",
                            url_encode(&format!("{};{}", plugin, plugin_opts))
                        ));
                    }
                    line.push_str(&format!(
                        "&group={}#{}",
                        url_safe_base64_encode(&node.group),
                        url_encode(&remark)
                    ));
                    line
                } else {
                    let mut line = format!(
                        "{} = shadowsocks, {}, {}, {}, \"{}\", group={}",
                        remark, hostname, port, method, password, node.group
                    );
                    if plugin == "simple-obfs" || plugin == "obfs-local" {
                        if !plugin_opts.is_empty() {
                            line.push_str(&format!(
                                ", {}",
                                replace_all_distinct(&plugin_opts, ";", ", ")
                            ));
                        }
                    }
                    line
                }
            }
            ProxyType::HTTP | ProxyType::HTTPS => {
                let username = node.username.clone().unwrap_or_default();
                let host = node.host.clone().unwrap_or_default();
                let mut line = format!(
                    "{} = http, upstream-proxy-address={}, upstream-proxy-port={}, group={}",
                    remark, hostname, port, node.group
                );
                if !username.is_empty() && !password.is_empty() {
                    line.push_str(&format!(
                        ", upstream-proxy-auth=true, upstream-proxy-username={}, upstream-proxy-password={}",
                        username, password
                    ));
                } else {
                    line.push_str(", upstream-proxy-auth=false");
                }
                if node.tls_secure {
                    line.push_str(", over-tls=true");
                    if !host.is_empty() {
                        line.push_str(&format!(", tls-host={}", host));
                    }
                    if let Some(scv) = scv {
                        line.push_str(&format!(", certificate={}", if scv { "0" } else { "1" }));
                    }
                }
                if ext.nodelist {
                    format!("http://{}", url_safe_base64_encode(&line))
                } else {
                    line
                }
            }
            ProxyType::Socks5 => {
                let username = node.username.clone().unwrap_or_default();
                let host = node.host.clone().unwrap_or_default();
                let mut line = format!(
                    "{} = socks, upstream-proxy-address={}, upstream-proxy-port={}, group={}",
                    remark, hostname, port, node.group
                );
                if !username.is_empty() && !password.is_empty() {
                    line.push_str(&format!(
                        ", upstream-proxy-auth=true, upstream-proxy-username={}, upstream-proxy-password={}",
                        username, password
                    ));
                } else {
                    line.push_str(", upstream-proxy-auth=false");
                }
                if node.tls_secure {
                    line.push_str(", over-tls=true");
                    if !host.is_empty() {
                        line.push_str(&format!(", tls-host={}", host));
                    }
                    if let Some(scv) = scv {
                        line.push_str(&format!(", certificate={}", if scv { "0" } else { "1" }));
                    }
                }
                if ext.nodelist {
                    format!("socks://{}", url_safe_base64_encode(&line))
                } else {
                    line
                }
            }
            _ => continue,
        };

        ini.set_current(NONAME, &proxy_str);
        node.remark = remark.clone();
        remarks_list.push(remark);
        nodelist.push(node.clone());
    }

    if ext.nodelist {
        return;
    }

    ini.set_current_section("POLICY");
    ini.erase_section();

    for group in extra_proxy_group {
        let mut filtered_nodelist: Vec<String> = Vec::new();
        let mut group_type = match group.group_type {
            ProxyGroupType::Select | ProxyGroupType::Fallback => "static",
            ProxyGroupType::URLTest => "auto",
            ProxyGroupType::LoadBalance => "balance, round-robin",
            ProxyGroupType::SSID => {
                if group.proxies.len() < 2 {
                    continue;
                }
                let mut single_group =
                    format!("{} : wifi = {}", group.name, group.proxies[0]);
                let mut content = String::new();
                let mut celluar = String::new();
                let celluar_matcher = r"^(.*?),?celluar\s?=\s?(.*?)(,.*)$";
                for item in &group.proxies[1..] {
                    let replaced = reg_replace(item, celluar_matcher, "$1$3", false);
                    if replaced == *item {
                        content.push_str(item);
                        content.push('\n');
                    } else {
                        celluar = reg_replace(item, celluar_matcher, "$2", false);
                        content.push_str(&replaced);
                        content.push('\n');
                    }
                }
                if !celluar.is_empty() {
                    single_group.push_str(&format!(", celluar = {}", celluar));
                }
                single_group.push('\n');
                single_group
                    .push_str(&replace_all_distinct(trim_of(&content, ','), ",", "\n"));
                ini.set_current(NONAME, &base64_encode(&single_group));
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
        // groups with a single node must be static
        if filtered_nodelist.len() < 2 {
            group_type = "static";
        }

        let mut single_group = format!("{} : {}", group.name, group_type);
        if group_type == "static" {
            single_group.push_str(&format!(", {}", filtered_nodelist[0]));
        }
        single_group.push('\n');
        single_group.push_str(&filtered_nodelist.join("\n"));
        single_group.push('\n');
        ini.set_current(NONAME, &base64_encode(&single_group));
    }

    if ext.enable_rule_generator {
        ruleset_to_surge(
            ini,
            ruleset_content_array,
            -2,
            ext.overwrite_original_rules,
            "",
            ext.max_allowed_rules,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::proxy_group_config::ProxyGroupConfig;
    use crate::utils::base64::base64_decode;

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
    fn test_proxy_to_quan_server_line() {
        let mut nodes = vec![ss_node("Node")];
        let ext = ExtraSettings::default();
        let output = proxy_to_quan(&mut nodes, "", &[], &vec![], &ext).unwrap();
        assert!(output.contains("[SERVER]"));
        assert!(output
            .contains("Node = shadowsocks, 1.2.3.4, 8388, aes-128-gcm, \"pass\", group=SSProvider"));
    }

    #[test]
    fn test_proxy_to_quan_policy_base64() {
        let mut nodes = vec![ss_node("US-01"), ss_node("US-02")];
        let groups = vec![ProxyGroupConfig {
            name: "Auto".to_string(),
            group_type: ProxyGroupType::URLTest,
            proxies: vec!["^US".to_string()],
            url: "http://www.gstatic.com/generate_204".to_string(),
            interval: 300,
            ..Default::default()
        }];
        let ext = ExtraSettings::default();
        let output = proxy_to_quan(&mut nodes, "", &[], &groups, &ext).unwrap();
        assert!(output.contains("[POLICY]"));

        let encoded = output
            .lines()
            .skip_while(|l| *l != "[POLICY]")
            .nth(1)
            .unwrap();
        let decoded = base64_decode(encoded);
        assert!(decoded.starts_with("Auto : auto\n"));
        assert!(decoded.contains("US-01"));
        assert!(decoded.contains("US-02"));
    }

    #[test]
    fn test_proxy_to_quan_nodelist() {
        let mut nodes = vec![ss_node("Node")];
        let mut ext = ExtraSettings::default();
        ext.nodelist = true;
        let output = proxy_to_quan(&mut nodes, "", &[], &vec![], &ext).unwrap();
        let decoded = base64_decode(&output);
        assert!(decoded.starts_with("ss://"));
    }
}
