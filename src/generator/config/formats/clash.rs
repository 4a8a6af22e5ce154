use std::collections::HashSet;

use lazy_static::lazy_static;
use log::error;
use serde_json::{json, Map, Value as JsonValue};
use serde_yaml::{Mapping, Sequence, Value as YamlValue};

use crate::generator::config::group::group_generate;
use crate::generator::config::remark::process_remark;
use crate::generator::ruleconvert::ruleset_to_clash_str;
use crate::models::{
    ExtraSettings, Proxy, ProxyGroupConfigs, ProxyGroupType, ProxyType, RulesetContent, SubError,
    SubResult,
};
use crate::utils::string::replace_all_distinct;
use crate::utils::tribool::TriboolExt;
use crate::utils::url::get_url_arg;

// Lists of supported protocols and encryption methods for filtering in ClashR
lazy_static! {
    static ref CLASH_SSR_CIPHERS: HashSet<&'static str> = HashSet::from([
        "aes-128-cfb",
        "aes-192-cfb",
        "aes-256-cfb",
        "aes-128-ctr",
        "aes-192-ctr",
        "aes-256-ctr",
        "aes-128-ofb",
        "aes-192-ofb",
        "aes-256-ofb",
        "des-cfb",
        "bf-cfb",
        "cast5-cfb",
        "rc4-md5",
        "chacha20",
        "chacha20-ietf",
        "salsa20",
        "camellia-128-cfb",
        "camellia-192-cfb",
        "camellia-256-cfb",
        "idea-cfb",
        "rc2-cfb",
        "seed-cfb",
    ]);
    static ref CLASHR_PROTOCOLS: HashSet<&'static str> = HashSet::from([
        "origin",
        "auth_sha1_v4",
        "auth_aes128_md5",
        "auth_aes128_sha1",
        "auth_chain_a",
        "auth_chain_b",
    ]);
    static ref CLASHR_OBFS: HashSet<&'static str> = HashSet::from([
        "plain",
        "http_simple",
        "http_post",
        "random_head",
        "tls1.2_ticket_auth",
        "tls1.2_ticket_fastauth",
    ]);
}

/// Convert proxies to the Clash configuration format, merging into the base
/// template and appending the generated rule block.
pub fn proxy_to_clash(
    nodes: &mut Vec<Proxy>,
    base_conf: &str,
    ruleset_content_array: &[RulesetContent],
    extra_proxy_group: &ProxyGroupConfigs,
    clash_r: bool,
    ext: &ExtraSettings,
) -> SubResult<String> {
    let mut yaml_node: YamlValue = if base_conf.trim().is_empty() {
        YamlValue::Mapping(Mapping::new())
    } else {
        match serde_yaml::from_str(base_conf) {
            Ok(node) => node,
            Err(e) => {
                error!("Clash base loader failed with error: {}", e);
                return Err(SubError::Config(format!("invalid Clash base: {}", e)));
            }
        }
    };
    if yaml_node.is_null() {
        yaml_node = YamlValue::Mapping(Mapping::new());
    }

    proxy_to_clash_yaml(nodes, &mut yaml_node, extra_proxy_group, clash_r, ext);

    if ext.nodelist || !ext.enable_rule_generator {
        return serde_yaml::to_string(&yaml_node)
            .map_err(|e| SubError::Emit(e.to_string()));
    }

    let rules_str = ruleset_to_clash_str(
        &yaml_node,
        ruleset_content_array,
        ext.overwrite_original_rules,
        ext.clash_new_field_name,
        ext.max_allowed_rules,
    );

    // the rule block is appended as text, drop any original one
    if let Some(map) = yaml_node.as_mapping_mut() {
        let field_name = if ext.clash_new_field_name {
            "rules"
        } else {
            "Rule"
        };
        let key = YamlValue::String(field_name.to_string());
        map.remove(&key);
    }

    let yaml_output =
        serde_yaml::to_string(&yaml_node).map_err(|e| SubError::Emit(e.to_string()))?;
    Ok(format!("{}{}", yaml_output, rules_str))
}

fn proxy_to_clash_yaml(
    nodes: &mut Vec<Proxy>,
    yaml_node: &mut YamlValue,
    extra_proxy_group: &ProxyGroupConfigs,
    clash_r: bool,
    ext: &ExtraSettings,
) {
    let mut proxies_json = Vec::new();
    let mut remarks_list = Vec::new();

    for node in nodes.iter_mut() {
        let mut remark = node.remark.clone();

        if ext.append_proxy_type {
            remark = format!("[{}] {}", node.proxy_type.as_str(), remark);
        }

        process_remark(&mut remark, &remarks_list, false);

        let udp = node.udp.define(ext.udp);
        let tfo = node.tcp_fast_open.define(ext.tfo);
        let scv = node.allow_insecure.define(ext.skip_cert_verify);

        let handled = match node.proxy_type {
            ProxyType::Shadowsocks => handle_shadowsocks(node, &remark, &scv, ext),
            ProxyType::ShadowsocksR => handle_shadowsocksr(node, &remark, clash_r, ext),
            ProxyType::VMess => handle_vmess(node, &remark, ext),
            ProxyType::Trojan => handle_trojan(node, &remark),
            ProxyType::HTTP | ProxyType::HTTPS => handle_http(node, &remark),
            ProxyType::Socks5 => handle_socks5(node, &remark),
            ProxyType::Snell => handle_snell(node, &remark),
            ProxyType::Unknown => continue,
        };
        let mut proxy_json = match handled {
            Some(value) => value,
            None => continue,
        };

        if let Some(obj) = proxy_json.as_object_mut() {
            udp.apply_to_json(obj, "udp");
            tfo.apply_to_json(obj, "tfo");
            scv.apply_to_json(obj, "skip-cert-verify");
        }

        remarks_list.push(remark);
        node.remark = remarks_list.last().cloned().unwrap_or_default();
        proxies_json.push(proxy_json);
    }

    if ext.nodelist {
        let mut provider = Mapping::new();
        provider.insert(
            YamlValue::String("proxies".to_string()),
            serde_yaml::to_value(&proxies_json).unwrap_or(YamlValue::Sequence(Vec::new())),
        );
        *yaml_node = YamlValue::Mapping(provider);
        return;
    }

    let proxies_field = if ext.clash_new_field_name {
        "proxies"
    } else {
        "Proxy"
    };
    let groups_field = if ext.clash_new_field_name {
        "proxy-groups"
    } else {
        "Proxy Group"
    };

    if let Some(map) = yaml_node.as_mapping_mut() {
        map.insert(
            YamlValue::String(proxies_field.to_string()),
            serde_yaml::to_value(&proxies_json).unwrap_or(YamlValue::Sequence(Vec::new())),
        );
    }

    if extra_proxy_group.is_empty() {
        return;
    }

    let mut original_groups = match yaml_node.get(groups_field) {
        Some(YamlValue::Sequence(seq)) => seq.clone(),
        _ => Sequence::new(),
    };

    for group in extra_proxy_group {
        let mut group_map = Mapping::new();
        group_map.insert(
            YamlValue::String("name".to_string()),
            YamlValue::String(group.name.clone()),
        );

        match group.group_type {
            ProxyGroupType::Select | ProxyGroupType::Relay => {}
            ProxyGroupType::URLTest | ProxyGroupType::Fallback | ProxyGroupType::LoadBalance => {}
            // Clash cannot represent ssid groups
            ProxyGroupType::SSID => continue,
        }
        group_map.insert(
            YamlValue::String("type".to_string()),
            YamlValue::String(group.type_str().to_string()),
        );

        if group.group_type.has_url() {
            group_map.insert(
                YamlValue::String("url".to_string()),
                YamlValue::String(group.url.clone()),
            );
            if group.interval > 0 {
                group_map.insert(
                    YamlValue::String("interval".to_string()),
                    YamlValue::Number(group.interval.into()),
                );
            }
            if group.tolerance > 0 {
                group_map.insert(
                    YamlValue::String("tolerance".to_string()),
                    YamlValue::Number(group.tolerance.into()),
                );
            }
        }

        let mut filtered_nodes = Vec::new();
        for selector in &group.proxies {
            group_generate(selector, nodes, &mut filtered_nodes, true, ext);
        }

        if !group.using_provider.is_empty() {
            let provider_seq = group
                .using_provider
                .iter()
                .map(|name| YamlValue::String(name.clone()))
                .collect::<Vec<_>>();
            group_map.insert(
                YamlValue::String("use".to_string()),
                YamlValue::Sequence(provider_seq),
            );
        } else if filtered_nodes.is_empty() {
            filtered_nodes.push("DIRECT".to_string());
        }

        if !filtered_nodes.is_empty() {
            let proxies_seq = filtered_nodes
                .into_iter()
                .map(YamlValue::String)
                .collect::<Vec<_>>();
            group_map.insert(
                YamlValue::String("proxies".to_string()),
                YamlValue::Sequence(proxies_seq),
            );
        }

        let proxy_group = YamlValue::Mapping(group_map);

        // replace an existing group of the same name, else append
        let mut replaced = false;
        for elem in original_groups.iter_mut() {
            let name_matches = elem
                .get("name")
                .and_then(|n| n.as_str())
                .map(|n| n == group.name)
                .unwrap_or(false);
            if name_matches {
                *elem = proxy_group.clone();
                replaced = true;
                break;
            }
        }
        if !replaced {
            original_groups.push(proxy_group);
        }
    }

    if let Some(map) = yaml_node.as_mapping_mut() {
        map.insert(
            YamlValue::String(groups_field.to_string()),
            YamlValue::Sequence(original_groups),
        );
    }
}

fn handle_shadowsocks(
    node: &Proxy,
    remark: &str,
    scv: &Option<bool>,
    ext: &ExtraSettings,
) -> Option<JsonValue> {
    if ext.filter_deprecated && node.encrypt_method.as_deref() == Some("chacha20") {
        return None;
    }

    let mut proxy = json!({
        "name": remark,
        "type": "ss",
        "server": node.hostname,
        "port": node.port,
        "cipher": node.encrypt_method.as_deref().unwrap_or(""),
        "password": node.password.as_deref().unwrap_or("")
    });

    if let Some(plugin) = &node.plugin {
        let plugin_option =
            replace_all_distinct(node.plugin_option.as_deref().unwrap_or(""), ";", "&");
        match plugin.as_str() {
            "simple-obfs" | "obfs-local" => {
                proxy["plugin"] = json!("obfs");

                let mut plugin_opts = Map::new();
                plugin_opts.insert(
                    "mode".to_string(),
                    JsonValue::String(get_url_arg(&plugin_option, "obfs")),
                );
                let obfs_host = get_url_arg(&plugin_option, "obfs-host");
                if !obfs_host.is_empty() {
                    plugin_opts.insert("host".to_string(), JsonValue::String(obfs_host));
                }
                proxy["plugin-opts"] = JsonValue::Object(plugin_opts);
            }
            "v2ray-plugin" => {
                proxy["plugin"] = json!("v2ray-plugin");

                let mut plugin_opts = Map::new();
                let mode = get_url_arg(&plugin_option, "mode");
                if !mode.is_empty() {
                    plugin_opts.insert("mode".to_string(), JsonValue::String(mode));
                }
                let host = get_url_arg(&plugin_option, "host");
                if !host.is_empty() {
                    plugin_opts.insert("host".to_string(), JsonValue::String(host));
                }
                let path = get_url_arg(&plugin_option, "path");
                if !path.is_empty() {
                    plugin_opts.insert("path".to_string(), JsonValue::String(path));
                }
                if plugin_option.contains("tls") {
                    plugin_opts.insert("tls".to_string(), JsonValue::Bool(true));
                }
                if plugin_option.contains("mux") {
                    plugin_opts.insert("mux".to_string(), JsonValue::Bool(true));
                }
                scv.apply_to_json(&mut plugin_opts, "skip-cert-verify");
                proxy["plugin-opts"] = JsonValue::Object(plugin_opts);
            }
            _ => {}
        }
    }

    Some(proxy)
}

fn handle_shadowsocksr(
    node: &Proxy,
    remark: &str,
    clash_r: bool,
    ext: &ExtraSettings,
) -> Option<JsonValue> {
    if ext.filter_deprecated {
        if !clash_r {
            return None;
        }
        let encrypt_method = node.encrypt_method.as_deref().unwrap_or("");
        if !CLASH_SSR_CIPHERS.contains(encrypt_method) {
            return None;
        }
        let protocol = node.protocol.as_deref().unwrap_or("");
        if !CLASHR_PROTOCOLS.contains(protocol) {
            return None;
        }
        let obfs = node.obfs.as_deref().unwrap_or("");
        if !CLASHR_OBFS.contains(obfs) {
            return None;
        }
    }

    let encrypt_method = node.encrypt_method.as_deref().unwrap_or("");
    let cipher = if encrypt_method == "none" || encrypt_method.is_empty() {
        "dummy"
    } else {
        encrypt_method
    };

    let mut proxy = json!({
        "name": remark,
        "type": "ssr",
        "server": node.hostname,
        "port": node.port,
        "cipher": cipher,
        "password": node.password.as_deref().unwrap_or(""),
        "protocol": node.protocol.as_deref().unwrap_or(""),
        "obfs": node.obfs.as_deref().unwrap_or("")
    });

    // ClashR uses different field names than mainline Clash
    if clash_r {
        proxy["protocolparam"] = json!(node.protocol_param.as_deref().unwrap_or(""));
        proxy["obfsparam"] = json!(node.obfs_param.as_deref().unwrap_or(""));
    } else {
        proxy["protocol-param"] = json!(node.protocol_param.as_deref().unwrap_or(""));
        proxy["obfs-param"] = json!(node.obfs_param.as_deref().unwrap_or(""));
    }

    Some(proxy)
}

fn handle_vmess(node: &Proxy, remark: &str, ext: &ExtraSettings) -> Option<JsonValue> {
    let encrypt_method = node.encrypt_method.as_deref().unwrap_or("");
    let mut proxy = json!({
        "name": remark,
        "type": "vmess",
        "server": node.hostname,
        "port": node.port,
        "uuid": node.user_id.as_deref().unwrap_or(""),
        "alterId": node.alter_id,
        "cipher": if encrypt_method.is_empty() { "auto" } else { encrypt_method },
        "tls": node.tls_secure
    });

    if let Some(sni) = &node.server_name {
        if !sni.is_empty() {
            proxy["servername"] = json!(sni);
        }
    }

    match node.transfer_protocol.as_deref() {
        Some("ws") => {
            proxy["network"] = json!("ws");
            if ext.clash_new_field_name {
                let mut ws_opts = Map::new();
                if let Some(path) = &node.path {
                    ws_opts.insert("path".to_string(), JsonValue::String(path.clone()));
                }
                let mut headers = Map::new();
                if let Some(host) = &node.host {
                    if !host.is_empty() {
                        headers.insert("Host".to_string(), JsonValue::String(host.clone()));
                    }
                }
                if let Some(edge) = &node.edge {
                    if !edge.is_empty() {
                        headers.insert("Edge".to_string(), JsonValue::String(edge.clone()));
                    }
                }
                if !headers.is_empty() {
                    ws_opts.insert("headers".to_string(), JsonValue::Object(headers));
                }
                if !ws_opts.is_empty() {
                    proxy["ws-opts"] = JsonValue::Object(ws_opts);
                }
            } else {
                if let Some(path) = &node.path {
                    proxy["ws-path"] = json!(path);
                }
                let mut headers = Map::new();
                if let Some(host) = &node.host {
                    if !host.is_empty() {
                        headers.insert("Host".to_string(), JsonValue::String(host.clone()));
                    }
                }
                if let Some(edge) = &node.edge {
                    if !edge.is_empty() {
                        headers.insert("Edge".to_string(), JsonValue::String(edge.clone()));
                    }
                }
                if !headers.is_empty() {
                    proxy["ws-headers"] = JsonValue::Object(headers);
                }
            }
        }
        Some("http") => {
            proxy["network"] = json!("http");
            let mut http_opts = Map::new();
            http_opts.insert("method".to_string(), JsonValue::String("GET".to_string()));
            if let Some(path) = &node.path {
                http_opts.insert(
                    "path".to_string(),
                    JsonValue::Array(vec![JsonValue::String(path.clone())]),
                );
            }
            let mut headers = Map::new();
            if let Some(host) = &node.host {
                if !host.is_empty() {
                    headers.insert(
                        "Host".to_string(),
                        JsonValue::Array(vec![JsonValue::String(host.clone())]),
                    );
                }
            }
            if !headers.is_empty() {
                http_opts.insert("headers".to_string(), JsonValue::Object(headers));
            }
            proxy["http-opts"] = JsonValue::Object(http_opts);
        }
        _ => {}
    }

    Some(proxy)
}

fn handle_trojan(node: &Proxy, remark: &str) -> Option<JsonValue> {
    let mut proxy = json!({
        "name": remark,
        "type": "trojan",
        "server": node.hostname,
        "port": node.port,
        "password": node.password.as_deref().unwrap_or("")
    });
    if let Some(host) = &node.host {
        if !host.is_empty() {
            proxy["sni"] = json!(host);
        }
    }
    Some(proxy)
}

fn handle_http(node: &Proxy, remark: &str) -> Option<JsonValue> {
    let mut proxy = json!({
        "name": remark,
        "type": "http",
        "server": node.hostname,
        "port": node.port
    });
    if let Some(username) = &node.username {
        proxy["username"] = json!(username);
    }
    if let Some(password) = &node.password {
        proxy["password"] = json!(password);
    }
    if node.proxy_type == ProxyType::HTTPS {
        proxy["tls"] = json!(true);
    }
    Some(proxy)
}

fn handle_socks5(node: &Proxy, remark: &str) -> Option<JsonValue> {
    let mut proxy = json!({
        "name": remark,
        "type": "socks5",
        "server": node.hostname,
        "port": node.port
    });
    if let Some(username) = &node.username {
        proxy["username"] = json!(username);
    }
    if let Some(password) = &node.password {
        proxy["password"] = json!(password);
    }
    Some(proxy)
}

fn handle_snell(node: &Proxy, remark: &str) -> Option<JsonValue> {
    // Snell v4+ is not representable in Clash
    if node.snell_version >= 4 {
        return None;
    }

    let mut proxy = json!({
        "name": remark,
        "type": "snell",
        "server": node.hostname,
        "port": node.port,
        "psk": node.password.as_deref().unwrap_or("")
    });
    if node.snell_version > 0 {
        proxy["version"] = json!(node.snell_version);
    }
    if node.obfs.is_some() || node.host.is_some() {
        let mut obfs_opts = Map::new();
        if let Some(obfs) = &node.obfs {
            obfs_opts.insert("mode".to_string(), JsonValue::String(obfs.clone()));
        }
        if let Some(host) = &node.host {
            obfs_opts.insert("host".to_string(), JsonValue::String(host.clone()));
        }
        proxy["obfs-opts"] = JsonValue::Object(obfs_opts);
    }
    Some(proxy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::proxy_group_config::ProxyGroupConfig;

    fn ss_node(remark: &str) -> Proxy {
        Proxy::ss_construct(
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
        )
    }

    #[test]
    fn test_proxy_to_clash_basic() {
        let mut nodes = vec![ss_node("Node")];
        let ext = ExtraSettings::default();
        let output = proxy_to_clash(&mut nodes, "", &[], &vec![], false, &ext).unwrap();
        assert!(output.contains("name: Node"));
        assert!(output.contains("type: ss"));
        assert!(output.contains("server: 1.2.3.4"));
        assert!(output.contains("port: 8388"));
        assert!(output.contains("cipher: aes-128-gcm"));
        assert!(output.contains("password: pass"));
    }

    #[test]
    fn test_proxy_to_clash_dedup_remarks() {
        let mut nodes = vec![ss_node("Same"), ss_node("Same"), ss_node("Same")];
        let ext = ExtraSettings::default();
        let output = proxy_to_clash(&mut nodes, "", &[], &vec![], false, &ext).unwrap();
        assert!(output.contains("name: Same\n"));
        assert!(output.contains("name: Same 2"));
        assert!(output.contains("name: Same 3"));
    }

    #[test]
    fn test_proxy_to_clash_ssr_excluded_without_clashr() {
        let mut ssr = Proxy::ssr_construct(
            "SSRProvider",
            "SSR Node",
            "1.2.3.4",
            8388,
            "auth_aes128_md5",
            "rc4-md5",
            "tls1.2_ticket_auth",
            "pw",
            "",
            "",
            None,
            None,
            None,
        );
        ssr.group_id = 1;
        let mut ext = ExtraSettings::default();
        ext.filter_deprecated = true;
        let output = proxy_to_clash(&mut vec![ssr.clone()], "", &[], &vec![], false, &ext).unwrap();
        assert!(!output.contains("SSR Node"));

        let output = proxy_to_clash(&mut vec![ssr], "", &[], &vec![], true, &ext).unwrap();
        assert!(output.contains("SSR Node"));
        assert!(output.contains("protocolparam"));
    }

    #[test]
    fn test_proxy_to_clash_group_fallback_direct() {
        let mut nodes = vec![ss_node("US-01")];
        let groups = vec![ProxyGroupConfig {
            name: "Empty".to_string(),
            group_type: ProxyGroupType::Select,
            proxies: vec!["^JP".to_string()],
            ..Default::default()
        }];
        let ext = ExtraSettings::default();
        let output = proxy_to_clash(&mut nodes, "", &[], &groups, false, &ext).unwrap();
        assert!(output.contains("name: Empty"));
        assert!(output.contains("- DIRECT"));
    }

    #[test]
    fn test_proxy_to_clash_tribool_unset_not_emitted() {
        let mut nodes = vec![ss_node("Node")];
        let ext = ExtraSettings::default();
        let output = proxy_to_clash(&mut nodes, "", &[], &vec![], false, &ext).unwrap();
        assert!(!output.contains("skip-cert-verify"));
        assert!(!output.contains("udp:"));

        let mut nodes = vec![ss_node("Node")];
        let mut ext = ExtraSettings::default();
        ext.skip_cert_verify = Some(true);
        ext.udp = Some(false);
        let output = proxy_to_clash(&mut nodes, "", &[], &vec![], false, &ext).unwrap();
        assert!(output.contains("skip-cert-verify: true"));
        assert!(output.contains("udp: false"));
    }

    #[test]
    fn test_proxy_to_clash_nodelist_mode() {
        let mut nodes = vec![ss_node("Node")];
        let mut ext = ExtraSettings::default();
        ext.nodelist = true;
        let output = proxy_to_clash(&mut nodes, "", &[], &vec![], false, &ext).unwrap();
        assert!(output.contains("proxies:"));
        assert!(!output.contains("rules:"));
    }

    #[test]
    fn test_proxy_to_clash_vmess_ws_opts() {
        let mut vmess = Proxy::vmess_construct(
            "V2RayProvider",
            "V",
            "example.com",
            443,
            "",
            "uuid",
            0,
            "ws",
            "auto",
            "/ws",
            "cdn.example.com",
            "",
            "tls",
            "",
            None,
            None,
            None,
            None,
        );
        vmess.group_id = 1;
        let ext = ExtraSettings::default();
        let output = proxy_to_clash(&mut vec![vmess], "", &[], &vec![], false, &ext).unwrap();
        assert!(output.contains("ws-opts:"));
        assert!(output.contains("path: /ws"));
        assert!(output.contains("Host: cdn.example.com"));
    }

    #[test]
    fn test_proxy_to_clash_old_field_names() {
        let mut nodes = vec![ss_node("Node")];
        let mut ext = ExtraSettings::default();
        ext.clash_new_field_name = false;
        let output = proxy_to_clash(&mut nodes, "", &[], &vec![], false, &ext).unwrap();
        assert!(output.contains("Proxy:"));
        assert!(output.contains("Rule:"));
    }
}
