use log::{error, warn};

use crate::generator::config::group::group_generate;
use crate::generator::config::remark::process_remark;
use crate::generator::ruleconvert::ruleset_to_surge;
use crate::models::{
    ExtraSettings, Proxy, ProxyGroupConfigs, ProxyGroupType, ProxyType, RulesetContent, SubError,
    SubResult,
};
use crate::utils::ini_reader::{IniReader, NONAME};
use crate::utils::network::{hostname_to_ip_addr, is_ipv4, is_ipv6};
use crate::utils::string::replace_all_distinct;
use crate::utils::tribool::TriboolExt;

/// Convert proxies to the Surge configuration format.
///
/// `surge_ver` is the Surge major version; `-3` emits the Surfboard dialect.
pub fn proxy_to_surge(
    nodes: &mut Vec<Proxy>,
    base_conf: &str,
    ruleset_content_array: &[RulesetContent],
    extra_proxy_group: &ProxyGroupConfigs,
    surge_ver: i32,
    ext: &ExtraSettings,
) -> SubResult<String> {
    let mut ini = IniReader::new();
    ini.store_any_line = true;
    for section in [
        "General",
        "Replica",
        "Rule",
        "MITM",
        "Script",
        "Host",
        "URL Rewrite",
        "Header Rewrite",
    ] {
        ini.add_direct_save_section(section);
    }

    if !base_conf.trim().is_empty() {
        if let Err(e) = ini.parse(base_conf) {
            if !ext.nodelist {
                error!("Surge base loader failed with error: {}", e);
                return Err(SubError::Config(format!("invalid Surge base: {}", e)));
            }
        }
    }

    let mut output_nodelist = String::new();
    let mut nodelist: Vec<Proxy> = Vec::new();
    let mut remarks_list: Vec<String> = Vec::new();
    let mut local_port = 1080u16;

    ini.set_current_section("Proxy");
    ini.erase_section();
    ini.set_current(NONAME, "DIRECT = direct");

    for node in nodes.iter_mut() {
        if ext.append_proxy_type {
            node.remark = format!("[{}] {}", node.proxy_type.as_str(), node.remark);
        }
        let mut remark = node.remark.clone();
        process_remark(&mut remark, &remarks_list, true);

        let hostname = node.hostname.clone();
        let port = node.port.to_string();
        let username = node.username.clone().unwrap_or_default();
        let password = node.password.clone().unwrap_or_default();
        let method = node.encrypt_method.clone().unwrap_or_default();

        let udp = node.udp.define(ext.udp);
        let tfo = node.tcp_fast_open.define(ext.tfo);
        let scv = node.allow_insecure.define(ext.skip_cert_verify);
        let tls13 = node.tls13.define(ext.tls13);

        let mut proxy;

        match node.proxy_type {
            ProxyType::Shadowsocks => {
                let plugin = node.plugin.clone().unwrap_or_default();
                let plugin_opts = node.plugin_option.clone().unwrap_or_default();
                if surge_ver >= 3 || surge_ver == -3 {
                    proxy = format!(
                        "ss, {}, {}, encrypt-method={}, password={}",
                        hostname, port, method, password
                    );
                } else {
                    proxy = format!(
                        "custom, {}, {}, {}, {}, https://github.com/ConnersHua/SSEncrypt/raw/master/SSEncrypt.module",
                        hostname, port, method, password
                    );
                }
                match plugin.as_str() {
                    "" => {}
                    "simple-obfs" | "obfs-local" => {
                        if !plugin_opts.is_empty() {
                            proxy.push_str(&format!(
                                ",{}",
                                replace_all_distinct(&plugin_opts, ";", ",")
                            ));
                        }
                    }
                    _ => continue,
                }
            }
            ProxyType::VMess => {
                if surge_ver < 4 && surge_ver != -3 {
                    continue;
                }
                let id = node.user_id.clone().unwrap_or_default();
                let host = node.host.clone().unwrap_or_default();
                let edge = node.edge.clone().unwrap_or_default();
                let path = node.path.clone().unwrap_or_default();
                proxy = format!(
                    "vmess, {}, {}, username={}, tls={}",
                    hostname, port, id, node.tls_secure
                );
                if node.tls_secure {
                    if let Some(tls13) = tls13 {
                        proxy.push_str(&format!(", tls13={}", tls13));
                    }
                }
                match node.transfer_protocol.as_deref() {
                    Some("tcp") | None => {}
                    Some("ws") => {
                        proxy.push_str(&format!(
                            ", ws=true, ws-path={}, sni={}, ws-headers=Host:{}",
                            path, host, host
                        ));
                        if !edge.is_empty() {
                            proxy.push_str(&format!("|Edge:{}", edge));
                        }
                    }
                    _ => continue,
                }
                if let Some(scv) = scv {
                    proxy.push_str(&format!(", skip-cert-verify={}", if scv { "1" } else { "0" }));
                }
            }
            ProxyType::ShadowsocksR => {
                if ext.surge_ssr_path.is_empty() || surge_ver < 2 {
                    continue;
                }
                let protocol = node.protocol.clone().unwrap_or_default();
                let protocol_param = node.protocol_param.clone().unwrap_or_default();
                let obfs = node.obfs.clone().unwrap_or_default();
                let obfs_param = node.obfs_param.clone().unwrap_or_default();

                let mut args = vec![
                    "-l".to_string(),
                    local_port.to_string(),
                    "-s".to_string(),
                    hostname.clone(),
                    "-p".to_string(),
                    port.clone(),
                    "-m".to_string(),
                    method.clone(),
                    "-k".to_string(),
                    password.clone(),
                    "-o".to_string(),
                    obfs,
                    "-O".to_string(),
                    protocol,
                ];
                if !obfs_param.is_empty() {
                    args.push("-g".to_string());
                    args.push(obfs_param);
                }
                if !protocol_param.is_empty() {
                    args.push("-G".to_string());
                    args.push(protocol_param);
                }

                proxy = format!(
                    "external, exec=\"{}\", args=\"{}\", local-port={}",
                    ext.surge_ssr_path,
                    args.join("\", args=\""),
                    local_port
                );
                if is_ipv4(&hostname) || is_ipv6(&hostname) {
                    proxy.push_str(&format!(", addresses={}", hostname));
                } else if ext.surge_resolve_hostname {
                    match hostname_to_ip_addr(&hostname) {
                        Some(ip) => proxy.push_str(&format!(", addresses={}", ip)),
                        None => warn!("Failed to resolve hostname '{}'", hostname),
                    }
                }
                local_port = local_port.wrapping_add(1);
            }
            ProxyType::Socks5 => {
                proxy = format!("socks5, {}, {}", hostname, port);
                if !username.is_empty() {
                    proxy.push_str(&format!(", username={}", username));
                }
                if !password.is_empty() {
                    proxy.push_str(&format!(", password={}", password));
                }
                if let Some(scv) = scv {
                    proxy.push_str(&format!(", skip-cert-verify={}", if scv { "1" } else { "0" }));
                }
            }
            ProxyType::HTTP | ProxyType::HTTPS => {
                proxy = format!("http, {}, {}", hostname, port);
                if !username.is_empty() {
                    proxy.push_str(&format!(", username={}", username));
                }
                if !password.is_empty() {
                    proxy.push_str(&format!(", password={}", password));
                }
                proxy.push_str(&format!(
                    ", tls={}",
                    node.proxy_type == ProxyType::HTTPS
                ));
                if let Some(scv) = scv {
                    proxy.push_str(&format!(", skip-cert-verify={}", if scv { "1" } else { "0" }));
                }
            }
            ProxyType::Trojan => {
                if surge_ver < 4 {
                    continue;
                }
                proxy = format!("trojan, {}, {}, password={}", hostname, port, password);
                if let Some(host) = &node.host {
                    if !host.is_empty() {
                        proxy.push_str(&format!(", sni={}", host));
                    }
                }
                if let Some(scv) = scv {
                    proxy.push_str(&format!(", skip-cert-verify={}", if scv { "1" } else { "0" }));
                }
            }
            ProxyType::Snell => {
                proxy = format!("snell, {}, {}, psk={}", hostname, port, password);
                if let Some(obfs) = &node.obfs {
                    if !obfs.is_empty() {
                        proxy.push_str(&format!(
                            ", obfs={}, obfs-host={}",
                            obfs,
                            node.host.clone().unwrap_or_default()
                        ));
                    }
                }
                if node.snell_version > 0 {
                    proxy.push_str(&format!(", version={}", node.snell_version));
                }
            }
            ProxyType::Unknown => continue,
        }

        if let Some(tfo) = tfo {
            proxy.push_str(&format!(", tfo={}", tfo));
        }
        if let Some(udp) = udp {
            proxy.push_str(&format!(", udp-relay={}", udp));
        }

        if ext.nodelist {
            output_nodelist.push_str(&format!("{} = {}\n", remark, proxy));
        } else {
            ini.set_current(NONAME, &format!("{} = {}", remark, proxy));
            node.remark = remark.clone();
            nodelist.push(node.clone());
        }
        remarks_list.push(remark);
    }

    if ext.nodelist {
        return Ok(output_nodelist);
    }

    ini.set_current_section("Proxy Group");
    ini.erase_section();
    for group in extra_proxy_group {
        let mut filtered_nodelist = Vec::new();

        match group.group_type {
            ProxyGroupType::Select | ProxyGroupType::URLTest | ProxyGroupType::Fallback => {}
            ProxyGroupType::LoadBalance => {
                if surge_ver < 1 {
                    continue;
                }
            }
            ProxyGroupType::SSID => {
                // selectors carry the raw ssid mapping: default group first
                if group.proxies.len() < 2 {
                    continue;
                }
                let proxy = format!(
                    "ssid,default={},{}",
                    group.proxies[0],
                    group.proxies[1..].join(",")
                );
                ini.set_current(NONAME, &format!("{} = {}", group.name, proxy));
                continue;
            }
            ProxyGroupType::Relay => continue,
        }

        for selector in &group.proxies {
            group_generate(selector, &nodelist, &mut filtered_nodelist, true, ext);
        }
        if filtered_nodelist.is_empty() {
            filtered_nodelist.push("DIRECT".to_string());
        }

        // a lone literal member collapses to a plain select
        if filtered_nodelist.len() == 1 {
            let candidate = filtered_nodelist[0].to_lowercase();
            if matches!(candidate.as_str(), "direct" | "reject" | "reject-tinygif") {
                ini.set_current(NONAME, &format!("{} = select,{}", group.name, candidate));
                continue;
            }
        }

        let mut proxy = format!("{},{}", group.type_str(), filtered_nodelist.join(","));
        match group.group_type {
            ProxyGroupType::URLTest | ProxyGroupType::Fallback => {
                proxy.push_str(&format!(",url={},interval={}", group.url, group.interval));
                if group.tolerance > 0 {
                    proxy.push_str(&format!(",tolerance={}", group.tolerance));
                }
                if group.timeout > 0 {
                    proxy.push_str(&format!(",timeout={}", group.timeout));
                }
            }
            ProxyGroupType::LoadBalance => {
                proxy.push_str(&format!(",url={}", group.url));
            }
            _ => {}
        }

        ini.set_current(NONAME, &format!("{} = {}", group.name, proxy));
    }

    if ext.enable_rule_generator {
        ruleset_to_surge(
            &mut ini,
            ruleset_content_array,
            surge_ver,
            ext.overwrite_original_rules,
            &ext.managed_config_prefix,
            ext.max_allowed_rules,
        );
    }

    Ok(ini.to_ini_string())
}
