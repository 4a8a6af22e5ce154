use log::error;

use crate::generator::config::group::group_generate;
use crate::generator::config::remark::process_remark;
use crate::generator::ruleconvert::ruleset_to_surge;
use crate::models::{
    ExtraSettings, Proxy, ProxyGroupConfigs, ProxyGroupType, ProxyType, RulesetContent, SubError,
    SubResult,
};
use crate::utils::ini_reader::{IniReader, NONAME};
use crate::utils::string::replace_all_distinct;
use crate::utils::tribool::TriboolExt;

/// Convert proxies to the Loon configuration format.
pub fn proxy_to_loon(
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
            error!("Loon base loader failed with error: {}", e);
            return Err(SubError::Config(format!("invalid Loon base: {}", e)));
        }
    }

    let mut output_nodelist = String::new();
    let mut nodelist: Vec<Proxy> = Vec::new();
    let mut remarks_list: Vec<String> = Vec::new();

    ini.set_current_section("Proxy");
    ini.erase_section();

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
        let mut method = node.encrypt_method.clone().unwrap_or_default();

        let scv = node.allow_insecure.define(ext.skip_cert_verify);

        let proxy = match node.proxy_type {
            ProxyType::Shadowsocks => {
                let plugin = node.plugin.clone().unwrap_or_default();
                let plugin_opts = node.plugin_option.clone().unwrap_or_default();
                let mut line = format!(
                    "Shadowsocks,{},{},{},\"{}\"",
                    hostname, port, method, password
                );
                match plugin.as_str() {
                    "" => {}
                    "simple-obfs" | "obfs-local" => {
                        if !plugin_opts.is_empty() {
                            line.push_str(&format!(
                                ",{}",
                                replace_all_distinct(
                                    &replace_all_distinct(&plugin_opts, ";obfs-host=", ","),
                                    "obfs=",
                                    ""
                                )
                            ));
                        }
                    }
                    _ => continue,
                }
                line
            }
            ProxyType::VMess => {
                let id = node.user_id.clone().unwrap_or_default();
                let host = node.host.clone().unwrap_or_default();
                let path = node.path.clone().unwrap_or_default();
                if method == "auto" {
                    method = "chacha20-ietf-poly1305".to_string();
                }
                let mut line = format!(
                    "vmess,{},{},{},\"{}\",over-tls:{}",
                    hostname, port, method, id, node.tls_secure
                );
                if node.tls_secure {
                    line.push_str(&format!(",tls-name:{}", host));
                }
                match node.transfer_protocol.as_deref() {
                    Some("tcp") | None => line.push_str(",transport:tcp"),
                    Some("ws") => {
                        line.push_str(&format!(",transport:ws,path:{},host:{}", path, host))
                    }
                    _ => continue,
                }
                if let Some(scv) = scv {
                    line.push_str(&format!(
                        ",skip-cert-verify:{}",
                        if scv { "1" } else { "0" }
                    ));
                }
                line
            }
            ProxyType::ShadowsocksR => {
                let protocol = node.protocol.clone().unwrap_or_default();
                let protocol_param = node.protocol_param.clone().unwrap_or_default();
                let obfs = node.obfs.clone().unwrap_or_default();
                let obfs_param = node.obfs_param.clone().unwrap_or_default();
                format!(
                    "ShadowsocksR,{},{},{},\"{}\",{},{{{}}},{},{{{}}}",
                    hostname, port, method, password, protocol, protocol_param, obfs, obfs_param
                )
            }
            ProxyType::HTTP | ProxyType::HTTPS => {
                format!("http,{},{},{},{}", hostname, port, username, password)
            }
            ProxyType::Trojan => {
                let host = node.host.clone().unwrap_or_default();
                let mut line = format!("trojan,{},{},{}", hostname, port, password);
                if !host.is_empty() {
                    line.push_str(&format!(",tls-name:{}", host));
                }
                if let Some(scv) = scv {
                    line.push_str(&format!(
                        ",skip-cert-verify:{}",
                        if scv { "1" } else { "0" }
                    ));
                }
                line
            }
            _ => continue,
        };

        if ext.nodelist {
            output_nodelist.push_str(&format!("{} = {}\n", remark, proxy));
        } else {
            ini.set_current(NONAME, &format!("{} = {}", remark, proxy));
            node.remark = remark.clone();
            nodelist.push(node.clone());
            remarks_list.push(remark);
        }
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
            ProxyGroupType::SSID => {
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
            // Loon has no load-balance or relay groups
            ProxyGroupType::LoadBalance | ProxyGroupType::Relay => continue,
        }

        for selector in &group.proxies {
            group_generate(selector, &nodelist, &mut filtered_nodelist, true, ext);
        }
        if filtered_nodelist.is_empty() {
            filtered_nodelist.push("DIRECT".to_string());
        }

        let mut proxy = format!("{},{}", group.type_str(), filtered_nodelist.join(","));
        if matches!(
            group.group_type,
            ProxyGroupType::URLTest | ProxyGroupType::Fallback
        ) {
            proxy.push_str(&format!(",url={},interval={}", group.url, group.interval));
        }

        ini.set_current(NONAME, &format!("{} = {}", group.name, proxy));
    }

    if ext.enable_rule_generator {
        ruleset_to_surge(
            &mut ini,
            ruleset_content_array,
            -4,
            ext.overwrite_original_rules,
            &ext.managed_config_prefix,
            ext.max_allowed_rules,
        );
    }

    Ok(ini.to_ini_string())
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_proxy_to_loon_ss() {
        let mut nodes = vec![ss_node("Node")];
        let ext = ExtraSettings::default();
        let output = proxy_to_loon(&mut nodes, "", &[], &vec![], &ext).unwrap();
        assert!(output.contains("Node = Shadowsocks,1.2.3.4,8388,aes-128-gcm,\"pass\""));
    }

    #[test]
    fn test_proxy_to_loon_vmess_tls_params() {
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
            Some(false),
            None,
        );
        vmess.group_id = 1;
        let ext = ExtraSettings::default();
        let output = proxy_to_loon(&mut vec![vmess], "", &[], &vec![], &ext).unwrap();
        assert!(output.contains("over-tls:true,tls-name:cdn.example.com"));
        assert!(output.contains("transport:ws,path:/ws,host:cdn.example.com"));
        assert!(output.contains("skip-cert-verify:0"));
    }

    #[test]
    fn test_proxy_to_loon_ssr_braced_params() {
        let mut ssr = Proxy::ssr_construct(
            "SSRProvider",
            "R",
            "example.com",
            8388,
            "auth_aes128_md5",
            "rc4-md5",
            "tls1.2_ticket_auth",
            "pw",
            "obfsp",
            "protop",
            None,
            None,
            None,
        );
        ssr.group_id = 1;
        let ext = ExtraSettings::default();
        let output = proxy_to_loon(&mut vec![ssr], "", &[], &vec![], &ext).unwrap();
        assert!(output.contains(
            "R = ShadowsocksR,example.com,8388,rc4-md5,\"pw\",auth_aes128_md5,{protop},tls1.2_ticket_auth,{obfsp}"
        ));
    }
}
