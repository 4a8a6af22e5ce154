use log::error;

use crate::generator::config::group::group_generate;
use crate::generator::config::remark::process_remark;
use crate::generator::ruleconvert::ruleset_to_surge;
use crate::models::{
    ExtraSettings, Proxy, ProxyGroupConfigs, ProxyGroupType, ProxyType, RulesetContent, SubError,
    SubResult,
};
use crate::utils::base64::url_safe_base64_encode;
use crate::utils::ini_reader::{IniReader, NONAME};
use crate::utils::tribool::TriboolExt;
use crate::utils::url::url_encode;

/// Convert proxies to the Mellow configuration format.
pub fn proxy_to_mellow(
    nodes: &mut Vec<Proxy>,
    base_conf: &str,
    ruleset_content_array: &[RulesetContent],
    extra_proxy_group: &ProxyGroupConfigs,
    ext: &ExtraSettings,
) -> SubResult<String> {
    let mut ini = IniReader::new();
    ini.store_any_line = true;
    if !base_conf.trim().is_empty() {
        if let Err(e) = ini.parse(base_conf) {
            error!("Mellow base loader failed with error: {}", e);
            return Err(SubError::Config(format!("invalid Mellow base: {}", e)));
        }
    }

    let mut nodelist: Vec<Proxy> = Vec::new();
    let mut remarks_list: Vec<String> = Vec::new();

    ini.set_current_section("Endpoint");

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

        let tfo = node.tcp_fast_open.define(ext.tfo);
        let scv = node.allow_insecure.define(ext.skip_cert_verify);

        let proxy = match node.proxy_type {
            ProxyType::Shadowsocks => {
                if node.plugin.as_deref().map_or(false, |p| !p.is_empty()) {
                    continue;
                }
                format!(
                    "{}, ss, ss://{}@{}:{}",
                    remark,
                    url_safe_base64_encode(&format!("{}:{}", method, password)),
                    hostname,
                    port
                )
            }
            ProxyType::VMess => {
                let id = node.user_id.clone().unwrap_or_default();
                let transproto = node.transfer_protocol.clone().unwrap_or_default();
                let host = node.host.clone().unwrap_or_default();
                let path = node.path.clone().unwrap_or_default();
                let mut line = format!("{}, vmess1, vmess1://{}@{}:{}", remark, id, hostname, port);
                if !path.is_empty() {
                    line.push_str(&path);
                }
                line.push_str(&format!("?network={}", transproto));
                match transproto.as_str() {
                    "ws" => line.push_str(&format!("&ws.host={}", url_encode(&host))),
                    "http" => {
                        if !host.is_empty() {
                            line.push_str(&format!("&http.host={}", url_encode(&host)));
                        }
                    }
                    "quic" => {
                        let quic_secure = node.quic_secure.clone().unwrap_or_default();
                        if !quic_secure.is_empty() {
                            let quic_secret = node.quic_secret.clone().unwrap_or_default();
                            line.push_str(&format!(
                                "&quic.security={}&quic.key={}",
                                quic_secure, quic_secret
                            ));
                        }
                    }
                    _ => {}
                }
                line.push_str(&format!("&tls={}", node.tls_secure));
                if node.tls_secure && !host.is_empty() {
                    line.push_str(&format!("&tls.servername={}", url_encode(&host)));
                }
                if let Some(scv) = scv {
                    line.push_str(&format!("&tls.allowinsecure={}", scv));
                }
                if let Some(tfo) = tfo {
                    line.push_str(&format!("&sockopt.tcpfastopen={}", tfo));
                }
                line
            }
            ProxyType::Socks5 => format!(
                "{}, builtin, socks, address={}, port={}, user={}, pass={}",
                remark, hostname, port, username, password
            ),
            ProxyType::HTTP => format!(
                "{}, builtin, http, address={}, port={}, user={}, pass={}",
                remark, hostname, port, username, password
            ),
            _ => continue,
        };

        ini.set_current(NONAME, &proxy);
        node.remark = remark.clone();
        remarks_list.push(remark);
        nodelist.push(node.clone());
    }

    ini.set_current_section("EndpointGroup");

    for group in extra_proxy_group {
        match group.group_type {
            ProxyGroupType::Select
            | ProxyGroupType::URLTest
            | ProxyGroupType::Fallback
            | ProxyGroupType::LoadBalance => {}
            _ => continue,
        }

        let mut filtered_nodelist = Vec::new();
        for selector in &group.proxies {
            group_generate(selector, &nodelist, &mut filtered_nodelist, false, ext);
        }

        if filtered_nodelist.is_empty() {
            if remarks_list.is_empty() {
                filtered_nodelist.push("DIRECT".to_string());
            } else {
                filtered_nodelist = remarks_list.clone();
            }
        }

        let proxy = format!(
            "{}, {}, latency, interval=300, timeout=6",
            group.name,
            filtered_nodelist.join(":")
        );
        ini.set_current(NONAME, &proxy);
    }

    if ext.enable_rule_generator {
        ruleset_to_surge(
            &mut ini,
            ruleset_content_array,
            0,
            ext.overwrite_original_rules,
            "",
            ext.max_allowed_rules,
        );
    }

    Ok(ini.to_ini_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::proxy_group_config::ProxyGroupConfig;

    fn vmess_node(remark: &str) -> Proxy {
        let mut node = Proxy::vmess_construct(
            "V2RayProvider",
            remark,
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
        node.group_id = 1;
        node
    }

    #[test]
    fn test_proxy_to_mellow_vmess_endpoint() {
        let mut nodes = vec![vmess_node("V")];
        let ext = ExtraSettings::default();
        let output = proxy_to_mellow(&mut nodes, "", &[], &vec![], &ext).unwrap();
        assert!(output.contains("[Endpoint]"));
        assert!(output.contains("V, vmess1, vmess1://uuid@example.com:443/ws?network=ws"));
        assert!(output.contains("ws.host=cdn.example.com"));
        assert!(output.contains("tls=true"));
        assert!(output.contains("tls.servername=cdn.example.com"));
    }

    #[test]
    fn test_proxy_to_mellow_ss_with_plugin_skipped() {
        let mut node = Proxy::ss_construct(
            "SSProvider",
            "P",
            "1.2.3.4",
            8388,
            "pw",
            "aes-128-gcm",
            "obfs-local",
            "obfs=http",
            None,
            None,
            None,
            None,
        );
        node.group_id = 1;
        let ext = ExtraSettings::default();
        let output = proxy_to_mellow(&mut vec![node], "", &[], &vec![], &ext).unwrap();
        assert!(!output.contains("P, ss"));
    }

    #[test]
    fn test_proxy_to_mellow_group_colon_separated() {
        let mut nodes = vec![vmess_node("A"), vmess_node("B")];
        let groups = vec![ProxyGroupConfig {
            name: "G".to_string(),
            group_type: ProxyGroupType::URLTest,
            proxies: vec![".*".to_string()],
            url: "http://www.gstatic.com/generate_204".to_string(),
            interval: 300,
            ..Default::default()
        }];
        let ext = ExtraSettings::default();
        let output = proxy_to_mellow(&mut nodes, "", &[], &groups, &ext).unwrap();
        assert!(output.contains("G, A:B, latency, interval=300, timeout=6"));
    }
}
