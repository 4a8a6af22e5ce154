use serde_yaml::Value;

use crate::models::{
    Proxy, HTTP_DEFAULT_GROUP, SNELL_DEFAULT_GROUP, SOCKS_DEFAULT_GROUP, SSR_DEFAULT_GROUP,
    SS_DEFAULT_GROUP, TROJAN_DEFAULT_GROUP, V2RAY_DEFAULT_GROUP,
};

fn yaml_str(value: &Value, key: &str) -> String {
    match &value[key] {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn yaml_u16(value: &Value, key: &str) -> u16 {
    match &value[key] {
        Value::Number(n) => n.as_u64().unwrap_or(0) as u16,
        Value::String(s) => s.parse().unwrap_or(0),
        _ => 0,
    }
}

fn yaml_tribool(value: &Value, key: &str) -> Option<bool> {
    value[key].as_bool()
}

fn plugin_opts_string(value: &Value) -> String {
    let opts = &value["plugin-opts"];
    if !opts.is_mapping() {
        return String::new();
    }
    let mut parts = Vec::new();
    if let Some(mode) = opts["mode"].as_str() {
        parts.push(format!("obfs={}", mode));
    }
    if let Some(host) = opts["host"].as_str() {
        if !host.is_empty() {
            parts.push(format!("obfs-host={}", host));
        }
    }
    if let Some(path) = opts["path"].as_str() {
        if !path.is_empty() {
            parts.push(format!("path={}", path));
        }
    }
    if opts["tls"].as_bool() == Some(true) {
        parts.push("tls".to_string());
    }
    if opts["mux"].as_bool() == Some(true) {
        parts.push("mux=4".to_string());
    }
    parts.join(";")
}

fn clash_proxy_to_node(proxy: &Value) -> Option<Proxy> {
    let name = yaml_str(proxy, "name");
    let server = yaml_str(proxy, "server");
    let port = yaml_u16(proxy, "port");
    if name.is_empty() || server.is_empty() || port == 0 {
        return None;
    }

    let udp = yaml_tribool(proxy, "udp");
    let tfo = yaml_tribool(proxy, "tfo");
    let scv = yaml_tribool(proxy, "skip-cert-verify");

    let node = match yaml_str(proxy, "type").as_str() {
        "ss" => {
            let plugin_raw = yaml_str(proxy, "plugin");
            let plugin = match plugin_raw.as_str() {
                "obfs" => "obfs-local",
                other => other,
            };
            Proxy::ss_construct(
                SS_DEFAULT_GROUP,
                &name,
                &server,
                port,
                &yaml_str(proxy, "password"),
                &yaml_str(proxy, "cipher"),
                plugin,
                &plugin_opts_string(proxy),
                udp,
                tfo,
                scv,
                None,
            )
        }
        "ssr" => {
            let protocol_param = {
                let p = yaml_str(proxy, "protocol-param");
                if p.is_empty() {
                    yaml_str(proxy, "protocolparam")
                } else {
                    p
                }
            };
            let obfs_param = {
                let o = yaml_str(proxy, "obfs-param");
                if o.is_empty() {
                    yaml_str(proxy, "obfsparam")
                } else {
                    o
                }
            };
            Proxy::ssr_construct(
                SSR_DEFAULT_GROUP,
                &name,
                &server,
                port,
                &yaml_str(proxy, "protocol"),
                &yaml_str(proxy, "cipher"),
                &yaml_str(proxy, "obfs"),
                &yaml_str(proxy, "password"),
                &obfs_param,
                &protocol_param,
                udp,
                tfo,
                scv,
            )
        }
        "vmess" => {
            let network = yaml_str(proxy, "network");
            let (mut host, mut path) = (String::new(), String::new());
            match network.as_str() {
                "ws" => {
                    let ws_opts = &proxy["ws-opts"];
                    if ws_opts.is_mapping() {
                        path = yaml_str(ws_opts, "path");
                        host = yaml_str(&ws_opts["headers"], "Host");
                    } else {
                        path = yaml_str(proxy, "ws-path");
                        host = yaml_str(&proxy["ws-headers"], "Host");
                    }
                }
                "http" => {
                    let http_opts = &proxy["http-opts"];
                    if let Some(paths) = http_opts["path"].as_sequence() {
                        if let Some(first) = paths.first().and_then(|p| p.as_str()) {
                            path = first.to_string();
                        }
                    }
                    if let Some(hosts) = http_opts["headers"]["Host"].as_sequence() {
                        if let Some(first) = hosts.first().and_then(|h| h.as_str()) {
                            host = first.to_string();
                        }
                    }
                }
                _ => {}
            }
            Proxy::vmess_construct(
                V2RAY_DEFAULT_GROUP,
                &name,
                &server,
                port,
                "",
                &yaml_str(proxy, "uuid"),
                yaml_u16(proxy, "alterId"),
                &network,
                &yaml_str(proxy, "cipher"),
                &path,
                &host,
                "",
                if proxy["tls"].as_bool() == Some(true) {
                    "tls"
                } else {
                    ""
                },
                &yaml_str(proxy, "servername"),
                udp,
                tfo,
                scv,
                None,
            )
        }
        "trojan" => Proxy::trojan_construct(
            TROJAN_DEFAULT_GROUP,
            &name,
            &server,
            port,
            &yaml_str(proxy, "password"),
            &yaml_str(proxy, "sni"),
            true,
            udp,
            tfo,
            scv,
            None,
        ),
        "http" => Proxy::http_construct(
            HTTP_DEFAULT_GROUP,
            &name,
            &server,
            port,
            &yaml_str(proxy, "username"),
            &yaml_str(proxy, "password"),
            proxy["tls"].as_bool() == Some(true),
            tfo,
            scv,
            None,
        ),
        "socks5" => Proxy::socks_construct(
            SOCKS_DEFAULT_GROUP,
            &name,
            &server,
            port,
            &yaml_str(proxy, "username"),
            &yaml_str(proxy, "password"),
            udp,
            tfo,
            scv,
        ),
        "snell" => {
            let obfs_opts = &proxy["obfs-opts"];
            Proxy::snell_construct(
                SNELL_DEFAULT_GROUP,
                &name,
                &server,
                port,
                &yaml_str(proxy, "psk"),
                &yaml_str(obfs_opts, "mode"),
                &yaml_str(obfs_opts, "host"),
                yaml_u16(proxy, "version"),
                udp,
                tfo,
                scv,
            )
        }
        _ => return None,
    };

    Some(node)
}

/// Parse a Clash configuration (top-level `proxies:` or legacy `Proxy:`).
pub fn explode_clash(content: &str, nodes: &mut Vec<Proxy>) -> bool {
    let yaml: Value = match serde_yaml::from_str(content) {
        Ok(yaml) => yaml,
        Err(_) => return false,
    };

    let proxies = match yaml["proxies"].as_sequence().or_else(|| yaml["Proxy"].as_sequence()) {
        Some(list) => list,
        None => return false,
    };

    let initial_len = nodes.len();
    for proxy in proxies {
        if let Some(node) = clash_proxy_to_node(proxy) {
            nodes.push(node);
        }
    }
    nodes.len() > initial_len
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProxyType;

    #[test]
    fn test_explode_clash_ss_and_vmess() {
        let content = r#"
proxies:
  - {name: SS Node, type: ss, server: 1.2.3.4, port: 8388, cipher: aes-128-gcm, password: pass, udp: true}
  - name: VMess Node
    type: vmess
    server: example.com
    port: 443
    uuid: uuid-here
    alterId: 0
    cipher: auto
    tls: true
    network: ws
    ws-opts:
      path: /ws
      headers:
        Host: cdn.example.com
"#;
        let mut nodes = Vec::new();
        assert!(explode_clash(content, &mut nodes));
        assert_eq!(nodes.len(), 2);

        assert_eq!(nodes[0].proxy_type, ProxyType::Shadowsocks);
        assert_eq!(nodes[0].udp, Some(true));

        assert_eq!(nodes[1].proxy_type, ProxyType::VMess);
        assert_eq!(nodes[1].path.as_deref(), Some("/ws"));
        assert_eq!(nodes[1].host.as_deref(), Some("cdn.example.com"));
        assert!(nodes[1].tls_secure);
    }

    #[test]
    fn test_explode_clash_legacy_field_and_ws_fields() {
        let content = r#"
Proxy:
  - {name: Old, type: vmess, server: example.com, port: 80, uuid: u, alterId: 2, cipher: auto, network: ws, ws-path: /legacy, ws-headers: {Host: h.example.com}}
"#;
        let mut nodes = Vec::new();
        assert!(explode_clash(content, &mut nodes));
        assert_eq!(nodes[0].path.as_deref(), Some("/legacy"));
        assert_eq!(nodes[0].host.as_deref(), Some("h.example.com"));
        assert_eq!(nodes[0].alter_id, 2);
    }

    #[test]
    fn test_explode_clash_ss_plugin() {
        let content = r#"
proxies:
  - {name: P, type: ss, server: s, port: 443, cipher: aes-128-gcm, password: x, plugin: obfs, plugin-opts: {mode: tls, host: bing.com}}
"#;
        let mut nodes = Vec::new();
        assert!(explode_clash(content, &mut nodes));
        assert_eq!(nodes[0].plugin.as_deref(), Some("obfs-local"));
        assert_eq!(
            nodes[0].plugin_option.as_deref(),
            Some("obfs=tls;obfs-host=bing.com")
        );
    }

    #[test]
    fn test_explode_clash_not_clash() {
        let mut nodes = Vec::new();
        assert!(!explode_clash("rules:\n  - FINAL,DIRECT\n", &mut nodes));
        assert!(!explode_clash("not yaml: [", &mut nodes));
    }
}
