use serde_json::Value;

use crate::models::{Proxy, V2RAY_DEFAULT_GROUP};
use crate::utils::base64::url_safe_base64_decode;
use crate::utils::string::to_int;
use crate::utils::url::{get_url_arg, url_decode};

fn json_field(value: &Value, key: &str) -> String {
    match &value[key] {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// Parse any of the `vmess://` link flavours into a node.
///
/// Dispatches between the Shadowrocket userinfo form, the Kitsunebi
/// `vmess1://` form, a Quantumult single line hidden in base64, and the
/// canonical v2rayN base64-JSON form.
pub fn explode_vmess(vmess: &str, node: &mut Proxy) -> bool {
    if !vmess.starts_with("vmess://") && !vmess.starts_with("vmess1://") {
        return false;
    }

    if vmess.starts_with("vmess1://") {
        return explode_kitsunebi(vmess, node);
    }
    if vmess[8..].contains('?') {
        return explode_shadowrocket(vmess, node);
    }

    let decoded = url_safe_base64_decode(&vmess[8..]);
    if decoded.contains(" = ") {
        return super::quan::explode_quan_line(&decoded, node);
    }

    let json: Value = match serde_json::from_str(&decoded) {
        Ok(json) => json,
        Err(_) => return false,
    };

    // links without a version are treated as version 1
    let version = {
        let v = json_field(&json, "v");
        if v.is_empty() {
            "1".to_string()
        } else {
            v
        }
    };

    let ps = json_field(&json, "ps");
    let add = json_field(&json, "add");
    let port_str = json_field(&json, "port");
    let fake_type = json_field(&json, "type");
    let id = json_field(&json, "id");
    let aid = json_field(&json, "aid");
    let net = json_field(&json, "net");
    let tls = json_field(&json, "tls");
    let mut host = json_field(&json, "host");
    let mut path = String::new();

    if version == "1" {
        // version 1 packs "host;path" into the host field
        if let Some(pos) = host.find(';') {
            path = host[pos + 1..].to_string();
            host.truncate(pos);
        }
    } else {
        path = json_field(&json, "path");
    }

    let port = to_int(&port_str, 0u16);
    if add.is_empty() || port == 0 {
        return false;
    }

    let remark = if ps.is_empty() {
        format!("{} ({})", add, port)
    } else {
        ps
    };

    *node = Proxy::vmess_construct(
        V2RAY_DEFAULT_GROUP,
        &remark,
        &add,
        port,
        &fake_type,
        &id,
        to_int(&aid, 0u16),
        &net,
        "auto",
        &path,
        &host,
        "",
        if tls == "tls" { "tls" } else { "" },
        "",
        None,
        None,
        None,
        None,
    );
    true
}

/// Shadowrocket style: `vmess://base64(cipher:id@host:port)?remark=…&obfs=…`.
pub fn explode_shadowrocket(link: &str, node: &mut Proxy) -> bool {
    let body = &link[8..];
    let (main, addition) = match body.split_once('?') {
        Some(pair) => pair,
        None => return false,
    };

    let decoded = url_safe_base64_decode(main);
    let (secret, server_port) = match decoded.split_once('@') {
        Some(pair) => pair,
        None => return false,
    };
    let (cipher, id) = match secret.split_once(':') {
        Some(pair) => pair,
        None => return false,
    };
    let (add, port_str) = match server_port.rsplit_once(':') {
        Some(pair) => pair,
        None => return false,
    };
    let port = to_int(port_str, 0u16);
    if port == 0 {
        return false;
    }

    let mut remarks = url_decode(&get_url_arg(addition, "remark"));
    let obfs = get_url_arg(addition, "obfs");
    let mut net = String::from("tcp");
    let mut host = String::new();
    let mut path = String::new();
    if !obfs.is_empty() {
        if obfs == "websocket" {
            net = "ws".to_string();
            host = get_url_arg(addition, "obfsParam");
            path = get_url_arg(addition, "path");
        }
    } else {
        let network = get_url_arg(addition, "network");
        if !network.is_empty() {
            net = network;
        }
        host = get_url_arg(addition, "wsHost");
        path = get_url_arg(addition, "wspath");
    }
    let tls = if get_url_arg(addition, "tls") == "1" {
        "tls"
    } else {
        ""
    };
    // Shadowrocket omits aid for its default of 0
    let aid = to_int(&get_url_arg(addition, "aid"), 0u16);

    if remarks.is_empty() {
        remarks = format!("{}:{}", add, port);
    }

    *node = Proxy::vmess_construct(
        V2RAY_DEFAULT_GROUP,
        &remarks,
        add,
        port,
        "",
        id,
        aid,
        &net,
        cipher,
        &path,
        &host,
        "",
        tls,
        "",
        None,
        None,
        None,
        None,
    );
    true
}

/// Kitsunebi style: `vmess1://id@host:port/path?network=…&tls=…#remark`.
pub fn explode_kitsunebi(link: &str, node: &mut Proxy) -> bool {
    let mut body = link[9..].to_string();

    let mut remarks = String::new();
    if let Some(pos) = body.find('#') {
        remarks = body[pos + 1..].to_string();
        body.truncate(pos);
    }

    let addition = match body.find('?') {
        Some(pos) => {
            let addition = body[pos + 1..].to_string();
            body.truncate(pos);
            addition
        }
        None => String::new(),
    };

    let (id, server_port) = match body.split_once('@') {
        Some(pair) => pair,
        None => return false,
    };
    let (add, port_path) = match server_port.rsplit_once(':') {
        Some(pair) => pair,
        None => return false,
    };
    let (port_str, path) = match port_path.find('/') {
        Some(pos) => (&port_path[..pos], &port_path[pos..]),
        None => (port_path, ""),
    };
    let port = to_int(port_str, 0u16);
    if port == 0 {
        return false;
    }

    let net = get_url_arg(&addition, "network");
    let tls = if get_url_arg(&addition, "tls") == "true" {
        "tls"
    } else {
        ""
    };
    let host = get_url_arg(&addition, "ws.host");

    if remarks.is_empty() {
        remarks = format!("{}:{}", add, port);
    }

    *node = Proxy::vmess_construct(
        V2RAY_DEFAULT_GROUP,
        &remarks,
        add,
        port,
        "",
        id,
        0,
        &net,
        "auto",
        path,
        &host,
        "",
        tls,
        "",
        None,
        None,
        None,
        None,
    );
    true
}

/// Parse a v2rayN export (`vnext` outbounds or the subscription item list).
pub fn explode_vmess_conf(content: &str, nodes: &mut Vec<Proxy>) -> bool {
    let json: Value = match serde_json::from_str(content) {
        Ok(json) => json,
        Err(_) => return false,
    };

    let initial_len = nodes.len();

    if let Some(outbounds) = json["outbounds"].as_array() {
        for outbound in outbounds {
            if outbound["protocol"].as_str() != Some("vmess") {
                continue;
            }
            let vnext = match outbound["settings"]["vnext"].as_array() {
                Some(v) => v,
                None => continue,
            };
            for server in vnext {
                let add = json_field(server, "address");
                let port = server["port"].as_u64().unwrap_or(0) as u16;
                if add.is_empty() || port == 0 {
                    continue;
                }
                let users = match server["users"].as_array() {
                    Some(u) => u,
                    None => continue,
                };
                for user in users {
                    let id = json_field(user, "id");
                    let aid = user["alterId"].as_u64().unwrap_or(0) as u16;
                    let net = json_field(&outbound["streamSettings"], "network");
                    let security = json_field(&outbound["streamSettings"], "security");
                    let ws = &outbound["streamSettings"]["wsSettings"];
                    let path = json_field(ws, "path");
                    let host = json_field(&ws["headers"], "Host");
                    nodes.push(Proxy::vmess_construct(
                        V2RAY_DEFAULT_GROUP,
                        &format!("{} ({})", add, port),
                        &add,
                        port,
                        "",
                        &id,
                        aid,
                        &net,
                        "auto",
                        &path,
                        &host,
                        "",
                        if security == "tls" { "tls" } else { "" },
                        "",
                        None,
                        None,
                        None,
                        None,
                    ));
                }
            }
        }
    } else if let Some(items) = json["vmess"].as_array() {
        // v2rayN gui-config subscription list
        for item in items {
            let add = json_field(item, "address");
            let port = to_int(&json_field(item, "port"), 0u16);
            if add.is_empty() || port == 0 {
                continue;
            }
            let config_type = item["configType"].as_u64().unwrap_or(1);
            if config_type != 1 {
                continue;
            }
            let ps = json_field(item, "remarks");
            let remark = if ps.is_empty() {
                format!("{} ({})", add, port)
            } else {
                ps
            };
            nodes.push(Proxy::vmess_construct(
                V2RAY_DEFAULT_GROUP,
                &remark,
                &add,
                port,
                &json_field(item, "headerType"),
                &json_field(item, "id"),
                to_int(&json_field(item, "alterId"), 0u16),
                &json_field(item, "network"),
                &json_field(item, "security"),
                &json_field(item, "path"),
                &json_field(item, "requestHost"),
                "",
                if json_field(item, "streamSecurity") == "tls" {
                    "tls"
                } else {
                    ""
                },
                "",
                None,
                None,
                None,
                None,
            ));
        }
    }

    nodes.len() > initial_len
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProxyType;
    use crate::utils::base64::base64_encode;

    #[test]
    fn test_explode_vmess_v2rayn() {
        let config = r#"{"v":"2","ps":"Test VMess","add":"example.com","port":"443","id":"uuid-here","aid":"4","net":"ws","type":"none","host":"cdn.example.com","path":"/ws","tls":"tls"}"#;
        let link = format!("vmess://{}", base64_encode(config));
        let mut node = Proxy::default();
        assert!(explode_vmess(&link, &mut node));
        assert_eq!(node.proxy_type, ProxyType::VMess);
        assert_eq!(node.remark, "Test VMess");
        assert_eq!(node.hostname, "example.com");
        assert_eq!(node.port, 443);
        assert_eq!(node.user_id.as_deref(), Some("uuid-here"));
        assert_eq!(node.alter_id, 4);
        assert_eq!(node.transfer_protocol.as_deref(), Some("ws"));
        assert_eq!(node.path.as_deref(), Some("/ws"));
        assert_eq!(node.host.as_deref(), Some("cdn.example.com"));
        assert!(node.tls_secure);
    }

    #[test]
    fn test_explode_vmess_version1_host_packs_path() {
        let config = r#"{"ps":"V1","add":"example.com","port":"80","id":"uuid","aid":"0","net":"ws","host":"cdn.example.com;/path"}"#;
        let link = format!("vmess://{}", base64_encode(config));
        let mut node = Proxy::default();
        assert!(explode_vmess(&link, &mut node));
        assert_eq!(node.host.as_deref(), Some("cdn.example.com"));
        assert_eq!(node.path.as_deref(), Some("/path"));
    }

    #[test]
    fn test_explode_shadowrocket() {
        let main = base64_encode("chacha20-poly1305:uuid-here@example.com:443");
        let link = format!(
            "vmess://{}?remark=Rocket&obfs=websocket&obfsParam=cdn.example.com&path=/ws&tls=1",
            main
        );
        let mut node = Proxy::default();
        assert!(explode_vmess(&link, &mut node));
        assert_eq!(node.remark, "Rocket");
        assert_eq!(node.alter_id, 0);
        assert_eq!(node.transfer_protocol.as_deref(), Some("ws"));
        assert_eq!(node.host.as_deref(), Some("cdn.example.com"));
        assert!(node.tls_secure);
    }

    #[test]
    fn test_explode_kitsunebi() {
        let link = "vmess1://uuid-here@example.com:443/ws-path?network=ws&tls=true&ws.host=cdn.example.com#Kit";
        let mut node = Proxy::default();
        assert!(explode_vmess(link, &mut node));
        assert_eq!(node.remark, "Kit");
        assert_eq!(node.port, 443);
        assert_eq!(node.alter_id, 0);
        assert_eq!(node.path.as_deref(), Some("/ws-path"));
        assert!(node.tls_secure);
    }

    #[test]
    fn test_explode_vmess_invalid() {
        let mut node = Proxy::default();
        assert!(!explode_vmess("vmess://!!!notbase64!!!", &mut node));
        assert!(!explode_vmess("trojan://x", &mut node));
    }

    #[test]
    fn test_explode_vmess_conf_vnext() {
        let content = r#"{
            "outbounds": [{
                "protocol": "vmess",
                "settings": {"vnext": [{
                    "address": "example.com",
                    "port": 443,
                    "users": [{"id": "uuid", "alterId": 2}]
                }]},
                "streamSettings": {"network": "ws", "security": "tls",
                    "wsSettings": {"path": "/ws", "headers": {"Host": "cdn.example.com"}}}
            }]
        }"#;
        let mut nodes = Vec::new();
        assert!(explode_vmess_conf(content, &mut nodes));
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].alter_id, 2);
        assert_eq!(nodes[0].transfer_protocol.as_deref(), Some("ws"));
    }
}
