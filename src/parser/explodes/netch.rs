use serde_json::Value;

use super::common::SS_CIPHERS;
use crate::models::{
    Proxy, SOCKS_DEFAULT_GROUP, SSR_DEFAULT_GROUP, SS_DEFAULT_GROUP, V2RAY_DEFAULT_GROUP,
};
use crate::utils::base64::url_safe_base64_decode;
use crate::utils::string::to_int;

fn field(value: &Value, key: &str) -> String {
    match &value[key] {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Build a node from one Netch server object.
pub fn netch_server_to_node(json: &Value, node: &mut Proxy) -> bool {
    let server_type = field(json, "Type");
    let address = field(json, "Hostname");
    let port = to_int(&field(json, "Port"), 0u16);
    if address.is_empty() || port == 0 {
        return false;
    }
    let method = field(json, "EncryptMethod");
    let password = field(json, "Password");
    let mut remark = field(json, "Remark");
    if remark.is_empty() {
        remark = format!("{}:{}", address, port);
    }

    match server_type.as_str() {
        "SS" => {
            *node = Proxy::ss_construct(
                SS_DEFAULT_GROUP,
                &remark,
                &address,
                port,
                &password,
                &method,
                &field(json, "Plugin"),
                &field(json, "PluginOption"),
                None,
                None,
                None,
                None,
            );
        }
        "SSR" => {
            let protocol = field(json, "Protocol");
            let obfs = field(json, "OBFS");
            if SS_CIPHERS.contains(&method.as_str())
                && (obfs.is_empty() || obfs == "plain")
                && (protocol.is_empty() || protocol == "origin")
            {
                *node = Proxy::ss_construct(
                    SS_DEFAULT_GROUP,
                    &remark,
                    &address,
                    port,
                    &password,
                    &method,
                    &field(json, "Plugin"),
                    &field(json, "PluginOption"),
                    None,
                    None,
                    None,
                    None,
                );
            } else {
                *node = Proxy::ssr_construct(
                    SSR_DEFAULT_GROUP,
                    &remark,
                    &address,
                    port,
                    &protocol,
                    &method,
                    &obfs,
                    &password,
                    &field(json, "OBFSParam"),
                    &field(json, "ProtocolParam"),
                    None,
                    None,
                    None,
                );
            }
        }
        "VMess" => {
            *node = Proxy::vmess_construct(
                V2RAY_DEFAULT_GROUP,
                &remark,
                &address,
                port,
                &field(json, "FakeType"),
                &field(json, "UserID"),
                to_int(&field(json, "AlterID"), 0u16),
                &field(json, "TransferProtocol"),
                &method,
                &field(json, "Path"),
                &field(json, "Host"),
                &field(json, "Edge"),
                if field(json, "TLSSecure") == "true" {
                    "tls"
                } else {
                    ""
                },
                "",
                None,
                None,
                None,
                None,
            );
        }
        "Socks5" => {
            *node = Proxy::socks_construct(
                SOCKS_DEFAULT_GROUP,
                &remark,
                &address,
                port,
                &field(json, "Username"),
                &password,
                None,
                None,
                None,
            );
        }
        _ => return false,
    }

    true
}

/// Parse a `Netch://<base64 JSON>` single-server link.
pub fn explode_netch(link: &str, node: &mut Proxy) -> bool {
    if !link.starts_with("Netch://") {
        return false;
    }
    let decoded = url_safe_base64_decode(&link[8..]);
    let json: Value = match serde_json::from_str(&decoded) {
        Ok(json) => json,
        Err(_) => return false,
    };
    netch_server_to_node(&json, node)
}

/// Parse a Netch GUI config (`Server` array).
pub fn explode_netch_conf(content: &str, nodes: &mut Vec<Proxy>) -> bool {
    let json: Value = match serde_json::from_str(content) {
        Ok(json) => json,
        Err(_) => return false,
    };
    let servers = match json["Server"].as_array() {
        Some(servers) => servers,
        None => return false,
    };

    let initial_len = nodes.len();
    for server in servers {
        let mut node = Proxy::default();
        if netch_server_to_node(server, &mut node) {
            nodes.push(node);
        }
    }
    nodes.len() > initial_len
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProxyType;
    use crate::utils::base64::url_safe_base64_encode;

    #[test]
    fn test_explode_netch_ss() {
        let payload = r#"{"Type":"SS","Remark":"Netch SS","Hostname":"example.com","Port":8388,"EncryptMethod":"aes-256-gcm","Password":"pw"}"#;
        let link = format!("Netch://{}", url_safe_base64_encode(payload));
        let mut node = Proxy::default();
        assert!(explode_netch(&link, &mut node));
        assert_eq!(node.proxy_type, ProxyType::Shadowsocks);
        assert_eq!(node.remark, "Netch SS");
    }

    #[test]
    fn test_explode_netch_ssr_downgrade() {
        let payload = r#"{"Type":"SSR","Hostname":"example.com","Port":8388,"EncryptMethod":"aes-256-gcm","Password":"pw","Protocol":"origin","OBFS":"plain"}"#;
        let link = format!("Netch://{}", url_safe_base64_encode(payload));
        let mut node = Proxy::default();
        assert!(explode_netch(&link, &mut node));
        assert_eq!(node.proxy_type, ProxyType::Shadowsocks);
    }

    #[test]
    fn test_explode_netch_conf() {
        let content = r#"{"ModeFileNameType":0,"Server":[
            {"Type":"Socks5","Hostname":"1.2.3.4","Port":1080,"Username":"u","Password":"p"}
        ]}"#;
        let mut nodes = Vec::new();
        assert!(explode_netch_conf(content, &mut nodes));
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].proxy_type, ProxyType::Socks5);
    }

    #[test]
    fn test_explode_netch_invalid() {
        let mut node = Proxy::default();
        assert!(!explode_netch("Netch://bm90anNvbg", &mut node));
        assert!(!explode_netch("netch://xx", &mut node));
    }
}
