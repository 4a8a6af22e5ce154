use serde_json::Value;

use super::common::SS_CIPHERS;
use crate::models::{Proxy, SSR_DEFAULT_GROUP, SS_DEFAULT_GROUP};

/// Parse an SSTap export (`configs` array with a numeric `type` per entry).
pub fn explode_sstap(content: &str, nodes: &mut Vec<Proxy>) -> bool {
    let json: Value = match serde_json::from_str(content) {
        Ok(json) => json,
        Err(_) => return false,
    };

    let configs = match json["configs"].as_array() {
        Some(configs) => configs,
        None => return false,
    };

    let initial_len = nodes.len();
    for config in configs {
        let group = config["group"].as_str().unwrap_or("");
        let remarks = config["remarks"].as_str().unwrap_or("");
        let server = config["server"].as_str().unwrap_or("");
        let port = config["server_port"].as_u64().unwrap_or(0) as u16;
        if server.is_empty() || port == 0 {
            continue;
        }
        let password = config["password"].as_str().unwrap_or("");
        let method = config["method"].as_str().unwrap_or("");

        let remark = if remarks.is_empty() {
            format!("{} ({})", server, port)
        } else {
            remarks.to_string()
        };

        // type: 5 = SSR, 6 = SS
        match config["type"].as_u64() {
            Some(5) => {
                let protocol = config["protocol"].as_str().unwrap_or("");
                let obfs = config["obfs"].as_str().unwrap_or("");
                if SS_CIPHERS.contains(&method)
                    && (obfs.is_empty() || obfs == "plain")
                    && (protocol.is_empty() || protocol == "origin")
                {
                    nodes.push(Proxy::ss_construct(
                        if group.is_empty() { SS_DEFAULT_GROUP } else { group },
                        &remark,
                        server,
                        port,
                        password,
                        method,
                        "",
                        "",
                        None,
                        None,
                        None,
                        None,
                    ));
                } else {
                    nodes.push(Proxy::ssr_construct(
                        if group.is_empty() { SSR_DEFAULT_GROUP } else { group },
                        &remark,
                        server,
                        port,
                        protocol,
                        method,
                        obfs,
                        password,
                        config["obfsparam"].as_str().unwrap_or(""),
                        config["protocolparam"].as_str().unwrap_or(""),
                        None,
                        None,
                        None,
                    ));
                }
            }
            Some(6) => {
                nodes.push(Proxy::ss_construct(
                    if group.is_empty() { SS_DEFAULT_GROUP } else { group },
                    &remark,
                    server,
                    port,
                    password,
                    method,
                    "",
                    "",
                    None,
                    None,
                    None,
                    None,
                ));
            }
            _ => continue,
        }
    }

    nodes.len() > initial_len
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProxyType;

    #[test]
    fn test_explode_sstap() {
        let content = r#"{
            "idInUse": 1,
            "configs": [
                {"type": 6, "server": "a.example.com", "server_port": 8388,
                 "password": "pw", "method": "aes-256-gcm", "remarks": "SS"},
                {"type": 5, "server": "b.example.com", "server_port": 8388,
                 "password": "pw", "method": "rc4", "protocol": "auth_chain_a",
                 "obfs": "http_simple", "remarks": "SSR"}
            ]
        }"#;
        let mut nodes = Vec::new();
        assert!(explode_sstap(content, &mut nodes));
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].proxy_type, ProxyType::Shadowsocks);
        assert_eq!(nodes[1].proxy_type, ProxyType::ShadowsocksR);
    }

    #[test]
    fn test_explode_sstap_invalid() {
        let mut nodes = Vec::new();
        assert!(!explode_sstap("{}", &mut nodes));
    }
}
