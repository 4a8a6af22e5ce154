use crate::models::{Proxy, TROJAN_DEFAULT_GROUP};
use crate::utils::string::to_int;
use crate::utils::tribool::parse_tribool;
use crate::utils::url::{get_url_arg, url_decode};

/// Parse a `trojan://password@host:port?…#remark` link into a node.
pub fn explode_trojan(trojan: &str, node: &mut Proxy) -> bool {
    if !trojan.starts_with("trojan://") {
        return false;
    }

    let mut body = trojan[9..].to_string();

    let mut remark = String::new();
    if let Some(pos) = body.rfind('#') {
        remark = url_decode(body[pos + 1..].trim_end());
        body.truncate(pos);
    }

    let mut addition = String::new();
    if let Some(pos) = body.rfind('?') {
        addition = body[pos + 1..].to_string();
        body.truncate(pos);
    }

    let (psk, server_port) = match body.split_once('@') {
        Some(pair) => pair,
        None => return false,
    };
    let (server, port_str) = match server_port.rsplit_once(':') {
        Some(pair) => pair,
        None => return false,
    };
    let port = to_int(port_str, 0u16);
    if port == 0 {
        return false;
    }

    let host = {
        let sni = get_url_arg(&addition, "sni");
        if sni.is_empty() {
            get_url_arg(&addition, "peer")
        } else {
            sni
        }
    };
    let scv = parse_tribool(&get_url_arg(&addition, "allowInsecure"));

    if remark.is_empty() {
        remark = format!("{}:{}", server, port);
    }

    *node = Proxy::trojan_construct(
        TROJAN_DEFAULT_GROUP,
        &remark,
        server,
        port,
        psk,
        &host,
        true,
        None,
        None,
        scv,
        None,
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProxyType;

    #[test]
    fn test_explode_trojan_basic() {
        let mut node = Proxy::default();
        assert!(explode_trojan(
            "trojan://password@example.com:443#Tro",
            &mut node
        ));
        assert_eq!(node.proxy_type, ProxyType::Trojan);
        assert_eq!(node.password.as_deref(), Some("password"));
        assert_eq!(node.hostname, "example.com");
        assert_eq!(node.port, 443);
        assert_eq!(node.remark, "Tro");
        assert!(node.tls_secure);
    }

    #[test]
    fn test_explode_trojan_with_sni_and_scv() {
        let mut node = Proxy::default();
        assert!(explode_trojan(
            "trojan://pw@example.com:443?sni=sni.example.com&allowInsecure=1",
            &mut node
        ));
        assert_eq!(node.host.as_deref(), Some("sni.example.com"));
        assert_eq!(node.allow_insecure, Some(true));
        assert_eq!(node.remark, "example.com:443");
    }

    #[test]
    fn test_explode_trojan_invalid() {
        let mut node = Proxy::default();
        assert!(!explode_trojan("trojan://nopassword", &mut node));
        assert!(!explode_trojan("ss://x", &mut node));
    }
}
