use crate::models::{Proxy, SOCKS_DEFAULT_GROUP};
use crate::utils::base64::url_safe_base64_decode;
use crate::utils::string::to_int;
use crate::utils::url::{get_url_arg, url_decode};

/// Parse a `socks://` (v2rayN style) or Telegram `t.me/socks` link.
pub fn explode_socks(link: &str, node: &mut Proxy) -> bool {
    let mut remarks = String::new();
    let mut server = String::new();
    let mut port_str = String::new();
    let mut username = String::new();
    let mut password = String::new();

    if link.starts_with("socks://") {
        let mut body = link[8..].to_string();
        if let Some(pos) = body.find('#') {
            remarks = url_decode(&body[pos + 1..]);
            body.truncate(pos);
        }
        let decoded = url_safe_base64_decode(&body);
        match decoded.rsplit_once(':') {
            Some((s, p)) => {
                server = s.to_string();
                port_str = p.to_string();
            }
            None => return false,
        }
    } else if link.starts_with("https://t.me/socks") || link.starts_with("tg://socks") {
        let query = match link.split_once('?') {
            Some((_, q)) => q,
            None => return false,
        };
        server = get_url_arg(query, "server");
        port_str = get_url_arg(query, "port");
        username = get_url_arg(query, "user");
        password = get_url_arg(query, "pass");
    } else {
        return false;
    }

    let port = to_int(&port_str, 0u16);
    if server.is_empty() || port == 0 {
        return false;
    }

    if remarks.is_empty() {
        remarks = format!("{}:{}", server, port);
    }

    *node = Proxy::socks_construct(
        SOCKS_DEFAULT_GROUP,
        &remarks,
        &server,
        port,
        &username,
        &password,
        None,
        None,
        None,
    );
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProxyType;
    use crate::utils::base64::url_safe_base64_encode;

    #[test]
    fn test_explode_socks_v2rayn() {
        let mut node = Proxy::default();
        let link = format!("socks://{}#Socks", url_safe_base64_encode("1.2.3.4:1080"));
        assert!(explode_socks(&link, &mut node));
        assert_eq!(node.proxy_type, ProxyType::Socks5);
        assert_eq!(node.hostname, "1.2.3.4");
        assert_eq!(node.port, 1080);
        assert_eq!(node.remark, "Socks");
    }

    #[test]
    fn test_explode_socks_telegram() {
        let mut node = Proxy::default();
        assert!(explode_socks(
            "https://t.me/socks?server=example.com&port=1080&user=u&pass=p",
            &mut node
        ));
        assert_eq!(node.hostname, "example.com");
        assert_eq!(node.username.as_deref(), Some("u"));
        assert_eq!(node.password.as_deref(), Some("p"));
        assert_eq!(node.remark, "example.com:1080");
    }

    #[test]
    fn test_explode_socks_invalid() {
        let mut node = Proxy::default();
        assert!(!explode_socks("https://t.me/socks", &mut node));
        assert!(!explode_socks("http://example.com", &mut node));
    }
}
