use crate::models::{Proxy, HTTP_DEFAULT_GROUP};
use crate::utils::string::to_int;
use crate::utils::url::{get_url_arg, url_decode};

/// Parse a Telegram `t.me/http` / `t.me/https` proxy link.
pub fn explode_http(link: &str, node: &mut Proxy) -> bool {
    if !link.starts_with("https://t.me/http") && !link.starts_with("tg://http") {
        return false;
    }

    let query = match link.split_once('?') {
        Some((_, q)) => q,
        None => return false,
    };

    let server = get_url_arg(query, "server");
    let port = to_int(&get_url_arg(query, "port"), 0u16);
    let username = get_url_arg(query, "user");
    let password = get_url_arg(query, "pass");
    let mut remarks = url_decode(&get_url_arg(query, "remark"));

    if server.is_empty() || port == 0 {
        return false;
    }
    if remarks.is_empty() {
        remarks = format!("{}:{}", server, port);
    }

    let tls = link.contains("/https");
    *node = Proxy::http_construct(
        HTTP_DEFAULT_GROUP,
        &remarks,
        &server,
        port,
        &username,
        &password,
        tls,
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

    #[test]
    fn test_explode_http_telegram() {
        let mut node = Proxy::default();
        assert!(explode_http(
            "https://t.me/http?server=example.com&port=8080&user=u&pass=p",
            &mut node
        ));
        assert_eq!(node.proxy_type, ProxyType::HTTP);
        assert_eq!(node.hostname, "example.com");
        assert_eq!(node.port, 8080);
    }

    #[test]
    fn test_explode_https_telegram() {
        let mut node = Proxy::default();
        assert!(explode_http(
            "https://t.me/https?server=example.com&port=8443",
            &mut node
        ));
        assert_eq!(node.proxy_type, ProxyType::HTTPS);
        assert!(node.tls_secure);
    }

    #[test]
    fn test_explode_http_rejects_other() {
        let mut node = Proxy::default();
        assert!(!explode_http("https://t.me/socks?server=x&port=1", &mut node));
    }
}
