//! Polymorphic decoders from every supported input shape into nodes.

pub mod clash;
pub mod common;
pub mod http;
pub mod netch;
pub mod quan;
pub mod socks;
pub mod ss;
pub mod ssd;
pub mod ssr;
pub mod sstap;
pub mod surge;
pub mod trojan;
pub mod vmess;

use log::warn;

use crate::models::{Proxy, ProxyType};
use crate::utils::base64::url_safe_base64_decode;
use crate::utils::string::{get_line_break, strip_bom};

pub use clash::explode_clash;
pub use netch::{explode_netch, explode_netch_conf};
pub use ss::{explode_ss, explode_ss_android, explode_ss_conf};
pub use ssd::explode_ssd;
pub use ssr::{explode_ssr, explode_ssr_conf};
pub use sstap::explode_sstap;
pub use surge::explode_surge;
pub use vmess::{explode_vmess, explode_vmess_conf};

/// Decode one single-node link, dispatching on its scheme.
pub fn explode(link: &str, node: &mut Proxy) -> bool {
    if link.starts_with("ssr://") {
        ssr::explode_ssr(link, node)
    } else if link.starts_with("vmess://") || link.starts_with("vmess1://") {
        vmess::explode_vmess(link, node)
    } else if link.starts_with("ss://") {
        ss::explode_ss(link, node)
    } else if link.starts_with("socks://")
        || link.starts_with("https://t.me/socks")
        || link.starts_with("tg://socks")
    {
        socks::explode_socks(link, node)
    } else if link.starts_with("https://t.me/http") || link.starts_with("tg://http") {
        http::explode_http(link, node)
    } else if link.starts_with("Netch://") {
        netch::explode_netch(link, node)
    } else if link.starts_with("trojan://") {
        trojan::explode_trojan(link, node)
    } else {
        false
    }
}

/// Decode a textual subscription: SSD envelope, Clash YAML, Surge INI, or a
/// (possibly base64-wrapped) list of single-node links.
pub fn explode_sub(sub: &str, nodes: &mut Vec<Proxy>) -> bool {
    let sub = strip_bom(sub).trim();

    if sub.starts_with("ssd://") {
        return ssd::explode_ssd(sub, nodes);
    }

    if (sub.contains("proxies:") || sub.contains("Proxy:")) && clash::explode_clash(sub, nodes) {
        return true;
    }

    if sub.contains("[Proxy]") || sub.contains("[server_local]") {
        if surge::explode_surge(sub, nodes) {
            return true;
        }
    }

    // normal subscription: base64-wrapped link-per-line
    let decoded = {
        let decoded = url_safe_base64_decode(sub);
        if decoded.is_empty() {
            sub.to_string()
        } else {
            decoded
        }
    };

    let delimiter = get_line_break(&decoded);
    let initial_len = nodes.len();
    for line in decoded.split(delimiter) {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let mut node = Proxy::default();
        if explode(line, &mut node) && node.proxy_type != ProxyType::Unknown {
            if node.port == 0 {
                warn!("Dropping node '{}' with empty port", node.remark);
                continue;
            }
            nodes.push(node);
        } else {
            warn!("Dropping unrecognized line in subscription");
        }
    }

    nodes.len() > initial_len
}

/// Decode a configuration blob by sniffing its shape, falling back to the
/// subscription decoder.
pub fn explode_conf_content(content: &str, nodes: &mut Vec<Proxy>) -> bool {
    let content = strip_bom(content);

    let parsed = if content.contains("\"version\"") {
        explode_ss_conf(content, nodes)
    } else if content.contains("\"serverSubscribes\"")
        || (content.contains("\"local_address\"") && content.contains("\"local_port\""))
    {
        explode_ssr_conf(content, nodes)
    } else if content.contains("\"uiItem\"") || content.contains("vnext") {
        explode_vmess_conf(content, nodes)
    } else if content.contains("\"proxy_apps\"") {
        explode_ss_android(content, nodes)
    } else if content.contains("\"idInUse\"") {
        explode_sstap(content, nodes)
    } else if content.contains("\"ModeFileNameType\"") {
        explode_netch_conf(content, nodes)
    } else {
        explode_sub(content, nodes)
    };

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::base64::base64_encode;

    #[test]
    fn test_explode_dispatch() {
        let mut node = Proxy::default();
        assert!(explode(
            "ss://YWVzLTEyOC1nY206cGFzc0AxLjIuMy40OjgzODg#Node",
            &mut node
        ));
        assert_eq!(node.proxy_type, ProxyType::Shadowsocks);

        let mut node = Proxy::default();
        assert!(explode("trojan://pw@example.com:443#T", &mut node));
        assert_eq!(node.proxy_type, ProxyType::Trojan);

        let mut node = Proxy::default();
        assert!(!explode("ftp://example.com", &mut node));
    }

    #[test]
    fn test_explode_sub_base64_list() {
        let list = "ss://YWVzLTEyOC1nY206cGFzc0AxLjIuMy40OjgzODg#One\ntrojan://pw@example.com:443#Two\n";
        let encoded = base64_encode(list);
        let mut nodes = Vec::new();
        assert!(explode_sub(&encoded, &mut nodes));
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].remark, "One");
        assert_eq!(nodes[1].remark, "Two");
    }

    #[test]
    fn test_explode_sub_plain_list_with_bad_line() {
        let list = "ss://YWVzLTEyOC1nY206cGFzc0AxLjIuMy40OjgzODg#Good\nnot-a-link\n";
        let mut nodes = Vec::new();
        assert!(explode_sub(list, &mut nodes));
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn test_explode_sub_clash_yaml() {
        let content = "proxies:\n  - {name: N, type: ss, server: s.example.com, port: 1, cipher: aes-128-gcm, password: p}\n";
        let mut nodes = Vec::new();
        assert!(explode_sub(content, &mut nodes));
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn test_explode_conf_content_sniffs_json() {
        let content = r#"{"version":"4.0","configs":[{"server":"x.example.com","server_port":1,"password":"p","method":"aes-256-gcm","remarks":"R"}]}"#;
        let mut nodes = Vec::new();
        assert!(explode_conf_content(content, &mut nodes));
        assert_eq!(nodes[0].remark, "R");
    }

    #[test]
    fn test_explode_conf_content_invalid() {
        let mut nodes = Vec::new();
        assert!(!explode_conf_content("complete garbage that is nothing", &mut nodes));
    }
}
