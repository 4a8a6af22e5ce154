use serde_json::json;

use crate::models::{ExtraSettings, Proxy, ProxyType, SubResult};
use crate::utils::base64::{base64_encode, url_safe_base64_encode};
use crate::utils::url::url_encode;

/// Ciphers plain Shadowsocks clients accept; used for SSR downgrades at
/// emit time.
pub const SS_ACCEPTED_CIPHERS: &[&str] = &[
    "rc4-md5",
    "aes-128-gcm",
    "aes-192-gcm",
    "aes-256-gcm",
    "aes-128-cfb",
    "aes-192-cfb",
    "aes-256-cfb",
    "aes-128-ctr",
    "aes-192-ctr",
    "aes-256-ctr",
    "camellia-128-cfb",
    "camellia-192-cfb",
    "camellia-256-cfb",
    "bf-cfb",
    "chacha20-ietf-poly1305",
    "xchacha20-ietf-poly1305",
    "salsa20",
    "chacha20",
    "chacha20-ietf",
];

/// Node kinds selectable in `proxy_to_single`'s `types` bitmask.
pub const TYPE_SS: u32 = 1;
pub const TYPE_SSR: u32 = 2;
pub const TYPE_VMESS: u32 = 4;
pub const TYPE_TROJAN: u32 = 8;

/// Build the v2rayN JSON payload of a `vmess://` link.
fn vmess_link_construct(node: &Proxy) -> String {
    let payload = json!({
        "v": "2",
        "ps": node.remark,
        "add": node.hostname,
        "port": node.port.to_string(),
        "type": node.fake_type.as_deref().unwrap_or("none"),
        "id": node.user_id.as_deref().unwrap_or(""),
        "aid": node.alter_id.to_string(),
        "net": node.transfer_protocol.as_deref().unwrap_or("tcp"),
        "path": node.path.as_deref().unwrap_or(""),
        "host": node.host.as_deref().unwrap_or(""),
        "tls": if node.tls_secure { "tls" } else { "" }
    });
    payload.to_string()
}

/// Render nodes as one URI per line for the plain single-list targets.
///
/// Unless `nodelist` is on, the result is base64-wrapped the way clients
/// expect subscriptions to arrive.
pub fn proxy_to_single(nodes: &mut Vec<Proxy>, types: u32, ext: &ExtraSettings) -> SubResult<String> {
    let ss = types & TYPE_SS != 0;
    let ssr = types & TYPE_SSR != 0;
    let vmess = types & TYPE_VMESS != 0;
    let trojan = types & TYPE_TROJAN != 0;

    let mut all_links = String::new();
    for node in nodes.iter() {
        let remark = &node.remark;
        let hostname = &node.hostname;
        let port = node.port;
        let password = node.password.as_deref().unwrap_or("");
        let method = node.encrypt_method.as_deref().unwrap_or("");
        let plugin = node.plugin.as_deref().unwrap_or("");
        let plugin_opts = node.plugin_option.as_deref().unwrap_or("");
        let protocol = node.protocol.as_deref().unwrap_or("");
        let protocol_param = node.protocol_param.as_deref().unwrap_or("");
        let obfs = node.obfs.as_deref().unwrap_or("");
        let obfs_param = node.obfs_param.as_deref().unwrap_or("");

        let proxy_str = match node.proxy_type {
            ProxyType::Shadowsocks => {
                if ss {
                    let mut link = format!(
                        "ss://{}@{}:{}",
                        url_safe_base64_encode(&format!("{}:{}", method, password)),
                        hostname,
                        port
                    );
                    if !plugin.is_empty() && !plugin_opts.is_empty() {
                        link.push_str(&format!(
                            "/?plugin={}",
                            url_encode(&format!("{};{}", plugin, plugin_opts))
                        ));
                    }
                    link.push_str(&format!("#{}", url_encode(remark)));
                    link
                } else if ssr {
                    if !SS_ACCEPTED_CIPHERS.contains(&method) || !plugin.is_empty() {
                        continue;
                    }
                    format!(
                        "ssr://{}",
                        url_safe_base64_encode(&format!(
                            "{}:{}:origin:{}:plain:{}/?group={}&remarks={}",
                            hostname,
                            port,
                            method,
                            url_safe_base64_encode(password),
                            url_safe_base64_encode(&node.group),
                            url_safe_base64_encode(remark)
                        ))
                    )
                } else {
                    continue;
                }
            }
            ProxyType::ShadowsocksR => {
                if ssr {
                    format!(
                        "ssr://{}",
                        url_safe_base64_encode(&format!(
                            "{}:{}:{}:{}:{}:{}/?group={}&remarks={}&obfsparam={}&protoparam={}",
                            hostname,
                            port,
                            protocol,
                            method,
                            obfs,
                            url_safe_base64_encode(password),
                            url_safe_base64_encode(&node.group),
                            url_safe_base64_encode(remark),
                            url_safe_base64_encode(obfs_param),
                            url_safe_base64_encode(protocol_param)
                        ))
                    )
                } else if ss {
                    if !SS_ACCEPTED_CIPHERS.contains(&method)
                        || protocol != "origin"
                        || obfs != "plain"
                    {
                        continue;
                    }
                    format!(
                        "ss://{}@{}:{}#{}",
                        url_safe_base64_encode(&format!("{}:{}", method, password)),
                        hostname,
                        port,
                        url_encode(remark)
                    )
                } else {
                    continue;
                }
            }
            ProxyType::VMess => {
                if !vmess {
                    continue;
                }
                format!("vmess://{}", base64_encode(&vmess_link_construct(node)))
            }
            ProxyType::Trojan => {
                if !trojan {
                    continue;
                }
                format!(
                    "trojan://{}@{}:{}#{}",
                    password,
                    hostname,
                    port,
                    url_encode(remark)
                )
            }
            _ => continue,
        };

        all_links.push_str(&proxy_str);
        all_links.push('\n');
    }

    if ext.nodelist {
        Ok(all_links)
    } else {
        Ok(base64_encode(&all_links))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::explodes::{explode, explode_sub};
    use crate::utils::base64::base64_decode;

    fn ss_node(remark: &str) -> Proxy {
        Proxy::ss_construct(
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
        )
    }

    #[test]
    fn test_proxy_to_single_ss_plain() {
        let mut nodes = vec![ss_node("Node")];
        let mut ext = ExtraSettings::default();
        ext.nodelist = true;
        let output = proxy_to_single(&mut nodes, TYPE_SS, &ext).unwrap();
        assert!(output.starts_with("ss://"));
        assert!(output.trim_end().ends_with("#Node"));
    }

    #[test]
    fn test_proxy_to_single_base64_wrapped() {
        let mut nodes = vec![ss_node("Node")];
        let ext = ExtraSettings::default();
        let output = proxy_to_single(&mut nodes, TYPE_SS, &ext).unwrap();
        assert!(base64_decode(&output).starts_with("ss://"));
    }

    #[test]
    fn test_proxy_to_single_mixed_types() {
        let trojan = Proxy::trojan_construct(
            "TrojanProvider",
            "T",
            "example.com",
            443,
            "pw",
            "",
            true,
            None,
            None,
            None,
            None,
        );
        let mut nodes = vec![ss_node("S"), trojan];
        let mut ext = ExtraSettings::default();
        ext.nodelist = true;
        let output =
            proxy_to_single(&mut nodes, TYPE_SS | TYPE_SSR | TYPE_VMESS | TYPE_TROJAN, &ext)
                .unwrap();
        assert!(output.contains("ss://"));
        assert!(output.contains("trojan://pw@example.com:443#T"));
    }

    #[test]
    fn test_proxy_to_single_ssr_downgrade_rules() {
        let real_ssr = Proxy::ssr_construct(
            "SSRProvider",
            "R",
            "example.com",
            8388,
            "auth_aes128_md5",
            "rc4-md5",
            "tls1.2_ticket_auth",
            "pw",
            "",
            "",
            None,
            None,
            None,
        );
        let mut nodes = vec![real_ssr];
        let mut ext = ExtraSettings::default();
        ext.nodelist = true;
        // a true SSR node cannot appear in a pure SS list
        let output = proxy_to_single(&mut nodes, TYPE_SS, &ext).unwrap();
        assert!(output.is_empty());
        let output = proxy_to_single(&mut nodes, TYPE_SSR, &ext).unwrap();
        assert!(output.starts_with("ssr://"));
    }

    #[test]
    fn test_parser_roundtrip_through_single_list() {
        let original = "ss://YWVzLTEyOC1nY206cGFzc0AxLjIuMy40OjgzODg#Node";
        let mut node = Proxy::default();
        assert!(explode(original, &mut node));

        let ext = ExtraSettings::default();
        let emitted = proxy_to_single(&mut vec![node.clone()], TYPE_SS, &ext).unwrap();

        let mut reparsed = Vec::new();
        assert!(explode_sub(&emitted, &mut reparsed));
        assert_eq!(reparsed.len(), 1);
        assert_eq!(reparsed[0].hostname, node.hostname);
        assert_eq!(reparsed[0].port, node.port);
        assert_eq!(reparsed[0].encrypt_method, node.encrypt_method);
        assert_eq!(reparsed[0].password, node.password);
        assert_eq!(reparsed[0].remark, node.remark);
    }
}
