use crate::models::{
    Proxy, HTTP_DEFAULT_GROUP, SSR_DEFAULT_GROUP, SS_DEFAULT_GROUP, TROJAN_DEFAULT_GROUP,
    V2RAY_DEFAULT_GROUP,
};
use crate::utils::string::{replace_all_distinct, to_int, trim};
use crate::utils::tribool::parse_tribool;

fn strip_quotes(s: &str) -> &str {
    s.trim_matches('"')
}

/// Parse a Quantumult proxy line: `Name = vmess, host, port, cipher, "id", …`.
///
/// Quantumult subscriptions also arrive as `vmess://` links whose base64
/// payload decodes to exactly this shape.
pub fn explode_quan_line(line: &str, node: &mut Proxy) -> bool {
    let (name, config) = match line.split_once(" = ") {
        Some(pair) => pair,
        None => return false,
    };
    let parts: Vec<&str> = config.split(',').map(trim).collect();
    if parts.is_empty() {
        return false;
    }

    match parts[0] {
        "vmess" => {
            if parts.len() < 5 {
                return false;
            }
            let server = parts[1];
            let port = to_int(parts[2], 0u16);
            if port == 0 {
                return false;
            }
            let cipher = parts[3];
            let id = strip_quotes(parts[4]);

            let mut group = V2RAY_DEFAULT_GROUP.to_string();
            let mut tls = "";
            let mut host = String::new();
            let mut edge = String::new();
            let mut path = String::new();
            let mut net = "tcp";
            let mut scv = None;

            for part in &parts[5..] {
                let (key, value) = match part.split_once('=') {
                    Some(pair) => (trim(pair.0), trim(pair.1)),
                    None => continue,
                };
                match key {
                    "group" => group = value.to_string(),
                    "over-tls" => tls = if value == "true" { "tls" } else { "" },
                    "tls-host" => host = value.to_string(),
                    "certificate" => scv = Some(value == "0"),
                    "obfs" if value == "ws" => net = "ws",
                    "obfs-path" => path = strip_quotes(value).to_string(),
                    "obfs-header" => {
                        let headers = replace_all_distinct(strip_quotes(value), "[Rr][Nn]", "|");
                        for header in headers.split('|') {
                            if let Some(v) = header.strip_prefix("Host: ") {
                                host = v.to_string();
                            } else if let Some(v) = header.strip_prefix("Edge: ") {
                                edge = v.to_string();
                            }
                        }
                    }
                    _ => {}
                }
            }
            if path.is_empty() {
                path = "/".to_string();
            }

            *node = Proxy::vmess_construct(
                &group, name, server, port, "", id, 0, net, cipher, &path, &host, &edge, tls, "",
                None, None, scv, None,
            );
            true
        }
        "shadowsocks" | "shadowsocksr" => {
            if parts.len() < 5 {
                return false;
            }
            let server = parts[1];
            let port = to_int(parts[2], 0u16);
            if port == 0 {
                return false;
            }
            let method = parts[3];
            let password = strip_quotes(parts[4]);

            let mut group = if parts[0] == "shadowsocks" {
                SS_DEFAULT_GROUP.to_string()
            } else {
                SSR_DEFAULT_GROUP.to_string()
            };
            let mut protocol = String::new();
            let mut protocol_param = String::new();
            let mut obfs = String::new();
            let mut obfs_param = String::new();
            let mut plugin_opts = String::new();

            for part in &parts[5..] {
                let (key, value) = match part.split_once('=') {
                    Some(pair) => (trim(pair.0), trim(pair.1)),
                    None => continue,
                };
                match key {
                    "group" => group = value.to_string(),
                    "protocol" => protocol = value.to_string(),
                    "protocol_param" => protocol_param = value.to_string(),
                    "obfs" => obfs = value.to_string(),
                    "obfs_param" => obfs_param = value.to_string(),
                    "obfs-host" => {
                        if !plugin_opts.is_empty() {
                            plugin_opts.push(';');
                        }
                        plugin_opts.push_str(&format!("obfs-host={}", value));
                    }
                    _ => {}
                }
            }

            if parts[0] == "shadowsocksr" {
                *node = Proxy::ssr_construct(
                    &group,
                    name,
                    server,
                    port,
                    &protocol,
                    method,
                    &obfs,
                    password,
                    &obfs_param,
                    &protocol_param,
                    None,
                    None,
                    None,
                );
            } else {
                let (plugin, opts) = if obfs.is_empty() {
                    (String::new(), String::new())
                } else {
                    let mut opts = format!("obfs={}", obfs);
                    if !plugin_opts.is_empty() {
                        opts.push(';');
                        opts.push_str(&plugin_opts);
                    }
                    ("obfs-local".to_string(), opts)
                };
                *node = Proxy::ss_construct(
                    &group, name, server, port, password, method, &plugin, &opts, None, None, None,
                    None,
                );
            }
            true
        }
        _ => false,
    }
}

/// Parse a Quantumult X `server_local` line. The protocol name arrives as the
/// key (`vmess = host:port, …, tag=Name`).
pub fn explode_quanx_line(proto: &str, config: &str, node: &mut Proxy) -> bool {
    let parts: Vec<&str> = config.split(',').map(trim).collect();
    if parts.is_empty() {
        return false;
    }

    let (server, port_str) = match parts[0].rsplit_once(':') {
        Some(pair) => pair,
        None => return false,
    };
    let port = to_int(port_str, 0u16);
    if port == 0 {
        return false;
    }

    let mut args: Vec<(String, String)> = Vec::new();
    for part in &parts[1..] {
        if let Some((key, value)) = part.split_once('=') {
            args.push((trim(key).to_string(), trim(value).to_string()));
        }
    }
    let arg = |key: &str| -> String {
        args.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    };

    let tag = arg("tag");
    let remark = if tag.is_empty() {
        format!("{}:{}", server, port)
    } else {
        tag
    };
    let udp = parse_tribool(&arg("udp-relay"));
    let tfo = parse_tribool(&arg("fast-open"));

    match proto {
        "vmess" => {
            let method = arg("method");
            let id = arg("password");
            let obfs = arg("obfs");
            let (net, tls) = match obfs.as_str() {
                "ws" => ("ws", ""),
                "wss" => ("ws", "tls"),
                "over-tls" => ("tcp", "tls"),
                _ => ("tcp", ""),
            };
            *node = Proxy::vmess_construct(
                V2RAY_DEFAULT_GROUP,
                &remark,
                server,
                port,
                "",
                &id,
                0,
                net,
                &method,
                &arg("obfs-uri"),
                &arg("obfs-host"),
                "",
                tls,
                "",
                udp,
                tfo,
                None,
                parse_tribool(&arg("tls13")),
            );
            true
        }
        "shadowsocks" => {
            let method = arg("method");
            let password = arg("password");
            let ssr_protocol = arg("ssr-protocol");
            if !ssr_protocol.is_empty() {
                *node = Proxy::ssr_construct(
                    SSR_DEFAULT_GROUP,
                    &remark,
                    server,
                    port,
                    &ssr_protocol,
                    &method,
                    &arg("obfs"),
                    &password,
                    &arg("obfs-host"),
                    &arg("ssr-protocol-param"),
                    udp,
                    tfo,
                    None,
                );
            } else {
                let obfs = arg("obfs");
                let (plugin, plugin_opts) = if obfs.is_empty() {
                    (String::new(), String::new())
                } else {
                    let mut opts = format!("obfs={}", obfs);
                    let host = arg("obfs-host");
                    if !host.is_empty() {
                        opts.push_str(&format!(";obfs-host={}", host));
                    }
                    ("obfs-local".to_string(), opts)
                };
                *node = Proxy::ss_construct(
                    SS_DEFAULT_GROUP,
                    &remark,
                    server,
                    port,
                    &password,
                    &method,
                    &plugin,
                    &plugin_opts,
                    udp,
                    tfo,
                    None,
                    None,
                );
            }
            true
        }
        "trojan" => {
            let scv = parse_tribool(&arg("tls-verification")).map(|v| !v);
            *node = Proxy::trojan_construct(
                TROJAN_DEFAULT_GROUP,
                &remark,
                server,
                port,
                &arg("password"),
                &arg("tls-host"),
                arg("over-tls") == "true",
                udp,
                tfo,
                scv,
                None,
            );
            true
        }
        "http" => {
            let username = match arg("username").as_str() {
                "none" => String::new(),
                other => other.to_string(),
            };
            let password = match arg("password").as_str() {
                "none" => String::new(),
                other => other.to_string(),
            };
            *node = Proxy::http_construct(
                HTTP_DEFAULT_GROUP,
                &remark,
                server,
                port,
                &username,
                &password,
                arg("over-tls") == "true",
                tfo,
                None,
                None,
            );
            true
        }
        _ => false,
    }
}
