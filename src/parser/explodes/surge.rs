use crate::models::{
    Proxy, HTTP_DEFAULT_GROUP, SNELL_DEFAULT_GROUP, SOCKS_DEFAULT_GROUP, SS_DEFAULT_GROUP,
    TROJAN_DEFAULT_GROUP, V2RAY_DEFAULT_GROUP,
};
use crate::utils::tribool::parse_tribool;

fn kv_args(parts: &[&str]) -> Vec<(String, String)> {
    parts
        .iter()
        .filter_map(|part| {
            part.split_once('=')
                .map(|(k, v)| (k.trim().to_string(), v.trim().trim_matches('"').to_string()))
        })
        .collect()
}

fn arg<'a>(args: &'a [(String, String)], key: &str) -> &'a str {
    args.iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .unwrap_or("")
}

fn arg_tribool(args: &[(String, String)], key: &str) -> Option<bool> {
    let value = arg(args, key);
    match value {
        "1" => Some(true),
        "0" => Some(false),
        _ => parse_tribool(value),
    }
}

/// Parse a Surge-style INI with a `[Proxy]` section into nodes.
///
/// Quantumult X single-node lines (`vmess = host:port, …, tag=Name`) are
/// accepted in the same section since exported snippets mix both shapes.
pub fn explode_surge(content: &str, nodes: &mut Vec<Proxy>) -> bool {
    let mut in_proxy_section = false;
    let initial_len = nodes.len();

    for raw_line in content.lines() {
        let line = raw_line.trim_end_matches('\r').trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') || line.starts_with("//")
        {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            in_proxy_section = line == "[Proxy]" || line == "[server_local]";
            continue;
        }
        if !in_proxy_section {
            continue;
        }

        let (name, config) = match line.split_once('=') {
            Some((name, config)) => (name.trim(), config.trim()),
            None => continue,
        };

        let mut node = Proxy::default();
        let parsed = match config.split(',').next().map(str::trim) {
            Some("ss") | Some("shadowsocks") => parse_surge_ss(config, name, &mut node),
            Some("custom") => parse_surge_custom(config, name, &mut node),
            Some("vmess") => parse_surge_vmess(config, name, &mut node),
            Some("http") | Some("https") => parse_surge_http(config, name, &mut node),
            Some("socks5") | Some("socks5-tls") => parse_surge_socks(config, name, &mut node),
            Some("trojan") => parse_surge_trojan(config, name, &mut node),
            Some("snell") => parse_surge_snell(config, name, &mut node),
            _ => {
                // Quantumult X flavour: the key is the protocol name
                super::quan::explode_quanx_line(name, config, &mut node)
            }
        };

        if parsed {
            nodes.push(node);
        }
    }

    nodes.len() > initial_len
}

fn parse_surge_ss(config: &str, name: &str, node: &mut Proxy) -> bool {
    let parts: Vec<&str> = config.split(',').map(str::trim).collect();
    if parts.len() < 3 {
        return false;
    }

    let server = parts[1];
    let port = match parts[2].parse::<u16>() {
        Ok(p) => p,
        Err(_) => return false,
    };

    let args = kv_args(&parts[3..]);
    let method = arg(&args, "encrypt-method");
    let password = arg(&args, "password");

    let mut plugin = String::new();
    let mut plugin_opts = String::new();
    let obfs = arg(&args, "obfs");
    if !obfs.is_empty() {
        plugin = "obfs-local".to_string();
        plugin_opts = format!("obfs={}", obfs);
        let obfs_host = arg(&args, "obfs-host");
        if !obfs_host.is_empty() {
            plugin_opts.push_str(&format!(";obfs-host={}", obfs_host));
        }
    }

    *node = Proxy::ss_construct(
        SS_DEFAULT_GROUP,
        name,
        server,
        port,
        password,
        method,
        &plugin,
        &plugin_opts,
        arg_tribool(&args, "udp-relay"),
        arg_tribool(&args, "tfo"),
        arg_tribool(&args, "skip-cert-verify"),
        None,
    );
    true
}

/// Legacy Surge 2 `custom` proxies carrying the SSEncrypt module are plain SS.
fn parse_surge_custom(config: &str, name: &str, node: &mut Proxy) -> bool {
    let parts: Vec<&str> = config.split(',').map(str::trim).collect();
    if parts.len() < 6 || !parts[5].contains("SSEncrypt") {
        return false;
    }

    let server = parts[1];
    let port = match parts[2].parse::<u16>() {
        Ok(p) => p,
        Err(_) => return false,
    };
    let method = parts[3];
    let password = parts[4];

    let args = kv_args(&parts[6..]);
    let mut plugin = String::new();
    let mut plugin_opts = String::new();
    let obfs = arg(&args, "obfs");
    if !obfs.is_empty() {
        plugin = "obfs-local".to_string();
        plugin_opts = format!("obfs={}", obfs);
        let obfs_host = arg(&args, "obfs-host");
        if !obfs_host.is_empty() {
            plugin_opts.push_str(&format!(";obfs-host={}", obfs_host));
        }
    }

    *node = Proxy::ss_construct(
        SS_DEFAULT_GROUP,
        name,
        server,
        port,
        password,
        method,
        &plugin,
        &plugin_opts,
        arg_tribool(&args, "udp-relay"),
        arg_tribool(&args, "tfo"),
        arg_tribool(&args, "skip-cert-verify"),
        None,
    );
    true
}

fn parse_surge_vmess(config: &str, name: &str, node: &mut Proxy) -> bool {
    let parts: Vec<&str> = config.split(',').map(str::trim).collect();
    if parts.len() < 3 {
        return false;
    }

    let server = parts[1];
    let port = match parts[2].parse::<u16>() {
        Ok(p) => p,
        Err(_) => return false,
    };

    let args = kv_args(&parts[3..]);
    let id = arg(&args, "username");
    if id.is_empty() {
        return false;
    }

    let tls = arg(&args, "tls") == "true";
    let net = if arg(&args, "ws") == "true" { "ws" } else { "tcp" };
    let path = arg(&args, "ws-path");
    let mut host = String::new();
    let mut edge = String::new();
    for header in arg(&args, "ws-headers").split('|') {
        if let Some(value) = header.trim().strip_prefix("Host:") {
            host = value.to_string();
        } else if let Some(value) = header.trim().strip_prefix("Edge:") {
            edge = value.to_string();
        }
    }
    let sni = arg(&args, "sni");

    *node = Proxy::vmess_construct(
        V2RAY_DEFAULT_GROUP,
        name,
        server,
        port,
        "",
        id,
        0,
        net,
        "auto",
        path,
        &host,
        &edge,
        if tls { "tls" } else { "" },
        sni,
        arg_tribool(&args, "udp-relay"),
        arg_tribool(&args, "tfo"),
        arg_tribool(&args, "skip-cert-verify"),
        arg_tribool(&args, "tls13"),
    );
    true
}

fn parse_surge_http(config: &str, name: &str, node: &mut Proxy) -> bool {
    let parts: Vec<&str> = config.split(',').map(str::trim).collect();
    if parts.len() < 3 {
        return false;
    }

    let server = parts[1];
    let port = match parts[2].parse::<u16>() {
        Ok(p) => p,
        Err(_) => return false,
    };
    let is_https = parts[0] == "https";

    let args = kv_args(&parts[3..]);
    // bare username/password may also appear positionally
    let mut username = arg(&args, "username").to_string();
    let mut password = arg(&args, "password").to_string();
    if username.is_empty() && parts.len() > 3 && !parts[3].contains('=') {
        username = parts[3].to_string();
    }
    if password.is_empty() && parts.len() > 4 && !parts[4].contains('=') {
        password = parts[4].to_string();
    }

    *node = Proxy::http_construct(
        HTTP_DEFAULT_GROUP,
        name,
        server,
        port,
        &username,
        &password,
        is_https,
        arg_tribool(&args, "tfo"),
        arg_tribool(&args, "skip-cert-verify"),
        None,
    );
    true
}

fn parse_surge_socks(config: &str, name: &str, node: &mut Proxy) -> bool {
    let parts: Vec<&str> = config.split(',').map(str::trim).collect();
    if parts.len() < 3 {
        return false;
    }

    let server = parts[1];
    let port = match parts[2].parse::<u16>() {
        Ok(p) => p,
        Err(_) => return false,
    };

    let args = kv_args(&parts[3..]);
    let mut username = arg(&args, "username").to_string();
    let mut password = arg(&args, "password").to_string();
    if username.is_empty() && parts.len() > 3 && !parts[3].contains('=') {
        username = parts[3].to_string();
    }
    if password.is_empty() && parts.len() > 4 && !parts[4].contains('=') {
        password = parts[4].to_string();
    }

    *node = Proxy::socks_construct(
        SOCKS_DEFAULT_GROUP,
        name,
        server,
        port,
        &username,
        &password,
        arg_tribool(&args, "udp-relay"),
        arg_tribool(&args, "tfo"),
        arg_tribool(&args, "skip-cert-verify"),
    );
    true
}

fn parse_surge_trojan(config: &str, name: &str, node: &mut Proxy) -> bool {
    let parts: Vec<&str> = config.split(',').map(str::trim).collect();
    if parts.len() < 4 {
        return false;
    }

    let server = parts[1];
    let port = match parts[2].parse::<u16>() {
        Ok(p) => p,
        Err(_) => return false,
    };

    let args = kv_args(&parts[3..]);
    let password = arg(&args, "password");
    if password.is_empty() {
        return false;
    }

    *node = Proxy::trojan_construct(
        TROJAN_DEFAULT_GROUP,
        name,
        server,
        port,
        password,
        arg(&args, "sni"),
        true,
        arg_tribool(&args, "udp-relay"),
        arg_tribool(&args, "tfo"),
        arg_tribool(&args, "skip-cert-verify"),
        None,
    );
    true
}

fn parse_surge_snell(config: &str, name: &str, node: &mut Proxy) -> bool {
    let parts: Vec<&str> = config.split(',').map(str::trim).collect();
    if parts.len() < 3 {
        return false;
    }

    let server = parts[1];
    let port = match parts[2].parse::<u16>() {
        Ok(p) => p,
        Err(_) => return false,
    };

    let args = kv_args(&parts[3..]);
    let psk = arg(&args, "psk");
    let version = arg(&args, "version").parse::<u16>().unwrap_or(1);

    *node = Proxy::snell_construct(
        SNELL_DEFAULT_GROUP,
        name,
        server,
        port,
        psk,
        arg(&args, "obfs"),
        arg(&args, "obfs-host"),
        version,
        arg_tribool(&args, "udp-relay"),
        arg_tribool(&args, "tfo"),
        arg_tribool(&args, "skip-cert-verify"),
    );
    true
}
