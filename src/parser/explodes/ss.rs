use serde_json::Value;

use crate::models::{Proxy, SS_DEFAULT_GROUP};
use crate::utils::base64::url_safe_base64_decode;
use crate::utils::url::url_decode;

/// Parse a Shadowsocks link (SIP002 or legacy fully-base64 form) into a node.
pub fn explode_ss(ss: &str, node: &mut Proxy) -> bool {
    if !ss.starts_with("ss://") {
        return false;
    }

    let mut ss_content = ss[5..].replace("/?", "?");

    let mut ps = String::new();
    if let Some(hash_pos) = ss_content.find('#') {
        ps = url_decode(ss_content[hash_pos + 1..].trim_end());
        ss_content.truncate(hash_pos);
    }

    let mut plugin = String::new();
    let mut plugin_opts = String::new();
    let mut group = SS_DEFAULT_GROUP.to_string();

    if let Some(query_pos) = ss_content.find('?') {
        let addition = ss_content[query_pos + 1..].to_string();
        ss_content.truncate(query_pos);

        for (key, value) in url::form_urlencoded::parse(addition.as_bytes()) {
            if key == "plugin" {
                let plugins = url_decode(&value);
                if let Some(semicolon_pos) = plugins.find(';') {
                    plugin = plugins[..semicolon_pos].to_string();
                    plugin_opts = plugins[semicolon_pos + 1..].to_string();
                } else {
                    plugin = plugins;
                }
            } else if key == "group" && !value.is_empty() {
                group = url_safe_base64_decode(&value);
            }
        }
    }

    let (method, password, server, port_str) = if ss_content.contains('@') {
        // SIP002: base64(method:password)@server:port
        let (secret, server_port) = match ss_content.split_once('@') {
            Some(pair) => pair,
            None => return false,
        };
        let (server, port) = match server_port.rsplit_once(':') {
            Some(pair) => pair,
            None => return false,
        };
        let decoded_secret = url_safe_base64_decode(secret);
        let (method, password) = match decoded_secret.split_once(':') {
            Some(pair) => pair,
            None => return false,
        };
        (
            method.to_string(),
            password.to_string(),
            server.to_string(),
            port.to_string(),
        )
    } else {
        // legacy: base64(method:password@server:port)
        let decoded = url_safe_base64_decode(&ss_content);
        let (secret, server_port) = match decoded.split_once('@') {
            Some(pair) => pair,
            None => return false,
        };
        let (method, password) = match secret.split_once(':') {
            Some(pair) => pair,
            None => return false,
        };
        let (server, port) = match server_port.rsplit_once(':') {
            Some(pair) => pair,
            None => return false,
        };
        (
            method.to_string(),
            password.to_string(),
            server.to_string(),
            port.to_string(),
        )
    };

    let port = match port_str.parse::<u16>() {
        Ok(p) => p,
        Err(_) => return false,
    };

    let remark = if ps.is_empty() {
        format!("{} ({})", server, port)
    } else {
        ps
    };

    *node = Proxy::ss_construct(
        &group,
        &remark,
        &server,
        port,
        &password,
        &method,
        &plugin,
        &plugin_opts,
        None,
        None,
        None,
        None,
    );
    true
}

/// Parse a shadowsocks-windows `gui-config.json` (`configs` array).
pub fn explode_ss_conf(content: &str, nodes: &mut Vec<Proxy>) -> bool {
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
        let server = config["server"].as_str().unwrap_or("");
        if server.is_empty() {
            continue;
        }
        let port = config["server_port"].as_u64().unwrap_or(0) as u16;
        let password = config["password"].as_str().unwrap_or("");
        let method = config["method"].as_str().unwrap_or("");
        let plugin = config["plugin"].as_str().unwrap_or("");
        let plugin_opts = config["plugin_opts"].as_str().unwrap_or("");
        let remarks = config["remarks"].as_str().unwrap_or("");

        let remark = if remarks.is_empty() {
            format!("{} ({})", server, port)
        } else {
            remarks.to_string()
        };

        nodes.push(Proxy::ss_construct(
            SS_DEFAULT_GROUP,
            &remark,
            server,
            port,
            password,
            method,
            plugin,
            plugin_opts,
            None,
            None,
            None,
            None,
        ));
    }

    nodes.len() > initial_len
}

/// Parse an SS-Android profile export (a bare JSON array with `proxy_apps`).
pub fn explode_ss_android(content: &str, nodes: &mut Vec<Proxy>) -> bool {
    let json: Value = match serde_json::from_str(content) {
        Ok(json) => json,
        Err(_) => return false,
    };

    let profiles = match json.as_array() {
        Some(profiles) => profiles,
        None => return false,
    };

    let initial_len = nodes.len();
    for profile in profiles {
        let server = profile["server"].as_str().unwrap_or("");
        if server.is_empty() {
            continue;
        }
        let port = profile["server_port"].as_u64().unwrap_or(0) as u16;
        let password = profile["password"].as_str().unwrap_or("");
        let method = profile["method"].as_str().unwrap_or("");
        let plugin = profile["plugin"].as_str().unwrap_or("");
        let plugin_opts = profile["plugin_opts"].as_str().unwrap_or("");
        let remarks = profile["remarks"].as_str().unwrap_or("");

        let remark = if remarks.is_empty() {
            format!("{} ({})", server, port)
        } else {
            remarks.to_string()
        };

        nodes.push(Proxy::ss_construct(
            SS_DEFAULT_GROUP,
            &remark,
            server,
            port,
            password,
            method,
            plugin,
            plugin_opts,
            None,
            None,
            None,
            None,
        ));
    }

    nodes.len() > initial_len
}
