use serde_json::Value;

use super::common::SS_CIPHERS;
use crate::models::{Proxy, SSR_DEFAULT_GROUP, SS_DEFAULT_GROUP};
use crate::utils::base64::url_safe_base64_decode;
use crate::utils::url::get_url_arg;

/// Parse a ShadowsocksR link into a node.
///
/// A node whose method/protocol/obfs combination is expressible as plain SS
/// is downgraded to an SS node so targets without SSR support can render it.
pub fn explode_ssr(ssr: &str, node: &mut Proxy) -> bool {
    if !ssr.starts_with("ssr://") {
        return false;
    }

    let mut decoded = url_safe_base64_decode(&ssr[6..].replace('\r', ""));
    if decoded.is_empty() {
        return false;
    }

    let mut group = String::new();
    let mut remarks = String::new();
    let mut obfs_param = String::new();
    let mut protocol_param = String::new();

    if let Some(pos) = decoded.find("/?") {
        let query = decoded[pos + 2..].to_string();
        decoded.truncate(pos);
        group = url_safe_base64_decode(&get_url_arg(&query, "group"));
        remarks = url_safe_base64_decode(&get_url_arg(&query, "remarks"));
        obfs_param = url_safe_base64_decode(&get_url_arg(&query, "obfsparam"))
            .split_whitespace()
            .collect();
        protocol_param = url_safe_base64_decode(&get_url_arg(&query, "protoparam"))
            .split_whitespace()
            .collect();
    }

    // host:port:protocol:method:obfs:base64(password) — the host itself may
    // contain colons (IPv6), so split the trailing five fields from the right
    let fields: Vec<&str> = decoded.rsplitn(6, ':').collect();
    if fields.len() != 6 {
        return false;
    }
    let server = fields[5];
    let port_str = fields[4];
    let protocol = fields[3];
    let method = fields[2];
    let obfs = fields[1];
    let password = url_safe_base64_decode(fields[0]);

    let port = match port_str.parse::<u16>() {
        Ok(p) => p,
        Err(_) => return false,
    };

    if group.is_empty() {
        group = SSR_DEFAULT_GROUP.to_string();
    }
    if remarks.is_empty() {
        remarks = format!("{} ({})", server, port);
    }

    if SS_CIPHERS.contains(&method)
        && (obfs.is_empty() || obfs == "plain")
        && (protocol.is_empty() || protocol == "origin")
    {
        *node = Proxy::ss_construct(
            &group, &remarks, server, port, &password, method, "", "", None, None, None, None,
        );
        if node.group == SSR_DEFAULT_GROUP {
            node.group = SS_DEFAULT_GROUP.to_string();
        }
    } else {
        *node = Proxy::ssr_construct(
            &group,
            &remarks,
            server,
            port,
            protocol,
            method,
            obfs,
            &password,
            &obfs_param,
            &protocol_param,
            None,
            None,
            None,
        );
    }

    true
}

/// Parse an SSR-windows `gui-config.json` (`configs` array) or a
/// shadowsocksr local config (`local_address`/`local_port`).
pub fn explode_ssr_conf(content: &str, nodes: &mut Vec<Proxy>) -> bool {
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
        let protocol = config["protocol"].as_str().unwrap_or("");
        let method = config["method"].as_str().unwrap_or("");
        let obfs = config["obfs"].as_str().unwrap_or("");
        let password = config["password"].as_str().unwrap_or("");
        let obfs_param = config["obfsparam"].as_str().unwrap_or("");
        let proto_param = config["protocolparam"].as_str().unwrap_or("");
        let remarks = config["remarks"].as_str().unwrap_or("");
        let group = config["group"].as_str().unwrap_or("");

        let group = if group.is_empty() {
            SSR_DEFAULT_GROUP.to_string()
        } else {
            group.to_string()
        };
        let remark = if remarks.is_empty() {
            format!("{} ({})", server, port)
        } else {
            remarks.to_string()
        };

        nodes.push(Proxy::ssr_construct(
            &group,
            &remark,
            server,
            port,
            protocol,
            method,
            obfs,
            password,
            obfs_param,
            proto_param,
            None,
            None,
            None,
        ));
    }

    nodes.len() > initial_len
}
