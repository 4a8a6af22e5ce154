use serde_json::Value;

use crate::models::Proxy;
use crate::utils::base64::url_safe_base64_decode;

fn field_string(value: &Value, key: &str) -> Option<String> {
    match &value[key] {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse an `ssd://` airport envelope: base64-wrapped JSON with airport-wide
/// defaults and a `servers` array whose entries override them.
pub fn explode_ssd(link: &str, nodes: &mut Vec<Proxy>) -> bool {
    if !link.starts_with("ssd://") {
        return false;
    }

    let decoded = url_safe_base64_decode(link[6..].trim());
    let json: Value = match serde_json::from_str(&decoded) {
        Ok(json) => json,
        Err(_) => return false,
    };

    let servers = match json["servers"].as_array() {
        Some(servers) => servers,
        None => return false,
    };

    let airport = field_string(&json, "airport").unwrap_or_default();
    let initial_len = nodes.len();

    for server in servers {
        let hostname = match field_string(server, "server") {
            Some(h) if !h.is_empty() => h,
            _ => continue,
        };

        // airport-level defaults, overridden per server
        let port = field_string(server, "port")
            .or_else(|| field_string(&json, "port"))
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(0);
        let method = field_string(server, "encryption")
            .or_else(|| field_string(&json, "encryption"))
            .unwrap_or_default();
        let password = field_string(server, "password")
            .or_else(|| field_string(&json, "password"))
            .unwrap_or_default();
        let plugin = field_string(server, "plugin")
            .or_else(|| field_string(&json, "plugin"))
            .unwrap_or_default();
        let plugin_opts = field_string(server, "plugin_options")
            .or_else(|| field_string(&json, "plugin_options"))
            .unwrap_or_default();
        let remarks = field_string(server, "remarks").unwrap_or_default();

        if port == 0 {
            continue;
        }
        let remark = if remarks.is_empty() {
            format!("{} ({})", hostname, port)
        } else {
            remarks
        };

        nodes.push(Proxy::ss_construct(
            &airport,
            &remark,
            &hostname,
            port,
            &password,
            &method,
            &plugin,
            &plugin_opts,
            None,
            None,
            None,
            None,
        ));
    }

    nodes.len() > initial_len
}
