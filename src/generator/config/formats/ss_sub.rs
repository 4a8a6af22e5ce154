use log::error;
use serde_json::{json, Value as JsonValue};

use crate::generator::config::formats::single::SS_ACCEPTED_CIPHERS;
use crate::generator::config::remark::process_remark;
use crate::models::{ExtraSettings, Proxy, ProxyType, SubResult};

/// Convert proxies to a SIP008 JSON subscription.
///
/// Fields from the base template object are carried into every entry.
pub fn proxy_to_ss_sub(
    base_conf: &str,
    nodes: &mut Vec<Proxy>,
    _ext: &ExtraSettings,
) -> SubResult<String> {
    let base: JsonValue = if base_conf.trim().is_empty() {
        json!({})
    } else {
        match serde_json::from_str(base_conf) {
            Ok(value) => value,
            Err(e) => {
                error!("SIP008 base loader failed with error: {}", e);
                json!({})
            }
        }
    };

    let mut output = Vec::new();
    let mut remarks_list: Vec<String> = Vec::new();

    for node in nodes.iter_mut() {
        let (plugin, plugin_opts) = match node.proxy_type {
            ProxyType::Shadowsocks => {
                let plugin = match node.plugin.as_deref() {
                    Some("simple-obfs") => "obfs-local".to_string(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                (plugin, node.plugin_option.clone().unwrap_or_default())
            }
            ProxyType::ShadowsocksR => {
                let method = node.encrypt_method.as_deref().unwrap_or("");
                let protocol = node.protocol.as_deref().unwrap_or("");
                let obfs = node.obfs.as_deref().unwrap_or("");
                if !SS_ACCEPTED_CIPHERS.contains(&method) || protocol != "origin" || obfs != "plain"
                {
                    continue;
                }
                (String::new(), String::new())
            }
            _ => continue,
        };

        let mut remark = node.remark.clone();
        process_remark(&mut remark, &remarks_list, false);
        remarks_list.push(remark.clone());

        let mut entry = base.clone();
        if !entry.is_object() {
            entry = json!({});
        }
        entry["remarks"] = json!(remark);
        entry["server"] = json!(node.hostname);
        entry["server_port"] = json!(node.port);
        entry["method"] = json!(node.encrypt_method.as_deref().unwrap_or(""));
        entry["password"] = json!(node.password.as_deref().unwrap_or(""));
        entry["plugin"] = json!(plugin);
        entry["plugin_opts"] = json!(plugin_opts);
        output.push(entry);
    }

    serde_json::to_string(&output).map_err(|e| crate::models::SubError::Emit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ss_node(remark: &str) -> Proxy {
        Proxy::ss_construct(
            "SSProvider",
            remark,
            "1.2.3.4",
            8388,
            "pass",
            "aes-128-gcm",
            "simple-obfs",
            "obfs=http;obfs-host=bing.com",
            None,
            None,
            None,
            None,
        )
    }

    #[test]
    fn test_proxy_to_ss_sub() {
        let mut nodes = vec![ss_node("Node")];
        let ext = ExtraSettings::default();
        let output = proxy_to_ss_sub("", &mut nodes, &ext).unwrap();
        let parsed: JsonValue = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 1);
        assert_eq!(parsed[0]["remarks"], "Node");
        assert_eq!(parsed[0]["server"], "1.2.3.4");
        assert_eq!(parsed[0]["server_port"], 8388);
        assert_eq!(parsed[0]["method"], "aes-128-gcm");
        assert_eq!(parsed[0]["plugin"], "obfs-local");
    }

    #[test]
    fn test_proxy_to_ss_sub_dedups_remarks() {
        let mut nodes = vec![ss_node("Same"), ss_node("Same")];
        let ext = ExtraSettings::default();
        let output = proxy_to_ss_sub("", &mut nodes, &ext).unwrap();
        let parsed: JsonValue = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed[0]["remarks"], "Same");
        assert_eq!(parsed[1]["remarks"], "Same 2");
    }

    #[test]
    fn test_proxy_to_ss_sub_base_fields_carried() {
        let mut nodes = vec![ss_node("Node")];
        let ext = ExtraSettings::default();
        let output = proxy_to_ss_sub(r#"{"mode":"tcp_and_udp"}"#, &mut nodes, &ext).unwrap();
        let parsed: JsonValue = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed[0]["mode"], "tcp_and_udp");
    }

    #[test]
    fn test_proxy_to_ss_sub_skips_vmess() {
        let mut vmess = Proxy::vmess_construct(
            "V2RayProvider",
            "V",
            "example.com",
            443,
            "",
            "uuid",
            0,
            "tcp",
            "auto",
            "",
            "",
            "",
            "",
            "",
            None,
            None,
            None,
            None,
        );
        vmess.group_id = 1;
        let ext = ExtraSettings::default();
        let output = proxy_to_ss_sub("", &mut vec![vmess], &ext).unwrap();
        assert_eq!(output, "[]");
    }
}
