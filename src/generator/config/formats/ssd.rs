use serde_json::{json, Value as JsonValue};

use crate::generator::config::formats::single::SS_ACCEPTED_CIPHERS;
use crate::models::{ExtraSettings, Proxy, ProxyType, SubResult};
use crate::utils::base64::base64_encode;
use crate::utils::url::get_url_arg;

/// Convert proxies to an SSD airport envelope.
///
/// `sub_info` carries the upstream `Subscription-UserInfo` grammar and feeds
/// the airport's traffic accounting fields.
pub fn proxy_to_ssd(
    nodes: &mut Vec<Proxy>,
    group: &str,
    sub_info: &str,
    _ext: &ExtraSettings,
) -> SubResult<String> {
    let airport = if group.is_empty() { "SSD" } else { group };

    let mut envelope = json!({
        "airport": airport,
        "port": 1,
        "encryption": "aes-128-gcm",
        "password": "password"
    });

    if !sub_info.is_empty() {
        let data = sub_info.replace("; ", "&");
        let upload: f64 = get_url_arg(&data, "upload").parse().unwrap_or(0.0);
        let download: f64 = get_url_arg(&data, "download").parse().unwrap_or(0.0);
        let total: f64 = get_url_arg(&data, "total").parse().unwrap_or(0.0);
        let gib = (1u64 << 30) as f64;
        envelope["traffic_used"] = json!((upload + download) / gib);
        envelope["traffic_total"] = json!(total / gib);
        let expire = get_url_arg(&data, "expire");
        if !expire.is_empty() {
            envelope["expiry"] = json!(format_expiry(&expire));
        }
    }

    let mut servers = Vec::new();
    let mut index = 0u32;
    for node in nodes.iter() {
        match node.proxy_type {
            ProxyType::Shadowsocks => {
                let plugin = match node.plugin.as_deref() {
                    Some("obfs-local") => "simple-obfs",
                    Some(other) => other,
                    None => "",
                };
                servers.push(json!({
                    "server": node.hostname,
                    "port": node.port,
                    "encryption": node.encrypt_method.as_deref().unwrap_or(""),
                    "password": node.password.as_deref().unwrap_or(""),
                    "plugin": plugin,
                    "plugin_options": node.plugin_option.as_deref().unwrap_or(""),
                    "remarks": node.remark,
                    "id": index
                }));
            }
            ProxyType::ShadowsocksR => {
                let method = node.encrypt_method.as_deref().unwrap_or("");
                let protocol = node.protocol.as_deref().unwrap_or("");
                let obfs = node.obfs.as_deref().unwrap_or("");
                if !SS_ACCEPTED_CIPHERS.contains(&method) || protocol != "origin" || obfs != "plain"
                {
                    continue;
                }
                servers.push(json!({
                    "server": node.hostname,
                    "port": node.port,
                    "encryption": method,
                    "password": node.password.as_deref().unwrap_or(""),
                    "remarks": node.remark,
                    "id": index
                }));
            }
            _ => continue,
        }
        index += 1;
    }
    envelope["servers"] = JsonValue::Array(servers);

    Ok(format!("ssd://{}", base64_encode(&envelope.to_string())))
}

/// Render a unix timestamp as the `YYYY-MM-DD hh:mm` form SSD clients show.
fn format_expiry(expire: &str) -> String {
    let ts: i64 = expire.parse().unwrap_or(0);
    let days = ts.div_euclid(86400);
    let secs_of_day = ts.rem_euclid(86400);

    // civil-from-days
    let z = days + 719468;
    let era = z.div_euclid(146097);
    let doe = z - era * 146097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let year = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if month <= 2 { year + 1 } else { year };

    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}",
        year,
        month,
        day,
        secs_of_day / 3600,
        (secs_of_day % 3600) / 60
    )
}
