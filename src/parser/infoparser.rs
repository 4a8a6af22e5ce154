//! Subscription traffic/expiry extraction from node remarks and SSD envelopes.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

use crate::models::{Proxy, RegexMatchConfigs};
use crate::utils::base64::url_safe_base64_decode;
use crate::utils::matcher::{reg_match, reg_replace};
use crate::utils::url::get_url_arg;

/// Convert `12.5GB`-style stream sizes to bytes.
pub fn stream_to_bytes(stream: &str) -> u64 {
    let stream = stream.trim();
    if stream.is_empty() {
        return 0;
    }
    let units = [
        ("PB", 1u64 << 50),
        ("TB", 1u64 << 40),
        ("GB", 1u64 << 30),
        ("MB", 1u64 << 20),
        ("KB", 1u64 << 10),
        ("B", 1),
    ];
    for (suffix, factor) in units {
        if let Some(number) = stream.strip_suffix(suffix) {
            let value: f64 = number.trim().parse().unwrap_or(0.0);
            return (value * factor as f64) as u64;
        }
    }
    0
}

fn percent_to_fraction(percent: &str) -> f64 {
    percent
        .strip_suffix('%')
        .and_then(|p| p.parse::<f64>().ok())
        .map(|p| p / 100.0)
        .unwrap_or(0.0)
}

/// Convert an expiry description to a unix timestamp.
///
/// Accepts `left=<N>d` relative days and `YYYY:MM:DD:hh:mm:ss` absolute
/// stamps (the colon form produced by the time-rule replacements).
pub fn date_string_to_timestamp(date: &str) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    if let Some(rest) = date.strip_prefix("left=") {
        if let Some(days) = rest.strip_suffix('d') {
            let days: f64 = days.parse().unwrap_or(0.0);
            return now + (days * 86400.0) as u64;
        }
        return now;
    }

    let fields: Vec<&str> = date.split(':').collect();
    if fields.len() != 6 {
        return 0;
    }
    let year: i64 = fields[0].parse().unwrap_or(1970);
    let month: i64 = fields[1].parse().unwrap_or(1);
    let day: i64 = fields[2].parse().unwrap_or(1);
    let hour: i64 = fields[3].parse().unwrap_or(0);
    let minute: i64 = fields[4].parse().unwrap_or(0);
    let second: i64 = fields[5].parse().unwrap_or(0);

    // days since epoch, civil-calendar arithmetic
    let years = year - if month <= 2 { 1 } else { 0 };
    let era = years.div_euclid(400);
    let year_of_era = years - era * 400;
    let month_adj = if month > 2 { month - 3 } else { month + 9 };
    let day_of_year = (153 * month_adj + 2) / 5 + day - 1;
    let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
    let days = era * 146097 + day_of_era - 719468;

    (days * 86400 + hour * 3600 + minute * 60 + second).max(0) as u64
}

fn apply_rules(remark: &str, rules: &RegexMatchConfigs) -> Option<String> {
    for rule in rules {
        if rule._match.is_empty() || rule.replace.is_empty() {
            continue;
        }
        if reg_match(remark, &rule._match) {
            let replaced = reg_replace(remark, &format!("(?i)^(?:{})$", rule._match), &rule.replace, false);
            if replaced != remark {
                return Some(replaced);
            }
        }
    }
    None
}

/// Assemble a `Subscription-UserInfo` value by matching node remarks against
/// the configured stream and time rules.
pub fn get_sub_info_from_nodes(
    nodes: &[Proxy],
    stream_rules: &RegexMatchConfigs,
    time_rules: &RegexMatchConfigs,
) -> Option<String> {
    let mut stream_info = String::new();
    let mut time_info = String::new();

    for node in nodes {
        if stream_info.is_empty() {
            if let Some(info) = apply_rules(&node.remark, stream_rules) {
                stream_info = info;
            }
        }
        if time_info.is_empty() {
            if let Some(info) = apply_rules(&node.remark, time_rules) {
                time_info = info;
            }
        }
        if !stream_info.is_empty() && !time_info.is_empty() {
            break;
        }
    }

    if stream_info.is_empty() && time_info.is_empty() {
        return None;
    }

    let total_str = get_url_arg(&stream_info, "total");
    let left_str = get_url_arg(&stream_info, "left");
    let used_str = get_url_arg(&stream_info, "used");

    let (total, used) = if total_str.contains('%') {
        if !used_str.is_empty() {
            let used = stream_to_bytes(&used_str);
            let fraction = 1.0 - percent_to_fraction(&total_str);
            let total = if fraction > 0.0 {
                (used as f64 / fraction) as u64
            } else {
                0
            };
            (total, used)
        } else if !left_str.is_empty() {
            let left = stream_to_bytes(&left_str);
            let fraction = percent_to_fraction(&total_str);
            let total = if fraction > 0.0 {
                (left as f64 / fraction) as u64
            } else {
                0
            };
            (total, total.saturating_sub(left))
        } else {
            (0, 0)
        }
    } else {
        let total = stream_to_bytes(&total_str);
        let used = if !used_str.is_empty() {
            stream_to_bytes(&used_str)
        } else if !left_str.is_empty() {
            total.saturating_sub(stream_to_bytes(&left_str))
        } else {
            0
        };
        (total, used)
    };

    let mut result = format!("upload=0; download={}; total={};", used, total);
    let expire = date_string_to_timestamp(&time_info);
    if expire > 0 {
        result.push_str(&format!(" expire={};", expire));
    }
    Some(result)
}

/// Extract traffic accounting from an SSD envelope's airport fields.
pub fn get_sub_info_from_ssd(sub: &str) -> Option<String> {
    let decoded = url_safe_base64_decode(sub.strip_prefix("ssd://")?.trim());
    let json: Value = serde_json::from_str(&decoded).ok()?;

    let used = json["traffic_used"].as_f64()?;
    let total = json["traffic_total"].as_f64()?;
    let used_bytes = (used * (1u64 << 30) as f64) as u64;
    let total_bytes = (total * (1u64 << 30) as f64) as u64;

    let mut result = format!("upload=0; download={}; total={};", used_bytes, total_bytes);
    if let Some(expiry) = json["expiry"].as_str() {
        let normalised = reg_replace(
            expiry,
            r"(\d+)-(\d+)-(\d+) (\d+):(\d+)",
            "$1:$2:$3:$4:$5:00",
            false,
        );
        let expire = date_string_to_timestamp(&normalised);
        if expire > 0 {
            result.push_str(&format!(" expire={};", expire));
        }
    }
    Some(result)
}
