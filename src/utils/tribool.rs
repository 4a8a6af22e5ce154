//! Tri-state flag helpers.
//!
//! Node-level overrides and request defaults are `Option<bool>`: `None` means
//! "inherit", so emitters must only write the key when the value is defined.

use serde_json::{Map, Value as JsonValue};

pub trait TriboolExt {
    /// Keep a defined value, otherwise fall back to the supplied default.
    fn define(self, fallback: Self) -> Self;
    /// Insert the value under `key` only when it is defined.
    fn apply_to_json(&self, object: &mut Map<String, JsonValue>, key: &str);
    /// Render as `"true"`/`"false"` for INI-style emitters, if defined.
    fn get_str(&self) -> Option<&'static str>;
}

impl TriboolExt for Option<bool> {
    fn define(self, fallback: Self) -> Self {
        self.or(fallback)
    }

    fn apply_to_json(&self, object: &mut Map<String, JsonValue>, key: &str) {
        if let Some(value) = self {
            object.insert(key.to_string(), JsonValue::Bool(*value));
        }
    }

    fn get_str(&self) -> Option<&'static str> {
        self.map(|value| if value { "true" } else { "false" })
    }
}

/// Parse a tri-state query/config value: empty or unknown input stays unset.
pub fn parse_tribool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}
