//! Jinja-flavoured template rendering for `/render` and profile composition.
//!
//! Variables live in three scopes (`global.*` from server config,
//! `request.*` from query params, `local.*` from the profile); dotted keys
//! split into nested maps. File includes are sandboxed to the template
//! directory.

use std::collections::HashMap;
use std::path::Path;

use log::error;
use minijinja::{Environment, Error as JinjaError, ErrorKind, Value};
use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::models::{SubError, SubResult};
use crate::settings::Settings;
use crate::utils::file::{file_get, path_escapes_scope};
use crate::utils::http::{parse_proxy, web_get};

/// Template arguments container.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TemplateArgs {
    /// Global variables from the server preferences.
    pub global_vars: HashMap<String, String>,
    /// Request query parameters.
    pub request_params: HashMap<String, String>,
    /// Profile-local variables.
    pub local_vars: HashMap<String, String>,
}

/// Expand dotted keys into nested JSON objects (`a.b=c` → `{a: {b: "c"}}`).
fn nest_variables(vars: &HashMap<String, String>) -> JsonValue {
    let mut root = JsonMap::new();
    for (key, value) in vars {
        let mut cursor = &mut root;
        let parts: Vec<&str> = key.split('.').collect();
        for (i, part) in parts.iter().enumerate() {
            if i + 1 == parts.len() {
                cursor.insert(part.to_string(), JsonValue::String(value.clone()));
            } else {
                let entry = cursor
                    .entry(part.to_string())
                    .or_insert_with(|| JsonValue::Object(JsonMap::new()));
                if !entry.is_object() {
                    *entry = JsonValue::Object(JsonMap::new());
                }
                cursor = entry.as_object_mut().unwrap();
            }
        }
    }
    JsonValue::Object(root)
}

fn build_environment(scope: String) -> Environment<'static> {
    let mut env = Environment::new();

    env.set_loader(move |name: &str| {
        if path_escapes_scope(name) {
            return Err(JinjaError::new(
                ErrorKind::InvalidOperation,
                "template include escapes the template directory",
            ));
        }
        match file_get(name, Some(&scope)) {
            Ok(content) => Ok(Some(content)),
            Err(_) => Ok(None),
        }
    });

    env.add_filter("trim", filter_trim);
    env.add_filter("trim_of", filter_trim_of);
    env.add_filter("url_encode", filter_url_encode);
    env.add_filter("url_decode", filter_url_decode);
    env.add_filter("replace", filter_replace);
    env.add_filter("find", filter_find);

    env.add_function("getLink", fn_get_link);
    env.add_function("startsWith", fn_starts_with);
    env.add_function("endsWith", fn_ends_with);
    env.add_function("bool", fn_to_bool);
    env.add_function("string", fn_to_string);
    env.add_function("fetch", fn_web_get);

    env
}

/// Render the template at `path` (relative to `include_scope`).
pub fn render_template(path: &str, args: &TemplateArgs, include_scope: &str) -> SubResult<String> {
    let scope = if include_scope.is_empty() {
        ".".to_string()
    } else {
        include_scope.to_string()
    };

    let content = if Path::new(path).is_file() {
        file_get(path, None)?
    } else {
        file_get(path, Some(&scope))?
    };

    render_template_content(&content, args, &scope)
}

/// Render template text directly.
pub fn render_template_content(
    content: &str,
    args: &TemplateArgs,
    include_scope: &str,
) -> SubResult<String> {
    let env = build_environment(include_scope.to_string());

    let mut request_vars = args.request_params.clone();
    let mut all_args = String::new();
    for (key, value) in &args.request_params {
        all_args.push_str(key);
        if !value.is_empty() {
            all_args.push('=');
            all_args.push_str(value);
        }
        all_args.push('&');
    }
    if !all_args.is_empty() {
        all_args.pop();
        request_vars.insert("_args".to_string(), all_args);
    }

    let context = serde_json::json!({
        "global": nest_variables(&args.global_vars),
        "request": nest_variables(&request_vars),
        "local": nest_variables(&args.local_vars),
    });

    let template = env.template_from_str(content).map_err(|e| {
        error!("Failed to parse template: {}", e);
        SubError::Config(format!("template parse failed: {}", e))
    })?;
    template.render(&context).map_err(|e| {
        error!("Template render failed! Reason: {}", e);
        SubError::Config(format!("template render failed: {}", e))
    })
}

// Filter implementations

fn filter_trim(value: Value) -> Result<String, JinjaError> {
    Ok(value.to_string().trim().to_string())
}

fn filter_trim_of(value: Value, chars: Value) -> Result<String, JinjaError> {
    let s = value.to_string();
    let chars_str = chars.to_string();
    match chars_str.chars().next() {
        Some(first) => Ok(s.trim_matches(first).to_string()),
        None => Ok(s),
    }
}

fn filter_url_encode(value: Value) -> Result<String, JinjaError> {
    Ok(urlencoding::encode(&value.to_string()).to_string())
}

fn filter_url_decode(value: Value) -> Result<String, JinjaError> {
    match urlencoding::decode(&value.to_string()) {
        Ok(decoded) => Ok(decoded.to_string()),
        Err(e) => Err(JinjaError::new(
            ErrorKind::InvalidOperation,
            format!("URL decode error: {}", e),
        )),
    }
}

fn filter_replace(value: Value, pattern: Value, replacement: Value) -> Result<String, JinjaError> {
    let s = value.to_string();
    let pattern_str = pattern.to_string();
    if pattern_str.is_empty() || s.is_empty() {
        return Ok(s);
    }
    match regex::Regex::new(&pattern_str) {
        Ok(re) => Ok(re
            .replace_all(&s, replacement.to_string().as_str())
            .to_string()),
        Err(e) => Err(JinjaError::new(
            ErrorKind::InvalidOperation,
            format!("Invalid regex pattern: {}", e),
        )),
    }
}

fn filter_find(value: Value, pattern: Value) -> Result<bool, JinjaError> {
    let s = value.to_string();
    let pattern_str = pattern.to_string();
    if pattern_str.is_empty() || s.is_empty() {
        return Ok(false);
    }
    match regex::Regex::new(&pattern_str) {
        Ok(re) => Ok(re.is_match(&s)),
        Err(e) => Err(JinjaError::new(
            ErrorKind::InvalidOperation,
            format!("Invalid regex pattern: {}", e),
        )),
    }
}

// Function implementations

fn fn_get_link(path: Value) -> Result<String, JinjaError> {
    let settings = Settings::current();
    Ok(format!("{}{}", settings.managed_config_prefix, path))
}

fn fn_starts_with(s: Value, prefix: Value) -> Result<bool, JinjaError> {
    Ok(s.to_string().starts_with(&prefix.to_string()))
}

fn fn_ends_with(s: Value, suffix: Value) -> Result<bool, JinjaError> {
    Ok(s.to_string().ends_with(&suffix.to_string()))
}

fn fn_to_bool(s: Value) -> Result<bool, JinjaError> {
    let s_str = s.to_string().to_lowercase();
    Ok(s_str == "true" || s_str == "1")
}

fn fn_to_string(n: Value) -> Result<String, JinjaError> {
    Ok(n.to_string())
}

fn fn_web_get(url: Value) -> Result<String, JinjaError> {
    let url_str = url.to_string();
    if url_str.is_empty() {
        return Ok(String::new());
    }
    let settings = Settings::current();
    let proxy = parse_proxy(&settings.proxy_config);
    match web_get(&url_str, &proxy, settings.cache_config, None) {
        Ok((content, _)) => Ok(content),
        Err(e) => Err(JinjaError::new(
            ErrorKind::InvalidOperation,
            format!("Failed to fetch URL: {}", e),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args_with_request(pairs: &[(&str, &str)]) -> TemplateArgs {
        TemplateArgs {
            request_params: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_simple_expression() {
        let args = args_with_request(&[("target", "clash")]);
        let output = render_template_content("target={{ request.target }}", &args, ".").unwrap();
        assert_eq!(output, "target=clash");
    }

    #[test]
    fn test_render_dotted_keys_nest() {
        let args = args_with_request(&[("clash.dns", "1")]);
        let output =
            render_template_content("{% if request.clash.dns %}dns on{% endif %}", &args, ".")
                .unwrap();
        assert_eq!(output, "dns on");
    }

    #[test]
    fn test_render_condition_and_filters() {
        let mut args = TemplateArgs::default();
        args.global_vars
            .insert("name".to_string(), "  padded  ".to_string());
        let output = render_template_content("[{{ global.name | trim }}]", &args, ".").unwrap();
        assert_eq!(output, "[padded]");
    }

    #[test]
    fn test_render_include_sandboxed() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("part.tpl")).unwrap();
        f.write_all(b"included").unwrap();

        let args = TemplateArgs::default();
        let scope = dir.path().to_str().unwrap();
        let output =
            render_template_content("{% include \"part.tpl\" %}", &args, scope).unwrap();
        assert_eq!(output, "included");

        // escaping includes must fail
        assert!(
            render_template_content("{% include \"../part.tpl\" %}", &args, scope).is_err()
        );
    }

    #[test]
    fn test_render_args_variable() {
        let args = args_with_request(&[("a", "1")]);
        let output = render_template_content("{{ request._args }}", &args, ".").unwrap();
        assert_eq!(output, "a=1");
    }
}
