//! HTTP endpoints and request-to-config translation.

use std::collections::HashMap;

use actix_web::{web, HttpRequest, HttpResponse, HttpResponseBuilder};
use log::{debug, error, info, warn};

use crate::interfaces::subconverter::{
    subconverter, SubconverterConfig, SubconverterTarget,
};
use crate::models::{
    proxy_groups_from_ini, regex_match_configs_from_list, rulesets_from_ini, SubError,
};
use crate::parser::ParseSettings;
use crate::rulesets::refresh_rulesets;
use crate::settings::{refresh_configuration, ExternalSettings, Settings};
use crate::template::{render_template, render_template_content, TemplateArgs};
use crate::utils::base64::url_safe_base64_decode;
use crate::utils::http::{fetch_file, parse_proxy, USER_AGENT};
use crate::utils::ini_reader::IniReader;
use crate::utils::matcher::{reg_replace, reg_valid};
use crate::utils::string::get_line_break;
use crate::utils::tribool::parse_tribool;
use crate::utils::url::{is_link, url_decode, url_encode};

/// Patterns that blow up the regex engine; rejected outright.
const REGEX_BLACKLIST: &[&str] = &["(.*)*", "((.*)*)*"];

fn common_response() -> HttpResponseBuilder {
    let mut builder = HttpResponse::Ok();
    builder
        .append_header(("Access-Control-Allow-Origin", "*"))
        .append_header(("Cache-Control", "no-cache, no-store, must-revalidate"))
        .append_header(("Connection", "close"));
    builder
}

fn error_response(e: &SubError) -> HttpResponse {
    let mut builder = match e.status_code() {
        400 => HttpResponse::BadRequest(),
        403 => HttpResponse::Forbidden(),
        404 => HttpResponse::NotFound(),
        _ => HttpResponse::InternalServerError(),
    };
    builder
        .append_header(("Access-Control-Allow-Origin", "*"))
        .append_header(("Cache-Control", "no-cache, no-store, must-revalidate"))
        .append_header(("Connection", "close"));
    builder.body(e.to_string())
}

/// Reject requests carrying our own User-Agent to break subscription loops.
fn loop_guard(req: &HttpRequest) -> Option<HttpResponse> {
    let ua = req
        .headers()
        .get("User-Agent")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if ua.starts_with("subforge/") || ua == USER_AGENT {
        warn!("Loop request detected!");
        return Some(HttpResponse::InternalServerError().body("Loop request detected!"));
    }
    None
}

fn arg<'a>(args: &'a HashMap<String, String>, key: &str) -> &'a str {
    args.get(key).map(String::as_str).unwrap_or("")
}

fn arg_tribool(args: &HashMap<String, String>, key: &str) -> Option<bool> {
    parse_tribool(arg(args, key))
}

/// Fetch a per-target base template and run it through the template engine.
fn load_base_content(
    path: &str,
    settings: &Settings,
    template_args: &TemplateArgs,
) -> String {
    if path.is_empty() {
        return String::new();
    }
    let proxy = parse_proxy(&settings.proxy_config);
    let content = match fetch_file(path, &proxy, settings.cache_config, true) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to load base config '{}': {}", path, e);
            return String::new();
        }
    };
    match render_template_content(&content, template_args, &settings.base_path) {
        Ok(rendered) => rendered,
        Err(e) => {
            warn!("Base template render failed, using raw content: {}", e);
            content
        }
    }
}

/// Build a conversion config from query arguments. Shared by `/sub`, the
/// shortcut endpoints, `/getprofile` and the batch generator.
pub fn build_config_from_args(
    args: &HashMap<String, String>,
    query_string: &str,
) -> Result<SubconverterConfig, SubError> {
    let settings = Settings::current();

    let target = SubconverterTarget::from_str(arg(args, "target"))
        .ok_or(SubError::UnknownTarget)?;
    let target = match target {
        SubconverterTarget::Surge(_) => {
            let ver = arg(args, "ver").parse::<i32>().unwrap_or(3);
            SubconverterTarget::Surge(ver)
        }
        other => other,
    };

    let include = url_decode(arg(args, "include"));
    let exclude = url_decode(arg(args, "exclude"));
    if REGEX_BLACKLIST.contains(&include.as_str()) || REGEX_BLACKLIST.contains(&exclude.as_str())
    {
        return Err(SubError::BadRequest("Invalid request!".to_string()));
    }

    let token = arg(args, "token");
    let authorized = !settings.api_mode || token == settings.api_access_token;

    let mut urls: Vec<String> = {
        let raw = arg(args, "url");
        if raw.is_empty() {
            Vec::new()
        } else {
            url_decode(raw)
                .split('|')
                .map(|s| s.to_string())
                .collect()
        }
    };
    if urls.is_empty() && (!settings.api_mode || authorized) {
        urls = settings.default_urls.clone();
    }

    let enable_insert = arg_tribool(args, "insert").unwrap_or(settings.enable_insert);
    let insert_urls = if enable_insert {
        settings.insert_urls.clone()
    } else {
        Vec::new()
    };

    if urls.is_empty() && insert_urls.is_empty() {
        return Err(SubError::BadRequest("Invalid request!".to_string()));
    }

    let mut extra = crate::models::ExtraSettings {
        authorized,
        append_proxy_type: arg_tribool(args, "append_type").unwrap_or(settings.append_type),
        tfo: arg_tribool(args, "tfo").or(settings.tfo_flag),
        udp: arg_tribool(args, "udp").or(settings.udp_flag),
        skip_cert_verify: arg_tribool(args, "scv").or(settings.skip_cert_verify),
        tls13: arg_tribool(args, "tls13").or(settings.tls13_flag),
        sort_flag: arg_tribool(args, "sort").unwrap_or(settings.enable_sort),
        filter_deprecated: arg_tribool(args, "fdn").unwrap_or(settings.filter_deprecated),
        clash_new_field_name: arg_tribool(args, "new_name")
            .unwrap_or(settings.clash_use_new_field),
        nodelist: arg_tribool(args, "list").unwrap_or(false),
        surge_ssr_path: settings.surge_ssr_path.clone(),
        surge_resolve_hostname: settings.surge_resolve_hostname,
        quanx_dev_id: {
            let dev_id = arg(args, "dev_id");
            if dev_id.is_empty() {
                settings.quanx_dev_id.clone()
            } else {
                dev_id.to_string()
            }
        },
        enable_rule_generator: settings.enable_rule_gen,
        overwrite_original_rules: settings.overwrite_original_rules,
        add_emoji: settings.add_emoji,
        remove_emoji: settings.remove_emoji,
        rename_array: settings.renames.clone(),
        emoji_array: settings.emojis.clone(),
        max_allowed_rules: settings.max_allowed_rules,
        ..Default::default()
    };

    // ruleset indirection prefix is suppressed when rules are expanded
    let expand = arg_tribool(args, "expand").unwrap_or(false);
    if !expand {
        extra.managed_config_prefix = settings.managed_config_prefix.clone();
    }

    let mut include_remarks = settings.include_remarks.clone();
    let mut exclude_remarks = settings.exclude_remarks.clone();
    let mut ruleset_configs = settings.custom_rulesets.clone();
    let mut group_configs = settings.custom_proxy_groups.clone();
    let mut startup_rulesets_valid = true;

    let mut template_args = TemplateArgs {
        global_vars: settings.template_vars.clone(),
        request_params: args.clone(),
        local_vars: HashMap::new(),
    };

    // base template paths, possibly overridden by the external config
    let mut clash_base = settings.clash_base.clone();
    let mut surge_base = settings.surge_base.clone();
    let mut surfboard_base = settings.surfboard_base.clone();
    let mut mellow_base = settings.mellow_base.clone();
    let mut quan_base = settings.quan_base.clone();
    let mut quanx_base = settings.quanx_base.clone();
    let mut loon_base = settings.loon_base.clone();
    let mut ssub_base = settings.ssub_base.clone();

    let ext_config = {
        let from_query = url_decode(arg(args, "config"));
        if from_query.is_empty() {
            settings.default_ext_config.clone()
        } else {
            from_query
        }
    };
    if !ext_config.is_empty() {
        info!("External configuration file provided. Loading...");
        let proxy = parse_proxy(&settings.proxy_config);
        match ExternalSettings::load(&ext_config, &proxy, settings.cache_config, authorized) {
            Ok(external) => {
                if !external.clash_rule_base.is_empty() {
                    clash_base = external.clash_rule_base.clone();
                }
                if !external.surge_rule_base.is_empty() {
                    surge_base = external.surge_rule_base.clone();
                }
                if !external.surfboard_rule_base.is_empty() {
                    surfboard_base = external.surfboard_rule_base.clone();
                }
                if !external.mellow_rule_base.is_empty() {
                    mellow_base = external.mellow_rule_base.clone();
                }
                if !external.quan_rule_base.is_empty() {
                    quan_base = external.quan_rule_base.clone();
                }
                if !external.quanx_rule_base.is_empty() {
                    quanx_base = external.quanx_rule_base.clone();
                }
                if !external.loon_rule_base.is_empty() {
                    loon_base = external.loon_rule_base.clone();
                }
                if !external.sssub_rule_base.is_empty() {
                    ssub_base = external.sssub_rule_base.clone();
                }
                if !external.custom_rulesets.is_empty() {
                    ruleset_configs = external.custom_rulesets;
                    startup_rulesets_valid = false;
                }
                if !external.custom_proxy_groups.is_empty() {
                    group_configs = external.custom_proxy_groups;
                }
                if !external.rename_nodes.is_empty() {
                    extra.rename_array = external.rename_nodes;
                }
                if !external.emojis.is_empty() {
                    extra.emoji_array = external.emojis;
                }
                if !external.include_remarks.is_empty() {
                    include_remarks = external.include_remarks;
                }
                if !external.exclude_remarks.is_empty() {
                    exclude_remarks = external.exclude_remarks;
                }
                if let Some(add_emoji) = external.add_emoji {
                    extra.add_emoji = add_emoji;
                }
                if let Some(remove_old_emoji) = external.remove_old_emoji {
                    extra.remove_emoji = remove_old_emoji;
                }
                if let Some(enabled) = external.enable_rule_generator {
                    extra.enable_rule_generator = enabled;
                }
                if let Some(overwrite) = external.overwrite_original_rules {
                    extra.overwrite_original_rules = overwrite;
                }
                template_args.local_vars = external.tpl_args;
            }
            Err(e) => {
                error!("Failed to load external config from {}: {}", ext_config, e);
                return Err(SubError::Config(format!(
                    "failed to load external config: {}",
                    e
                )));
            }
        }
    }

    // request arguments take the highest precedence
    if !include.is_empty() {
        if reg_valid(&include) {
            include_remarks = vec![include];
        }
    }
    if !exclude.is_empty() {
        if reg_valid(&exclude) {
            exclude_remarks = vec![exclude];
        }
    }
    if let Some(emoji) = arg_tribool(args, "emoji") {
        extra.add_emoji = emoji;
        extra.remove_emoji = true;
    }
    if let Some(add_emoji) = arg_tribool(args, "add_emoji") {
        extra.add_emoji = add_emoji;
    }
    if let Some(remove_emoji) = arg_tribool(args, "remove_emoji") {
        extra.remove_emoji = remove_emoji;
    }
    let rename = arg(args, "rename");
    if !rename.is_empty() {
        let entries: Vec<String> = url_decode(rename)
            .split('`')
            .map(|s| s.to_string())
            .collect();
        extra.rename_array = regex_match_configs_from_list(&entries, "@");
    }
    let sort_script = arg(args, "sort_script");
    if !sort_script.is_empty() {
        extra.sort_script = sort_script.to_string();
    }

    // accepted either base64-encoded or raw
    let decode_arg = |key: &str| -> String {
        let raw = arg(args, key);
        let decoded = url_safe_base64_decode(raw);
        if decoded.is_empty() {
            url_decode(raw)
        } else {
            decoded
        }
    };

    let nodelist = extra.nodelist;
    if !target.is_simple() && !nodelist {
        let groups = decode_arg("groups");
        if !groups.is_empty() {
            let lines: Vec<String> = groups.split('@').map(|s| s.to_string()).collect();
            group_configs = proxy_groups_from_ini(&lines);
        }
        let rulesets_arg = decode_arg("ruleset");
        if !rulesets_arg.is_empty() {
            let lines: Vec<String> = rulesets_arg.split('@').map(|s| s.to_string()).collect();
            ruleset_configs = rulesets_from_ini(&lines);
            startup_rulesets_valid = false;
        }
    }

    // resolve rulesets: reuse the startup cache when the declarations are
    // unchanged, otherwise fetch for this request
    let ruleset_content = if target.is_simple() || nodelist || !extra.enable_rule_generator {
        Vec::new()
    } else if startup_rulesets_valid && !settings.update_ruleset_on_request {
        settings.rulesets_content.clone()
    } else {
        let proxy = parse_proxy(&settings.proxy_ruleset);
        refresh_rulesets(
            &ruleset_configs,
            &proxy,
            settings.cache_ruleset,
            settings.async_fetch_ruleset,
            authorized,
        )
    };

    // only the selected target's base is fetched
    let mut base_content = HashMap::new();
    match &target {
        SubconverterTarget::Clash | SubconverterTarget::ClashR => {
            base_content.insert(
                target.clone(),
                load_base_content(&clash_base, &settings, &template_args),
            );
        }
        SubconverterTarget::Surge(_) => {
            base_content.insert(
                target.clone(),
                load_base_content(&surge_base, &settings, &template_args),
            );
        }
        SubconverterTarget::Surfboard => {
            base_content.insert(
                target.clone(),
                load_base_content(&surfboard_base, &settings, &template_args),
            );
        }
        SubconverterTarget::Mellow => {
            base_content.insert(
                target.clone(),
                load_base_content(&mellow_base, &settings, &template_args),
            );
        }
        SubconverterTarget::Quantumult => {
            base_content.insert(
                target.clone(),
                load_base_content(&quan_base, &settings, &template_args),
            );
        }
        SubconverterTarget::QuantumultX => {
            base_content.insert(
                target.clone(),
                load_base_content(&quanx_base, &settings, &template_args),
            );
        }
        SubconverterTarget::Loon => {
            base_content.insert(
                target.clone(),
                load_base_content(&loon_base, &settings, &template_args),
            );
        }
        SubconverterTarget::SSSub => {
            base_content.insert(
                target.clone(),
                load_base_content(&ssub_base, &settings, &template_args),
            );
        }
        _ => {}
    }

    let parse_settings = ParseSettings {
        proxy: parse_proxy(&settings.proxy_subscription),
        cache_ttl: settings.cache_subscription,
        include_remarks,
        exclude_remarks,
        stream_rules: settings.stream_rules.clone(),
        time_rules: settings.time_rules.clone(),
        request_header: HashMap::new(),
        authorized,
        custom_port: None,
        sub_info: String::new(),
    };

    let managed_config_prefix =
        if settings.write_managed_config && target.supports_managed_config() {
            settings.managed_config_prefix.clone()
        } else {
            String::new()
        };

    if arg_tribool(args, "upload").unwrap_or(false) {
        warn!("Gist upload requested but no uploader is configured, ignoring.");
    }

    Ok(SubconverterConfig {
        target: Some(target),
        urls,
        insert_urls,
        prepend_insert: settings.prepend_insert,
        group_name: {
            let group = url_decode(arg(args, "group"));
            if group.is_empty() {
                None
            } else {
                Some(group)
            }
        },
        base_content,
        ruleset_content,
        proxy_groups: group_configs,
        extra,
        parse_settings,
        filename: {
            let filename = arg(args, "filename");
            if filename.is_empty() {
                None
            } else {
                Some(url_decode(filename))
            }
        },
        update_interval: arg(args, "interval")
            .parse()
            .unwrap_or(settings.update_interval),
        update_strict: arg_tribool(args, "strict").unwrap_or(settings.update_strict),
        managed_config_prefix,
        request_query: query_string.to_string(),
        append_userinfo: arg_tribool(args, "append_info").unwrap_or(settings.append_userinfo),
    })
}

fn content_type_for(target: &SubconverterTarget) -> &'static str {
    match target {
        SubconverterTarget::Clash | SubconverterTarget::ClashR => "text/yaml;charset=utf-8",
        SubconverterTarget::SSSub => "application/json;charset=utf-8",
        _ => "text/plain;charset=utf-8",
    }
}

/// Run a conversion for the given argument map and wrap the HTTP response.
fn handle_sub_request(args: HashMap<String, String>, query_string: String) -> HttpResponse {
    let settings = Settings::current();
    if settings.reload_conf_on_request {
        refresh_configuration();
    }

    let config = match build_config_from_args(&args, &query_string) {
        Ok(config) => config,
        Err(e) => return error_response(&e),
    };
    let target = config.target.clone().unwrap();

    // conversion does blocking I/O, keep it off the async executor
    let result = std::thread::spawn(move || subconverter(config)).join();

    match result {
        Ok(Ok(result)) => {
            let mut builder = common_response();
            builder.content_type(content_type_for(&target));
            for (name, value) in result.headers {
                builder.append_header((name, value));
            }
            builder.body(result.content)
        }
        Ok(Err(e)) => {
            error!("Conversion failed: {}", e);
            error_response(&e)
        }
        Err(_) => HttpResponse::InternalServerError().body("Conversion thread panicked"),
    }
}

/// Handler for `/sub`, the main conversion endpoint.
pub async fn sub_handler(
    req: HttpRequest,
    query: web::Query<HashMap<String, String>>,
) -> HttpResponse {
    if let Some(resp) = loop_guard(&req) {
        return resp;
    }
    debug!("Received subconverter request: {:?}", query);
    handle_sub_request(query.into_inner(), req.query_string().to_string())
}

/// Handler for the `/clash` and `/surge` shortcuts.
pub async fn simple_handler(
    req: HttpRequest,
    path: web::Path<(String,)>,
    query: web::Query<HashMap<String, String>>,
) -> HttpResponse {
    if let Some(resp) = loop_guard(&req) {
        return resp;
    }
    let target_type = path.into_inner().0;
    let mut args = query.into_inner();
    match target_type.as_str() {
        "clash" | "clashr" | "surfboard" | "mellow" | "quan" | "quanx" | "loon" | "ss" | "ssr"
        | "ssd" | "v2ray" | "trojan" | "mixed" | "sssub" => {
            args.insert("target".to_string(), target_type.clone());
        }
        "surge" => {
            args.insert("target".to_string(), "surge".to_string());
            args.entry("ver".to_string()).or_insert("3".to_string());
        }
        _ => {
            return HttpResponse::BadRequest()
                .body(format!("Unsupported target type: {}", target_type))
        }
    }
    let query_string = format!("target={}&{}", target_type, req.query_string());
    handle_sub_request(args, query_string)
}

/// Handler for `/sub2clashr`: legacy one-shot link conversion.
pub async fn sub_to_clashr_handler(
    req: HttpRequest,
    query: web::Query<HashMap<String, String>>,
) -> HttpResponse {
    if let Some(resp) = loop_guard(&req) {
        return resp;
    }
    let mut args = query.into_inner();
    if let Some(sublink) = args.remove("sublink") {
        args.insert("url".to_string(), sublink);
    }
    args.insert("target".to_string(), "clashr".to_string());
    handle_sub_request(args, req.query_string().to_string())
}

/// Handler for `/surge2clash`: convert an existing Surge config.
pub async fn surge_to_clash_handler(
    req: HttpRequest,
    query: web::Query<HashMap<String, String>>,
) -> HttpResponse {
    if let Some(resp) = loop_guard(&req) {
        return resp;
    }
    let mut args = query.into_inner();
    if let Some(link) = args.remove("link") {
        args.insert("url".to_string(), link);
    }
    args.insert("target".to_string(), "clash".to_string());
    handle_sub_request(args, req.query_string().to_string())
}

/// Handler for `/getruleset`: proxy a ruleset through the server.
///
/// `type=1` returns the body converted to Surge lines; `type=2` re-tags every
/// rule with a group for Quantumult X remote filters.
pub async fn get_ruleset_handler(
    req: HttpRequest,
    query: web::Query<HashMap<String, String>>,
) -> HttpResponse {
    if let Some(resp) = loop_guard(&req) {
        return resp;
    }
    let args = query.into_inner();
    let url = url_safe_base64_decode(arg(&args, "url"));
    let rule_type = arg(&args, "type");
    let group = url_safe_base64_decode(arg(&args, "group"));

    if url.is_empty()
        || rule_type.is_empty()
        || (rule_type == "2" && group.is_empty())
        || (rule_type != "1" && rule_type != "2")
    {
        return HttpResponse::BadRequest().body("Invalid request!");
    }

    let settings = Settings::current();
    let proxy = parse_proxy(&settings.proxy_ruleset);
    let (bare_url, detected_type) = crate::models::split_ruleset_type(&url);
    let content = match fetch_file(bare_url, &proxy, settings.cache_ruleset, false) {
        Ok(content) if !content.is_empty() => content,
        _ => return HttpResponse::BadRequest().body("Invalid request!"),
    };

    if rule_type == "1" {
        let converted = crate::generator::ruleconvert::convert_ruleset(&content, detected_type);
        return common_response()
            .content_type("text/plain;charset=utf-8")
            .body(converted);
    }

    // type 2: strip unsupported types, re-tag with the group
    let mut output = String::new();
    let delimiter = get_line_break(&content);
    for line in content.split(delimiter) {
        let mut line = line.trim_end_matches('\r').to_string();
        if line.starts_with("IP-CIDR6")
            || line.starts_with("URL-REGEX")
            || line.starts_with("PROCESS-NAME")
            || line.starts_with("AND")
            || line.starts_with("OR")
        {
            continue;
        }
        if !line.is_empty()
            && !line.starts_with(';')
            && !line.starts_with('#')
            && !line.starts_with("//")
        {
            line.push_str(&format!(",{}", group));
            if line.matches(',').count() > 2 {
                let swapped = reg_replace(&line, r"^(.*?,.*?)(,.*)(,.*)$", "${1}${3}${2}", false);
                let dropped = reg_replace(&line, r"^(.*?,.*?)(,.*)(,.*)$", "${1}${3}", false);
                line = if line.contains(",no-resolve") {
                    swapped
                } else {
                    dropped
                };
            }
        }
        output.push_str(&line);
        output.push('\n');
    }

    common_response()
        .content_type("text/plain;charset=utf-8")
        .body(output)
}

/// Handler for `/getprofile`: load a server-side profile and convert it.
pub async fn get_profile_handler(
    req: HttpRequest,
    query: web::Query<HashMap<String, String>>,
) -> HttpResponse {
    if let Some(resp) = loop_guard(&req) {
        return resp;
    }
    let args = query.into_inner();
    let name = url_decode(arg(&args, "name"));
    let token = url_decode(arg(&args, "token"));
    if name.is_empty() || token.is_empty() {
        return HttpResponse::Forbidden().body("Forbidden");
    }

    let settings = Settings::current();
    let content = match crate::utils::file::file_get(&name, None) {
        Ok(content) => content,
        Err(_) => return HttpResponse::NotFound().body("Profile not found"),
    };

    info!("Trying to load profile '{}'.", name);
    let mut ini = IniReader::new();
    if ini.parse(&content).is_err() || !ini.section_exist("Profile") {
        error!("Load profile failed!");
        return HttpResponse::InternalServerError().body("Broken profile!");
    }

    let items = ini.get_items("Profile");
    if items.is_empty() {
        error!("Load profile failed! Reason: Empty Profile section");
        return HttpResponse::InternalServerError().body("Broken profile!");
    }

    // a profile may carry its own token, which overrides the global one
    let profile_token = items
        .iter()
        .find(|(k, _)| k == "profile_token")
        .map(|(_, v)| v.clone());
    let authorized = match profile_token {
        Some(profile_token) => token == profile_token,
        None => token == settings.api_access_token,
    };
    if !authorized {
        return HttpResponse::Forbidden().body("Forbidden");
    }

    let mut profile_args: HashMap<String, String> = items
        .into_iter()
        .filter(|(k, _)| k != "profile_token")
        .collect();
    profile_args.insert("token".to_string(), settings.api_access_token.clone());
    if let Some(expand) = args.get("expand") {
        profile_args.insert("expand".to_string(), expand.clone());
    }

    let query_string = profile_args
        .iter()
        .map(|(k, v)| format!("{}={}", k, url_encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    handle_sub_request(profile_args, query_string)
}

/// Handler for `/render`: run a template from the template directory.
pub async fn render_handler(
    req: HttpRequest,
    query: web::Query<HashMap<String, String>>,
) -> HttpResponse {
    if let Some(resp) = loop_guard(&req) {
        return resp;
    }
    let args = query.into_inner();
    let path = arg(&args, "path");
    let settings = Settings::current();

    if !path.starts_with(&settings.template_path)
        || crate::utils::file::path_escapes_scope(path)
    {
        return HttpResponse::Forbidden().body("Out of scope!");
    }

    let template_args = TemplateArgs {
        global_vars: settings.template_vars.clone(),
        request_params: args.clone(),
        local_vars: HashMap::new(),
    };

    match render_template(path, &template_args, &settings.template_path) {
        Ok(output) => common_response()
            .content_type("text/plain;charset=utf-8")
            .body(output),
        Err(e) => HttpResponse::BadRequest().body(e.to_string()),
    }
}

/// Handler for `/qx-script`: re-serve a Quantumult X script with the
/// caller's device id injected into `@supported`.
pub async fn qx_script_handler(
    req: HttpRequest,
    query: web::Query<HashMap<String, String>>,
) -> HttpResponse {
    if let Some(resp) = loop_guard(&req) {
        return resp;
    }
    let args = query.into_inner();
    let url = url_safe_base64_decode(arg(&args, "url"));
    if url.is_empty() || !is_link(&url) {
        return HttpResponse::BadRequest().body("Invalid request!");
    }

    let settings = Settings::current();
    let dev_id = {
        let id = arg(&args, "id");
        if id.is_empty() {
            settings.quanx_dev_id.clone()
        } else {
            id.to_string()
        }
    };

    let proxy = parse_proxy(&settings.proxy_config);
    let mut content = match fetch_file(&url, &proxy, settings.cache_config, false) {
        Ok(content) => content,
        Err(e) => return error_response(&e),
    };

    if !dev_id.is_empty() {
        let pattern = r"(?m)^(.*?@supported )(.*?)\s*$";
        let replaced = reg_replace(&content, pattern, &format!("${{1}}{}", dev_id), false);
        content = if replaced != content {
            replaced
        } else {
            format!(
                "/**\n * @supported {}\n * THIS COMMENT IS GENERATED BY SUBFORGE\n */\n\n{}",
                dev_id, content
            )
        };
    }

    common_response()
        .content_type("text/plain;charset=utf-8")
        .body(content)
}

/// Handler for `/qx-rewrite`: re-serve a rewrite list with script URLs
/// indirected through `/qx-script`.
pub async fn qx_rewrite_handler(
    req: HttpRequest,
    query: web::Query<HashMap<String, String>>,
) -> HttpResponse {
    if let Some(resp) = loop_guard(&req) {
        return resp;
    }
    let args = query.into_inner();
    let url = url_safe_base64_decode(arg(&args, "url"));
    if url.is_empty() || !is_link(&url) {
        return HttpResponse::BadRequest().body("Invalid request!");
    }

    let settings = Settings::current();
    let dev_id = {
        let id = arg(&args, "id");
        if id.is_empty() {
            settings.quanx_dev_id.clone()
        } else {
            id.to_string()
        }
    };

    let proxy = parse_proxy(&settings.proxy_config);
    let content = match fetch_file(&url, &proxy, settings.cache_config, false) {
        Ok(content) => content,
        Err(e) => return error_response(&e),
    };

    let output = if dev_id.is_empty() {
        content
    } else {
        let pattern = regex::Regex::new(r"^(.*? url script-.*? )(.*?)$").unwrap();
        let delimiter = get_line_break(&content);
        let mut output = String::new();
        for line in content.split(delimiter) {
            let line = line.trim_end_matches('\r');
            if let Some(caps) = pattern.captures(line) {
                let script_url = &caps[2];
                output.push_str(&format!(
                    "{}{}/qx-script?id={}&url={}",
                    &caps[1],
                    settings.managed_config_prefix,
                    dev_id,
                    crate::utils::base64::url_safe_base64_encode(script_url)
                ));
            } else {
                output.push_str(line);
            }
            output.push('\n');
        }
        output
    };

    common_response()
        .content_type("text/plain;charset=utf-8")
        .body(output)
}

/// Handler for `/readconf`: token-gated configuration reload.
pub async fn read_conf_handler(
    req: HttpRequest,
    query: web::Query<HashMap<String, String>>,
) -> HttpResponse {
    if let Some(resp) = loop_guard(&req) {
        return resp;
    }
    let args = query.into_inner();
    let settings = Settings::current();
    if arg(&args, "token") != settings.api_access_token {
        return HttpResponse::Forbidden().body("Forbidden");
    }
    refresh_configuration();
    common_response().body("done")
}

/// Handler for `/version`.
pub async fn version_handler() -> HttpResponse {
    common_response().body(concat!("subforge v", env!("CARGO_PKG_VERSION"), " backend\n"))
}

/// Register the API endpoints with Actix Web.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.route("/sub", web::get().to(sub_handler))
        .route("/version", web::get().to(version_handler))
        .route("/readconf", web::get().to(read_conf_handler))
        .route("/getruleset", web::get().to(get_ruleset_handler))
        .route("/getprofile", web::get().to(get_profile_handler))
        .route("/render", web::get().to(render_handler))
        .route("/qx-script", web::get().to(qx_script_handler))
        .route("/qx-rewrite", web::get().to(qx_rewrite_handler))
        .route("/sub2clashr", web::get().to(sub_to_clashr_handler))
        .route("/surge2clash", web::get().to(surge_to_clash_handler))
        .route("/{target_type}", web::get().to(simple_handler));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_build_config_requires_target() {
        let result = build_config_from_args(&args(&[("url", "ss://x")]), "");
        assert!(matches!(result, Err(SubError::UnknownTarget)));
    }

    #[test]
    fn test_build_config_requires_url() {
        let result = build_config_from_args(&args(&[("target", "clash")]), "");
        assert!(result.is_err());
    }

    #[test]
    fn test_build_config_surge_version() {
        let config = build_config_from_args(
            &args(&[("target", "surge"), ("ver", "4"), ("url", "ss://x")]),
            "target=surge&ver=4",
        )
        .unwrap();
        assert_eq!(config.target, Some(SubconverterTarget::Surge(4)));
    }

    #[test]
    fn test_build_config_blacklisted_regex() {
        let result = build_config_from_args(
            &args(&[("target", "clash"), ("url", "ss://x"), ("exclude", "(.*)*")]),
            "",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_build_config_flags() {
        let config = build_config_from_args(
            &args(&[
                ("target", "clash"),
                ("url", "ss://x"),
                ("udp", "true"),
                ("scv", "false"),
                ("list", "true"),
                ("emoji", "true"),
            ]),
            "",
        )
        .unwrap();
        assert_eq!(config.extra.udp, Some(true));
        assert_eq!(config.extra.skip_cert_verify, Some(false));
        assert!(config.extra.nodelist);
        assert!(config.extra.add_emoji);
        assert!(config.extra.remove_emoji);
    }

    #[test]
    fn test_build_config_groups_param() {
        let groups = crate::utils::base64::url_safe_base64_encode("Pick`select`.*");
        let config = build_config_from_args(
            &args(&[
                ("target", "clash"),
                ("url", "ss://x"),
                ("groups", &groups),
            ]),
            "",
        )
        .unwrap();
        assert_eq!(config.proxy_groups.len(), 1);
        assert_eq!(config.proxy_groups[0].name, "Pick");
    }
}
