//! Subscription fetcher: HTTP(S), `data:` URLs and the TTL disk cache.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use case_insensitive_string::CaseInsensitiveString;
use log::{info, warn};
use once_cell::sync::Lazy;
use reqwest::Client;

use crate::models::{SubError, SubResult};
use crate::utils::base64::base64_decode;
use crate::utils::file::{file_exists, file_get};
use crate::utils::md5;
use crate::utils::system::get_system_proxy;
use crate::utils::url::{is_link, url_decode};

/// Timeout for upstream fetches in seconds.
const DEFAULT_TIMEOUT: u64 = 15;

/// User agent sent upstream; the server edge rejects requests carrying it to
/// break self-recursive subscription loops.
pub const USER_AGENT: &str = concat!("subforge/", env!("CARGO_PKG_VERSION"), " cURL/7.58.0");

/// Serialises all cache directory reads and writes across workers.
static CACHE_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    pub proxy: Option<String>,
}

/// Interpret the proxy preference grammar: empty or `NONE` disables,
/// `SYSTEM` reads the environment, anything else is an explicit proxy URL.
pub fn parse_proxy(proxy_str: &str) -> ProxyConfig {
    match proxy_str {
        "SYSTEM" => {
            let system = get_system_proxy();
            ProxyConfig {
                proxy: if system.is_empty() { None } else { Some(system) },
            }
        }
        "NONE" | "" => ProxyConfig { proxy: None },
        other => ProxyConfig {
            proxy: Some(other.to_string()),
        },
    }
}

pub type ResponseHeaders = HashMap<String, String>;

/// Decode a `data:[<mediatype>][;base64],<payload>` URL.
fn data_get(url: &str) -> SubResult<String> {
    let rest = &url["data:".len()..];
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| SubError::fetch(url, "malformed data url"))?;
    let decoded = url_decode(payload);
    if meta.ends_with(";base64") {
        Ok(base64_decode(&decoded))
    } else {
        Ok(decoded)
    }
}

async fn web_get_inner(
    url: &str,
    proxy_config: &ProxyConfig,
    headers: Option<&HashMap<CaseInsensitiveString, String>>,
) -> SubResult<(String, ResponseHeaders)> {
    let mut client_builder = Client::builder()
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT))
        .danger_accept_invalid_certs(true)
        .user_agent(USER_AGENT);

    if let Some(proxy) = &proxy_config.proxy {
        let proxy =
            reqwest::Proxy::all(proxy).map_err(|e| SubError::fetch(url, e))?;
        client_builder = client_builder.proxy(proxy);
    }

    let client = client_builder
        .build()
        .map_err(|e| SubError::fetch(url, e))?;

    let mut request_builder = client.get(url);
    if let Some(custom_headers) = headers {
        for (key, value) in custom_headers {
            request_builder = request_builder.header(key.to_string(), value);
        }
    }

    let response = request_builder
        .send()
        .await
        .map_err(|e| SubError::fetch(url, e))?;

    let mut resp_headers = ResponseHeaders::new();
    for (key, value) in response.headers() {
        if let Ok(v) = value.to_str() {
            resp_headers.insert(key.to_string().to_lowercase(), v.to_string());
        }
    }

    if !response.status().is_success() {
        return Err(SubError::fetch(url, format!("HTTP error: {}", response.status())));
    }

    let body = response.text().await.map_err(|e| SubError::fetch(url, e))?;
    if body.is_empty() {
        return Err(SubError::fetch(url, "empty response body"));
    }
    Ok((body, resp_headers))
}

/// Blocking fetch without caching. Each conversion request runs on its own
/// worker thread, so spinning a current-thread runtime here is safe.
fn web_get_uncached(
    url: &str,
    proxy_config: &ProxyConfig,
    headers: Option<&HashMap<CaseInsensitiveString, String>>,
) -> SubResult<(String, ResponseHeaders)> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| SubError::fetch(url, e))?;
    rt.block_on(web_get_inner(url, proxy_config, headers))
}

fn header_file_to_map(content: &str) -> ResponseHeaders {
    let mut headers = ResponseHeaders::new();
    for line in content.lines() {
        if let Some((key, value)) = line.split_once(": ") {
            headers.insert(key.to_lowercase(), value.to_string());
        }
    }
    headers
}

fn header_map_to_file(headers: &ResponseHeaders) -> String {
    let mut out = String::new();
    for (key, value) in headers {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    }
    out
}

/// Fetch a URL with the TTL disk cache of `cache/<md5>` + `cache/<md5>_header`.
///
/// Within the TTL the cache is served without touching the network; on fetch
/// failure a stale cache is served when present.
pub fn web_get(
    url: &str,
    proxy_config: &ProxyConfig,
    cache_ttl: u32,
    headers: Option<&HashMap<CaseInsensitiveString, String>>,
) -> SubResult<(String, ResponseHeaders)> {
    if url.starts_with("data:") {
        return data_get(url).map(|body| (body, ResponseHeaders::new()));
    }

    if cache_ttl == 0 {
        return web_get_uncached(url, proxy_config, headers);
    }

    let _ = fs::create_dir_all("cache");
    let url_hash = md5(url);
    let path = format!("cache/{}", url_hash);
    let path_header = format!("{}_header", path);

    if let Ok(metadata) = fs::metadata(&path) {
        let age = metadata
            .modified()
            .ok()
            .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
            .unwrap_or(Duration::MAX);
        if age.as_secs() <= cache_ttl as u64 {
            info!("CACHE HIT: '{}', using local cache.", url);
            let _guard = CACHE_MUTEX.lock().unwrap();
            let body = file_get(&path, None)?;
            let resp_headers = file_get(&path_header, None)
                .map(|content| header_file_to_map(&content))
                .unwrap_or_default();
            return Ok((body, resp_headers));
        }
        info!("CACHE MISS: '{}', TTL timeout, creating new cache.", url);
    } else {
        info!("CACHE NOT EXIST: '{}', creating new cache.", url);
    }

    match web_get_uncached(url, proxy_config, headers) {
        Ok((body, resp_headers)) => {
            let _guard = CACHE_MUTEX.lock().unwrap();
            if let Err(e) = fs::write(&path, &body)
                .and_then(|_| fs::write(&path_header, header_map_to_file(&resp_headers)))
            {
                warn!("Failed to write cache for '{}': {}", url, e);
            }
            Ok((body, resp_headers))
        }
        Err(e) => {
            if Path::new(&path).exists() {
                warn!("Fetch failed. Serving cached content.");
                let _guard = CACHE_MUTEX.lock().unwrap();
                let body = file_get(&path, None)?;
                let resp_headers = file_get(&path_header, None)
                    .map(|content| header_file_to_map(&content))
                    .unwrap_or_default();
                Ok((body, resp_headers))
            } else {
                warn!("Fetch failed. No local cache available.");
                Err(e)
            }
        }
    }
}

/// Fetch a local file or a remote link, whichever `path` names.
///
/// Local files require authorization from the caller; pass the flag from the
/// request scope.
pub fn fetch_file(
    path: &str,
    proxy_config: &ProxyConfig,
    cache_ttl: u32,
    authorized: bool,
) -> SubResult<String> {
    if file_exists(path) {
        if !authorized {
            return Err(SubError::Forbidden);
        }
        return file_get(path, None);
    }
    if is_link(path) {
        return web_get(path, proxy_config, cache_ttl, None).map(|(body, _)| body);
    }
    Err(SubError::fetch(path, "not a file or link"))
}

/// Extract the raw `Subscription-UserInfo` value from response headers.
pub fn get_sub_info_from_header(headers: &ResponseHeaders) -> Option<String> {
    headers
        .get("subscription-userinfo")
        .filter(|v| !v.is_empty())
        .cloned()
}
