//! Ruleset resolution: fetching, caching, and declaration-order joins.

use std::thread;

use log::{error, info};

use crate::models::{
    split_ruleset_type, RulesetConfig, RulesetContent, SubResult,
};
use crate::utils::http::{fetch_file, ProxyConfig};

/// Fetch one ruleset body from a file or URL through the shared TTL cache.
pub fn fetch_ruleset(
    url: &str,
    proxy: &ProxyConfig,
    cache_ttl: u32,
    authorized: bool,
) -> SubResult<String> {
    fetch_file(url, proxy, cache_ttl, authorized)
}

/// Resolve every declared ruleset reference into a `RulesetContent`.
///
/// With `async_fetch` the fetches fan out onto worker threads and are joined
/// in declaration order, so the output order always matches the input order.
/// A reference that fails to fetch is dropped with an error log.
pub fn refresh_rulesets(
    ruleset_list: &[RulesetConfig],
    proxy: &ProxyConfig,
    cache_ttl: u32,
    async_fetch: bool,
    authorized: bool,
) -> Vec<RulesetContent> {
    let mut contents = Vec::new();

    struct Pending {
        ruleset: RulesetContent,
        handle: Option<thread::JoinHandle<SubResult<String>>>,
        inline: bool,
    }

    let mut pending: Vec<Pending> = Vec::new();

    for config in ruleset_list {
        let rule_group = &config.group;
        let rule_url = &config.url;

        if let Some(pos) = rule_url.find("[]") {
            info!(
                "Adding rule '{}' with group '{}'",
                &rule_url[pos + 2..],
                rule_group
            );
            let mut ruleset = RulesetContent::new("", rule_group);
            ruleset.set_rule_content(&rule_url[pos..]);
            pending.push(Pending {
                ruleset,
                handle: None,
                inline: true,
            });
            continue;
        }

        let (bare_url, rule_type) = split_ruleset_type(rule_url);
        info!(
            "Updating ruleset url '{}' with group '{}'.",
            bare_url, rule_group
        );

        let mut ruleset = RulesetContent::new(bare_url, rule_group);
        ruleset.rule_path_typed = rule_url.clone();
        ruleset.rule_type = rule_type;
        ruleset.update_interval = config.interval;

        if async_fetch {
            let url = bare_url.to_string();
            let proxy = proxy.clone();
            let handle =
                thread::spawn(move || fetch_ruleset(&url, &proxy, cache_ttl, authorized));
            pending.push(Pending {
                ruleset,
                handle: Some(handle),
                inline: false,
            });
        } else {
            match fetch_ruleset(bare_url, proxy, cache_ttl, authorized) {
                Ok(content) => {
                    ruleset.set_rule_content(&content);
                    pending.push(Pending {
                        ruleset,
                        handle: None,
                        inline: true,
                    });
                }
                Err(e) => {
                    error!("Failed to fetch ruleset from '{}': {}", bare_url, e);
                }
            }
        }
    }

    // join in declaration order
    for entry in pending {
        let mut ruleset = entry.ruleset;
        if entry.inline {
            contents.push(ruleset);
            continue;
        }
        let handle = match entry.handle {
            Some(handle) => handle,
            None => continue,
        };
        match handle.join() {
            Ok(Ok(content)) => {
                ruleset.set_rule_content(&content);
                contents.push(ruleset);
            }
            Ok(Err(e)) => {
                error!(
                    "Failed to fetch ruleset from '{}': {}",
                    ruleset.rule_path, e
                );
            }
            Err(_) => {
                error!("Ruleset fetch thread panicked for '{}'", ruleset.rule_path);
            }
        }
    }

    contents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RulesetType;
    use std::io::Write;

    #[test]
    fn test_refresh_rulesets_inline_and_local() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.list");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"DOMAIN,example.com\n").unwrap();

        let configs = vec![
            RulesetConfig {
                group: "Inline".to_string(),
                url: "[]FINAL".to_string(),
                interval: 0,
            },
            RulesetConfig {
                group: "Local".to_string(),
                url: path.to_str().unwrap().to_string(),
                interval: 0,
            },
        ];
        let contents = refresh_rulesets(&configs, &ProxyConfig::default(), 0, false, true);
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].group, "Inline");
        assert_eq!(contents[0].get_rule_content(), "[]FINAL");
        assert_eq!(contents[1].group, "Local");
        assert!(contents[1].get_rule_content().contains("DOMAIN,example.com"));
    }

    #[test]
    fn test_refresh_rulesets_async_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut configs = Vec::new();
        for i in 0..4 {
            let path = dir.path().join(format!("r{}.list", i));
            std::fs::write(&path, format!("DOMAIN,site{}.com\n", i)).unwrap();
            configs.push(RulesetConfig {
                group: format!("G{}", i),
                url: path.to_str().unwrap().to_string(),
                interval: 0,
            });
        }
        let contents = refresh_rulesets(&configs, &ProxyConfig::default(), 0, true, true);
        assert_eq!(contents.len(), 4);
        for (i, content) in contents.iter().enumerate() {
            assert_eq!(content.group, format!("G{}", i));
            assert!(content
                .get_rule_content()
                .contains(&format!("site{}.com", i)));
        }
    }

    #[test]
    fn test_refresh_rulesets_typed_prefix() {
        let configs = vec![RulesetConfig {
            group: "Typed".to_string(),
            url: "clash-domain:/nonexistent/path.yml".to_string(),
            interval: 0,
        }];
        // the fetch fails, so the ruleset is dropped; the type split still
        // must not panic
        let contents = refresh_rulesets(&configs, &ProxyConfig::default(), 0, false, true);
        assert!(contents.is_empty());
        assert_eq!(
            split_ruleset_type("clash-domain:x").1,
            RulesetType::ClashDomain
        );
    }

    #[test]
    fn test_refresh_rulesets_failed_fetch_dropped() {
        let configs = vec![
            RulesetConfig {
                group: "Bad".to_string(),
                url: "/definitely/not/here.list".to_string(),
                interval: 0,
            },
            RulesetConfig {
                group: "Inline".to_string(),
                url: "[]GEOIP,CN".to_string(),
                interval: 0,
            },
        ];
        let contents = refresh_rulesets(&configs, &ProxyConfig::default(), 0, false, true);
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].group, "Inline");
    }
}
