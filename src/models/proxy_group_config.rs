use log::warn;

/// Type of proxy group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProxyGroupType {
    #[default]
    Select,
    URLTest,
    Fallback,
    LoadBalance,
    Relay,
    SSID,
}

impl ProxyGroupType {
    /// Get string representation of the proxy group type
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyGroupType::Select => "select",
            ProxyGroupType::URLTest => "url-test",
            ProxyGroupType::LoadBalance => "load-balance",
            ProxyGroupType::Fallback => "fallback",
            ProxyGroupType::Relay => "relay",
            ProxyGroupType::SSID => "ssid",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "select" => Some(ProxyGroupType::Select),
            "url-test" => Some(ProxyGroupType::URLTest),
            "fallback" => Some(ProxyGroupType::Fallback),
            "load-balance" => Some(ProxyGroupType::LoadBalance),
            "relay" => Some(ProxyGroupType::Relay),
            "ssid" => Some(ProxyGroupType::SSID),
            _ => None,
        }
    }

    /// Whether this type carries trailing `test-url` and timing fields in the
    /// backtick declaration syntax.
    pub fn has_url(&self) -> bool {
        matches!(
            self,
            ProxyGroupType::URLTest | ProxyGroupType::Fallback | ProxyGroupType::LoadBalance
        )
    }
}

/// Configuration for a proxy group
#[derive(Debug, Clone, Default)]
pub struct ProxyGroupConfig {
    /// Name of the proxy group
    pub name: String,
    /// Type of the proxy group
    pub group_type: ProxyGroupType,
    /// Ordered node-selection patterns
    pub proxies: Vec<String>,
    /// External clash-proxy-provider names used by this group
    pub using_provider: Vec<String>,
    /// URL for testing
    pub url: String,
    /// Interval in seconds between tests
    pub interval: u32,
    /// Timeout in seconds for tests
    pub timeout: u32,
    /// Tolerance value for tests
    pub tolerance: u32,
}

impl ProxyGroupConfig {
    pub fn new(name: String, group_type: ProxyGroupType) -> Self {
        Self {
            name,
            group_type,
            ..Default::default()
        }
    }

    pub fn type_str(&self) -> &'static str {
        self.group_type.as_str()
    }

    /// Parse one backtick-delimited group declaration:
    /// `Name`type`selector`…[`test-url`interval[,timeout[,tolerance]]]`
    ///
    /// Test-like types require the two trailing fields; `ssid` keeps every
    /// field after the type verbatim as selectors.
    pub fn from_ini_line(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.split('`').collect();
        if fields.len() < 3 {
            warn!("Ignoring incomplete proxy group declaration '{}'", line);
            return None;
        }

        let group_type = match ProxyGroupType::from_str(fields[1]) {
            Some(t) => t,
            None => {
                warn!("Ignoring proxy group '{}' with unknown type '{}'", fields[0], fields[1]);
                return None;
            }
        };

        let mut group = ProxyGroupConfig::new(fields[0].to_string(), group_type);
        let mut upper_bound = fields.len();

        if group_type.has_url() {
            if fields.len() < 5 {
                warn!(
                    "Ignoring {} group '{}' without test url and interval",
                    group_type.as_str(),
                    group.name
                );
                return None;
            }
            upper_bound -= 2;
            group.url = fields[upper_bound].to_string();
            let (interval, timeout, tolerance) = parse_group_times(fields[upper_bound + 1]);
            group.interval = interval;
            group.timeout = timeout;
            group.tolerance = tolerance;
        }

        for selector in &fields[2..upper_bound] {
            if let Some(providers) = selector.strip_prefix("!!PROVIDER=") {
                group
                    .using_provider
                    .extend(providers.split(',').map(|s| s.trim().to_string()));
            } else {
                group.proxies.push(selector.to_string());
            }
        }

        Some(group)
    }
}

/// Parse `interval[,timeout[,tolerance]]` timing fields.
pub fn parse_group_times(src: &str) -> (u32, u32, u32) {
    let mut parts = src.split(',');
    let interval = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0);
    let timeout = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0);
    let tolerance = parts.next().and_then(|v| v.parse().ok()).unwrap_or(0);
    (interval, timeout, tolerance)
}

/// A collection of proxy group configurations
pub type ProxyGroupConfigs = Vec<ProxyGroupConfig>;

/// Parse a batch of backtick-delimited declarations, dropping malformed lines.
pub fn proxy_groups_from_ini(lines: &[String]) -> ProxyGroupConfigs {
    lines
        .iter()
        .filter_map(|line| ProxyGroupConfig::from_ini_line(line))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_select_group() {
        let group = ProxyGroupConfig::from_ini_line("Proxy`select`[]DIRECT`.*").unwrap();
        assert_eq!(group.name, "Proxy");
        assert_eq!(group.group_type, ProxyGroupType::Select);
        assert_eq!(group.proxies, vec!["[]DIRECT", ".*"]);
        assert!(group.url.is_empty());
    }

    #[test]
    fn test_parse_url_test_group() {
        let group = ProxyGroupConfig::from_ini_line(
            "Auto`url-test`.*`http://www.gstatic.com/generate_204`300,5,100",
        )
        .unwrap();
        assert_eq!(group.group_type, ProxyGroupType::URLTest);
        assert_eq!(group.proxies, vec![".*"]);
        assert_eq!(group.url, "http://www.gstatic.com/generate_204");
        assert_eq!(group.interval, 300);
        assert_eq!(group.timeout, 5);
        assert_eq!(group.tolerance, 100);
    }

    #[test]
    fn test_parse_url_test_group_without_url_is_dropped() {
        assert!(ProxyGroupConfig::from_ini_line("Auto`url-test`.*").is_none());
    }

    #[test]
    fn test_parse_provider_selector() {
        let group =
            ProxyGroupConfig::from_ini_line("Prov`select`!!PROVIDER=foo,bar`[]DIRECT").unwrap();
        assert_eq!(group.using_provider, vec!["foo", "bar"]);
        assert_eq!(group.proxies, vec!["[]DIRECT"]);
    }

    #[test]
    fn test_parse_group_times_partial() {
        assert_eq!(parse_group_times("300"), (300, 0, 0));
        assert_eq!(parse_group_times("300,5"), (300, 5, 0));
        assert_eq!(parse_group_times("bad"), (0, 0, 0));
    }
}
