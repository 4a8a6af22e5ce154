//! Proxy model definitions
//!
//! Contains the core data structures for proxy configurations.

/// Represents the type of a proxy.
/// This is the canonical enum used for proxy type identification across the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProxyType {
    #[default]
    Unknown,
    Shadowsocks,
    ShadowsocksR,
    VMess,
    Trojan,
    Snell,
    HTTP,
    HTTPS,
    Socks5,
}

impl ProxyType {
    /// Converts a `ProxyType` into a human-readable name.
    pub fn as_str(self) -> &'static str {
        match self {
            ProxyType::Shadowsocks => "SS",
            ProxyType::ShadowsocksR => "SSR",
            ProxyType::VMess => "VMess",
            ProxyType::Trojan => "Trojan",
            ProxyType::Snell => "Snell",
            ProxyType::HTTP => "HTTP",
            ProxyType::HTTPS => "HTTPS",
            ProxyType::Socks5 => "SOCKS5",
            ProxyType::Unknown => "Unknown",
        }
    }
}

/// Represents a single proxy server in the internal node model.
///
/// Parsers construct these, the node pipeline mutates `remark`/`id`, and the
/// emitters read the kind-specific fields. `group_id` is signed: sources from
/// `insert_url` carry negative ids so `!!INSERT=` matchers can tell them apart.
#[derive(Debug, Clone, Default)]
pub struct Proxy {
    pub proxy_type: ProxyType,
    pub id: u32,
    pub group_id: i32,
    pub group: String,
    pub remark: String,
    pub hostname: String,
    pub port: u16,

    pub username: Option<String>,
    pub password: Option<String>,
    pub encrypt_method: Option<String>,
    pub plugin: Option<String>,
    /// Plugin options in the format of `key1=value1;key2=value2`
    pub plugin_option: Option<String>,
    pub protocol: Option<String>,
    pub protocol_param: Option<String>,
    pub obfs: Option<String>,
    pub obfs_param: Option<String>,
    pub user_id: Option<String>,
    pub alter_id: u16,
    pub transfer_protocol: Option<String>,
    pub fake_type: Option<String>,
    pub tls_secure: bool,

    pub host: Option<String>,
    pub path: Option<String>,
    pub edge: Option<String>,

    pub quic_secure: Option<String>,
    pub quic_secret: Option<String>,

    pub snell_version: u16,
    pub server_name: Option<String>,

    pub udp: Option<bool>,
    pub tcp_fast_open: Option<bool>,
    pub allow_insecure: Option<bool>,
    pub tls13: Option<bool>,
}

/// Default provider group names as constants.
pub const SS_DEFAULT_GROUP: &str = "SSProvider";
pub const SSR_DEFAULT_GROUP: &str = "SSRProvider";
pub const V2RAY_DEFAULT_GROUP: &str = "V2RayProvider";
pub const SOCKS_DEFAULT_GROUP: &str = "SocksProvider";
pub const HTTP_DEFAULT_GROUP: &str = "HTTPProvider";
pub const TROJAN_DEFAULT_GROUP: &str = "TrojanProvider";
pub const SNELL_DEFAULT_GROUP: &str = "SnellProvider";

fn opt(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl Proxy {
    #[allow(clippy::too_many_arguments)]
    pub fn ss_construct(
        group: &str,
        remark: &str,
        server: &str,
        port: u16,
        password: &str,
        method: &str,
        plugin: &str,
        plugin_opts: &str,
        udp: Option<bool>,
        tfo: Option<bool>,
        scv: Option<bool>,
        tls13: Option<bool>,
    ) -> Self {
        Proxy {
            proxy_type: ProxyType::Shadowsocks,
            group: group.to_string(),
            remark: remark.to_string(),
            hostname: server.to_string(),
            port,
            password: Some(password.to_string()),
            encrypt_method: Some(method.to_string()),
            plugin: opt(plugin),
            plugin_option: opt(plugin_opts),
            udp,
            tcp_fast_open: tfo,
            allow_insecure: scv,
            tls13,
            ..Default::default()
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn ssr_construct(
        group: &str,
        remark: &str,
        server: &str,
        port: u16,
        protocol: &str,
        method: &str,
        obfs: &str,
        password: &str,
        obfs_param: &str,
        protocol_param: &str,
        udp: Option<bool>,
        tfo: Option<bool>,
        scv: Option<bool>,
    ) -> Self {
        Proxy {
            proxy_type: ProxyType::ShadowsocksR,
            group: group.to_string(),
            remark: remark.to_string(),
            hostname: server.to_string(),
            port,
            protocol: Some(protocol.to_string()),
            encrypt_method: Some(method.to_string()),
            obfs: Some(obfs.to_string()),
            password: Some(password.to_string()),
            obfs_param: Some(obfs_param.to_string()),
            protocol_param: Some(protocol_param.to_string()),
            udp,
            tcp_fast_open: tfo,
            allow_insecure: scv,
            ..Default::default()
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn vmess_construct(
        group: &str,
        remark: &str,
        server: &str,
        port: u16,
        fake_type: &str,
        user_id: &str,
        alter_id: u16,
        transfer_protocol: &str,
        cipher: &str,
        path: &str,
        host: &str,
        edge: &str,
        tls: &str,
        sni: &str,
        udp: Option<bool>,
        tfo: Option<bool>,
        scv: Option<bool>,
        tls13: Option<bool>,
    ) -> Self {
        Proxy {
            proxy_type: ProxyType::VMess,
            group: group.to_string(),
            remark: remark.to_string(),
            hostname: server.to_string(),
            port,
            fake_type: opt(fake_type),
            user_id: Some(user_id.to_string()),
            alter_id,
            transfer_protocol: Some(if transfer_protocol.is_empty() {
                "tcp".to_string()
            } else {
                transfer_protocol.to_string()
            }),
            encrypt_method: Some(if cipher.is_empty() {
                "auto".to_string()
            } else {
                cipher.to_string()
            }),
            path: opt(path),
            host: opt(host),
            edge: opt(edge),
            tls_secure: tls == "tls",
            server_name: opt(sni),
            udp,
            tcp_fast_open: tfo,
            allow_insecure: scv,
            tls13,
            ..Default::default()
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn trojan_construct(
        group: &str,
        remark: &str,
        server: &str,
        port: u16,
        password: &str,
        host: &str,
        tls_secure: bool,
        udp: Option<bool>,
        tfo: Option<bool>,
        scv: Option<bool>,
        tls13: Option<bool>,
    ) -> Self {
        Proxy {
            proxy_type: ProxyType::Trojan,
            group: group.to_string(),
            remark: remark.to_string(),
            hostname: server.to_string(),
            port,
            password: Some(password.to_string()),
            host: opt(host),
            tls_secure,
            udp,
            tcp_fast_open: tfo,
            allow_insecure: scv,
            tls13,
            ..Default::default()
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn socks_construct(
        group: &str,
        remark: &str,
        server: &str,
        port: u16,
        username: &str,
        password: &str,
        udp: Option<bool>,
        tfo: Option<bool>,
        scv: Option<bool>,
    ) -> Self {
        Proxy {
            proxy_type: ProxyType::Socks5,
            group: group.to_string(),
            remark: remark.to_string(),
            hostname: server.to_string(),
            port,
            username: opt(username),
            password: opt(password),
            udp,
            tcp_fast_open: tfo,
            allow_insecure: scv,
            ..Default::default()
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn http_construct(
        group: &str,
        remark: &str,
        server: &str,
        port: u16,
        username: &str,
        password: &str,
        tls: bool,
        tfo: Option<bool>,
        scv: Option<bool>,
        tls13: Option<bool>,
    ) -> Self {
        Proxy {
            proxy_type: if tls {
                ProxyType::HTTPS
            } else {
                ProxyType::HTTP
            },
            group: group.to_string(),
            remark: remark.to_string(),
            hostname: server.to_string(),
            port,
            username: opt(username),
            password: opt(password),
            tls_secure: tls,
            tcp_fast_open: tfo,
            allow_insecure: scv,
            tls13,
            ..Default::default()
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn snell_construct(
        group: &str,
        remark: &str,
        server: &str,
        port: u16,
        password: &str,
        obfs: &str,
        host: &str,
        version: u16,
        udp: Option<bool>,
        tfo: Option<bool>,
        scv: Option<bool>,
    ) -> Self {
        Proxy {
            proxy_type: ProxyType::Snell,
            group: group.to_string(),
            remark: remark.to_string(),
            hostname: server.to_string(),
            port,
            password: Some(password.to_string()),
            obfs: opt(obfs),
            host: opt(host),
            snell_version: version,
            udp,
            tcp_fast_open: tfo,
            allow_insecure: scv,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ss_construct_defaults() {
        let node = Proxy::ss_construct(
            SS_DEFAULT_GROUP,
            "Test",
            "example.com",
            8388,
            "password",
            "aes-256-gcm",
            "",
            "",
            None,
            None,
            None,
            None,
        );
        assert_eq!(node.proxy_type, ProxyType::Shadowsocks);
        assert_eq!(node.group, SS_DEFAULT_GROUP);
        assert_eq!(node.port, 8388);
        assert!(node.plugin.is_none());
        assert!(node.udp.is_none());
    }

    #[test]
    fn test_vmess_construct_fills_defaults() {
        let node = Proxy::vmess_construct(
            V2RAY_DEFAULT_GROUP,
            "VMess",
            "example.com",
            443,
            "",
            "uuid",
            0,
            "",
            "",
            "/ws",
            "host.example.com",
            "",
            "tls",
            "",
            None,
            None,
            None,
            None,
        );
        assert_eq!(node.transfer_protocol.as_deref(), Some("tcp"));
        assert_eq!(node.encrypt_method.as_deref(), Some("auto"));
        assert!(node.tls_secure);
    }
}
