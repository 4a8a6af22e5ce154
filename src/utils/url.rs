//! URL helpers shared by parsers and emitters.

/// Percent-decode a string, tolerating malformed input.
pub fn url_decode(input: &str) -> String {
    urlencoding::decode(input)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| input.to_string())
}

/// Percent-encode a string.
pub fn url_encode(input: &str) -> String {
    urlencoding::encode(input).into_owned()
}

/// Extract one argument from a query-ish string (`a=1&b=2` or plugin-opts
/// style `a=1;b=2` pre-normalised to `&`).
pub fn get_url_arg(query: &str, key: &str) -> String {
    for pair in query.split('&') {
        if let Some((k, v)) = pair.split_once('=') {
            if k == key {
                return v.to_string();
            }
        }
    }
    String::new()
}

/// Whether a link points at something the fetcher can retrieve remotely.
pub fn is_link(link: &str) -> bool {
    link.starts_with("http://") || link.starts_with("https://") || link.starts_with("data:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_decode() {
        assert_eq!(url_decode("a%20b%7Cc"), "a b|c");
        assert_eq!(url_decode("plain"), "plain");
    }

    #[test]
    fn test_get_url_arg() {
        assert_eq!(get_url_arg("obfs=http;obfs-host=x", "obfs"), "");
        assert_eq!(get_url_arg("obfs=http&obfs-host=x", "obfs"), "http");
        assert_eq!(get_url_arg("obfs=http&obfs-host=x", "obfs-host"), "x");
        assert_eq!(get_url_arg("a=1", "b"), "");
    }

    #[test]
    fn test_is_link() {
        assert!(is_link("https://example.com/sub"));
        assert!(is_link("data:text/plain;base64,aGk"));
        assert!(!is_link("ss://abc"));
        assert!(!is_link("/tmp/nodes.txt"));
    }
}
