use base64::{
    alphabet::{STANDARD as STANDARD_ALPHABET, URL_SAFE as URL_SAFE_ALPHABET},
    engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig},
    engine::DecodePaddingMode,
    Engine as _,
};

const NO_PAD: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_encode_padding(false)
    .with_decode_padding_mode(DecodePaddingMode::Indifferent);
const STANDARD_NO_PAD: GeneralPurpose = GeneralPurpose::new(&STANDARD_ALPHABET, NO_PAD);
const URL_SAFE_NO_PAD: GeneralPurpose = GeneralPurpose::new(&URL_SAFE_ALPHABET, NO_PAD);

/// Encodes a string to standard Base64 without padding.
pub fn base64_encode(input: &str) -> String {
    STANDARD_NO_PAD.encode(input)
}

/// Decodes a Base64 string, returning an empty string on invalid input.
/// Whitespace is trimmed first; padding is accepted but not required.
pub fn base64_decode(input: &str) -> String {
    let trimmed = input.trim();
    let decoded = STANDARD_NO_PAD.decode(trimmed).unwrap_or_default();
    String::from_utf8_lossy(&decoded).to_string()
}

/// Encodes a string to URL-safe Base64 without padding.
pub fn url_safe_base64_encode(input: &str) -> String {
    URL_SAFE_NO_PAD.encode(input)
}

/// Decodes a URL-safe Base64 string; falls back to the standard alphabet so
/// subscriptions encoded either way are accepted.
pub fn url_safe_base64_decode(input: &str) -> String {
    let trimmed = input.trim();
    let decoded = URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .unwrap_or_default();
    String::from_utf8_lossy(&decoded).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_roundtrip() {
        assert_eq!(base64_decode(&base64_encode("hello world")), "hello world");
    }

    #[test]
    fn test_url_safe_decode_accepts_standard() {
        let standard = STANDARD_NO_PAD.encode("??>>??");
        assert_eq!(url_safe_base64_decode(&standard), "??>>??");
    }

    #[test]
    fn test_decode_with_padding() {
        assert_eq!(base64_decode("aGVsbG8="), "hello");
        assert_eq!(base64_decode("aGVsbG8"), "hello");
    }

    #[test]
    fn test_decode_invalid_returns_empty() {
        assert_eq!(base64_decode("not valid base64!!"), "");
    }

    #[test]
    fn test_url_safe_roundtrip_ssr_payload() {
        let payload = "example.com:8388:origin:aes-256-gcm:plain:cGFzcw";
        assert_eq!(
            url_safe_base64_decode(&url_safe_base64_encode(payload)),
            payload
        );
    }
}
