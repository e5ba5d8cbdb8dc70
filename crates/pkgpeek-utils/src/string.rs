use percent_encoding::percent_decode_str;

/// Decodes `%XX` escapes into the bytes they stand for.
///
/// Malformed escapes are copied through untouched and invalid UTF-8 is replaced with the
/// Unicode replacement character.
///
/// # Examples
///
/// ```
/// use pkgpeek_utils::string::decode_uri;
///
/// assert_eq!(decode_uri("Assets/Store%20Logo.png"), "Assets/Store Logo.png");
/// ```
pub fn decode_uri(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_uri() {
        assert_eq!(decode_uri("plain/path.png"), "plain/path.png");
        assert_eq!(decode_uri("a%20b"), "a b");
        assert_eq!(decode_uri("caf%C3%A9"), "café");
        assert_eq!(decode_uri("100%"), "100%");
        assert_eq!(decode_uri("bad%zzescape"), "bad%zzescape");
        assert_eq!(decode_uri("%2"), "%2");
    }
}
