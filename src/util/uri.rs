use std::sync::OnceLock;

use regex::Regex;
use url::Url;

/// URI schemes allowed to survive [`make_safe_absolute_uri`].
pub const ACCEPTABLE_URI_SCHEMES: &[&str] = &[
    "file", "ftp", "gopher", "h323", "hdl", "http", "https", "imap", "magnet", "mailto", "mms",
    "news", "nntp", "prospero", "rsync", "rtsp", "rtspu", "sftp", "shttp", "sip", "sips", "snews",
    "svn", "svn+ssh", "telnet", "wais",
    // Common but unofficial
    "aim", "callto", "cvs", "facetime", "feed", "git", "gtalk", "irc", "ircs", "irc6", "itms",
    "msnim", "skype", "ssh", "smb", "ymsg",
];

static URI_FIXER_RE: OnceLock<Regex> = OnceLock::new();

fn uri_fixer_regex() -> &'static Regex {
    URI_FIXER_RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z][A-Za-z0-9+\-.]*://)/*").expect("Failed to compile URI fixer regex")
    })
}

/// Returns the lowercased scheme of `uri`, or `""` when it has none.
pub fn scheme_of(uri: &str) -> String {
    let Some((scheme, _)) = uri.split_once(':') else {
        return String::new();
    };
    let mut chars = scheme.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if valid {
        scheme.to_ascii_lowercase()
    } else {
        String::new()
    }
}

/// Resolves `uri` against `base`.
///
/// Extra slashes after `scheme://` are collapsed first. URIs that already
/// carry a scheme are returned as written; unparseable bases leave `uri`
/// unchanged.
///
/// # Examples
///
/// ```
/// use feedparse::util::urljoin;
///
/// assert_eq!(urljoin("http://example.com/feed/", "item/1"), "http://example.com/feed/item/1");
/// assert_eq!(urljoin("http://example.com/feed/", "/root"), "http://example.com/root");
/// assert_eq!(urljoin("", "relative"), "relative");
/// assert_eq!(urljoin("http://a/", "http:////b/c"), "http://b/c");
/// ```
pub fn urljoin(base: &str, uri: &str) -> String {
    let uri = uri_fixer_regex().replace(uri, "$1");
    if base.is_empty() {
        return uri.into_owned();
    }
    if uri.is_empty() {
        return base.to_owned();
    }
    if !scheme_of(&uri).is_empty() {
        return uri.into_owned();
    }
    match Url::parse(base).and_then(|b| b.join(&uri)) {
        Ok(joined) => joined.into(),
        Err(_) => uri.into_owned(),
    }
}

/// Resolves `rel` against `base`, returning `""` when the result uses a
/// scheme outside [`ACCEPTABLE_URI_SCHEMES`].
///
/// # Arguments
///
/// * `base` - The base URI (may be empty)
/// * `rel` - The reference to resolve; `None` or empty checks `base` alone
///
/// # Examples
///
/// ```
/// use feedparse::util::make_safe_absolute_uri;
///
/// assert_eq!(make_safe_absolute_uri("http://example.com/", Some("a.html")), "http://example.com/a.html");
/// assert_eq!(make_safe_absolute_uri("http://example.com/", Some("javascript:alert(1)")), "");
/// assert_eq!(make_safe_absolute_uri("", Some("whatever")), "whatever");
/// assert_eq!(make_safe_absolute_uri("javascript:alert(1)", None), "");
/// ```
pub fn make_safe_absolute_uri(base: &str, rel: Option<&str>) -> String {
    let rel = rel.unwrap_or("");
    if base.is_empty() {
        return rel.to_owned();
    }
    if rel.is_empty() {
        let scheme = scheme_of(base);
        return if scheme.is_empty() || ACCEPTABLE_URI_SCHEMES.contains(&scheme.as_str()) {
            base.to_owned()
        } else {
            String::new()
        };
    }
    let uri = urljoin(base, rel);
    let scheme = uri.trim().split(':').next().unwrap_or("");
    if ACCEPTABLE_URI_SCHEMES.contains(&scheme) {
        uri
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_of() {
        assert_eq!(scheme_of("HTTP://example.com"), "http");
        assert_eq!(scheme_of("svn+ssh://host"), "svn+ssh");
        assert_eq!(scheme_of("relative/path"), "");
        assert_eq!(scheme_of("1abc:thing"), "");
    }

    #[test]
    fn test_urljoin_relative_paths() {
        assert_eq!(urljoin("http://example.com/a/b", "c"), "http://example.com/a/c");
        assert_eq!(urljoin("http://example.com/a/b", "../c"), "http://example.com/c");
        assert_eq!(urljoin("http://example.com/a/b", "?q=1"), "http://example.com/a/b?q=1");
    }

    #[test]
    fn test_urljoin_keeps_absolute_uri() {
        assert_eq!(urljoin("http://example.com/", "https://other.org/x"), "https://other.org/x");
        assert_eq!(urljoin("http://example.com/", "mailto:me@example.com"), "mailto:me@example.com");
    }

    #[test]
    fn test_urljoin_empty_uri_returns_base() {
        assert_eq!(urljoin("http://example.com/feed", ""), "http://example.com/feed");
    }

    #[test]
    fn test_safe_uri_rejects_script_schemes() {
        assert_eq!(make_safe_absolute_uri("http://example.com/", Some("javascript:void(0)")), "");
        assert_eq!(make_safe_absolute_uri("http://example.com/", Some("data:text/html,x")), "");
    }

    #[test]
    fn test_safe_uri_accepts_base_without_scheme() {
        assert_eq!(make_safe_absolute_uri("relative/base", None), "relative/base");
        assert_eq!(make_safe_absolute_uri("http://example.com/", None), "http://example.com/");
    }
}
