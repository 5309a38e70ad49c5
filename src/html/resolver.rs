use super::tokenizer::{preprocess, scan, ScanOptions, TagSink};
use super::{normalize_attrs, MarkupWriter};
use crate::util::make_safe_absolute_uri;

/// `(element, attribute)` pairs whose value is a URI reference.
const RELATIVE_URIS: &[(&str, &str)] = &[
    ("a", "href"),
    ("applet", "codebase"),
    ("area", "href"),
    ("audio", "src"),
    ("blockquote", "cite"),
    ("body", "background"),
    ("del", "cite"),
    ("form", "action"),
    ("frame", "longdesc"),
    ("frame", "src"),
    ("iframe", "longdesc"),
    ("iframe", "src"),
    ("head", "profile"),
    ("img", "longdesc"),
    ("img", "src"),
    ("img", "usemap"),
    ("input", "src"),
    ("input", "usemap"),
    ("ins", "cite"),
    ("link", "href"),
    ("object", "classid"),
    ("object", "codebase"),
    ("object", "data"),
    ("object", "usemap"),
    ("q", "cite"),
    ("script", "src"),
    ("source", "src"),
    ("video", "poster"),
    ("video", "src"),
];

fn is_ascii_ws(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\x0c' | '\r' | ' ')
}

/// Consumes optional whitespace then a `,` or the end of input.
fn candidate_tail(s: &str) -> Option<usize> {
    let ws = s.len() - s.trim_start_matches(is_ascii_ws).len();
    match s[ws..].chars().next() {
        None => Some(ws),
        Some(',') => Some(ws + 1),
        Some(_) => None,
    }
}

/// Matches a `1234w` or `2.5x` descriptor preceded by whitespace.
fn descriptor(s: &str) -> Option<(&str, usize)> {
    let body = s.trim_start_matches(is_ascii_ws);
    let ws = s.len() - body.len();
    if ws == 0 {
        return None;
    }
    let b = body.as_bytes();
    let digits = |from: usize| b[from..].iter().take_while(|c| c.is_ascii_digit()).count();

    let int = digits(0);
    if int == 0 {
        return None;
    }
    if b.get(int) == Some(&b'w') {
        return Some((&body[..=int], ws + int + 1));
    }
    let mut k = int;
    if b.get(k) == Some(&b'.') && digits(k + 1) > 0 {
        k += 1 + digits(k + 1);
    }
    if matches!(b.get(k), Some(b'e' | b'E')) {
        let sign = usize::from(matches!(b.get(k + 1), Some(b'+' | b'-')));
        let exp = digits(k + 1 + sign);
        if exp > 0 {
            k += 1 + sign + exp;
        }
    }
    (b.get(k) == Some(&b'x')).then(|| (&body[..=k], ws + k + 1))
}

/// Splits a `srcset` value into `(url, descriptor)` candidates. Parsing
/// stops at the first malformed candidate.
fn srcset_candidates(value: &str) -> Vec<(&str, &str)> {
    let mut candidates = Vec::new();
    let mut pos = 0;
    'outer: while pos < value.len() {
        let rest = &value[pos..];
        let start = rest.len() - rest.trim_start_matches(is_ascii_ws).len();
        let rest = &rest[start..];
        let token_len = rest.find(is_ascii_ws).unwrap_or(rest.len());
        let token = &rest[..token_len];
        if token.is_empty() || token.starts_with(',') {
            break;
        }
        // Longest URL first; shorter ones may only end right before a comma.
        for end in (1..=token_len).rev() {
            if !token.is_char_boundary(end) || token[..end].ends_with(',') {
                continue;
            }
            if end != token_len && !token[end..].starts_with(',') {
                continue;
            }
            let after = &rest[end..];
            if let Some((desc, used)) = descriptor(after) {
                if let Some(tail) = candidate_tail(&after[used..]) {
                    candidates.push((&token[..end], desc));
                    pos += start + end + used + tail;
                    continue 'outer;
                }
            }
            if let Some(tail) = candidate_tail(after) {
                candidates.push((&token[..end], ""));
                pos += start + end + tail;
                continue 'outer;
            }
        }
        break;
    }
    candidates
}

struct Resolver<'a> {
    base: &'a str,
    writer: MarkupWriter,
}

impl Resolver<'_> {
    fn resolve(&self, uri: &str) -> String {
        make_safe_absolute_uri(self.base, Some(uri.trim()))
    }

    fn resolve_srcset(&self, srcset: &str) -> String {
        srcset_candidates(srcset)
            .into_iter()
            .map(|(uri, desc)| {
                let uri = self.resolve(uri);
                if desc.is_empty() {
                    uri
                } else {
                    format!("{uri} {desc}")
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl TagSink for Resolver<'_> {
    fn start_tag(&mut self, tag: &str, attrs: Vec<(String, String)>) {
        let attrs: Vec<(String, String)> = normalize_attrs(attrs)
            .into_iter()
            .map(|(key, value)| {
                let value = if RELATIVE_URIS.contains(&(tag, key.as_str())) {
                    self.resolve(&value)
                } else if matches!(tag, "img" | "source") && key == "srcset" {
                    self.resolve_srcset(&value)
                } else {
                    value
                };
                (key, value)
            })
            .collect();
        self.writer.start_tag(tag, &attrs);
    }

    fn end_tag(&mut self, tag: &str) {
        self.writer.end_tag(tag);
    }

    fn text(&mut self, text: &str) {
        self.writer.text(text);
    }

    fn char_ref(&mut self, name: &str) {
        self.writer.char_ref(name);
    }

    fn entity_ref(&mut self, name: &str) {
        self.writer.entity_ref(name);
    }

    fn cdata(&mut self, text: &str) {
        self.writer.cdata(text);
    }

    fn comment(&mut self, text: &str) {
        self.writer.comment(text);
    }

    fn pi(&mut self, text: &str) {
        self.writer.pi(text);
    }

    fn declaration(&mut self, text: &str) {
        self.writer.declaration(text);
    }
}

/// Rewrites link-bearing attributes of an HTML fragment to absolute URIs.
///
/// References that resolve to a scheme outside the allow-list are blanked.
///
/// # Examples
///
/// ```
/// use feedparse::html::resolve_relative_uris;
///
/// let html = r#"<a href="/about">About</a>"#;
/// assert_eq!(
///     resolve_relative_uris(html, "http://example.com/blog/", "text/html"),
///     r#"<a href="http://example.com/about">About</a>"#
/// );
/// ```
pub fn resolve_relative_uris(html: &str, base_uri: &str, content_type: &str) -> String {
    let mut resolver = Resolver {
        base: base_uri,
        writer: MarkupWriter::default(),
    };
    let options = ScanOptions {
        xhtml: content_type == "application/xhtml+xml",
        swallow_bad_comments: false,
    };
    scan(&preprocess(html), options, &mut resolver);
    resolver.writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BASE: &str = "http://example.com/feed/";

    #[test]
    fn test_resolves_known_attributes_only() {
        assert_eq!(
            resolve_relative_uris(r#"<img src="a.png" alt="a.png">"#, BASE, "text/html"),
            r#"<img alt="a.png" src="http://example.com/feed/a.png" />"#
        );
    }

    #[test]
    fn test_blanks_unsafe_schemes() {
        assert_eq!(
            resolve_relative_uris(r#"<a href="javascript:go()">x</a>"#, BASE, "text/html"),
            r#"<a href="">x</a>"#
        );
    }

    #[test]
    fn test_keeps_text_and_comments() {
        assert_eq!(
            resolve_relative_uris("a <!-- b --> &copy; c", BASE, "text/html"),
            "a <!-- b --> &copy; c"
        );
    }

    #[test]
    fn test_srcset_candidates() {
        assert_eq!(
            srcset_candidates("/foo.jpg, /foo.2x.jpg 2x"),
            vec![("/foo.jpg", ""), ("/foo.2x.jpg", "2x")]
        );
        assert_eq!(srcset_candidates("a.png 100w,b.png 1.5x"), vec![("a.png", "100w"), ("b.png", "1.5x")]);
        assert_eq!(srcset_candidates(""), Vec::<(&str, &str)>::new());
        assert_eq!(srcset_candidates(", a.png"), Vec::<(&str, &str)>::new());
    }

    #[test]
    fn test_resolves_srcset() {
        assert_eq!(
            resolve_relative_uris(r#"<img srcset="a.png, b.png 2x">"#, BASE, "text/html"),
            r#"<img srcset="http://example.com/feed/a.png, http://example.com/feed/b.png 2x" />"#
        );
    }
}
