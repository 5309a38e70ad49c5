use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

use crate::html::{is_acceptable_element, lookup_entity, CP1252};

/// Escapes `&`, `<` and `>` for use in XML character data.
///
/// # Examples
///
/// ```
/// use feedparse::util::xml_escape;
///
/// assert_eq!(xml_escape("a < b & c"), "a &lt; b &amp; c");
/// assert_eq!(xml_escape("plain"), "plain");
/// ```
pub fn xml_escape(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '>']) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Like [`xml_escape`], additionally escaping `"` for attribute values.
pub fn xml_escape_attr(s: &str) -> Cow<'_, str> {
    let escaped = xml_escape(s);
    if escaped.contains('"') {
        Cow::Owned(escaped.replace('"', "&quot;"))
    } else {
        escaped
    }
}

static CLOSING_TAG_RE: OnceLock<Regex> = OnceLock::new();
static ANY_REF_RE: OnceLock<Regex> = OnceLock::new();
static TAG_NAME_RE: OnceLock<Regex> = OnceLock::new();
static NAMED_REF_RE: OnceLock<Regex> = OnceLock::new();

fn closing_tag_regex() -> &'static Regex {
    CLOSING_TAG_RE.get_or_init(|| Regex::new(r"</(\w+)>").expect("Failed to compile closing tag regex"))
}

fn any_ref_regex() -> &'static Regex {
    ANY_REF_RE.get_or_init(|| Regex::new(r"&#?\w+;").expect("Failed to compile reference regex"))
}

fn tag_name_regex() -> &'static Regex {
    TAG_NAME_RE.get_or_init(|| Regex::new(r"</?(\w+)").expect("Failed to compile tag name regex"))
}

fn named_ref_regex() -> &'static Regex {
    NAMED_REF_RE.get_or_init(|| Regex::new(r"&(\w+);").expect("Failed to compile named reference regex"))
}

/// Guesses whether nominally plain text is really HTML.
///
/// Errs toward "plain text": the content must contain a closing tag or an
/// entity reference, every tag must be on the sanitizer allow-list, and every
/// named entity must be a known HTML entity.
///
/// # Examples
///
/// ```
/// use feedparse::util::looks_like_html;
///
/// assert!(looks_like_html("<b>bold</b>"));
/// assert!(!looks_like_html("It's time to </blink>"));
/// assert!(!looks_like_html("U&IRGR8;)"));
/// assert!(!looks_like_html("2 < 3"));
/// ```
pub fn looks_like_html(content: &str) -> bool {
    if !(closing_tag_regex().is_match(content) || any_ref_regex().is_match(content)) {
        return false;
    }
    let tags_ok = tag_name_regex()
        .captures_iter(content)
        .all(|c| is_acceptable_element(&c[1].to_lowercase()));
    if !tags_ok {
        return false;
    }
    named_ref_regex()
        .captures_iter(content)
        .all(|c| lookup_entity(&c[1]).is_some())
}

/// Maps C1 control characters (U+0080..U+009F) to the characters that
/// Windows-1252 assigns to those bytes.
pub fn translate_cp1252(s: &str) -> Cow<'_, str> {
    if !s.chars().any(|c| ('\u{80}'..='\u{9f}').contains(&c)) {
        return Cow::Borrowed(s);
    }
    s.chars()
        .map(|c| match c as u32 {
            cp @ 0x80..=0x9f => CP1252[(cp - 0x80) as usize],
            _ => c,
        })
        .collect::<String>()
        .into()
}

/// Repairs UTF-8 text that was decoded as Latin-1.
///
/// Returns `None` when the text has no Latin-1 range characters or does not
/// form valid UTF-8 once narrowed back to bytes.
pub fn fix_double_encoded_utf8(s: &str) -> Option<String> {
    if !s.chars().any(|c| c as u32 >= 0x80) {
        return None;
    }
    let bytes = s
        .chars()
        .map(|c| u8::try_from(c as u32).ok())
        .collect::<Option<Vec<u8>>>()?;
    String::from_utf8(bytes).ok()
}

const NUMERIC_MARKUP_REFS: &[(&str, &str)] = &[
    ("&#60;", "&lt;"),
    ("&#x3c;", "&lt;"),
    ("&#x3C;", "&lt;"),
    ("&#62;", "&gt;"),
    ("&#x3e;", "&gt;"),
    ("&#x3E;", "&gt;"),
    ("&#38;", "&amp;"),
    ("&#x26;", "&amp;"),
    ("&#34;", "&quot;"),
    ("&#x22;", "&quot;"),
    ("&#39;", "&apos;"),
    ("&#x27;", "&apos;"),
];

const NAMED_MARKUP_REFS: &[(&str, &str)] = &[
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&amp;", "&"),
    ("&quot;", "\""),
    ("&apos;", "'"),
];

/// Normalizes the markup-significant references the tag-soup scanner leaves
/// in text. Numeric forms become named ones; when `unescape` is set (content
/// that is not XML-typed) the named ones are then expanded.
pub fn decode_markup_entities(data: &str, unescape: bool) -> String {
    let mut out = data.to_owned();
    for (from, to) in NUMERIC_MARKUP_REFS {
        if out.contains(from) {
            out = out.replace(from, to);
        }
    }
    if unescape {
        for (from, to) in NAMED_MARKUP_REFS {
            if out.contains(from) {
                out = out.replace(from, to);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_escape_borrowed_when_clean() {
        assert!(matches!(xml_escape("clean text"), Cow::Borrowed(_)));
        assert_eq!(xml_escape("<a&b>"), "&lt;a&amp;b&gt;");
    }

    #[test]
    fn test_xml_escape_attr_quotes() {
        assert_eq!(xml_escape_attr(r#"say "hi" & go"#), "say &quot;hi&quot; &amp; go");
    }

    #[test]
    fn test_looks_like_html_requires_markup_signal() {
        assert!(!looks_like_html("<b>no closing tag"));
        assert!(looks_like_html("fish &amp; chips"));
        assert!(looks_like_html("<p>para</p>"));
    }

    #[test]
    fn test_looks_like_html_rejects_unknown_tags_and_entities() {
        assert!(!looks_like_html("<blink>x</blink>"));
        assert!(!looks_like_html("&bogus; thing"));
    }

    #[test]
    fn test_translate_cp1252() {
        assert_eq!(translate_cp1252("\u{93}quoted\u{94}"), "\u{201c}quoted\u{201d}");
        assert_eq!(translate_cp1252("\u{80}"), "\u{20ac}");
        assert!(matches!(translate_cp1252("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_fix_double_encoded_utf8() {
        // "café" encoded as UTF-8 then read as Latin-1
        assert_eq!(fix_double_encoded_utf8("caf\u{c3}\u{a9}").as_deref(), Some("café"));
        assert_eq!(fix_double_encoded_utf8("plain"), None);
        // Latin-1 text that is not UTF-8 stays untouched
        assert_eq!(fix_double_encoded_utf8("caf\u{e9}"), None);
        // Characters outside Latin-1 cannot be narrowed
        assert_eq!(fix_double_encoded_utf8("\u{2603}"), None);
    }

    #[test]
    fn test_decode_markup_entities() {
        assert_eq!(decode_markup_entities("&#60;b&#62;", false), "&lt;b&gt;");
        assert_eq!(decode_markup_entities("&#60;b&#62; &amp;", true), "<b> &");
    }
}
