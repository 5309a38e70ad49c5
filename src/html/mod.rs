//! HTML processing collaborators.
//!
//! Both processors run the tolerant [`tokenizer`] over a fragment and
//! re-serialize it through a [`MarkupWriter`]:
//!
//! - [`sanitize_html`] drops elements, attributes, CSS and URI schemes that
//!   are not on its allow-lists
//! - [`resolve_relative_uris`] rewrites link-bearing attributes against a
//!   base URI
//!
//! The same tokenizer drives the loose feed parser.

mod entities;
mod resolver;
mod sanitizer;
pub(crate) mod tokenizer;

pub use entities::{lookup_entity, CP1252};
pub use resolver::resolve_relative_uris;
pub use sanitizer::{is_acceptable_element, sanitize_html};

use entities::is_cp1252_remapped;

/// Elements serialized as `<tag />` with no end tag.
pub const ELEMENTS_NO_END_TAG: &[&str] = &[
    "area", "base", "basefont", "br", "col", "command", "embed", "frame", "hr", "img", "input",
    "isindex", "keygen", "link", "meta", "param", "source", "track", "wbr",
];

/// Lowercases attribute names, drops duplicates (last one wins), lowercases
/// `rel`/`type` values and sorts by name.
pub(crate) fn normalize_attrs(attrs: Vec<(String, String)>) -> Vec<(String, String)> {
    let mut map = std::collections::BTreeMap::new();
    for (key, value) in attrs {
        let key = key.to_lowercase();
        let value = if key == "rel" || key == "type" { value.to_lowercase() } else { value };
        map.insert(key, value);
    }
    map.into_iter().collect()
}

/// Escapes an attribute value for double-quoted output. Ampersands that do
/// not start a character or entity reference become `&amp;`.
fn escape_attr_value(value: &str) -> String {
    let value = value.replace('>', "&gt;").replace('<', "&lt;").replace('"', "&quot;");
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.char_indices() {
        if c == '&' && !starts_reference(&value[i + 1..]) {
            out.push_str("&amp;");
        } else {
            out.push(c);
        }
    }
    out
}

fn starts_reference(after_amp: &str) -> bool {
    let terminated = |body: &str, pred: fn(char) -> bool| {
        let len = body.find(|c: char| !pred(c)).unwrap_or(body.len());
        len > 0 && body[len..].starts_with(';')
    };
    if let Some(hex) = after_amp.strip_prefix("#x") {
        return terminated(hex, |c| c.is_ascii_hexdigit());
    }
    if let Some(dec) = after_amp.strip_prefix('#') {
        return terminated(dec, |c| c.is_ascii_digit());
    }
    terminated(after_amp, |c| c.is_alphanumeric() || c == '_')
}

/// Accumulates re-serialized markup.
#[derive(Debug, Default)]
pub(crate) struct MarkupWriter {
    pieces: Vec<String>,
}

impl MarkupWriter {
    pub(crate) fn start_tag(&mut self, tag: &str, attrs: &[(String, String)]) {
        let attrs: String = attrs
            .iter()
            .map(|(k, v)| format!(" {}=\"{}\"", k, escape_attr_value(v)))
            .collect();
        if ELEMENTS_NO_END_TAG.contains(&tag) {
            self.pieces.push(format!("<{tag}{attrs} />"));
        } else {
            self.pieces.push(format!("<{tag}{attrs}>"));
        }
    }

    pub(crate) fn end_tag(&mut self, tag: &str) {
        if !ELEMENTS_NO_END_TAG.contains(&tag) {
            self.pieces.push(format!("</{tag}>"));
        }
    }

    /// Re-emits a character reference, moving Windows-1252 C1 positions to
    /// the code points they actually stand for.
    pub(crate) fn char_ref(&mut self, name: &str) {
        let name = name.to_lowercase();
        let value = match name.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => name.parse::<u32>().ok(),
        };
        match value {
            Some(cp) if is_cp1252_remapped(cp) => {
                let mapped = CP1252[(cp - 0x80) as usize] as u32;
                self.pieces.push(format!("&#x{mapped:x};"));
            }
            _ => self.pieces.push(format!("&#{name};")),
        }
    }

    /// Known entities pass through; unknown ones have their `&` escaped.
    pub(crate) fn entity_ref(&mut self, name: &str) {
        if name == "apos" || lookup_entity(name).is_some() {
            self.pieces.push(format!("&{name};"));
        } else {
            self.pieces.push(format!("&amp;{name}"));
        }
    }

    pub(crate) fn text(&mut self, text: &str) {
        self.pieces.push(text.to_owned());
    }

    pub(crate) fn comment(&mut self, text: &str) {
        self.pieces.push(format!("<!--{text}-->"));
    }

    pub(crate) fn pi(&mut self, text: &str) {
        self.pieces.push(format!("<?{text}>"));
    }

    pub(crate) fn declaration(&mut self, text: &str) {
        self.pieces.push(format!("<!{text}>"));
    }

    pub(crate) fn cdata(&mut self, text: &str) {
        self.pieces.push(format!("<![CDATA[{text}]]>"));
    }

    pub(crate) fn finish(self) -> String {
        self.pieces.concat()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_escape_attr_value_keeps_references() {
        assert_eq!(escape_attr_value("a&b"), "a&amp;b");
        assert_eq!(escape_attr_value("a&amp;b"), "a&amp;b");
        assert_eq!(escape_attr_value("&#169; &#xA9;"), "&#169; &#xA9;");
        assert_eq!(escape_attr_value(r#"say "x" <y>"#), "say &quot;x&quot; &lt;y&gt;");
    }

    #[test]
    fn test_writer_void_elements() {
        let mut w = MarkupWriter::default();
        w.start_tag("br", &[]);
        w.end_tag("br");
        w.start_tag("p", &[("class".into(), "x".into())]);
        w.text("hi");
        w.end_tag("p");
        assert_eq!(w.finish(), r#"<br /><p class="x">hi</p>"#);
    }

    #[test]
    fn test_writer_char_refs() {
        let mut w = MarkupWriter::default();
        w.char_ref("150");
        w.char_ref("X41");
        w.char_ref("129");
        assert_eq!(w.finish(), "&#x2013;&#x41;&#129;");
    }

    #[test]
    fn test_writer_entity_refs() {
        let mut w = MarkupWriter::default();
        w.entity_ref("copy");
        w.entity_ref("apos");
        w.entity_ref("bogus");
        assert_eq!(w.finish(), "&copy;&apos;&amp;bogus");
    }

    #[test]
    fn test_normalize_attrs() {
        let attrs = vec![
            ("TYPE".to_owned(), "Text/HTML".to_owned()),
            ("href".to_owned(), "A".to_owned()),
            ("href".to_owned(), "B".to_owned()),
        ];
        assert_eq!(
            normalize_attrs(attrs),
            vec![("href".to_owned(), "B".to_owned()), ("type".to_owned(), "text/html".to_owned())]
        );
    }
}
