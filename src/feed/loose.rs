//! Loose adapter: drives [`ParserState`] from the tag-soup scanner.
//!
//! Never fails. Unbalanced markup is reported to the state as it is found
//! and the state's stack guard discards closing tags that do not match.

use super::state::ParserState;
use crate::html::tokenizer::{preprocess, scan, ScanOptions, TagSink};
use crate::util::xml_escape;

/// Parses `data` into `state`.
pub(crate) fn parse(data: &str, state: &mut ParserState) {
    let data = preprocess(data);
    scan(&data, ScanOptions::default(), &mut Sink { state });
}

struct Sink<'a> {
    state: &'a mut ParserState,
}

impl TagSink for Sink<'_> {
    fn start_tag(&mut self, tag: &str, attrs: Vec<(String, String)>) {
        self.state.start_element(tag, attrs);
    }

    fn end_tag(&mut self, tag: &str) {
        self.state.end_element(tag);
    }

    fn text(&mut self, text: &str) {
        self.state.text(text);
    }

    fn char_ref(&mut self, name: &str) {
        self.state.char_ref(name);
    }

    fn entity_ref(&mut self, name: &str) {
        self.state.entity_ref(name);
    }

    /// CDATA sections keep their markup as escaped text.
    fn cdata(&mut self, text: &str) {
        self.state.raw_text(&xml_escape(text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::state::{Mode, ParsedFeed, StateOptions};
    use pretty_assertions::assert_eq;

    fn run(data: &str) -> ParsedFeed {
        let options = StateOptions {
            encoding: "utf-8".into(),
            resolve_relative_uris: true,
            sanitize_html: true,
            ..Default::default()
        };
        let mut state = ParserState::new(Mode::Loose, options);
        parse(data, &mut state);
        state.finish()
    }

    #[test]
    fn test_minimal_atom() {
        let parsed = run("<feed><title>T</title><entry><id>1</id><title>E</title></entry></feed>");
        assert_eq!(parsed.feed.get_str("title"), Some("T"));
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].get_str("id"), Some("1"));
        assert_eq!(parsed.entries[0].get_str("title"), Some("E"));
    }

    #[test]
    fn test_unbalanced_markup_still_yields_feed() {
        let parsed = run("<rss version=\"2.0\"><channel><title>Hello</title><a><b>text</a><item><title>One</title></item>");
        assert_eq!(parsed.version, "rss20");
        assert_eq!(parsed.feed.get_str("title"), Some("Hello"));
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].get_str("title"), Some("One"));
    }

    #[test]
    fn test_cdata_markup_is_preserved() {
        let parsed = run(
            "<rss version=\"2.0\"><channel><item><description><![CDATA[<p>Hi &amp; bye</p>]]></description></item></channel></rss>",
        );
        assert_eq!(parsed.entries[0].get_str("summary"), Some("<p>Hi &amp; bye</p>"));
    }

    #[test]
    fn test_named_entities_in_text() {
        let parsed = run("<rss version=\"2.0\"><channel><title>Caf&eacute; &copy; 2024</title></channel></rss>");
        assert_eq!(parsed.feed.get_str("title"), Some("Café © 2024"));
    }

    #[test]
    fn test_undeclared_prefix_is_tolerated() {
        let parsed = run("<rss version=\"2.0\"><channel><foo:bar>x</foo:bar><title>T</title></channel></rss>");
        assert_eq!(parsed.feed.get_str("title"), Some("T"));
        assert_eq!(parsed.feed.get_str("foo_bar"), Some("x"));
    }

    #[test]
    fn test_attribute_ampersands_are_unescaped() {
        let parsed = run(
            "<rss version=\"2.0\"><channel><item><enclosure url=\"http://example.com/a?x=1&amp;y=2\" type=\"audio/mpeg\" length=\"10\"/></item></channel></rss>",
        );
        let enclosures = parsed.entries[0].enclosures();
        assert_eq!(enclosures[0].get_str("href"), Some("http://example.com/a?x=1&y=2"));
    }
}
