//! Integration tests for whole-document parsing through the public API.
//!
//! Covers encoding resolution as seen on the result, the strict/loose/JSON
//! fallback chain, alias behavior of the returned dictionaries, and the
//! properties that must hold for arbitrary input.

use feedparse::{parse, BozoError, Capabilities, FeedParser, FeedParserDict, ParseOptions, Value};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

const ATOM_MINIMAL: &str = "<feed><title>T</title><entry><id>1</id><title>E</title></entry></feed>";

fn utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

fn with_headers(headers: &[(&str, &str)]) -> FeedParser {
    let mut options = ParseOptions::default();
    for (name, value) in headers {
        options.response_headers.insert(name.to_string(), value.to_string());
    }
    FeedParser::new(options)
}

fn loose_only() -> FeedParser {
    FeedParser::default().with_capabilities(Capabilities {
        strict_parser: false,
        charset_detection: true,
    })
}

// ============================================================================
// Encoding Tests
// ============================================================================

#[test]
fn test_bom_wins_over_generic_declaration() {
    let mut data = vec![0xFF, 0xFE];
    data.extend(utf16le(
        "<?xml version='1.0' encoding='utf-16'?><feed xmlns='http://www.w3.org/2005/Atom'><title>T</title></feed>",
    ));

    let result = parse(data);
    assert_eq!(result.encoding.as_deref(), Some("utf-16le"));
    assert_eq!(result.feed.get_str("title"), Some("T"));
    assert!(!result.bozo, "{:?}", result.bozo_exception);
}

#[test]
fn test_text_xml_without_charset_is_us_ascii() {
    let doc = "<?xml version='1.0' encoding='koi8-r'?><rss version='2.0'><channel><title>Plain</title></channel></rss>";
    let result = with_headers(&[("Content-Type", "text/xml")]).parse(doc.as_bytes());
    assert_eq!(result.encoding.as_deref(), Some("us-ascii"));
    assert!(!result.bozo, "{:?}", result.bozo_exception);
    assert_eq!(result.feed.get_str("title"), Some("Plain"));
}

#[test]
fn test_gb2312_decodes_as_gb18030() {
    let doc = "<?xml version=\"1.0\" encoding=\"gb2312\"?><rss version=\"2.0\"><channel><title>中文频道</title></channel></rss>";
    let (bytes, _, _) = encoding_rs::GB18030.encode(doc);

    let result = parse(bytes.into_owned());
    assert_eq!(result.encoding.as_deref(), Some("gb18030"));
    assert_eq!(result.feed.get_str("title"), Some("中文频道"));
    assert!(!result.bozo, "{:?}", result.bozo_exception);
}

#[test]
fn test_ebcdic_document_is_decoded() {
    // Bytes of `<?xml version="1.0"?><rss version="2.0"><channel><title>T</title></channel></rss>` in cp037.
    let ascii_to_cp037 = |b: u8| -> u8 {
        match b {
            b'<' => 0x4c,
            b'>' => 0x6e,
            b'?' => 0x6f,
            b'/' => 0x61,
            b'=' => 0x7e,
            b'"' => 0x7f,
            b'.' => 0x4b,
            b' ' => 0x40,
            b'0'..=b'9' => 0xf0 + (b - b'0'),
            b'a'..=b'i' => 0x81 + (b - b'a'),
            b'j'..=b'r' => 0x91 + (b - b'j'),
            b's'..=b'z' => 0xa2 + (b - b's'),
            b'A'..=b'I' => 0xc1 + (b - b'A'),
            b'J'..=b'R' => 0xd1 + (b - b'J'),
            b'S'..=b'Z' => 0xe2 + (b - b'S'),
            other => panic!("no cp037 mapping for {other:#x}"),
        }
    };
    let doc = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>T</title></channel></rss>"#;
    let data: Vec<u8> = doc.bytes().map(ascii_to_cp037).collect();
    assert_eq!(&data[..4], &[0x4c, 0x6f, 0xa7, 0x94]);

    let result = parse(data);
    assert_eq!(result.encoding.as_deref(), Some("cp037"));
    assert_eq!(result.version.as_deref(), Some("rss20"));
    assert_eq!(result.feed.get_str("title"), Some("T"));
    assert!(!result.bozo, "{:?}", result.bozo_exception);
}

#[test]
fn test_non_xml_content_type_is_bozo_but_parsed() {
    let result = with_headers(&[("content-type", "text/plain")]).parse(ATOM_MINIMAL.as_bytes());
    assert!(result.bozo);
    assert_eq!(result.bozo_exception.as_ref().map(BozoError::kind), Some("NonXMLContentType"));
    assert_eq!(result.feed.get_str("title"), Some("T"));
}

// ============================================================================
// Parser Selection Tests
// ============================================================================

#[test]
fn test_minimal_atom_strict_and_loose_agree() {
    let strict = parse(ATOM_MINIMAL.as_bytes());
    let loose = loose_only().parse(ATOM_MINIMAL.as_bytes());

    for result in [&strict, &loose] {
        assert_eq!(result.feed.get_str("title"), Some("T"));
        assert_eq!(result.entries.len(), 1);
        assert_eq!(result.entries[0].get_str("id"), Some("1"));
        assert_eq!(result.entries[0].get_str("title"), Some("E"));
    }
    assert!(!strict.bozo, "{:?}", strict.bozo_exception);
    assert!(!loose.bozo, "{:?}", loose.bozo_exception);
    assert_eq!(strict.version, loose.version);
}

#[test]
fn test_unbalanced_markup_is_recovered() {
    let doc = r#"<rss version="2.0"><channel><title>Hello</title><a><b>text</a><item><title>One</title></item></channel></rss>"#;
    let result = parse(doc.as_bytes());
    assert!(result.bozo);
    assert_eq!(result.bozo_exception.as_ref().map(BozoError::kind), Some("XMLParseError"));
    assert_eq!(result.version.as_deref(), Some("rss20"));
    assert_eq!(result.feed.get_str("title"), Some("Hello"));
    assert_eq!(result.entries.len(), 1);
    assert_eq!(result.entries[0].get_str("title"), Some("One"));
}

#[test]
fn test_undeclared_prefix_demotes_to_loose() {
    let doc = r#"<rss version="2.0"><channel><title>T</title><foo:bar>x</foo:bar></channel></rss>"#;
    let result = parse(doc.as_bytes());
    assert!(result.bozo);
    assert_eq!(result.bozo_exception.as_ref().map(BozoError::kind), Some("UndeclaredNamespace"));
    assert_eq!(result.feed.get_str("title"), Some("T"));
}

#[test]
fn test_brace_body_routes_to_json() {
    let doc = br#"{"version": "https://jsonfeed.org/version/1.1", "title": "J", "items": [{"id": "1", "title": "x"}]}"#;
    let result = parse(&doc[..]);
    assert!(!result.bozo, "{:?}", result.bozo_exception);
    assert_eq!(result.version.as_deref(), Some("json11"));
    assert_eq!(result.feed.get_str("title"), Some("J"));
    assert_eq!(result.entries[0].get_str("title"), Some("x"));
    assert!(result.namespaces.is_empty());
}

#[test]
fn test_json_without_version_is_generic() {
    let result = parse(&br#"{"title": "J", "items": []}"#[..]);
    assert_eq!(result.version.as_deref(), Some("json"));
    assert!(!result.bozo, "{:?}", result.bozo_exception);
}

#[test]
fn test_empty_document() {
    let result = parse("");
    assert!(!result.bozo);
    assert_eq!(result.version, None);
    assert!(result.entries.is_empty());
}

#[test]
fn test_rss_versions_and_namespaces() {
    let doc = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns="http://purl.org/rss/1.0/" xmlns:dc="http://purl.org/dc/elements/1.1/">
<channel><title>R</title></channel>
<item><title>I</title><dc:creator>Ann</dc:creator></item></rdf:RDF>"#;
    let result = parse(doc.as_bytes());
    assert!(!result.bozo, "{:?}", result.bozo_exception);
    assert_eq!(result.version.as_deref(), Some("rss10"));
    assert_eq!(
        result.namespaces.get("dc").map(String::as_str),
        Some("http://purl.org/dc/elements/1.1/")
    );
    assert_eq!(result.entries[0].get_str("author"), Some("Ann"));
}

#[test]
fn test_netscape_doctype_sets_rss091n() {
    let doc = r#"<?xml version="1.0"?>
<!DOCTYPE rss PUBLIC "-//Netscape Communications//DTD RSS 0.91//EN" "http://my.netscape.com/publish/formats/rss-0.91.dtd">
<rss version="0.91"><channel><title>N</title></channel></rss>"#;
    let result = parse(doc.as_bytes());
    assert_eq!(result.version.as_deref(), Some("rss091n"));
    assert_eq!(result.feed.get_str("title"), Some("N"));
}

// ============================================================================
// Result Dictionary Tests
// ============================================================================

#[test]
fn test_description_reads_summary_but_not_the_reverse() {
    let doc = r#"<rss version="2.0"><channel><item><description>Body</description></item></channel></rss>"#;
    let result = parse(doc.as_bytes());
    let entry = &result.entries[0];
    assert_eq!(entry.get_str("summary"), Some("Body"));
    assert_eq!(entry.get_str("description"), Some("Body"));

    let raw: FeedParserDict = [("description", Value::from("d"))].into_iter().collect();
    assert_eq!(raw.get_str("description"), Some("d"));
    assert_eq!(raw.get_str("summary"), None);
}

#[test]
fn test_guid_and_channel_aliases() {
    let doc = r#"<rss version="2.0"><channel><title>C</title><item><guid>urn:x</guid></item></channel></rss>"#;
    let result = parse(doc.as_bytes());
    assert_eq!(result.entries[0].get_str("guid"), Some("urn:x"));
    assert_eq!(result.entries[0].get_str("id"), Some("urn:x"));
}

#[test]
fn test_result_serializes_to_json() {
    let result = parse(r#"<rss version="2.0"><channel><title>S</title></channel></rss>"#);
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["feed"]["title"], "S");
    assert_eq!(json["version"], "rss20");
    assert_eq!(json["bozo"], false);
    assert!(json["bozo_exception"].is_null());
    assert!(json.get("status").is_none());
}

// ============================================================================
// Property Tests
// ============================================================================

fn fragment() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![
        "<rss version=\"2.0\">",
        "<channel>",
        "</channel>",
        "<item>",
        "</item>",
        "<title>",
        "</title>",
        "<feed xmlns=\"http://www.w3.org/2005/Atom\">",
        "<entry>",
        "</entry>",
        "<link href=\"/a\"/>",
        "<description><![CDATA[<b>x</b>]]></description>",
        "<a><b>text</a>",
        "&amp;",
        "&nbsp;",
        "&#x41;",
        "<foo:bar>",
        "</foo:bar>",
        "text",
        "<!DOCTYPE rss [<!ENTITY e \"v\">]>",
        "{",
        "\u{e9}",
    ])
}

proptest! {
    #[test]
    fn test_parse_is_idempotent_on_bytes(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let first = parse(data.clone());
        let second = parse(data);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn test_parse_is_idempotent_on_markup(parts in prop::collection::vec(fragment(), 0..40)) {
        let doc = parts.concat();
        let first = parse(doc.as_bytes());
        let second = parse(doc.as_bytes());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn test_bozo_always_has_exception(parts in prop::collection::vec(fragment(), 0..40)) {
        let result = parse(parts.concat());
        prop_assert_eq!(result.bozo, result.bozo_exception.is_some());
    }
}
