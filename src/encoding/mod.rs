//! Encoding Resolver.
//!
//! Works out which character encoding a feed document is really in and
//! re-encodes it as UTF-8. The decision combines, in RFC 3023 order, the
//! HTTP `Content-Type` header, the byte-order mark, the XML declaration and
//! (optionally) statistical detection, then walks a fixed chain of fallback
//! encodings until one decodes the bytes.
//!
//! [`convert_to_utf8`] works on a whole buffer; [`convert_stream_to_utf8`]
//! decides from a bounded prefix and decodes the rest lazily.

mod codec;
mod sniff;
mod stream;

use std::sync::OnceLock;

use regex::Regex;

use crate::error::BozoError;
use crate::Headers;

pub use codec::{codec_for, Codec, StreamDecoder};
pub use sniff::{sniff, sniff_bom, Sniffed};
pub use stream::{
    convert_stream_to_utf8, convert_text, Utf8Document, Utf8Reader, PREFIX_LEN, TEXT_PREFIX_LEN,
};

/// `Content-Type` reported for documents routed to the JSON parser.
pub const JSON_FEED_CONTENT_TYPE: &str = "application/feed+json";

const APPLICATION_XML_TYPES: &[&str] = &[
    "application/xml",
    "application/xml-dtd",
    "application/xml-external-parsed-entity",
];
const TEXT_XML_TYPES: &[&str] = &["text/xml", "text/xml-external-parsed-entity"];
const JSON_TYPES: &[&str] = &[JSON_FEED_CONTENT_TYPE, "application/json"];

const UTF8_DECLARATION: &str = "<?xml version='1.0' encoding='utf-8'?>";

/// Outcome of resolving a document's encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    /// The document as UTF-8, or the input bytes (BOM stripped) when no
    /// encoding could decode them.
    pub data: Vec<u8>,
    /// Encoding that decoded the document; empty when none did.
    pub encoding: String,
    /// Media type from the headers, without parameters. JSON documents
    /// always report [`JSON_FEED_CONTENT_TYPE`].
    pub content_type: String,
    pub error: Option<BozoError>,
}

impl Conversion {
    pub fn is_json(&self) -> bool {
        self.content_type == JSON_FEED_CONTENT_TYPE
    }

    pub fn is_known(&self) -> bool {
        !self.encoding.is_empty()
    }
}

/// Splits a `Content-Type` value into its lowercased media type and the
/// `charset` parameter (quotes removed).
///
/// # Examples
///
/// ```
/// use feedparse::encoding::parse_content_type;
///
/// assert_eq!(
///     parse_content_type(r#"Text/XML; charset="UTF-8""#),
///     ("text/xml".to_string(), "utf-8".to_string())
/// );
/// assert_eq!(parse_content_type(""), (String::new(), String::new()));
/// ```
pub fn parse_content_type(line: &str) -> (String, String) {
    let mut parts = line.split(';');
    let media_type = parts.next().unwrap_or_default().trim().to_lowercase();
    let charset = parts
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim().trim_matches(|c| c == '"' || c == '\'').to_lowercase())
        .unwrap_or_default();
    (media_type, charset)
}

/// How a media type constrains the encoding decision.
struct Classification {
    /// Encoding RFC 3023 says the document is in.
    declared: String,
    content_type: String,
    acceptable: bool,
}

fn classify(headers: &Headers, body: &[u8], sniffed: &Sniffed) -> Classification {
    let raw = headers.get("content-type").map(String::as_str).unwrap_or_default();
    let (content_type, charset) = parse_content_type(raw);
    let charset = Some(charset).filter(|c| !c.is_empty());
    // A sniffed byte order stands in for a missing declaration.
    let in_document = sniffed
        .xml_encoding
        .clone()
        .or_else(|| sniffed.bom_encoding.map(str::to_owned));

    let (declared, content_type, acceptable) = if APPLICATION_XML_TYPES.contains(&content_type.as_str())
        || (content_type.starts_with("application/") && content_type.ends_with("+xml"))
    {
        let declared = charset.or(in_document).unwrap_or_else(|| "utf-8".into());
        (declared, content_type, true)
    } else if TEXT_XML_TYPES.contains(&content_type.as_str())
        || (content_type.starts_with("text/") && content_type.ends_with("+xml"))
    {
        (charset.unwrap_or_else(|| "us-ascii".into()), content_type, true)
    } else if JSON_TYPES.contains(&content_type.as_str())
        || (content_type.is_empty() && body.trim_ascii_start().starts_with(b"{"))
    {
        let declared = charset.unwrap_or_else(|| "utf-8".into());
        (declared, JSON_FEED_CONTENT_TYPE.to_owned(), true)
    } else if content_type.starts_with("text/") {
        (charset.unwrap_or_else(|| "us-ascii".into()), content_type, false)
    } else if !headers.is_empty() && !headers.contains_key("content-type") {
        (in_document.unwrap_or_else(|| "iso-8859-1".into()), content_type, false)
    } else {
        (in_document.unwrap_or_else(|| "utf-8".into()), content_type, false)
    };

    Classification {
        declared: normalize_gb2312(declared),
        content_type,
        acceptable,
    }
}

fn normalize_gb2312(encoding: String) -> String {
    if encoding == "gb2312" {
        "gb18030".to_owned()
    } else {
        encoding
    }
}

fn detect_charset(data: &[u8]) -> String {
    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(data, true);
    detector.guess(None, true).name().to_lowercase()
}

static XML_DECLARATION_RE: OnceLock<Regex> = OnceLock::new();

fn xml_declaration_regex() -> &'static Regex {
    XML_DECLARATION_RE.get_or_init(|| Regex::new(r"^<\?xml[^>]*?>").expect("Failed to compile XML declaration regex"))
}

/// Replaces the XML declaration with one naming UTF-8, adding it when the
/// document has none.
pub fn rewrite_declaration(text: &str) -> String {
    if xml_declaration_regex().is_match(text) {
        xml_declaration_regex().replace(text, UTF8_DECLARATION).into_owned()
    } else {
        format!("{UTF8_DECLARATION}\n{text}")
    }
}

/// Resolves the encoding of a whole document and re-encodes it as UTF-8.
///
/// Candidates are tried in order: the RFC 3023 encoding, the XML-declared
/// encoding, the BOM encoding, a statistical guess (when `detect` is
/// set), then `utf-8`, `windows-1252` and `iso-8859-2`. The first that
/// decodes wins.
///
/// # Errors recorded
///
/// - `NonXmlContentType` when headers were given but did not name an XML or
///   JSON media type
/// - `CharacterEncodingOverride` when the winning encoding is not the one
///   RFC 3023 picked
/// - `CharacterEncodingUnknown` when nothing decodes; `encoding` is then
///   empty and `data` holds the undecoded bytes
pub fn convert_to_utf8(headers: &Headers, data: &[u8], detect: bool) -> Conversion {
    let sniffed = sniff(data);
    let body = &data[sniffed.bom_len..];
    let class = classify(headers, body, &sniffed);
    let xml_encoding = sniffed.xml_encoding.clone().map(normalize_gb2312);
    let json = class.content_type == JSON_FEED_CONTENT_TYPE;

    let mut error = None;
    if !headers.is_empty() && !class.acceptable {
        let message = match headers.get("content-type") {
            Some(raw) => format!("{raw} is not an accepted media type"),
            None => "no Content-type specified".to_owned(),
        };
        error = Some(BozoError::NonXmlContentType(message));
    }

    let mut tried: Vec<String> = Vec::new();
    let mut decoded: Option<(String, String)> = None;
    let sniffed_names = [
        Some(class.declared.clone()),
        xml_encoding.clone(),
        sniffed.bom_encoding.map(str::to_owned),
    ];
    let detected = std::iter::once_with(|| detect.then(|| detect_charset(body)));
    let fallbacks = ["utf-8", "windows-1252", "iso-8859-2"].map(|e| Some(e.to_owned()));
    let candidates = sniffed_names.into_iter().chain(detected).chain(fallbacks);

    for proposed in candidates.flatten() {
        if proposed.is_empty() || tried.contains(&proposed) {
            continue;
        }
        tried.push(proposed.clone());
        let Some(text) = codec_for(&proposed).and_then(|codec| codec.decode(body)) else { continue };
        decoded = Some((proposed, text));
        break;
    }

    let Some((proposed, text)) = decoded else {
        let message = format!(
            "document encoding unknown, I tried {}, {}, utf-8, windows-1252, and iso-8859-2 but nothing worked",
            class.declared,
            xml_encoding.as_deref().unwrap_or_default()
        );
        tracing::debug!(declared = %class.declared, "no encoding could decode the document");
        return Conversion {
            data: body.to_vec(),
            encoding: String::new(),
            content_type: class.content_type,
            error: Some(BozoError::CharacterEncodingUnknown(message)),
        };
    };

    if proposed != class.declared {
        tracing::debug!(declared = %class.declared, actual = %proposed, "encoding override");
        error = Some(BozoError::CharacterEncodingOverride(format!(
            "document declared as {}, but parsed as {}",
            class.declared, proposed
        )));
    }

    let text = if json { text } else { rewrite_declaration(&text) };
    Conversion {
        data: text.into_bytes(),
        encoding: proposed,
        content_type: class.content_type,
        error,
    }
}
