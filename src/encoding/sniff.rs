//! Byte-order mark and XML declaration sniffing.

use std::sync::OnceLock;

use regex::bytes::Regex;

use super::codec::codec_for;

/// Encoding labels too generic to carry byte order. When the document
/// declares one of these, the encoding implied by its first bytes is used.
const GENERIC_ALIASES: &[&str] = &[
    "u16",
    "utf-16",
    "utf16",
    "utf_16",
    "u32",
    "utf-32",
    "utf32",
    "utf_32",
    "iso-10646-ucs-2",
    "iso-10646-ucs-4",
    "csucs4",
    "csunicode",
    "ucs-2",
    "ucs-4",
];

/// What the first bytes of a document say about its encoding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sniffed {
    /// Encoding implied by a byte-order mark or a `<?xm` pattern.
    pub bom_encoding: Option<&'static str>,
    /// Length of the byte-order mark to strip.
    pub bom_len: usize,
    /// Lowercased `encoding` pseudo-attribute of the XML declaration.
    pub xml_encoding: Option<String>,
}

/// Inspects the leading bytes of `data` for a byte-order mark or the
/// bytes of `<?xm` in a multi-byte encoding.
pub fn sniff_bom(data: &[u8]) -> (Option<&'static str>, usize) {
    let guard_zeroes = |d: &[u8]| d.get(2..4) != Some(&[0, 0][..]);
    if data.starts_with(&[0x00, 0x00, 0xfe, 0xff]) {
        (Some("utf-32be"), 4)
    } else if data.starts_with(&[0xff, 0xfe, 0x00, 0x00]) {
        (Some("utf-32le"), 4)
    } else if data.starts_with(&[0xfe, 0xff]) && guard_zeroes(data) {
        (Some("utf-16be"), 2)
    } else if data.starts_with(&[0xff, 0xfe]) && guard_zeroes(data) {
        (Some("utf-16le"), 2)
    } else if data.starts_with(&[0xef, 0xbb, 0xbf]) {
        (Some("utf-8"), 3)
    } else if data.starts_with(&[0x4c, 0x6f, 0xa7, 0x94]) {
        (Some("cp037"), 0)
    } else if data.starts_with(&[0x00, 0x3c, 0x00, 0x3f]) {
        (Some("utf-16be"), 0)
    } else if data.starts_with(&[0x3c, 0x00, 0x3f, 0x00]) {
        (Some("utf-16le"), 0)
    } else if data.starts_with(&[0x00, 0x00, 0x00, 0x3c]) {
        (Some("utf-32be"), 0)
    } else if data.starts_with(&[0x3c, 0x00, 0x00, 0x00]) {
        (Some("utf-32le"), 0)
    } else {
        (None, 0)
    }
}

static XML_PI_ENCODING_RE: OnceLock<Regex> = OnceLock::new();

fn xml_pi_encoding_regex() -> &'static Regex {
    XML_PI_ENCODING_RE.get_or_init(|| {
        Regex::new(r#"(?-u)^<\?.*encoding=['"](.*?)['"].*\?>"#).expect("Failed to compile XML declaration regex")
    })
}

/// Runs both sniffers. `data` is the document with any BOM still attached.
pub fn sniff(data: &[u8]) -> Sniffed {
    let (bom_encoding, bom_len) = sniff_bom(data);
    let body = &data[bom_len..];

    // The declaration is only readable once the multi-byte forms are
    // decoded to something ASCII-compatible.
    let decoded;
    let searchable: &[u8] = match bom_encoding.and_then(codec_for) {
        Some(codec) if bom_encoding != Some("utf-8") => match codec.decode(body) {
            Some(text) => {
                decoded = text;
                decoded.as_bytes()
            }
            None => b"",
        },
        _ => body,
    };

    let xml_encoding = xml_pi_encoding_regex()
        .captures(searchable)
        .and_then(|caps| caps.get(1))
        .map(|m| String::from_utf8_lossy(m.as_bytes()).to_lowercase())
        .filter(|enc| !enc.is_empty())
        .map(|enc| match bom_encoding {
            Some(bom) if GENERIC_ALIASES.contains(&enc.as_str()) => bom.to_owned(),
            _ => enc,
        });

    Sniffed {
        bom_encoding,
        bom_len,
        xml_encoding,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn utf16le(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(u16::to_le_bytes).collect()
    }

    #[test]
    fn test_bom_detection_order() {
        assert_eq!(sniff_bom(&[0xff, 0xfe, 0, 0, b'<']), (Some("utf-32le"), 4));
        assert_eq!(sniff_bom(&[0xff, 0xfe, b'<', 0]), (Some("utf-16le"), 2));
        assert_eq!(sniff_bom(&[0xfe, 0xff, 0, b'<']), (Some("utf-16be"), 2));
        assert_eq!(sniff_bom(b"\xef\xbb\xbf<rss>"), (Some("utf-8"), 3));
        assert_eq!(sniff_bom(b"<rss>"), (None, 0));
    }

    #[test]
    fn test_marker_patterns_are_not_stripped() {
        assert_eq!(sniff_bom(&utf16le("<?xml")), (Some("utf-16le"), 0));
        assert_eq!(sniff_bom(&[0, 0, 0, b'<']), (Some("utf-32be"), 0));
    }

    #[test]
    fn test_declaration_encoding_is_lowercased() {
        let sniffed = sniff(br#"<?xml version="1.0" encoding="ISO-8859-1"?><rss/>"#);
        assert_eq!(sniffed.xml_encoding.as_deref(), Some("iso-8859-1"));
        assert_eq!(sniffed.bom_encoding, None);
    }

    #[test]
    fn test_bom_wins_over_generic_alias() {
        let mut data = vec![0xff, 0xfe];
        data.extend(utf16le(r#"<?xml version="1.0" encoding="utf-16"?><rss/>"#));
        let sniffed = sniff(&data);
        assert_eq!(sniffed.bom_encoding, Some("utf-16le"));
        assert_eq!(sniffed.bom_len, 2);
        assert_eq!(sniffed.xml_encoding.as_deref(), Some("utf-16le"));
    }

    #[test]
    fn test_specific_declaration_is_kept_with_bom() {
        let sniffed = sniff(b"\xef\xbb\xbf<?xml version='1.0' encoding='windows-1252'?><rss/>");
        assert_eq!(sniffed.xml_encoding.as_deref(), Some("windows-1252"));
    }

    #[test]
    fn test_declaration_must_be_on_first_line() {
        let sniffed = sniff(b"<?xml version='1.0'\nencoding='koi8-r'?><rss/>");
        assert_eq!(sniffed.xml_encoding, None);
    }
}
