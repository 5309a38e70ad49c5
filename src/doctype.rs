//! DOCTYPE stripping.
//!
//! Feeds are parsed without their DOCTYPE so that neither adapter ever
//! loads an external DTD or expands a recursive entity. Internal
//! `<!ENTITY>` declarations whose value is plain text or a single
//! character reference survive in a minimal replacement DOCTYPE and are
//! returned separately for entity resolution.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::bytes::{NoExpand, Regex};

static FIRST_ELEMENT_RE: OnceLock<Regex> = OnceLock::new();
static ENTITY_RE: OnceLock<Regex> = OnceLock::new();
static DOCTYPE_RE: OnceLock<Regex> = OnceLock::new();
static SAFE_ENTITY_RE: OnceLock<Regex> = OnceLock::new();

fn first_element_regex() -> &'static Regex {
    FIRST_ELEMENT_RE.get_or_init(|| Regex::new(r"(?-u)<\w").expect("Failed to compile element regex"))
}

fn entity_regex() -> &'static Regex {
    ENTITY_RE.get_or_init(|| Regex::new(r"(?m-u)^\s*<!ENTITY([^>]*?)>").expect("Failed to compile entity regex"))
}

fn doctype_regex() -> &'static Regex {
    DOCTYPE_RE.get_or_init(|| Regex::new(r"(?m-u)^\s*<!DOCTYPE([^>]*?)>").expect("Failed to compile doctype regex"))
}

fn safe_entity_regex() -> &'static Regex {
    SAFE_ENTITY_RE.get_or_init(|| {
        Regex::new(r#"(?-u)^\s+(\w+)\s+"(&#\w+;|[^&"]*)""#).expect("Failed to compile safe entity regex")
    })
}

/// Result of [`replace_doctype`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Doctype {
    /// `rss091n` when the DOCTYPE names the Netscape RSS 0.91 DTD.
    pub version: Option<&'static str>,
    /// The document with its DOCTYPE replaced.
    pub data: Vec<u8>,
    /// Safe entity name to replacement text.
    pub entities: HashMap<String, String>,
}

/// Strips the DOCTYPE from the part of `data` before the first element.
///
/// When exactly one DOCTYPE is present and it declared safe entities, it is
/// replaced by `<!DOCTYPE feed [...]>` carrying only those declarations.
pub fn replace_doctype(data: &[u8]) -> Doctype {
    let split = match first_element_regex().find(data) {
        Some(m) if m.start() > 0 => m.start() + 1,
        _ => 0,
    };
    let (head, body) = data.split_at(split);

    let declared: Vec<&[u8]> = entity_regex()
        .captures_iter(head)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_bytes())
        .collect();
    let head = entity_regex().replace_all(head, &b""[..]);

    let doctypes: Vec<&[u8]> = doctype_regex()
        .captures_iter(&head)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_bytes())
        .collect();
    let version = doctypes
        .first()
        .filter(|doctype| doctype.to_ascii_lowercase().windows(8).any(|w| w == b"netscape"))
        .map(|_| "rss091n");

    let mut entities = HashMap::new();
    let mut replacement = Vec::new();
    if doctypes.len() == 1 {
        let safe: Vec<&[u8]> = declared
            .into_iter()
            .filter(|decl| safe_entity_regex().is_match(decl))
            .collect();
        if !safe.is_empty() {
            replacement.extend_from_slice(b"<!DOCTYPE feed [\n<!ENTITY");
            replacement.extend_from_slice(&safe.join(&b">\n<!ENTITY"[..]));
            replacement.extend_from_slice(b">\n]>");
        }
        for decl in safe {
            if let Some(caps) = safe_entity_regex().captures(decl) {
                entities.insert(
                    String::from_utf8_lossy(&caps[1]).into_owned(),
                    String::from_utf8_lossy(&caps[2]).into_owned(),
                );
            }
        }
    }

    let mut out = doctype_regex().replace_all(&head, NoExpand(&replacement)).into_owned();
    out.extend_from_slice(body);
    Doctype {
        version,
        data: out,
        entities,
    }
}
