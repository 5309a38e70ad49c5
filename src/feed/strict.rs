//! Strict adapter: drives [`ParserState`] from a namespace-aware XML reader.
//!
//! Any well-formedness problem aborts the attempt with a [`BozoError`];
//! the caller decides whether to retry with the loose adapter.

use std::borrow::Cow;
use std::collections::HashMap;
use std::io::BufRead;

use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{PrefixDeclaration, QName, ResolveResult};
use quick_xml::NsReader;

use super::state::ParserState;
use crate::error::BozoError;
use crate::namespaces::{canonical_prefix_for, MATHML_NAMESPACE, SVG_NAMESPACE, XLINK_NAMESPACE};

/// Parses a UTF-8 document into `state`.
///
/// # Security
///
/// SEC-002: `quick-xml` 0.37 does not read `<!ENTITY>` declarations, so no
/// external or recursive entity is ever expanded. The only custom entities
/// are the pre-vetted ones carried in the state options.
pub(crate) fn parse<R: BufRead>(source: R, state: &mut ParserState) -> Result<(), BozoError> {
    let mut reader = NsReader::from_reader(source);
    reader.config_mut().expand_empty_elements = true;

    let entities = expanded_entities(&state.options.entities);
    let resolve = |name: &str| entities.get(name).map(String::as_str).or_else(|| resolve_predefined_entity(name));

    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut seen_root = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                if depth == 0 && seen_root {
                    return Err(BozoError::Xml("junk after document element".into()));
                }
                seen_root = true;
                depth += 1;
                let (tag, attrs) = start_tag(&reader, &e, state, resolve)?;
                state.start_element(&tag, attrs);
            }
            Event::End(e) => {
                let tag = qualified_name(&reader, e.name().as_ref())?;
                state.end_element(&tag);
                depth = depth.saturating_sub(1);
            }
            Event::Text(e) => {
                let text = e.unescape_with(resolve)?;
                if depth > 0 {
                    state.text(&text);
                } else if !text.trim().is_empty() {
                    return Err(BozoError::Xml("text outside the document element".into()));
                }
            }
            Event::CData(e) => {
                if depth == 0 {
                    return Err(BozoError::Xml("CDATA outside the document element".into()));
                }
                state.text(&String::from_utf8_lossy(&e));
            }
            Event::Eof => break,
            // Declarations, comments and processing instructions carry no feed data.
            _ => {}
        }
        buf.clear();
    }

    if !seen_root {
        return Err(BozoError::Xml("no element found".into()));
    }
    if depth > 0 {
        return Err(BozoError::Xml(format!("unexpected end of document inside {depth} open element(s)")));
    }
    Ok(())
}

/// DOCTYPE entity values may themselves be character references.
fn expanded_entities(entities: &HashMap<String, String>) -> HashMap<String, String> {
    entities
        .iter()
        .map(|(name, value)| {
            let value = unescape(value).map_or_else(|_| value.clone(), Cow::into_owned);
            (name.clone(), value)
        })
        .collect()
}

/// Reports the element's namespace declarations to `state`, then builds the
/// lowercased tag and attribute list the state machine expects.
fn start_tag<'a, R, F>(
    reader: &NsReader<R>,
    e: &BytesStart<'_>,
    state: &mut ParserState,
    resolve: F,
) -> Result<(String, Vec<(String, String)>), BozoError>
where
    F: Fn(&str) -> Option<&'a str> + Copy,
{
    let mut attrs = Vec::new();
    let mut plain: Vec<Attribute<'_>> = Vec::new();

    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        match attr.key.as_namespace_binding() {
            Some(binding) => {
                let uri = attr.unescape_value()?;
                if uri.is_empty() {
                    continue;
                }
                match binding {
                    PrefixDeclaration::Default => state.track_namespace(None, &uri),
                    PrefixDeclaration::Named(prefix) => {
                        let prefix = String::from_utf8_lossy(prefix);
                        state.track_namespace(Some(&prefix), &uri);
                        if uri == XLINK_NAMESPACE {
                            attrs.push((format!("xmlns:{prefix}"), uri.into_owned()));
                        }
                    }
                }
            }
            None => plain.push(attr),
        }
    }

    let tag = qualified_name(reader, e.name().as_ref())?;

    let local = tag.rsplit(':').next().unwrap_or(&tag);
    let (namespace, _) = reader.resolve_element(e.name());
    if let ResolveResult::Bound(ns) = namespace {
        let ns = String::from_utf8_lossy(ns.as_ref());
        if (local == "math" && ns == MATHML_NAMESPACE) || (local == "svg" && ns == SVG_NAMESPACE) {
            attrs.push(("xmlns".to_owned(), ns.into_owned()));
        }
    }

    for attr in plain {
        let value = attr.decode_and_unescape_value_with(reader.decoder(), resolve)?.into_owned();
        let qname = String::from_utf8_lossy(attr.key.as_ref()).to_lowercase();
        let (namespace, local) = reader.resolve_attribute(attr.key);
        let local = String::from_utf8_lossy(local.as_ref()).to_lowercase();
        let key = match namespace {
            ResolveResult::Bound(ns) => match canonical_prefix_for(&String::from_utf8_lossy(ns.as_ref())) {
                Some(prefix) if !prefix.is_empty() => format!("{prefix}:{local}"),
                _ => local,
            },
            ResolveResult::Unbound => local,
            ResolveResult::Unknown(prefix) => {
                return Err(BozoError::UndeclaredNamespace(String::from_utf8_lossy(&prefix).into_owned()));
            }
        };
        if key != qname {
            attrs.push((key, value.clone()));
        }
        attrs.push((qname, value));
    }
    Ok((tag, attrs))
}

/// Lowercased `prefix:local` name, using the canonical prefix for known
/// namespaces and the document's own prefix otherwise.
fn qualified_name<R>(reader: &NsReader<R>, qname: &[u8]) -> Result<String, BozoError> {
    let qname = String::from_utf8_lossy(qname);
    let given = qname.split_once(':').map(|(prefix, _)| prefix);
    let (namespace, local) = reader.resolve_element(QName(qname.as_bytes()));
    let local = String::from_utf8_lossy(local.as_ref()).to_lowercase();

    let prefix = match namespace {
        ResolveResult::Bound(ns) => match canonical_prefix_for(&String::from_utf8_lossy(ns.as_ref())) {
            Some(canonical) => Some(canonical.to_owned()),
            None => given.map(str::to_owned),
        },
        ResolveResult::Unbound => given.map(str::to_owned),
        ResolveResult::Unknown(prefix) => {
            return Err(BozoError::UndeclaredNamespace(String::from_utf8_lossy(&prefix).into_owned()));
        }
    };

    Ok(match prefix.filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{}:{local}", prefix.to_lowercase()),
        None => local,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::state::{Mode, StateOptions};
    use pretty_assertions::assert_eq;

    fn run(xml: &str) -> (ParserState, Result<(), BozoError>) {
        let options = StateOptions {
            encoding: "utf-8".into(),
            resolve_relative_uris: true,
            sanitize_html: true,
            ..Default::default()
        };
        let mut state = ParserState::new(Mode::Strict, options);
        let result = parse(xml.as_bytes(), &mut state);
        (state, result)
    }

    #[test]
    fn test_minimal_atom() {
        let (state, result) = run(
            r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>T</title><entry><id>1</id><title>E</title></entry></feed>"#,
        );
        assert_eq!(result, Ok(()));
        let parsed = state.finish();
        assert_eq!(parsed.version, "atom10");
        assert_eq!(parsed.feed.get_str("title"), Some("T"));
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].get_str("id"), Some("1"));
        assert_eq!(parsed.entries[0].get_str("title"), Some("E"));
    }

    #[test]
    fn test_prefixed_elements_use_canonical_prefix() {
        let (state, result) = run(concat!(
            r#"<rss version="2.0" xmlns:d="http://purl.org/dc/elements/1.1/"><channel>"#,
            r#"<item><d:creator>Jane</d:creator></item></channel></rss>"#,
        ));
        assert_eq!(result, Ok(()));
        let parsed = state.finish();
        assert_eq!(parsed.version, "rss20");
        assert_eq!(parsed.entries[0].get_str("author"), Some("Jane"));
        assert_eq!(parsed.namespaces.get("dc").map(String::as_str), Some("http://purl.org/dc/elements/1.1/"));
    }

    #[test]
    fn test_undeclared_prefix_fails() {
        let (_, result) = run(r#"<rss version="2.0"><channel><foo:bar>x</foo:bar></channel></rss>"#);
        assert_eq!(result, Err(BozoError::UndeclaredNamespace("foo".into())));
    }

    #[test]
    fn test_mismatched_nesting_fails() {
        let (_, result) = run("<rss><channel><title>x</channel></rss>");
        assert!(matches!(result, Err(BozoError::Xml(_))));
    }

    #[test]
    fn test_unclosed_document_fails() {
        let (_, result) = run("<rss><channel><title>x</title>");
        assert!(matches!(result, Err(BozoError::Xml(_))));
    }

    #[test]
    fn test_empty_document_fails() {
        let (_, result) = run("   ");
        assert!(matches!(result, Err(BozoError::Xml(_))));
    }

    #[test]
    fn test_unknown_entity_fails() {
        let (_, result) = run("<rss><channel><title>a&nbsp;b</title></channel></rss>");
        assert!(matches!(result, Err(BozoError::Xml(_))));
    }

    #[test]
    fn test_doctype_entities_expand() {
        let options = StateOptions {
            encoding: "utf-8".into(),
            entities: [("nbsp".to_owned(), "&#160;".to_owned())].into_iter().collect(),
            ..Default::default()
        };
        let mut state = ParserState::new(Mode::Strict, options);
        let result = parse(&b"<rss><channel><title>a&nbsp;b &amp; c</title></channel></rss>"[..], &mut state);
        assert_eq!(result, Ok(()));
        assert_eq!(state.finish().feed.get_str("title"), Some("a\u{a0}b & c"));
    }

    #[test]
    fn test_cdata_is_text() {
        let (state, result) =
            run("<rss version=\"2.0\"><channel><item><description><![CDATA[<p>Hi</p>]]></description></item></channel></rss>");
        assert_eq!(result, Ok(()));
        let parsed = state.finish();
        assert_eq!(parsed.entries[0].get_str("summary"), Some("<p>Hi</p>"));
    }

    #[test]
    fn test_namespaced_attributes_get_canonical_keys() {
        let (state, result) = run(concat!(
            r#"<rss version="1.0" xmlns:r="http://www.w3.org/1999/02/22-rdf-syntax-ns#" "#,
            r#"xmlns:cc="http://web.resource.org/cc/"><channel><item>"#,
            r#"<cc:license r:resource="http://creativecommons.org/licenses/by/4.0/"/>"#,
            r#"</item></channel></rss>"#,
        ));
        assert_eq!(result, Ok(()));
        assert_eq!(state.finish().entries[0].license(), Some("http://creativecommons.org/licenses/by/4.0/"));
    }

    #[test]
    fn test_inline_svg_keeps_namespace() {
        let (state, result) = run(concat!(
            r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry><content type="xhtml">"#,
            r#"<div xmlns="http://www.w3.org/1999/xhtml"><svg xmlns="http://www.w3.org/2000/svg"><circle r="1"/></svg></div>"#,
            r#"</content></entry></feed>"#,
        ));
        assert_eq!(result, Ok(()));
        let parsed = state.finish();
        let content = parsed.entries[0].get_list("content").unwrap()[0].as_dict().unwrap().clone();
        let value = content.get_str("value").unwrap();
        assert!(value.contains(r#"xmlns="http://www.w3.org/2000/svg""#), "{value}");
        assert!(value.contains("<circle"), "{value}");
    }

    #[test]
    fn test_junk_after_root_fails() {
        let (_, result) = run("<rss></rss><rss></rss>");
        assert!(matches!(result, Err(BozoError::Xml(_))));
    }
}
