//! Content Model State Machine.
//!
//! [`ParserState`] is the single mutable structure both adapters drive. It
//! owns the element stack, the `xml:base`/`xml:lang` scope stacks, the
//! content-parameters register and the flags that decide which record
//! ([`ContextKind`]) receives extracted text. Element handlers live in
//! [`super::handlers`] and are reached through the dispatch table.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use base64::Engine as _;
use regex::Regex;

use super::attrs::Attrs;
use super::dispatch::dispatch_table;
use crate::dict::{canonical_key, FeedParserDict, Value};
use crate::html::{lookup_entity, resolve_relative_uris, sanitize_html};
use crate::namespaces::{NamespaceScope, MATHML_NAMESPACE, SVG_NAMESPACE};
use crate::util::{
    decode_markup_entities, fix_double_encoded_utf8, looks_like_html, make_safe_absolute_uri,
    translate_cp1252, urljoin, xml_escape,
};

pub(crate) const XHTML_TYPE: &str = "application/xhtml+xml";
pub(crate) const HTML_TYPES: &[&str] = &["text/html", XHTML_TYPE];

/// Elements whose text is a URI resolved against the current base.
const CAN_BE_RELATIVE_URI: &[&str] = &[
    "link", "id", "wfw_comment", "wfw_commentrss", "docs", "url", "href", "comments", "icon", "logo",
];

/// Elements whose markup is passed to the URI resolver and the sanitizer.
const CAN_CONTAIN_MARKUP: &[&str] = &[
    "content", "title", "summary", "info", "tagline", "subtitle", "copyright", "rights", "description",
];

/// Character references to markup-significant characters stay escaped.
const MARKUP_CHAR_REFS: &[&str] = &["34", "38", "39", "60", "62", "x22", "x26", "x27", "x3c", "x3e"];

const XML_ENTITIES: &[&str] = &["lt", "gt", "quot", "amp", "apos"];

/// Which adapter is driving the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Strict,
    Loose,
}

/// Per-document inputs to the state machine.
#[derive(Debug, Clone, Default)]
pub struct StateOptions {
    pub base_uri: String,
    pub base_lang: Option<String>,
    /// Encoding the document was decoded from.
    pub encoding: String,
    pub resolve_relative_uris: bool,
    pub sanitize_html: bool,
    /// Safe internal entities kept from the DOCTYPE.
    pub entities: HashMap<String, String>,
}

/// The record that extracted text is written into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Source,
    Image,
    TextInput,
    Entry,
    Feed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum GeometryKind {
    #[default]
    None,
    Point,
    LineString,
    Polygon,
}

/// Where an open `summary`-like element is being stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SummaryTarget {
    Summary,
    Content,
}

/// One currently open element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementFrame {
    pub tag: String,
    pub expecting_text: bool,
    pub pieces: Vec<String>,
}

/// Register describing the content element currently open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ContentParams {
    pub content_type: String,
    pub language: Option<String>,
    pub base: String,
    pub src: Option<String>,
    pub base64: bool,
    /// Element depth of the content element itself.
    pub depth: usize,
}

impl ContentParams {
    /// The content block stored as `<field>_detail`.
    fn detail(&self, value: &str) -> FeedParserDict {
        let mut detail: FeedParserDict = [
            ("type", Value::from(self.content_type.as_str())),
            ("language", Value::from(self.language.clone())),
            ("base", Value::from(self.base.as_str())),
            ("value", Value::from(value)),
        ]
        .into_iter()
        .collect();
        if let Some(src) = &self.src {
            detail.set("src", src.as_str());
        }
        detail
    }
}

/// What a finished parse hands back to the orchestrator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFeed {
    pub feed: FeedParserDict,
    pub entries: Vec<FeedParserDict>,
    pub version: String,
    pub namespaces: BTreeMap<String, String>,
}

impl ParsedFeed {
    /// True when nothing feed-shaped was found.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.feed.is_empty() && self.version.is_empty()
    }
}

/// Expands the short `type` values Atom allows.
pub(crate) fn map_content_type(content_type: &str) -> String {
    let lower = content_type.to_lowercase();
    match lower.as_str() {
        "text" | "plain" => "text/plain".to_owned(),
        "html" => "text/html".to_owned(),
        "xhtml" => XHTML_TYPE.to_owned(),
        _ => lower,
    }
}

static QUERY_AMPERSAND_RE: OnceLock<Regex> = OnceLock::new();
static EMAIL_RE: OnceLock<Regex> = OnceLock::new();

/// Undoes `?a=1&b;=2`-style damage done to query strings by entity handling.
fn fix_query_ampersands(link: &str) -> String {
    QUERY_AMPERSAND_RE
        .get_or_init(|| Regex::new(r"&([A-Za-z0-9_]+);").expect("Failed to compile query ampersand regex"))
        .replace_all(link, "&$1")
        .into_owned()
}

fn email_regex() -> &'static Regex {
    EMAIL_RE.get_or_init(|| {
        Regex::new(
            r"(([a-zA-Z0-9_.+\-]+)@((\[[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.)|(([a-zA-Z0-9\-]+\.)+))([a-zA-Z]{2,4}|[0-9]{1,3})(\]?))(\?subject=\S+)?",
        )
        .expect("Failed to compile email regex")
    })
}

fn decode_base64(text: &str) -> Option<String> {
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD.decode(cleaned).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Drops an enclosing `<div>` from XHTML content when everything else is
/// nested inside it.
fn strip_enclosing_div(pieces: &mut Vec<String>) {
    while pieces.len() > 1 && pieces.last().is_some_and(|p| p.trim().is_empty()) {
        pieces.pop();
    }
    while pieces.len() > 1 && pieces[0].trim().is_empty() {
        pieces.remove(0);
    }
    let (Some(first), Some(last)) = (pieces.first(), pieces.last()) else {
        return;
    };
    if !((first == "<div>" || first.starts_with("<div ")) && last == "</div>") {
        return;
    }
    let mut depth = 0i32;
    for piece in &pieces[..pieces.len() - 1] {
        if piece.starts_with("</") {
            depth -= 1;
            if depth == 0 {
                return;
            }
        } else if piece.starts_with('<') && !piece.ends_with("/>") {
            depth += 1;
        }
    }
    pieces.pop();
    pieces.remove(0);
}

/// Per-document parser state shared by the strict and loose adapters.
#[derive(Debug)]
pub struct ParserState {
    pub(crate) mode: Mode,
    pub(crate) options: StateOptions,
    pub(crate) feed: FeedParserDict,
    pub(crate) entries: Vec<FeedParserDict>,
    pub(crate) version: String,
    pub(crate) namespaces: NamespaceScope,

    pub(crate) infeed: bool,
    pub(crate) inentry: bool,
    pub(crate) insource: bool,
    pub(crate) inimage: bool,
    pub(crate) intextinput: bool,
    pub(crate) inauthor: bool,
    pub(crate) incontributor: bool,
    pub(crate) inpublisher: bool,
    pub(crate) incontent: usize,
    pub(crate) ingeometry: GeometryKind,

    pub(crate) sourcedata: FeedParserDict,
    pub(crate) contentparams: Option<ContentParams>,
    pub(crate) elementstack: Vec<ElementFrame>,
    basestack: Vec<String>,
    langstack: Vec<Option<String>>,
    pub(crate) baseuri: String,
    pub(crate) lang: Option<String>,

    pub(crate) svg_ok: usize,
    pub(crate) depth: usize,
    pub(crate) title_depth: Option<usize>,
    /// `None` until the first `psc:chapters` of an entry, then `true` while
    /// it is open and `false` after it closed.
    pub(crate) psc_chapters: Option<bool>,
    pub(crate) guidislink: bool,
    pub(crate) summary_target: Option<SummaryTarget>,
    /// Entry index to field name to the depth the field was set at.
    depth_map: HashMap<usize, HashMap<String, usize>>,
}

impl ParserState {
    pub fn new(mode: Mode, options: StateOptions) -> Self {
        let mut feed = FeedParserDict::new();
        let lang = options.base_lang.clone().filter(|l| !l.is_empty());
        if let Some(lang) = &lang {
            feed.set("language", lang.replace('_', "-"));
        }
        Self {
            mode,
            baseuri: options.base_uri.clone(),
            lang,
            options,
            feed,
            entries: Vec::new(),
            version: String::new(),
            namespaces: NamespaceScope::new(),
            infeed: false,
            inentry: false,
            insource: false,
            inimage: false,
            intextinput: false,
            inauthor: false,
            incontributor: false,
            inpublisher: false,
            incontent: 0,
            ingeometry: GeometryKind::None,
            sourcedata: FeedParserDict::new(),
            contentparams: None,
            elementstack: Vec::new(),
            basestack: Vec::new(),
            langstack: Vec::new(),
            svg_ok: 0,
            depth: 0,
            title_depth: None,
            psc_chapters: None,
            guidislink: false,
            summary_target: None,
            depth_map: HashMap::new(),
        }
    }

    pub fn finish(self) -> ParsedFeed {
        ParsedFeed {
            feed: self.feed,
            entries: self.entries,
            version: self.version,
            namespaces: self.namespaces.into_in_use(),
        }
    }

    // ========================================================================
    // Adapter entry points
    // ========================================================================

    /// Records a namespace declaration; the first of the version-bearing
    /// namespaces sets the feed version.
    pub fn track_namespace(&mut self, prefix: Option<&str>, uri: &str) {
        if let Some(version) = self.namespaces.register_declared(prefix, uri) {
            if self.version.is_empty() {
                self.version = version.to_owned();
            }
        }
    }

    fn normalize_attribute(&self, key: String, value: String) -> (String, String) {
        let key = key.to_lowercase();
        let value = if key == "rel" || key == "type" { value.to_lowercase() } else { value };
        let value = match self.mode {
            Mode::Loose => value.replace("&amp;", "&"),
            Mode::Strict => value,
        };
        (key, value)
    }

    /// Handles a start tag. `tag` is lowercased and may carry a document
    /// prefix (`dc:creator`).
    pub fn start_element(&mut self, tag: &str, attrs: Vec<(String, String)>) {
        self.depth += 1;
        let mut attrs: Attrs = attrs
            .into_iter()
            .map(|(k, v)| self.normalize_attribute(k, v))
            .collect();

        let base = attrs
            .get("xml:base")
            .or_else(|| attrs.get("base"))
            .filter(|b| !b.is_empty())
            .map_or_else(|| self.baseuri.clone(), str::to_owned);
        self.baseuri = if self.baseuri.is_empty() {
            urljoin(&self.baseuri, &base)
        } else {
            let safe = make_safe_absolute_uri(&self.baseuri, Some(&base));
            if safe.is_empty() { self.baseuri.clone() } else { safe }
        };

        let lang = match attrs.get("xml:lang").or_else(|| attrs.get("lang")) {
            Some("") => None,
            Some(lang) => Some(lang.to_owned()),
            None => self.lang.clone(),
        };
        if let Some(lang) = &lang {
            if matches!(tag, "feed" | "rss" | "rdf:rdf") {
                self.feed.set("language", lang.replace('_', "-"));
            }
        }
        self.lang = lang.clone();
        self.basestack.push(self.baseuri.clone());
        self.langstack.push(lang);

        let declarations: Vec<(Option<String>, String)> = attrs
            .iter()
            .filter_map(|(k, v)| match k.strip_prefix("xmlns:") {
                Some(prefix) => Some((Some(prefix.to_owned()), v.to_owned())),
                None if k == "xmlns" => Some((None, v.to_owned())),
                None => None,
            })
            .collect();
        for (prefix, uri) in declarations {
            self.track_namespace(prefix.as_deref(), &uri);
        }

        if self.incontent > 0 && !self.content_type_or("xml").ends_with("xml") {
            if tag == "div" || tag == "xhtml:div" {
                return;
            }
            // Declared as escaped markup but carries real elements.
            self.set_content_type(XHTML_TYPE);
        }
        if self.incontent > 0 && self.content_type() == Some(XHTML_TYPE) {
            let local = match tag.split_once(':') {
                Some((prefix, local)) => {
                    let namespace = self.namespaces.uri_for(prefix).unwrap_or("").to_owned();
                    if (local == "math" && namespace == MATHML_NAMESPACE)
                        || (local == "svg" && namespace == SVG_NAMESPACE)
                    {
                        attrs.set("xmlns", namespace);
                    }
                    local
                }
                None => tag,
            };
            if local == "svg" {
                self.svg_ok += 1;
            }
            self.emit_inline_start(local, &attrs);
            return;
        }

        let prefix = tag.split_once(':').map_or("", |(p, _)| self.namespaces.map_prefix(p));
        if prefix.is_empty() {
            if !matches!(tag, "title" | "link" | "description" | "name") {
                self.intextinput = false;
            }
            if !matches!(tag, "title" | "link" | "description" | "url" | "href" | "width" | "height") {
                self.inimage = false;
            }
        }

        let key = self.namespaces.handler_key(tag);
        match dispatch_table().start(&key) {
            Some(handler) => handler(self, attrs),
            None if attrs.is_empty() => self.push(&key, true),
            None => {
                let detail = attrs.to_dict();
                self.context().set(&key, detail);
            }
        }
    }

    /// Handles an end tag.
    pub fn end_element(&mut self, tag: &str) {
        let local = tag.rsplit(':').next().unwrap_or(tag);
        if local == "svg" && self.svg_ok > 0 {
            self.svg_ok -= 1;
        }

        // Children of XHTML content were serialized on the way in and never
        // reach a handler on the way out.
        let inline_child = self
            .contentparams
            .as_ref()
            .is_some_and(|p| p.content_type == XHTML_TYPE && self.depth > p.depth);
        if !inline_child {
            let key = self.namespaces.handler_key(tag);
            match dispatch_table().end(&key) {
                Some(handler) if self.svg_ok == 0 => handler(self),
                _ => {
                    self.pop(&key);
                }
            }
        }

        let mut emit = self.incontent > 0;
        if emit && !self.content_type_or("xml").ends_with("xml") {
            if tag == "div" || tag == "xhtml:div" {
                emit = false;
            } else {
                self.set_content_type(XHTML_TYPE);
            }
        }
        if emit && self.content_type() == Some(XHTML_TYPE) {
            self.handle_data(&format!("</{local}>"), false);
        }

        if self.basestack.pop().is_some() {
            if let Some(base) = self.basestack.last().filter(|b| !b.is_empty()) {
                self.baseuri = base.clone();
            }
        }
        if self.langstack.pop().is_some() {
            if let Some(lang) = self.langstack.last() {
                self.lang = lang.clone();
            }
        }
        self.depth = self.depth.saturating_sub(1);
    }

    /// Character data, escaped when it lands inside XHTML content.
    pub fn text(&mut self, text: &str) {
        self.handle_data(text, true);
    }

    /// Character data appended verbatim.
    pub fn raw_text(&mut self, text: &str) {
        self.handle_data(text, false);
    }

    fn handle_data(&mut self, text: &str, escape: bool) {
        let escape = escape && self.content_type() == Some(XHTML_TYPE);
        let Some(frame) = self.elementstack.last_mut() else {
            return;
        };
        if escape {
            frame.pieces.push(xml_escape(text).into_owned());
        } else {
            frame.pieces.push(text.to_owned());
        }
    }

    /// `&#name;` as reported by the tag-soup scanner.
    pub fn char_ref(&mut self, name: &str) {
        let Some(frame) = self.elementstack.last_mut() else {
            return;
        };
        let name = name.to_lowercase();
        let text = if MARKUP_CHAR_REFS.contains(&name.as_str()) {
            format!("&#{name};")
        } else {
            let code = match name.strip_prefix('x') {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => name.parse::<u32>().ok(),
            };
            match code.and_then(char::from_u32) {
                Some(c) => c.to_string(),
                None => format!("&#{name};"),
            }
        };
        frame.pieces.push(text);
    }

    /// `&name;` as reported by the tag-soup scanner.
    pub fn entity_ref(&mut self, name: &str) {
        if self.elementstack.is_empty() {
            return;
        }
        let text = if XML_ENTITIES.contains(&name) {
            format!("&{name};")
        } else if let Some(value) = self.options.entities.get(name) {
            if let Some(reference) = value.strip_prefix("&#").and_then(|v| v.strip_suffix(';')) {
                let reference = reference.to_owned();
                return self.char_ref(&reference);
            }
            value.clone()
        } else {
            match lookup_entity(name) {
                Some(c) => c.to_string(),
                None => format!("&{name};"),
            }
        };
        if let Some(frame) = self.elementstack.last_mut() {
            frame.pieces.push(text);
        }
    }

    pub(crate) fn emit_inline_start(&mut self, tag: &str, attrs: &Attrs) {
        let markup = format!("<{}{}>", tag, attrs.to_markup(self.mode == Mode::Strict));
        self.handle_data(&markup, false);
    }

    // ========================================================================
    // Content parameters
    // ========================================================================

    pub(crate) fn content_type(&self) -> Option<&str> {
        self.contentparams.as_ref().map(|p| p.content_type.as_str())
    }

    pub(crate) fn content_type_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.content_type().unwrap_or(default)
    }

    fn set_content_type(&mut self, content_type: &str) {
        if let Some(params) = &mut self.contentparams {
            params.content_type = content_type.to_owned();
        }
    }

    fn detail(&self, value: &str) -> FeedParserDict {
        match &self.contentparams {
            Some(params) => params.detail(value),
            None => [("value", Value::from(value))].into_iter().collect(),
        }
    }

    /// Explicit `mode="base64"`, or any type that is not textual.
    fn is_base64(attrs: &Attrs, content_type: &str) -> bool {
        if attrs.get("mode") == Some("base64") {
            return true;
        }
        !(content_type.starts_with("text/") || content_type.ends_with("+xml") || content_type.ends_with("/xml"))
    }

    pub(crate) fn push_content(&mut self, tag: &str, attrs: &Attrs, default_type: &str, expecting_text: bool) {
        self.incontent += 1;
        if let Some(lang) = &mut self.lang {
            *lang = lang.replace('_', "-");
        }
        let content_type = map_content_type(attrs.get("type").unwrap_or(default_type));
        let base64 = Self::is_base64(attrs, &content_type);
        self.contentparams = Some(ContentParams {
            content_type,
            language: self.lang.clone(),
            base: self.baseuri.clone(),
            src: None,
            base64,
            depth: self.depth,
        });
        self.push(tag, expecting_text);
    }

    pub(crate) fn pop_content(&mut self, tag: &str) -> Option<String> {
        let value = self.pop(tag);
        self.incontent = self.incontent.saturating_sub(1);
        self.contentparams = None;
        value
    }

    // ========================================================================
    // Element stack
    // ========================================================================

    pub(crate) fn push(&mut self, tag: &str, expecting_text: bool) {
        self.elementstack.push(ElementFrame {
            tag: tag.to_owned(),
            expecting_text,
            pieces: Vec::new(),
        });
    }

    /// Replaces the pieces of the top frame.
    pub(crate) fn set_top_text(&mut self, text: &str) {
        if let Some(frame) = self.elementstack.last_mut() {
            frame.pieces = vec![text.to_owned()];
        }
    }

    pub(crate) fn append_top_text(&mut self, text: &str) {
        if let Some(frame) = self.elementstack.last_mut() {
            frame.pieces.push(text.to_owned());
        }
    }

    /// Closes the top frame if it is `tag`, post-processes its text and
    /// stores it in the current context. Returns the final text.
    pub(crate) fn pop(&mut self, tag: &str) -> Option<String> {
        self.pop_with(tag, true)
    }

    /// Like [`pop`](Self::pop) without trimming whitespace.
    pub(crate) fn pop_unstripped(&mut self, tag: &str) -> Option<String> {
        self.pop_with(tag, false)
    }

    fn pop_with(&mut self, tag: &str, strip: bool) -> Option<String> {
        if self.elementstack.last()?.tag != tag {
            return None;
        }
        let ElementFrame {
            tag: element,
            expecting_text,
            mut pieces,
        } = self.elementstack.pop()?;

        if self.version == "atom10" && self.content_type_or("text") == XHTML_TYPE {
            strip_enclosing_div(&mut pieces);
        }
        let mut output = pieces.concat();
        if strip {
            output = output.trim().to_owned();
        }
        if !expecting_text {
            return Some(output);
        }

        let base64 = self.contentparams.as_ref().is_some_and(|p| p.base64);
        if base64 {
            if let Some(decoded) = decode_base64(&output) {
                output = decoded;
            }
        }

        if CAN_BE_RELATIVE_URI.contains(&element.as_str())
            && !output.is_empty()
            && (element != "id" || self.guidislink)
        {
            output = self.resolve_uri(&output);
        }

        if !base64 && self.mode == Mode::Loose {
            output = decode_markup_entities(&output, !self.content_type_or("xml").ends_with("xml"));
        }

        if !self.version.starts_with("atom") && self.content_type() == Some("text/plain") && looks_like_html(&output) {
            self.set_content_type("text/html");
        }
        if let Some(params) = &mut self.contentparams {
            params.base64 = false;
        }

        let markup_type = self.content_type_or("text/html").to_owned();
        let is_htmlish = HTML_TYPES.contains(&map_content_type(&markup_type).as_str());
        if is_htmlish && CAN_CONTAIN_MARKUP.contains(&element.as_str()) {
            if self.options.resolve_relative_uris {
                output = resolve_relative_uris(&output, &self.baseuri, &markup_type);
            }
            if self.options.sanitize_html {
                output = sanitize_html(&output, &markup_type);
            }
        }

        if self.options.encoding == "utf-8" {
            if let Some(fixed) = fix_double_encoded_utf8(&output) {
                output = fixed;
            }
        }
        output = translate_cp1252(&output).into_owned();

        if matches!(element.as_str(), "category" | "tags" | "itunes_keywords") {
            return Some(output);
        }
        if element == "title" && self.title_depth.is_some_and(|d| d <= self.depth) {
            return Some(output);
        }

        if self.inentry && !self.insource {
            self.store_in_entry(&element, output)
        } else if self.infeed || self.insource {
            Some(self.store_in_context(&element, output))
        } else {
            Some(output)
        }
    }

    fn store_in_entry(&mut self, element: &str, output: String) -> Option<String> {
        let Some(index) = self.entries.len().checked_sub(1) else {
            return Some(output);
        };
        match element {
            "content" => {
                let detail = self.detail(&output);
                self.entries[index].ensure_list("content").push(detail.into());
                Some(output)
            }
            "link" => {
                if self.inimage {
                    return Some(output);
                }
                let output = fix_query_ampersands(&output.replace("&amp;", "&"));
                let entry = &mut self.entries[index];
                entry.set("link", output.as_str());
                if !output.is_empty() {
                    if let Some(link) = entry.last_dict_mut("links") {
                        link.set("href", output.as_str());
                    }
                }
                Some(output)
            }
            _ => {
                let key = if element == "description" { "summary" } else { element };
                let key = canonical_key(key).to_owned();
                let depth = self.depth;
                let depths = self.depth_map.entry(index).or_default();
                // Shallowest wins; an equally deep later value does not replace it.
                if depths.get(&key).is_some_and(|&set_at| set_at <= depth) {
                    return Some(output);
                }
                depths.insert(key.clone(), depth);
                // `<key>_detail` always describes the stored value.
                let detail = (self.incontent > 0).then(|| self.detail(&output));
                let entry = &mut self.entries[index];
                entry.set(&key, output.as_str());
                if let Some(detail) = detail {
                    entry.set(&format!("{key}_detail"), detail);
                }
                Some(output)
            }
        }
    }

    fn store_in_context(&mut self, element: &str, output: String) -> String {
        let element = if element == "description" { "subtitle" } else { element };
        if element == "link" {
            let output = fix_query_ampersands(&output);
            let context = self.context();
            context.set("link", output.as_str());
            if let Some(link) = context.last_dict_mut("links") {
                link.set("href", output.as_str());
            }
            return output;
        }
        let detail = (self.incontent > 0).then(|| self.detail(&output));
        let context = self.context();
        context.set(element, output.as_str());
        if let Some(detail) = detail {
            context.set(&format!("{element}_detail"), detail);
        }
        output
    }

    // ========================================================================
    // Context resolution
    // ========================================================================

    pub(crate) fn context_kind(&self) -> ContextKind {
        let has_dict = |key: &str| self.feed.get_raw(key).is_some_and(|v| v.as_dict().is_some());
        if self.insource {
            ContextKind::Source
        } else if self.inimage && has_dict("image") {
            ContextKind::Image
        } else if self.intextinput && has_dict("textinput") {
            ContextKind::TextInput
        } else if self.inentry && !self.entries.is_empty() {
            ContextKind::Entry
        } else {
            ContextKind::Feed
        }
    }

    /// The record new data is written into, resolved from the current flags.
    pub(crate) fn context(&mut self) -> &mut FeedParserDict {
        match self.context_kind() {
            ContextKind::Source => &mut self.sourcedata,
            ContextKind::Image => self.feed.ensure_dict("image"),
            ContextKind::TextInput => self.feed.ensure_dict("textinput"),
            ContextKind::Entry => match self.entries.last_mut() {
                Some(entry) => entry,
                None => &mut self.feed,
            },
            ContextKind::Feed => &mut self.feed,
        }
    }

    pub(crate) fn save(&mut self, key: &str, value: impl Into<Value>, overwrite: bool) {
        let context = self.context();
        if overwrite {
            context.set(key, value);
        } else {
            context.set_default(key, value);
        }
    }

    pub(crate) fn in_feed_entry_or_source(&self) -> bool {
        self.infeed || self.inentry || self.insource
    }

    pub(crate) fn resolve_uri(&self, uri: &str) -> String {
        urljoin(&self.baseuri, uri)
    }

    /// Looks up a prefixed attribute by its canonical prefix.
    pub(crate) fn attribute<'a>(&self, attrs: &'a Attrs, name: &str) -> Option<&'a str> {
        match name.split_once(':') {
            Some((prefix, local)) => {
                let key = format!("{}:{}", self.namespaces.map_prefix(prefix), local);
                attrs.get(&key)
            }
            None => attrs.get(name),
        }
    }

    /// Moves `url` or `uri` to `href`.
    pub(crate) fn its_an_href(mut attrs: Attrs) -> Attrs {
        let href = attrs
            .get("url")
            .or_else(|| attrs.get("uri"))
            .or_else(|| attrs.get("href"))
            .filter(|h| !h.is_empty())
            .map(str::to_owned);
        if let Some(href) = href {
            attrs.remove("url");
            attrs.remove("uri");
            attrs.set("href", href);
        }
        attrs
    }

    // ========================================================================
    // People and tags
    // ========================================================================

    /// Keeps `<key>` and `<key>_detail` consistent: a detail record yields
    /// the display string, a display string yields name and email.
    pub(crate) fn sync_author_detail(&mut self, key: &str) {
        let list_key = format!("{key}s");
        let detail_key = format!("{key}_detail");
        let context = self.context();
        let mut detail = context
            .get_list(&list_key)
            .and_then(|list| list.last())
            .and_then(Value::as_dict)
            .cloned()
            .unwrap_or_default();

        if !detail.is_empty() {
            let name = detail.get_str("name").filter(|s| !s.is_empty());
            let email = detail.get_str("email").filter(|s| !s.is_empty());
            let display = match (name, email) {
                (Some(name), Some(email)) => format!("{name} ({email})"),
                (Some(name), None) => name.to_owned(),
                (None, Some(email)) => email.to_owned(),
                (None, None) => return,
            };
            context.set(key, display);
            return;
        }

        let Some(mut author) = context.get_str(key).filter(|s| !s.is_empty()).map(str::to_owned) else {
            return;
        };
        let mut email = None;
        if let Some(found) = email_regex().find(&author).map(|m| m.as_str().to_owned()) {
            author = author
                .replace(&found, "")
                .replace("()", "")
                .replace("<>", "")
                .replace("&lt;&gt;", "");
            let mut name = author.trim();
            name = name.strip_prefix('(').unwrap_or(name);
            name = name.strip_suffix(')').unwrap_or(name);
            author = name.trim().to_owned();
            email = Some(found);
        }
        if author.is_empty() && email.is_none() {
            return;
        }
        if !author.is_empty() {
            detail.set("name", author);
        }
        if let Some(email) = email {
            detail.set("email", email);
        }
        if !context.contains(&detail_key) {
            context.set(&detail_key, detail.clone());
        }
        if let Some(last) = context.last_dict_mut(&list_key) {
            *last = detail;
        }
    }

    pub(crate) fn save_author(&mut self, key: &str, value: Option<String>, prefix: &str) {
        let value = Value::from(value);
        self.context().ensure_dict(&format!("{prefix}_detail")).set(key, value.clone());
        self.sync_author_detail("author");
        let authors = self
            .context()
            .set_default("authors", Vec::<Value>::new())
            .force_list();
        if authors.is_empty() {
            authors.push(FeedParserDict::new().into());
        }
        if let Some(last) = authors.last_mut() {
            last.force_dict().set(key, value);
        }
    }

    pub(crate) fn save_contributor(&mut self, key: &str, value: Option<String>) {
        let contributors = self
            .context()
            .set_default("contributors", Vec::<Value>::new())
            .force_list();
        if contributors.is_empty() {
            contributors.push(FeedParserDict::new().into());
        }
        if let Some(last) = contributors.last_mut() {
            last.force_dict().set(key, value);
        }
    }

    /// Adds a tag unless it is empty or already present.
    pub(crate) fn add_tag(&mut self, term: Option<&str>, scheme: Option<&str>, label: Option<&str>) {
        let tags = self.context().ensure_list("tags");
        let empty = |s: Option<&str>| s.map_or(true, str::is_empty);
        if empty(term) && empty(scheme) && empty(label) {
            return;
        }
        let tag: Value = [
            ("term", Value::from(term)),
            ("scheme", Value::from(scheme)),
            ("label", Value::from(label)),
        ]
        .into_iter()
        .collect::<FeedParserDict>()
        .into();
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn state(mode: Mode) -> ParserState {
        ParserState::new(
            mode,
            StateOptions {
                encoding: "utf-8".into(),
                resolve_relative_uris: true,
                sanitize_html: true,
                ..StateOptions::default()
            },
        )
    }

    fn attrs(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn element(state: &mut ParserState, tag: &str, pairs: &[(&str, &str)], text: &str) {
        state.start_element(tag, attrs(pairs));
        state.text(text);
        state.end_element(tag);
    }

    #[test]
    fn test_map_content_type() {
        assert_eq!(map_content_type("text"), "text/plain");
        assert_eq!(map_content_type("HTML"), "text/html");
        assert_eq!(map_content_type("xhtml"), XHTML_TYPE);
        assert_eq!(map_content_type("image/png"), "image/png");
    }

    #[test]
    fn test_strip_enclosing_div() {
        let mut pieces: Vec<String> = ["<div>", "a", "<b>", "x", "</b>", "</div>"].map(String::from).to_vec();
        strip_enclosing_div(&mut pieces);
        assert_eq!(pieces.concat(), "a<b>x</b>");

        let mut siblings: Vec<String> = ["<div>", "a", "</div>", "<div>", "b", "</div>"].map(String::from).to_vec();
        strip_enclosing_div(&mut siblings);
        assert_eq!(siblings.concat(), "<div>a</div><div>b</div>");
    }

    #[test]
    fn test_unknown_element_without_attributes_becomes_text_field() {
        let mut s = state(Mode::Strict);
        s.start_element("rss", attrs(&[("version", "2.0")]));
        s.start_element("channel", vec![]);
        element(&mut s, "ttl", &[], "60");
        let parsed = s.finish();
        assert_eq!(parsed.feed.get_str("ttl"), Some("60"));
        assert_eq!(parsed.version, "rss20");
    }

    #[test]
    fn test_unknown_element_with_attributes_becomes_dict() {
        let mut s = state(Mode::Strict);
        s.start_element("channel", vec![]);
        element(&mut s, "widget", &[("Size", "3")], "");
        let parsed = s.finish();
        let widget = parsed.feed.get_dict("widget").unwrap();
        assert_eq!(widget.get_str("size"), Some("3"));
    }

    #[test]
    fn test_mismatched_end_is_ignored() {
        let mut s = state(Mode::Loose);
        s.start_element("channel", vec![]);
        s.start_element("title", vec![]);
        s.text("T");
        s.end_element("link");
        s.end_element("title");
        assert_eq!(s.finish().feed.get_str("title"), Some("T"));
    }

    #[test]
    fn test_context_precedence() {
        let mut s = state(Mode::Strict);
        s.start_element("channel", vec![]);
        assert_eq!(s.context_kind(), ContextKind::Feed);
        s.start_element("item", vec![]);
        assert_eq!(s.context_kind(), ContextKind::Entry);
        s.start_element("source", vec![]);
        assert_eq!(s.context_kind(), ContextKind::Source);
    }

    #[test]
    fn test_image_and_textinput_titles_stay_out_of_feed() {
        let mut s = state(Mode::Strict);
        s.start_element("rss", attrs(&[("version", "2.0")]));
        s.start_element("channel", vec![]);
        element(&mut s, "title", &[], "Channel");

        s.start_element("image", vec![]);
        assert_eq!(s.context_kind(), ContextKind::Image);
        element(&mut s, "title", &[], "Logo");
        s.end_element("image");

        s.start_element("textinput", vec![]);
        assert_eq!(s.context_kind(), ContextKind::TextInput);
        element(&mut s, "title", &[], "Search");
        s.end_element("textinput");
        assert_eq!(s.context_kind(), ContextKind::Feed);

        let parsed = s.finish();
        assert_eq!(parsed.feed.get_str("title"), Some("Channel"));
        assert_eq!(parsed.feed.get_dict("image").unwrap().get_str("title"), Some("Logo"));
        assert_eq!(parsed.feed.get_dict("textinput").unwrap().get_str("title"), Some("Search"));
    }

    #[test]
    fn test_xml_base_scopes_relative_links() {
        let mut s = state(Mode::Strict);
        s.start_element("feed", attrs(&[("xml:base", "http://example.com/blog/")]));
        s.start_element("entry", vec![]);
        element(&mut s, "id", &[], "1");
        s.start_element("link", attrs(&[("href", "post/1")]));
        s.end_element("link");
        s.end_element("entry");
        let parsed = s.finish();
        assert_eq!(parsed.entries[0].get_str("link"), Some("http://example.com/blog/post/1"));
    }

    #[test]
    fn test_xml_lang_on_root_sets_feed_language() {
        let mut s = state(Mode::Strict);
        s.start_element("feed", attrs(&[("xml:lang", "en_US")]));
        assert_eq!(s.feed.get_str("language"), Some("en-US"));
    }

    #[test]
    fn test_xhtml_children_are_serialized() {
        let mut s = state(Mode::Strict);
        s.track_namespace(None, crate::namespaces::ATOM10_NAMESPACE);
        s.start_element("feed", vec![]);
        s.start_element("entry", vec![]);
        s.start_element("content", attrs(&[("type", "xhtml")]));
        s.start_element("div", vec![]);
        s.text("a ");
        s.start_element("b", vec![]);
        s.text("x < y");
        s.end_element("b");
        s.end_element("div");
        s.end_element("content");
        let parsed = s.finish();
        let content = parsed.entries[0].get_list("content").unwrap();
        let block = content[0].as_dict().unwrap();
        assert_eq!(block.get_str("value"), Some("a <b>x &lt; y</b>"));
        assert_eq!(block.get_str("type"), Some(XHTML_TYPE));
    }

    #[test]
    fn test_escaped_markup_with_real_children_becomes_xhtml() {
        let mut s = state(Mode::Strict);
        s.start_element("rss", vec![]);
        s.start_element("channel", vec![]);
        s.start_element("item", vec![]);
        s.start_element("description", vec![]);
        s.text("Hello ");
        s.start_element("em", vec![]);
        s.text("world");
        s.end_element("em");
        s.end_element("description");
        let parsed = s.finish();
        assert_eq!(parsed.entries[0].get_str("summary"), Some("Hello <em>world</em>"));
        let detail = parsed.entries[0].get_dict("summary_detail").unwrap();
        assert_eq!(detail.get_str("type"), Some(XHTML_TYPE));
    }

    #[test]
    fn test_shallowest_value_wins_and_ties_keep_first() {
        let mut s = state(Mode::Strict);
        s.start_element("channel", vec![]);
        s.start_element("item", vec![]);
        element(&mut s, "comments", &[], "http://example.com/first");
        element(&mut s, "comments", &[], "http://example.com/second");
        s.start_element("wrapper", vec![]);
        element(&mut s, "comments", &[], "http://example.com/deep");
        s.end_element("wrapper");
        let parsed = s.finish();
        assert_eq!(parsed.entries[0].get_str("comments"), Some("http://example.com/first"));
    }

    #[test]
    fn test_detail_follows_the_kept_value() {
        let mut s = state(Mode::Strict);
        s.start_element("feed", vec![]);
        s.start_element("entry", vec![]);
        element(&mut s, "rights", &[("type", "text")], "Shallow");
        s.start_element("wrapper", vec![]);
        element(&mut s, "rights", &[("type", "html")], "Deep");
        s.end_element("wrapper");
        let parsed = s.finish();

        let entry = &parsed.entries[0];
        assert_eq!(entry.get_str("rights"), Some("Shallow"));
        let detail = entry.get_dict("rights_detail").unwrap();
        assert_eq!(detail.get_str("value"), Some("Shallow"));
        assert_eq!(detail.get_str("type"), Some("text/plain"));
    }

    #[test]
    fn test_depth_map_is_per_entry() {
        let mut s = state(Mode::Strict);
        s.start_element("channel", vec![]);
        for n in ["1", "2"] {
            s.start_element("item", vec![]);
            element(&mut s, "comments", &[], n);
            s.end_element("item");
        }
        let parsed = s.finish();
        assert_eq!(parsed.entries[0].get_str("comments"), Some("1"));
        assert_eq!(parsed.entries[1].get_str("comments"), Some("2"));
    }

    #[test]
    fn test_char_and_entity_refs() {
        let mut s = state(Mode::Loose);
        s.push("x", false);
        s.char_ref("233");
        s.char_ref("x3C");
        s.entity_ref("copy");
        s.entity_ref("amp");
        s.entity_ref("nosuch");
        assert_eq!(s.pop("x").as_deref(), Some("é&#x3c;©&amp;&nosuch;"));
    }

    #[test]
    fn test_safe_doctype_entity_resolves_through_char_ref() {
        let mut options = StateOptions::default();
        options.entities.insert("reg".into(), "&#174;".into());
        options.entities.insert("site".into(), "Example".into());
        let mut s = ParserState::new(Mode::Loose, options);
        s.push("x", false);
        s.entity_ref("reg");
        s.entity_ref("site");
        assert_eq!(s.pop("x").as_deref(), Some("®Example"));
    }

    #[test]
    fn test_refs_outside_any_element_are_dropped() {
        let mut s = state(Mode::Loose);
        s.char_ref("65");
        s.entity_ref("copy");
        s.text("stray");
        assert!(s.elementstack.is_empty());
    }

    #[test]
    fn test_sync_author_detail_splits_email() {
        let mut s = state(Mode::Strict);
        s.start_element("channel", vec![]);
        s.start_element("item", vec![]);
        element(&mut s, "author", &[], "jane@example.com (Jane Doe)");
        let parsed = s.finish();
        let entry = &parsed.entries[0];
        assert_eq!(entry.get_str("author"), Some("jane@example.com (Jane Doe)"));
        let detail = entry.get_dict("author_detail").unwrap();
        assert_eq!(detail.get_str("name"), Some("Jane Doe"));
        assert_eq!(detail.get_str("email"), Some("jane@example.com"));
        let authors = entry.get_list("authors").unwrap();
        assert_eq!(authors[0].as_dict().unwrap().get_str("name"), Some("Jane Doe"));
    }

    #[test]
    fn test_loose_attribute_ampersands_are_unescaped() {
        let mut s = state(Mode::Loose);
        s.start_element("channel", vec![]);
        s.start_element("link", attrs(&[("href", "http://example.com/?a=1&amp;b=2")]));
        s.end_element("link");
        assert_eq!(s.feed.get_str("link"), Some("http://example.com/?a=1&b=2"));
    }

    #[test]
    fn test_add_tag_dedupes_and_skips_empty() {
        let mut s = state(Mode::Strict);
        s.add_tag(Some("rust"), None, None);
        s.add_tag(Some("rust"), None, None);
        s.add_tag(None, Some(""), None);
        assert_eq!(s.feed.get_list("tags").map(<[Value]>::len), Some(1));
        assert_eq!(s.feed.category(), Some("rust"));
    }
}
