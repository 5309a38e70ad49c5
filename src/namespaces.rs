//! Namespace Registry.
//!
//! A static table maps the namespace URIs that feeds use to the short
//! prefixes element handlers are keyed by, and [`NamespaceScope`] tracks what
//! a single document actually declared.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

pub const ATOM10_NAMESPACE: &str = "http://www.w3.org/2005/Atom";
pub const MATHML_NAMESPACE: &str = "http://www.w3.org/1998/Math/MathML";
pub const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";
pub const XLINK_NAMESPACE: &str = "http://www.w3.org/1999/xlink";
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

const USERLAND_RSS: &str = "http://backend.userland.com/rss";

/// Namespace URI to canonical prefix. The empty prefix marks the core
/// RSS/Atom vocabularies.
const KNOWN_NAMESPACES: &[(&str, &str)] = &[
    ("", ""),
    (USERLAND_RSS, ""),
    ("http://blogs.law.harvard.edu/tech/rss", ""),
    ("http://purl.org/rss/1.0/", ""),
    ("http://my.netscape.com/rdf/simple/0.9/", ""),
    ("http://example.com/newformat#", ""),
    ("http://example.com/necho", ""),
    ("http://purl.org/echo/", ""),
    ("uri/of/echo/namespace#", ""),
    ("http://purl.org/pie/", ""),
    ("http://purl.org/atom/ns#", ""),
    (ATOM10_NAMESPACE, ""),
    ("http://purl.org/rss/1.0/modules/rss091#", ""),
    ("http://webns.net/mvcb/", "admin"),
    ("http://purl.org/rss/1.0/modules/aggregation/", "ag"),
    ("http://purl.org/rss/1.0/modules/annotate/", "annotate"),
    ("http://media.tangent.org/rss/1.0/", "audio"),
    ("http://backend.userland.com/blogChannelModule", "blogChannel"),
    ("http://creativecommons.org/ns#license", "cc"),
    ("http://web.resource.org/cc/", "cc"),
    ("http://cyber.law.harvard.edu/rss/creativeCommonsRssModule.html", "creativecommons"),
    ("http://backend.userland.com/creativeCommonsRssModule", "creativecommons"),
    ("http://purl.org/rss/1.0/modules/company", "co"),
    ("http://purl.org/rss/1.0/modules/content/", "content"),
    ("http://my.theinfo.org/changed/1.0/rss/", "cp"),
    ("http://purl.org/dc/elements/1.1/", "dc"),
    ("http://purl.org/dc/terms/", "dcterms"),
    ("http://purl.org/rss/1.0/modules/email/", "email"),
    ("http://purl.org/rss/1.0/modules/event/", "ev"),
    ("http://rssnamespace.org/feedburner/ext/1.0", "feedburner"),
    ("http://freshmeat.net/rss/fm/", "fm"),
    ("http://xmlns.com/foaf/0.1/", "foaf"),
    ("http://www.w3.org/2003/01/geo/wgs84_pos#", "geo"),
    ("http://www.georss.org/georss", "georss"),
    ("http://www.opengis.net/gml", "gml"),
    ("http://postneo.com/icbm/", "icbm"),
    ("http://purl.org/rss/1.0/modules/image/", "image"),
    ("http://www.itunes.com/DTDs/PodCast-1.0.dtd", "itunes"),
    ("http://example.com/DTDs/PodCast-1.0.dtd", "itunes"),
    ("http://purl.org/rss/1.0/modules/link/", "l"),
    ("http://search.yahoo.com/mrss", "media"),
    ("http://search.yahoo.com/mrss/", "media"),
    ("http://madskills.com/public/xml/rss/module/pingback/", "pingback"),
    ("http://prismstandard.org/namespaces/1.2/basic/", "prism"),
    ("http://podlove.org/simple-chapters", "psc"),
    ("http://www.w3.org/1999/02/22-rdf-syntax-ns#", "rdf"),
    ("http://www.w3.org/2000/01/rdf-schema#", "rdfs"),
    ("http://purl.org/rss/1.0/modules/reference/", "ref"),
    ("http://purl.org/rss/1.0/modules/richequiv/", "reqv"),
    ("http://purl.org/rss/1.0/modules/search/", "search"),
    ("http://purl.org/rss/1.0/modules/slash/", "slash"),
    ("http://schemas.xmlsoap.org/soap/envelope/", "soap"),
    ("http://purl.org/rss/1.0/modules/servicestatus/", "ss"),
    ("http://hacks.benhammersley.com/rss/streaming/", "str"),
    ("http://purl.org/rss/1.0/modules/subscription/", "sub"),
    ("http://purl.org/rss/1.0/modules/syndication/", "sy"),
    ("http://schemas.pocketsoap.com/rss/myDescModule/", "szf"),
    ("http://purl.org/rss/1.0/modules/taxonomy/", "taxo"),
    ("http://purl.org/rss/1.0/modules/threading/", "thr"),
    ("http://purl.org/rss/1.0/modules/textinput/", "ti"),
    ("http://madskills.com/public/xml/rss/module/trackback/", "trackback"),
    ("http://wellformedweb.org/commentAPI/", "wfw"),
    ("http://purl.org/rss/1.0/modules/wiki/", "wiki"),
    ("http://www.w3.org/1999/xhtml", "xhtml"),
    (XLINK_NAMESPACE, "xlink"),
    (XML_NAMESPACE, "xml"),
];

static MATCH_TABLE: OnceLock<HashMap<String, &'static str>> = OnceLock::new();

fn match_table() -> &'static HashMap<String, &'static str> {
    MATCH_TABLE.get_or_init(|| {
        KNOWN_NAMESPACES
            .iter()
            .map(|(uri, prefix)| (uri.to_lowercase(), *prefix))
            .collect()
    })
}

/// Folds every `backend.userland.com/rss*` URI onto one canonical URI.
pub(crate) fn fold_uri(uri: &str) -> Cow<'_, str> {
    if uri.to_lowercase().contains("backend.userland.com/rss") {
        Cow::Borrowed(USERLAND_RSS)
    } else {
        Cow::Borrowed(uri)
    }
}

/// Canonical short prefix for a namespace URI (case-insensitive).
///
/// # Examples
///
/// ```
/// use feedparse::namespaces::canonical_prefix_for;
///
/// assert_eq!(canonical_prefix_for("http://purl.org/dc/elements/1.1/"), Some("dc"));
/// assert_eq!(canonical_prefix_for("HTTP://WWW.W3.ORG/2005/ATOM"), Some(""));
/// assert_eq!(canonical_prefix_for("http://backend.userland.com/rss2"), Some(""));
/// assert_eq!(canonical_prefix_for("urn:unknown"), None);
/// ```
pub fn canonical_prefix_for(uri: &str) -> Option<&'static str> {
    match_table().get(&fold_uri(uri).to_lowercase()).copied()
}

/// Feed version implied by declaring `uri`, if any.
fn version_for(prefix: Option<&str>, lower_uri: &str) -> Option<&'static str> {
    match lower_uri {
        "http://my.netscape.com/rdf/simple/0.9/" if prefix.is_none() => Some("rss090"),
        "http://purl.org/rss/1.0/" => Some("rss10"),
        "http://www.w3.org/2005/atom" => Some("atom10"),
        _ => None,
    }
}

/// Per-document namespace state.
#[derive(Debug, Clone, Default)]
pub struct NamespaceScope {
    /// Document prefix (`None` for the default namespace) to canonical prefix.
    prefix_map: HashMap<Option<String>, &'static str>,
    /// What the document declared, keyed by canonical prefix where known.
    in_use: BTreeMap<String, String>,
}

impl NamespaceScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a namespace declaration. Returns the feed version the
    /// declaration implies; callers only apply it while no version is set.
    pub fn register_declared(&mut self, prefix: Option<&str>, uri: &str) -> Option<&'static str> {
        let version = version_for(prefix, &uri.to_lowercase());
        let uri = fold_uri(uri);
        match canonical_prefix_for(&uri) {
            Some(canonical) => {
                self.prefix_map.insert(prefix.map(str::to_owned), canonical);
                self.in_use.insert(canonical.to_owned(), uri.into_owned());
            }
            None => {
                self.in_use.insert(prefix.unwrap_or("").to_owned(), uri.into_owned());
            }
        }
        version
    }

    /// Maps a prefix written in the document to its canonical prefix;
    /// unknown prefixes map to themselves.
    pub fn map_prefix<'a>(&self, prefix: &'a str) -> &'a str {
        self.prefix_map
            .get(&Some(prefix.to_owned()))
            .copied()
            .unwrap_or(prefix)
    }

    /// URI declared under `prefix` (canonical or as written).
    pub fn uri_for(&self, prefix: &str) -> Option<&str> {
        self.in_use.get(prefix).map(String::as_str)
    }

    pub fn is_declared(&self, prefix: &str) -> bool {
        self.in_use.contains_key(prefix)
    }

    pub fn in_use(&self) -> &BTreeMap<String, String> {
        &self.in_use
    }

    pub fn into_in_use(self) -> BTreeMap<String, String> {
        self.in_use
    }

    /// Handler key for a qualified element name: the document prefix is
    /// replaced by its canonical prefix and joined to the local name with
    /// `_`, then case-folded.
    pub fn handler_key(&self, qname: &str) -> String {
        match qname.split_once(':') {
            Some((prefix, local)) => {
                let prefix = self.map_prefix(prefix);
                if prefix.is_empty() {
                    local.to_lowercase()
                } else {
                    format!("{prefix}_{local}").to_lowercase()
                }
            }
            None => qname.to_lowercase(),
        }
    }
}
