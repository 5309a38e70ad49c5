use std::sync::OnceLock;

use regex::Regex;

use super::tokenizer::{preprocess, scan, ScanOptions, TagSink};
use super::{normalize_attrs, MarkupWriter};
use crate::namespaces::{MATHML_NAMESPACE, SVG_NAMESPACE, XLINK_NAMESPACE};
use crate::util::{make_safe_absolute_uri, xml_escape};

const ACCEPTABLE_ELEMENTS: &[&str] = &[
    "a", "abbr", "acronym", "address", "area", "article", "aside", "audio", "b", "big",
    "blockquote", "br", "button", "canvas", "caption", "center", "cite", "code", "col",
    "colgroup", "command", "datagrid", "datalist", "dd", "del", "details", "dfn", "dialog", "dir",
    "div", "dl", "dt", "em", "event-source", "fieldset", "figcaption", "figure", "footer", "font",
    "form", "header", "h1", "h2", "h3", "h4", "h5", "h6", "hr", "i", "img", "input", "ins",
    "keygen", "kbd", "label", "legend", "li", "m", "map", "menu", "meter", "multicol", "nav",
    "nextid", "ol", "output", "optgroup", "option", "p", "pre", "progress", "q", "s", "samp",
    "section", "select", "small", "sound", "source", "spacer", "span", "strike", "strong", "sub",
    "sup", "table", "tbody", "td", "textarea", "time", "tfoot", "th", "thead", "tr", "tt", "u",
    "ul", "var", "video", "noscript",
];

const ACCEPTABLE_ATTRIBUTES: &[&str] = &[
    "abbr", "accept", "accept-charset", "accesskey", "action", "align", "alt", "autocomplete",
    "autofocus", "axis", "background", "balance", "bgcolor", "bgproperties", "border",
    "bordercolor", "bordercolordark", "bordercolorlight", "bottompadding", "cellpadding",
    "cellspacing", "ch", "challenge", "char", "charoff", "choff", "charset", "checked", "cite",
    "class", "clear", "color", "cols", "colspan", "compact", "contenteditable", "controls",
    "coords", "data", "datafld", "datapagesize", "datasrc", "datetime", "default", "delay", "dir",
    "disabled", "draggable", "dynsrc", "enctype", "end", "face", "for", "form", "frame",
    "galleryimg", "gutter", "headers", "height", "hidefocus", "hidden", "high", "href",
    "hreflang", "hspace", "icon", "id", "inputmode", "ismap", "keytype", "label", "leftspacing",
    "lang", "list", "longdesc", "loop", "loopcount", "loopend", "loopstart", "low", "lowsrc",
    "max", "maxlength", "media", "method", "min", "multiple", "name", "nohref", "noshade",
    "nowrap", "open", "optimum", "pattern", "ping", "point-size", "poster", "pqg", "preload",
    "prompt", "radiogroup", "readonly", "rel", "repeat-max", "repeat-min", "replace", "required",
    "rev", "rightspacing", "rows", "rowspan", "rules", "scope", "selected", "shape", "size",
    "span", "src", "start", "step", "summary", "suppress", "tabindex", "target", "template",
    "title", "toppadding", "type", "unselectable", "usemap", "urn", "valign", "value", "variable",
    "volume", "vspace", "vrml", "width", "wrap", "xml:lang",
];

/// Elements whose whole content is dropped, not just their tags.
const UNACCEPTABLE_ELEMENTS_WITH_END_TAG: &[&str] = &["script", "applet", "style"];

const ACCEPTABLE_CSS_PROPERTIES: &[&str] = &[
    "azimuth", "background-color", "border-bottom-color", "border-collapse", "border-color",
    "border-left-color", "border-right-color", "border-top-color", "clear", "color", "cursor",
    "direction", "display", "elevation", "float", "font", "font-family", "font-size",
    "font-style", "font-variant", "font-weight", "height", "letter-spacing", "line-height",
    "overflow", "pause", "pause-after", "pause-before", "pitch", "pitch-range", "richness",
    "speak", "speak-header", "speak-numeral", "speak-punctuation", "speech-rate", "stress",
    "text-align", "text-decoration", "text-indent", "unicode-bidi", "vertical-align",
    "voice-family", "volume", "white-space", "width",
];

const ACCEPTABLE_CSS_KEYWORDS: &[&str] = &[
    "auto", "aqua", "black", "block", "blue", "bold", "both", "bottom", "brown", "center",
    "collapse", "dashed", "dotted", "fuchsia", "gray", "green", "!important", "italic", "left",
    "lime", "maroon", "medium", "none", "navy", "normal", "nowrap", "olive", "pointer", "purple",
    "red", "right", "solid", "silver", "teal", "top", "transparent", "underline", "white",
    "yellow",
];

const ACCEPTABLE_SVG_PROPERTIES: &[&str] = &[
    "fill", "fill-opacity", "fill-rule", "stroke", "stroke-width", "stroke-linecap",
    "stroke-linejoin", "stroke-opacity",
];

const MATHML_ELEMENTS: &[&str] = &[
    "annotation", "annotation-xml", "maction", "maligngroup", "malignmark", "math", "menclose",
    "merror", "mfenced", "mfrac", "mglyph", "mi", "mlabeledtr", "mlongdiv", "mmultiscripts", "mn",
    "mo", "mover", "mpadded", "mphantom", "mprescripts", "mroot", "mrow", "ms", "mscarries",
    "mscarry", "msgroup", "msline", "mspace", "msqrt", "msrow", "mstack", "mstyle", "msub",
    "msubsup", "msup", "mtable", "mtd", "mtext", "mtr", "munder", "munderover", "none",
    "semantics",
];

const MATHML_ATTRIBUTES: &[&str] = &[
    "accent", "accentunder", "actiontype", "align", "alignmentscope", "altimg", "altimg-height",
    "altimg-valign", "altimg-width", "alttext", "bevelled", "charalign", "close", "columnalign",
    "columnlines", "columnspacing", "columnspan", "columnwidth", "crossout", "decimalpoint",
    "denomalign", "depth", "dir", "display", "displaystyle", "edge", "encoding", "equalcolumns",
    "equalrows", "fence", "fontstyle", "fontweight", "form", "frame", "framespacing",
    "groupalign", "height", "href", "id", "indentalign", "indentalignfirst", "indentalignlast",
    "indentshift", "indentshiftfirst", "indentshiftlast", "indenttarget", "infixlinebreakstyle",
    "largeop", "length", "linebreak", "linebreakmultchar", "linebreakstyle", "lineleading",
    "linethickness", "location", "longdivstyle", "lquote", "lspace", "mathbackground",
    "mathcolor", "mathsize", "mathvariant", "maxsize", "minlabelspacing", "minsize",
    "movablelimits", "notation", "numalign", "open", "other", "overflow", "position", "rowalign",
    "rowlines", "rowspacing", "rowspan", "rquote", "rspace", "scriptlevel", "scriptminsize",
    "scriptsizemultiplier", "selection", "separator", "separators", "shift", "side", "src",
    "stackalign", "stretchy", "subscriptshift", "superscriptshift", "symmetric", "voffset",
    "width", "xlink:href", "xlink:show", "xlink:type", "xmlns", "xmlns:xlink",
];

// SVG names keep their camel case; matching is done on the lowercased form.
const SVG_ELEMENTS: &[&str] = &[
    "a", "animate", "animateColor", "animateMotion", "animateTransform", "circle", "defs", "desc",
    "ellipse", "foreignObject", "font-face", "font-face-name", "font-face-src", "g", "glyph",
    "hkern", "linearGradient", "line", "marker", "metadata", "missing-glyph", "mpath", "path",
    "polygon", "polyline", "radialGradient", "rect", "set", "stop", "svg", "switch", "text",
    "title", "tspan", "use",
];

const SVG_ATTRIBUTES: &[&str] = &[
    "accent-height", "accumulate", "additive", "alphabetic", "arabic-form", "ascent",
    "attributeName", "attributeType", "baseProfile", "bbox", "begin", "by", "calcMode",
    "cap-height", "class", "color", "color-rendering", "content", "cx", "cy", "d", "dx", "dy",
    "descent", "display", "dur", "end", "fill", "fill-opacity", "fill-rule", "font-family",
    "font-size", "font-stretch", "font-style", "font-variant", "font-weight", "from", "fx", "fy",
    "g1", "g2", "glyph-name", "gradientUnits", "hanging", "height", "horiz-adv-x",
    "horiz-origin-x", "id", "ideographic", "k", "keyPoints", "keySplines", "keyTimes", "lang",
    "mathematical", "marker-end", "marker-mid", "marker-start", "markerHeight", "markerUnits",
    "markerWidth", "max", "min", "name", "offset", "opacity", "orient", "origin",
    "overline-position", "overline-thickness", "panose-1", "path", "pathLength", "points",
    "preserveAspectRatio", "r", "refX", "refY", "repeatCount", "repeatDur", "requiredExtensions",
    "requiredFeatures", "restart", "rotate", "rx", "ry", "slope", "stemh", "stemv", "stop-color",
    "stop-opacity", "strikethrough-position", "strikethrough-thickness", "stroke",
    "stroke-dasharray", "stroke-dashoffset", "stroke-linecap", "stroke-linejoin",
    "stroke-miterlimit", "stroke-opacity", "stroke-width", "systemLanguage", "target",
    "text-anchor", "to", "transform", "type", "u1", "u2", "underline-position",
    "underline-thickness", "unicode", "unicode-range", "units-per-em", "values", "version",
    "viewBox", "visibility", "width", "widths", "x", "x-height", "x1", "x2", "xlink:actuate",
    "xlink:arcrole", "xlink:href", "xlink:role", "xlink:show", "xlink:title", "xlink:type",
    "xml:base", "xml:lang", "xml:space", "xmlns", "xmlns:xlink", "y", "y1", "y2", "zoomAndPan",
];

/// True when `tag` is an HTML element allowed through the sanitizer.
pub fn is_acceptable_element(tag: &str) -> bool {
    ACCEPTABLE_ELEMENTS.contains(&tag)
}

/// Canonical (camel case) spelling of a lowercased SVG name.
fn svg_name(list: &'static [&'static str], lowered: &str) -> Option<&'static str> {
    list.iter().copied().find(|name| name.eq_ignore_ascii_case(lowered))
}

#[derive(Clone, Copy, PartialEq)]
enum Vocabulary {
    Html,
    MathMl,
    Svg,
}

impl Vocabulary {
    /// Canonical attribute name if `key` is allowed in this vocabulary.
    fn accept(self, key: &str) -> Option<String> {
        match self {
            Vocabulary::Html => ACCEPTABLE_ATTRIBUTES.contains(&key).then(|| key.to_owned()),
            Vocabulary::MathMl => MATHML_ATTRIBUTES.contains(&key).then(|| key.to_owned()),
            Vocabulary::Svg => svg_name(SVG_ATTRIBUTES, key).map(str::to_owned),
        }
    }
}

struct Sanitizer<'a> {
    content_type: &'a str,
    writer: MarkupWriter,
    unacceptable_depth: usize,
    mathml_depth: usize,
    svg_depth: usize,
}

impl TagSink for Sanitizer<'_> {
    fn start_tag(&mut self, tag: &str, mut attrs: Vec<(String, String)>) {
        let mut tag = tag.to_owned();
        let mut vocabulary = Vocabulary::Html;

        if !is_acceptable_element(&tag) || self.svg_depth > 0 {
            if UNACCEPTABLE_ELEMENTS_WITH_END_TAG.contains(&tag.as_str()) {
                self.unacceptable_depth += 1;
            }

            // HTML5 inline svg/math carry an implicit namespace
            let has_xmlns = attrs.iter().any(|(k, v)| k == "xmlns" && !v.is_empty());
            if self.content_type.ends_with("html") && !has_xmlns {
                if tag == "svg" {
                    attrs.push(("xmlns".into(), SVG_NAMESPACE.into()));
                }
                if tag == "math" {
                    attrs.push(("xmlns".into(), MATHML_NAMESPACE.into()));
                }
            }
            let declares = |ns: &str| attrs.iter().any(|(k, v)| k == "xmlns" && v == ns);
            if tag == "math" && declares(MATHML_NAMESPACE) {
                self.mathml_depth += 1;
            }
            if tag == "svg" && declares(SVG_NAMESPACE) {
                self.svg_depth += 1;
            }

            if self.mathml_depth > 0 && MATHML_ELEMENTS.contains(&tag.as_str()) {
                vocabulary = Vocabulary::MathMl;
            } else if let Some(name) = (self.svg_depth > 0).then(|| svg_name(SVG_ELEMENTS, &tag)).flatten() {
                vocabulary = Vocabulary::Svg;
                tag = name.to_owned();
            } else if !is_acceptable_element(&tag) {
                return;
            }
        }

        if self.mathml_depth > 0 || self.svg_depth > 0 {
            let uses_xlink = attrs.iter().any(|(k, _)| k.starts_with("xlink:"));
            let declared = attrs.iter().any(|(k, v)| k == "xmlns:xlink" && v == XLINK_NAMESPACE);
            if uses_xlink && !declared {
                attrs.push(("xmlns:xlink".into(), XLINK_NAMESPACE.into()));
            }
        }

        let mut clean = Vec::new();
        for (key, value) in normalize_attrs(attrs) {
            if let Some(key) = vocabulary.accept(&key) {
                let value = if key == "href" { make_safe_absolute_uri(&value, None) } else { value };
                clean.push((key, value));
            } else if key == "style" {
                let style = sanitize_style(&value, self.svg_depth > 0);
                if !style.is_empty() {
                    clean.push((key, style));
                }
            }
        }
        self.writer.start_tag(&tag, &clean);
    }

    fn end_tag(&mut self, tag: &str) {
        let mut tag = tag;
        if !is_acceptable_element(tag) {
            if UNACCEPTABLE_ELEMENTS_WITH_END_TAG.contains(&tag) {
                self.unacceptable_depth = self.unacceptable_depth.saturating_sub(1);
            }
            if self.mathml_depth > 0 && MATHML_ELEMENTS.contains(&tag) {
                if tag == "math" {
                    self.mathml_depth -= 1;
                }
            } else if let Some(name) = (self.svg_depth > 0).then(|| svg_name(SVG_ELEMENTS, tag)).flatten() {
                tag = name;
                if tag == "svg" {
                    self.svg_depth -= 1;
                }
            } else {
                return;
            }
        }
        self.writer.end_tag(tag);
    }

    fn text(&mut self, text: &str) {
        if self.unacceptable_depth == 0 {
            self.writer.text(text);
        }
    }

    fn char_ref(&mut self, name: &str) {
        self.writer.char_ref(name);
    }

    fn entity_ref(&mut self, name: &str) {
        self.writer.entity_ref(name);
    }

    fn cdata(&mut self, text: &str) {
        if self.unacceptable_depth == 0 {
            self.writer.text(&xml_escape(text));
        }
    }

    fn comment(&mut self, text: &str) {
        self.writer.comment(text);
    }
}

static CSS_URL_RE: OnceLock<Regex> = OnceLock::new();
static CSS_GAUNTLET_RE: OnceLock<Regex> = OnceLock::new();
static CSS_DECLARATION_RE: OnceLock<Regex> = OnceLock::new();
static CSS_PROPERTY_RE: OnceLock<Regex> = OnceLock::new();
static CSS_VALUE_RE: OnceLock<Regex> = OnceLock::new();

fn css_url_regex() -> &'static Regex {
    CSS_URL_RE.get_or_init(|| Regex::new(r"url\s*\(\s*[^\s)]+?\s*\)\s*").expect("Failed to compile CSS url regex"))
}

fn css_gauntlet_regex() -> &'static Regex {
    CSS_GAUNTLET_RE.get_or_init(|| {
        Regex::new(r#"^([:,;#%.\sa-zA-Z0-9!]|\w-\w|'[\s\w]+'|"[\s\w]+"|\([\d,\s]+\))*$"#)
            .expect("Failed to compile CSS gauntlet regex")
    })
}

fn css_declaration_regex() -> &'static Regex {
    CSS_DECLARATION_RE.get_or_init(|| {
        Regex::new(r"\s*[-\w]+\s*:\s*[^:;]*;?").expect("Failed to compile CSS declaration regex")
    })
}

fn css_property_regex() -> &'static Regex {
    CSS_PROPERTY_RE.get_or_init(|| Regex::new(r"([-\w]+)\s*:\s*([^:;]*)").expect("Failed to compile CSS property regex"))
}

fn css_value_regex() -> &'static Regex {
    CSS_VALUE_RE.get_or_init(|| {
        Regex::new(r"^(#[0-9a-f]+|rgb\(\d+%?,\d*%?,?\d*%?\)?|\d{0,2}\.?\d{0,2}(cm|em|ex|in|mm|pc|pt|px|%|,|\))?)$")
            .expect("Failed to compile CSS value regex")
    })
}

/// Keeps only allow-listed CSS declarations; `url(...)` values never survive.
fn sanitize_style(style: &str, in_svg: bool) -> String {
    let style = css_url_regex().replace_all(style, " ");
    if !css_gauntlet_regex().is_match(&style) {
        return String::new();
    }
    if !css_declaration_regex().replace_all(&style, "").trim().is_empty() {
        return String::new();
    }

    let mut clean = Vec::new();
    for caps in css_property_regex().captures_iter(&style) {
        let (prop, value) = (&caps[1], &caps[2]);
        if value.is_empty() {
            continue;
        }
        let lowered = prop.to_lowercase();
        let family = lowered.split('-').next().unwrap_or("");
        let keep = if ACCEPTABLE_CSS_PROPERTIES.contains(&lowered.as_str()) {
            true
        } else if matches!(family, "background" | "border" | "margin" | "padding") {
            value
                .split_whitespace()
                .all(|kw| ACCEPTABLE_CSS_KEYWORDS.contains(&kw) || css_value_regex().is_match(kw))
        } else {
            in_svg && ACCEPTABLE_SVG_PROPERTIES.contains(&lowered.as_str())
        };
        if keep {
            clean.push(format!("{prop}: {value};"));
        }
    }
    clean.join(" ")
}

/// Strips disallowed markup from an HTML fragment.
///
/// `content_type` is the MIME type of the block; `text/html`-like types get
/// implicit namespaces for inline `<svg>`/`<math>`, and
/// `application/xhtml+xml` honours `<tag/>` self-closing syntax.
///
/// # Examples
///
/// ```
/// use feedparse::html::sanitize_html;
///
/// let clean = sanitize_html(r#"<p onclick="evil()">hi<script>alert(1)</script></p>"#, "text/html");
/// assert_eq!(clean, "<p>hi</p>");
/// ```
pub fn sanitize_html(html: &str, content_type: &str) -> String {
    let source = html.replace("<![CDATA[", "&lt;![CDATA[");
    let mut sanitizer = Sanitizer {
        content_type,
        writer: MarkupWriter::default(),
        unacceptable_depth: 0,
        mathml_depth: 0,
        svg_depth: 0,
    };
    let options = ScanOptions {
        xhtml: content_type == "application/xhtml+xml",
        swallow_bad_comments: true,
    };
    scan(&preprocess(&source), options, &mut sanitizer);
    sanitizer.writer.finish().trim().replace("\r\n", "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_drops_script_content() {
        assert_eq!(sanitize_html("a<script>bad()</script>b", "text/html"), "ab");
        assert_eq!(sanitize_html("<style>p{}</style>ok", "text/html"), "ok");
    }

    #[test]
    fn test_drops_unknown_elements_but_keeps_text() {
        assert_eq!(sanitize_html("<blink>flash</blink>", "text/html"), "flash");
    }

    #[test]
    fn test_filters_attributes() {
        assert_eq!(
            sanitize_html(r#"<a href="http://x.org/" onclick="x()" title="t">l</a>"#, "text/html"),
            r#"<a href="http://x.org/" title="t">l</a>"#
        );
    }

    #[test]
    fn test_unsafe_href_is_blanked() {
        assert_eq!(
            sanitize_html(r#"<a href="javascript:alert(1)">x</a>"#, "text/html"),
            r#"<a href="">x</a>"#
        );
    }

    #[test]
    fn test_style_filtering() {
        assert_eq!(sanitize_style("color: red; position: absolute", false), "color: red;");
        assert_eq!(sanitize_style("background: url(http://evil/)", false), "");
        assert_eq!(sanitize_style("margin: 0 auto", false), "margin: 0 auto;");
        assert_eq!(sanitize_style("fill: red", false), "");
        assert_eq!(sanitize_style("fill: red", true), "fill: red;");
    }

    #[test]
    fn test_inline_svg_keeps_camel_case() {
        let out = sanitize_html(
            r#"<svg viewbox="0 0 10 10"><lineargradient id="g"></lineargradient></svg>"#,
            "text/html",
        );
        assert_eq!(
            out,
            r#"<svg viewBox="0 0 10 10" xmlns="http://www.w3.org/2000/svg"><linearGradient id="g"></linearGradient></svg>"#
        );
    }

    #[test]
    fn test_cdata_is_escaped() {
        assert_eq!(sanitize_html("<![CDATA[x]]>", "text/html"), "&lt;![CDATA[x]]>");
    }

    #[test]
    fn test_unclosed_comment_is_swallowed() {
        assert_eq!(sanitize_html("keep<!-- rest of page", "text/html"), "keep");
    }

    #[test]
    fn test_comments_pass_through() {
        assert_eq!(sanitize_html("a<!-- c -->b", "text/html"), "a<!-- c -->b");
    }
}
