//! Core RSS, Atom and CDF elements, plus the `content:` and `feedburner:`
//! elements that behave like them.

use crate::datetimes::parse_date;
use crate::dict::{FeedParserDict, Value};
use crate::feed::attrs::Attrs;
use crate::feed::dispatch::Handler::{self, End, Start};
use crate::feed::state::{map_content_type, ContextKind, ParserState, SummaryTarget, HTML_TYPES, XHTML_TYPE};
use crate::util::make_safe_absolute_uri;

pub(super) const HANDLERS: &[(&str, Handler)] = &[
    ("rss", Start(start_rss)),
    ("channel", Start(start_channel)),
    ("channel", End(end_channel)),
    ("feed", Start(start_feed)),
    ("feed", End(end_channel)),
    ("image", Start(start_image)),
    ("image", End(end_image)),
    ("textinput", Start(start_textinput)),
    ("textinput", End(end_textinput)),
    ("item", Start(start_item)),
    ("item", End(end_item)),
    ("entry", Start(start_item)),
    ("entry", End(end_item)),
    ("author", Start(start_author)),
    ("author", End(end_author)),
    ("managingeditor", Start(start_author)),
    ("managingeditor", End(end_author)),
    ("contributor", Start(start_contributor)),
    ("contributor", End(end_contributor)),
    ("name", Start(start_name)),
    ("name", End(end_name)),
    ("email", Start(start_email)),
    ("email", End(end_email)),
    ("url", Start(start_url)),
    ("url", End(end_url)),
    ("uri", Start(start_url)),
    ("uri", End(end_url)),
    ("homepage", Start(start_url)),
    ("homepage", End(end_url)),
    ("width", Start(start_width)),
    ("width", End(end_width)),
    ("height", Start(start_height)),
    ("height", End(end_height)),
    ("webmaster", Start(start_publisher)),
    ("webmaster", End(end_publisher)),
    ("language", Start(start_language)),
    ("language", End(end_language)),
    ("subtitle", Start(start_subtitle)),
    ("subtitle", End(end_subtitle)),
    ("tagline", Start(start_subtitle)),
    ("tagline", End(end_subtitle)),
    ("rights", Start(start_rights)),
    ("rights", End(end_rights)),
    ("copyright", Start(start_rights)),
    ("copyright", End(end_rights)),
    ("published", Start(start_published)),
    ("published", End(end_published)),
    ("issued", Start(start_published)),
    ("issued", End(end_published)),
    ("pubdate", Start(start_published)),
    ("pubdate", End(end_published)),
    ("updated", Start(start_updated)),
    ("updated", End(end_updated)),
    ("modified", Start(start_updated)),
    ("modified", End(end_updated)),
    ("lastbuilddate", Start(start_updated)),
    ("lastbuilddate", End(end_updated)),
    ("created", Start(start_created)),
    ("created", End(end_created)),
    ("expirationdate", Start(start_expirationdate)),
    ("expirationdate", End(end_expirationdate)),
    ("tags", Start(start_tags)),
    ("tags", End(end_tags)),
    ("category", Start(start_category)),
    ("category", End(end_category)),
    ("keywords", Start(start_category)),
    ("keywords", End(end_category)),
    ("cloud", Start(start_cloud)),
    ("link", Start(start_link)),
    ("link", End(end_link)),
    ("guid", Start(start_guid)),
    ("guid", End(end_guid)),
    ("id", Start(start_guid)),
    ("id", End(end_guid)),
    ("title", Start(start_title)),
    ("title", End(end_title)),
    ("description", Start(start_description)),
    ("description", End(end_description)),
    ("abstract", Start(start_abstract)),
    ("abstract", End(end_description)),
    ("summary", Start(start_summary)),
    ("summary", End(end_summary)),
    ("info", Start(start_info)),
    ("info", End(end_info)),
    ("feedburner_browserfriendly", Start(start_info)),
    ("feedburner_browserfriendly", End(end_info)),
    ("generator", Start(start_generator)),
    ("generator", End(end_generator)),
    ("enclosure", Start(start_enclosure)),
    ("source", Start(start_source)),
    ("source", End(end_source)),
    ("content", Start(start_content)),
    ("content", End(end_content)),
    ("body", Start(start_body)),
    ("body", End(end_content)),
    ("xhtml_body", Start(start_body)),
    ("xhtml_body", End(end_content)),
    ("content_encoded", Start(start_content_encoded)),
    ("content_encoded", End(end_content)),
    ("fullitem", Start(start_content_encoded)),
    ("fullitem", End(end_content)),
    ("newlocation", Start(start_newlocation)),
    ("newlocation", End(end_newlocation)),
];

// ============================================================================
// Document structure
// ============================================================================

fn start_rss(state: &mut ParserState, attrs: Attrs) {
    if state.version.starts_with("rss") {
        return;
    }
    state.version = match attrs.get("version").unwrap_or("") {
        "0.91" => "rss091u",
        "0.92" => "rss092",
        "0.93" => "rss093",
        "0.94" => "rss094",
        v if v.starts_with("2.") => "rss20",
        _ => "rss",
    }
    .to_owned();
}

fn start_channel(state: &mut ParserState, attrs: Attrs) {
    state.infeed = true;
    cdf_common(state, &attrs);
}

/// CDF carries the modification date and link as attributes.
fn cdf_common(state: &mut ParserState, attrs: &Attrs) {
    if let Some(lastmod) = attrs.get("lastmod") {
        start_updated(state, Attrs::new());
        state.set_top_text(lastmod);
        end_updated(state);
    }
    if let Some(href) = attrs.get("href") {
        start_link(state, Attrs::new());
        state.set_top_text(href);
        end_link(state);
    }
}

fn start_feed(state: &mut ParserState, attrs: Attrs) {
    state.infeed = true;
    if !state.version.is_empty() {
        return;
    }
    state.version = match attrs.get("version") {
        Some("0.1") => "atom01",
        Some("0.2") => "atom02",
        Some("0.3") => "atom03",
        _ => "atom",
    }
    .to_owned();
}

fn end_channel(state: &mut ParserState) {
    state.infeed = false;
}

fn start_image(state: &mut ParserState, _attrs: Attrs) {
    if !state.inentry {
        state.context().set_default("image", FeedParserDict::new());
    }
    state.inimage = true;
    state.title_depth = None;
    state.push("image", false);
}

fn end_image(state: &mut ParserState) {
    state.pop("image");
    state.inimage = false;
}

fn start_textinput(state: &mut ParserState, _attrs: Attrs) {
    state.context().set_default("textinput", FeedParserDict::new());
    state.intextinput = true;
    state.title_depth = None;
    state.push("textinput", false);
}

fn end_textinput(state: &mut ParserState) {
    state.pop("textinput");
    state.intextinput = false;
}

fn start_item(state: &mut ParserState, attrs: Attrs) {
    state.entries.push(FeedParserDict::new());
    state.push("item", false);
    state.inentry = true;
    state.guidislink = false;
    state.title_depth = None;
    state.psc_chapters = None;
    if let Some(id) = state.attribute(&attrs, "rdf:about").filter(|id| !id.is_empty()) {
        state.context().set("id", id);
    }
    cdf_common(state, &attrs);
}

fn end_item(state: &mut ParserState) {
    state.pop("item");
    state.inentry = false;
}

// ============================================================================
// People
// ============================================================================

pub(super) fn start_author(state: &mut ParserState, _attrs: Attrs) {
    state.inauthor = true;
    state.push("author", true);
    state.context().ensure_list("authors").push(FeedParserDict::new().into());
}

pub(super) fn end_author(state: &mut ParserState) {
    state.pop("author");
    state.inauthor = false;
    state.sync_author_detail("author");
}

fn start_contributor(state: &mut ParserState, _attrs: Attrs) {
    state.incontributor = true;
    state.context().ensure_list("contributors").push(FeedParserDict::new().into());
    state.push("contributor", false);
}

fn end_contributor(state: &mut ParserState) {
    state.pop("contributor");
    state.incontributor = false;
}

pub(super) fn start_name(state: &mut ParserState, _attrs: Attrs) {
    state.push("name", false);
}

pub(super) fn end_name(state: &mut ParserState) {
    let value = state.pop("name");
    if state.inpublisher {
        state.save_author("name", value, "publisher");
    } else if state.inauthor {
        state.save_author("name", value, "author");
    } else if state.incontributor {
        state.save_contributor("name", value);
    } else if state.intextinput {
        state.context().set("name", value);
    }
}

pub(super) fn start_email(state: &mut ParserState, _attrs: Attrs) {
    state.push("email", false);
}

pub(super) fn end_email(state: &mut ParserState) {
    let value = state.pop("email");
    if state.inpublisher {
        state.save_author("email", value, "publisher");
    } else if state.inauthor {
        state.save_author("email", value, "author");
    } else if state.incontributor {
        state.save_contributor("email", value);
    }
}

fn start_url(state: &mut ParserState, _attrs: Attrs) {
    state.push("href", true);
}

fn end_url(state: &mut ParserState) {
    let value = state.pop("href");
    if state.inauthor {
        state.save_author("href", value, "author");
    } else if state.incontributor {
        state.save_contributor("href", value);
    }
}

pub(super) fn start_publisher(state: &mut ParserState, _attrs: Attrs) {
    state.push("publisher", true);
}

pub(super) fn end_publisher(state: &mut ParserState) {
    state.pop("publisher");
    state.sync_author_detail("publisher");
}

// ============================================================================
// Image dimensions
// ============================================================================

fn start_width(state: &mut ParserState, _attrs: Attrs) {
    state.push("width", false);
}

fn end_width(state: &mut ParserState) {
    end_dimension(state, "width");
}

fn start_height(state: &mut ParserState, _attrs: Attrs) {
    state.push("height", false);
}

fn end_height(state: &mut ParserState) {
    end_dimension(state, "height");
}

fn end_dimension(state: &mut ParserState, key: &str) {
    let value = state
        .pop(key)
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0);
    if state.inimage {
        state.context().set(key, value);
    }
}

// ============================================================================
// Text constructs and dates
// ============================================================================

pub(super) fn start_language(state: &mut ParserState, _attrs: Attrs) {
    state.push("language", true);
}

pub(super) fn end_language(state: &mut ParserState) {
    state.lang = state.pop("language");
}

pub(super) fn start_subtitle(state: &mut ParserState, attrs: Attrs) {
    state.push_content("subtitle", &attrs, "text/plain", true);
}

pub(super) fn end_subtitle(state: &mut ParserState) {
    state.pop_content("subtitle");
}

pub(super) fn start_rights(state: &mut ParserState, attrs: Attrs) {
    state.push_content("rights", &attrs, "text/plain", true);
}

pub(super) fn end_rights(state: &mut ParserState) {
    state.pop_content("rights");
}

/// Pops `tag` and stores its parsed date as `key`, replacing any earlier one.
fn save_date(state: &mut ParserState, tag: &str, key: &str) {
    let parsed = state.pop(tag).as_deref().and_then(parse_date);
    state.save(key, parsed, true);
}

pub(super) fn start_published(state: &mut ParserState, _attrs: Attrs) {
    state.push("published", true);
}

pub(super) fn end_published(state: &mut ParserState) {
    save_date(state, "published", "published_parsed");
}

pub(super) fn start_updated(state: &mut ParserState, _attrs: Attrs) {
    state.push("updated", true);
}

pub(super) fn end_updated(state: &mut ParserState) {
    save_date(state, "updated", "updated_parsed");
}

pub(super) fn start_created(state: &mut ParserState, _attrs: Attrs) {
    state.push("created", true);
}

pub(super) fn end_created(state: &mut ParserState) {
    save_date(state, "created", "created_parsed");
}

fn start_expirationdate(state: &mut ParserState, _attrs: Attrs) {
    state.push("expired", true);
}

fn end_expirationdate(state: &mut ParserState) {
    save_date(state, "expired", "expired_parsed");
}

// ============================================================================
// Categories
// ============================================================================

fn start_tags(state: &mut ParserState, _attrs: Attrs) {
    state.push("tags", true);
}

fn end_tags(state: &mut ParserState) {
    let value = state.pop("tags").unwrap_or_default();
    for term in value.split(',') {
        state.add_tag(Some(term.trim()), None, None);
    }
}

pub(super) fn start_category(state: &mut ParserState, attrs: Attrs) {
    let scheme = attrs.get("scheme").or_else(|| attrs.get("domain"));
    state.add_tag(attrs.get("term"), scheme, attrs.get("label"));
    state.push("category", true);
}

/// The element text fills in a term-less tag opened by the start tag, or
/// becomes a tag of its own.
pub(super) fn end_category(state: &mut ParserState) {
    let Some(value) = state.pop("category").filter(|v| !v.is_empty()) else {
        return;
    };
    let tags = state.context().ensure_list("tags");
    if let Some(last) = tags.last_mut().and_then(Value::as_dict_mut) {
        if !last.get("term").is_some_and(Value::is_truthy) {
            last.set("term", value);
            return;
        }
    }
    state.add_tag(Some(&value), None, None);
}

// ============================================================================
// Links and identifiers
// ============================================================================

fn start_cloud(state: &mut ParserState, attrs: Attrs) {
    state.context().set("cloud", attrs.to_dict());
}

pub(super) fn start_link(state: &mut ParserState, mut attrs: Attrs) {
    attrs.set_default("rel", "alternate");
    if attrs.get("rel") == Some("self") {
        attrs.set_default("type", "application/atom+xml");
    } else {
        attrs.set_default("type", "text/html");
    }
    let mut attrs = ParserState::its_an_href(attrs);
    if let Some(href) = attrs.get("href") {
        let resolved = state.resolve_uri(href);
        attrs.set("href", resolved);
    }
    let expecting_text = state.in_feed_entry_or_source();
    let skip = state.inentry && state.inimage;

    let context = state.context();
    let links = context.ensure_list("links");
    if !skip {
        links.push(attrs.to_dict().into());
    }
    match attrs.get("href") {
        Some(href) => {
            let content_type = map_content_type(attrs.get("type").unwrap_or(""));
            if attrs.get("rel") == Some("alternate") && HTML_TYPES.contains(&content_type.as_str()) {
                context.set("link", href);
            }
        }
        None => state.push("link", expecting_text),
    }
}

pub(super) fn end_link(state: &mut ParserState) {
    state.pop("link");
}

fn start_guid(state: &mut ParserState, attrs: Attrs) {
    state.guidislink = attrs.get("ispermalink").unwrap_or("true") == "true";
    state.push("id", true);
}

/// A permalink guid doubles as the entry link unless a link exists.
fn end_guid(state: &mut ParserState) {
    let value = state.pop("id");
    let has_link = state.context().contains("link");
    state.save("guidislink", state.guidislink && !has_link, false);
    if state.guidislink {
        state.save("link", value, false);
    }
}

fn start_enclosure(state: &mut ParserState, attrs: Attrs) {
    let mut attrs = ParserState::its_an_href(attrs);
    attrs.set("rel", "enclosure");
    state.context().ensure_list("links").push(attrs.to_dict().into());
}

fn start_source(state: &mut ParserState, attrs: Attrs) {
    if let Some(url) = attrs.get("url") {
        state.sourcedata.set("href", url);
    }
    state.push("source", true);
    state.insource = true;
    state.title_depth = None;
}

fn end_source(state: &mut ParserState) {
    state.insource = false;
    if let Some(title) = state.pop("source").filter(|v| !v.is_empty()) {
        state.sourcedata.set("title", title);
    }
    let source = std::mem::take(&mut state.sourcedata);
    state.context().set("source", source);
}

fn start_newlocation(state: &mut ParserState, _attrs: Attrs) {
    state.push("newlocation", true);
}

/// Only honoured at feed level.
fn end_newlocation(state: &mut ParserState) {
    let url = state.pop("newlocation").unwrap_or_default();
    if state.context_kind() != ContextKind::Feed {
        return;
    }
    let location = make_safe_absolute_uri(&state.baseuri, Some(url.trim()));
    state.feed.set("newlocation", location);
}

// ============================================================================
// Content
// ============================================================================

pub(super) fn start_title(state: &mut ParserState, attrs: Attrs) {
    if state.svg_ok > 0 {
        return;
    }
    let expecting_text = state.in_feed_entry_or_source();
    state.push_content("title", &attrs, "text/plain", expecting_text);
}

pub(super) fn end_title(state: &mut ParserState) {
    if state.svg_ok > 0 {
        return;
    }
    if state.pop_content("title").is_some_and(|v| !v.is_empty()) {
        state.title_depth = Some(state.depth);
    }
}

/// A second description-like element in the same record is stored as
/// content.
pub(super) fn start_description(state: &mut ParserState, attrs: Attrs) {
    if state.context().contains("summary") {
        state.summary_target = Some(SummaryTarget::Content);
        start_content(state, attrs);
    } else {
        let expecting_text = state.in_feed_entry_or_source();
        state.push_content("description", &attrs, "text/html", expecting_text);
    }
}

fn start_abstract(state: &mut ParserState, attrs: Attrs) {
    let expecting_text = state.in_feed_entry_or_source();
    state.push_content("description", &attrs, "text/plain", expecting_text);
}

pub(super) fn end_description(state: &mut ParserState) {
    if state.summary_target == Some(SummaryTarget::Content) {
        end_content(state);
    } else {
        state.pop_content("description");
    }
    state.summary_target = None;
}

pub(super) fn start_summary(state: &mut ParserState, attrs: Attrs) {
    if state.context().contains("summary") {
        state.summary_target = Some(SummaryTarget::Content);
        start_content(state, attrs);
    } else {
        state.summary_target = Some(SummaryTarget::Summary);
        state.push_content("summary", &attrs, "text/plain", true);
    }
}

pub(super) fn end_summary(state: &mut ParserState) {
    if state.summary_target == Some(SummaryTarget::Content) {
        end_content(state);
    } else {
        state.pop_content("summary");
    }
    state.summary_target = None;
}

fn start_info(state: &mut ParserState, attrs: Attrs) {
    state.push_content("info", &attrs, "text/plain", true);
}

fn end_info(state: &mut ParserState) {
    state.pop_content("info");
}

fn start_generator(state: &mut ParserState, attrs: Attrs) {
    let mut attrs = ParserState::its_an_href(attrs);
    if let Some(href) = attrs.get("href") {
        let resolved = state.resolve_uri(href);
        attrs.set("href", resolved);
    }
    state.context().set("generator_detail", attrs.to_dict());
    state.push("generator", true);
}

fn end_generator(state: &mut ParserState) {
    let value = state.pop("generator");
    if let Some(detail) = state.context().dict_mut("generator_detail") {
        detail.set("name", value);
    }
}

pub(super) fn start_content(state: &mut ParserState, attrs: Attrs) {
    state.push_content("content", &attrs, "text/plain", true);
    if let (Some(src), Some(params)) = (attrs.get_nonempty("src"), state.contentparams.as_mut()) {
        params.src = Some(src.to_owned());
    }
}

fn start_body(state: &mut ParserState, attrs: Attrs) {
    state.push_content("content", &attrs, XHTML_TYPE, true);
}

fn start_content_encoded(state: &mut ParserState, attrs: Attrs) {
    state.push_content("content", &attrs, "text/html", true);
}

/// Textual content also fills `summary` when the record has none.
pub(super) fn end_content(state: &mut ParserState) {
    let copy_to_summary = state
        .content_type()
        .map(map_content_type)
        .is_some_and(|t| t == "text/plain" || HTML_TYPES.contains(&t.as_str()));
    let value = state.pop_content("content");
    if copy_to_summary {
        state.save("summary", value, false);
    }
}
