//! Media RSS (`media:`) elements.

use super::rss_atom::{end_category, end_description, end_title, start_category, start_description, start_title};
use crate::dict::Value;
use crate::feed::attrs::Attrs;
use crate::feed::dispatch::Handler::{self, End, Start};
use crate::feed::state::ParserState;

const CATEGORY_SCHEME: &str = "http://search.yahoo.com/mrss/category_schema";

pub(super) const HANDLERS: &[(&str, Handler)] = &[
    ("media_title", Start(start_title)),
    ("media_title", End(end_media_title)),
    ("media_description", Start(start_description)),
    ("media_description", End(end_description)),
    ("media_category", Start(start_media_category)),
    ("media_category", End(end_category)),
    ("media_keywords", End(end_media_keywords)),
    ("media_group", Start(start_media_group)),
    ("media_rating", Start(start_media_rating)),
    ("media_rating", End(end_media_rating)),
    ("media_credit", Start(start_media_credit)),
    ("media_credit", End(end_media_credit)),
    ("media_restriction", Start(start_media_restriction)),
    ("media_restriction", End(end_media_restriction)),
    ("media_license", Start(start_media_license)),
    ("media_license", End(end_media_license)),
    ("media_content", Start(start_media_content)),
    ("media_thumbnail", Start(start_media_thumbnail)),
    ("media_thumbnail", End(end_media_thumbnail)),
    ("media_player", Start(start_media_player)),
    ("media_player", End(end_media_player)),
];

/// A media title never blocks a later plain title.
fn end_media_title(state: &mut ParserState) {
    let title_depth = state.title_depth;
    end_title(state);
    state.title_depth = title_depth;
}

fn start_media_category(state: &mut ParserState, mut attrs: Attrs) {
    attrs.set_default("scheme", CATEGORY_SCHEME);
    start_category(state, attrs);
}

fn end_media_keywords(state: &mut ParserState) {
    let value = state.pop("media_keywords").unwrap_or_default();
    for term in value.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        state.add_tag(Some(term), None, None);
    }
}

/// Children are handled on their own.
fn start_media_group(_state: &mut ParserState, _attrs: Attrs) {}

fn start_media_rating(state: &mut ParserState, attrs: Attrs) {
    state.context().set_default("media_rating", attrs.to_dict());
    state.push("rating", true);
}

fn end_media_rating(state: &mut ParserState) {
    if let Some(rating) = state.pop("rating").filter(|r| !r.trim().is_empty()) {
        if let Some(detail) = state.context().dict_mut("media_rating") {
            detail.set("content", rating);
        }
    }
}

fn start_media_credit(state: &mut ParserState, attrs: Attrs) {
    state.context().ensure_list("media_credit").push(attrs.to_dict().into());
    state.push("credit", true);
}

fn end_media_credit(state: &mut ParserState) {
    if let Some(credit) = state.pop("credit").filter(|c| !c.trim().is_empty()) {
        if let Some(last) = state.context().last_dict_mut("media_credit") {
            last.set("content", credit);
        }
    }
}

fn start_media_restriction(state: &mut ParserState, attrs: Attrs) {
    state.context().set_default("media_restriction", attrs.to_dict());
    state.push("restriction", true);
}

/// Restrictions are space-separated, lowercased country codes.
fn end_media_restriction(state: &mut ParserState) {
    let Some(restriction) = state.pop("restriction").filter(|r| !r.trim().is_empty()) else {
        return;
    };
    let codes: Vec<Value> = restriction
        .split(' ')
        .map(|code| Value::from(code.trim().to_lowercase()))
        .collect();
    if let Some(detail) = state.context().dict_mut("media_restriction") {
        detail.set("content", codes);
    }
}

fn start_media_license(state: &mut ParserState, attrs: Attrs) {
    state.context().set_default("media_license", attrs.to_dict());
    state.push("license", true);
}

fn end_media_license(state: &mut ParserState) {
    if let Some(license) = state.pop("license").filter(|l| !l.trim().is_empty()) {
        if let Some(detail) = state.context().dict_mut("media_license") {
            detail.set("content", license);
        }
    }
}

fn start_media_content(state: &mut ParserState, attrs: Attrs) {
    state.context().ensure_list("media_content").push(attrs.to_dict().into());
}

fn start_media_thumbnail(state: &mut ParserState, attrs: Attrs) {
    state.push("url", true);
    state.context().ensure_list("media_thumbnail").push(attrs.to_dict().into());
}

/// Element text supplies the URL when the attribute did not.
fn end_media_thumbnail(state: &mut ParserState) {
    let Some(url) = state.pop("url").filter(|u| !u.trim().is_empty()) else {
        return;
    };
    if let Some(last) = state.context().last_dict_mut("media_thumbnail") {
        if !last.contains_raw("url") {
            last.insert_raw("url", url);
        }
    }
}

fn start_media_player(state: &mut ParserState, attrs: Attrs) {
    state.push("media_player", false);
    state.context().set("media_player", attrs.to_dict());
}

fn end_media_player(state: &mut ParserState) {
    let value = state.pop("media_player");
    if let Some(player) = state.context().dict_mut("media_player") {
        player.set("content", value);
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{rss, run, Ev};
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_media_content_and_thumbnail() {
        let parsed = run(&rss(
            true,
            vec![
                Ev::Start("media:group", &[]),
                Ev::Start("media:content", &[("url", "http://example.com/v.mp4"), ("medium", "video")]),
                Ev::End("media:content"),
                Ev::Start("media:thumbnail", &[("url", "http://example.com/t.jpg"), ("width", "75")]),
                Ev::End("media:thumbnail"),
                Ev::End("media:group"),
            ],
        ));
        let entry = &parsed.entries[0];
        let content = entry.get_list("media_content").unwrap()[0].as_dict().unwrap();
        assert_eq!(content.get_raw("url").and_then(Value::as_str), Some("http://example.com/v.mp4"));
        assert_eq!(content.get_str("medium"), Some("video"));
        let thumbnail = entry.get_list("media_thumbnail").unwrap()[0].as_dict().unwrap();
        assert_eq!(thumbnail.get_raw("url").and_then(Value::as_str), Some("http://example.com/t.jpg"));
    }

    #[test]
    fn test_thumbnail_url_from_text() {
        let parsed = run(&rss(
            true,
            vec![
                Ev::Start("media:thumbnail", &[]),
                Ev::Text("http://example.com/t.jpg"),
                Ev::End("media:thumbnail"),
            ],
        ));
        let thumbnail = parsed.entries[0].get_list("media_thumbnail").unwrap()[0].as_dict().unwrap();
        assert_eq!(thumbnail.get_str("url"), Some("http://example.com/t.jpg"));
    }

    #[test]
    fn test_restriction_codes() {
        let parsed = run(&rss(
            true,
            vec![
                Ev::Start("media:restriction", &[("relationship", "allow"), ("type", "country")]),
                Ev::Text("US CA"),
                Ev::End("media:restriction"),
            ],
        ));
        let restriction = parsed.entries[0].get_dict("media_restriction").unwrap();
        assert_eq!(restriction.get_str("relationship"), Some("allow"));
        let codes: Vec<_> = restriction.get_list("content").unwrap().iter().filter_map(Value::as_str).collect();
        assert_eq!(codes, vec!["us", "ca"]);
    }

    #[test]
    fn test_credit_and_rating() {
        let parsed = run(&rss(
            true,
            vec![
                Ev::Start("media:credit", &[("role", "author")]),
                Ev::Text("Jane"),
                Ev::End("media:credit"),
                Ev::Start("media:rating", &[("scheme", "urn:simple")]),
                Ev::Text("adult"),
                Ev::End("media:rating"),
            ],
        ));
        let entry = &parsed.entries[0];
        let credit = entry.get_list("media_credit").unwrap()[0].as_dict().unwrap();
        assert_eq!(credit.get_str("content"), Some("Jane"));
        assert_eq!(credit.get_str("role"), Some("author"));
        let rating = entry.get_dict("media_rating").unwrap();
        assert_eq!(rating.get_str("content"), Some("adult"));
    }

    #[test]
    fn test_media_title_is_kept_over_equally_deep_title() {
        let parsed = run(&rss(
            true,
            vec![
                Ev::Start("media:title", &[]),
                Ev::Text("Clip"),
                Ev::End("media:title"),
                Ev::Start("title", &[]),
                Ev::Text("Post"),
                Ev::End("title"),
            ],
        ));
        assert_eq!(parsed.entries[0].get_str("title"), Some("Clip"));
    }

    #[test]
    fn test_media_category_default_scheme() {
        let parsed = run(&rss(
            true,
            vec![Ev::Start("media:category", &[]), Ev::Text("music/rock"), Ev::End("media:category")],
        ));
        let tag = parsed.entries[0].get_list("tags").unwrap()[0].as_dict().unwrap().clone();
        assert_eq!(tag.get_str("term"), Some("music/rock"));
        assert_eq!(tag.get_str("scheme"), Some(CATEGORY_SCHEME));
    }
}
