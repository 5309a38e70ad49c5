//! Apple podcast (`itunes:`) elements.

use super::rss_atom::{
    end_author, end_category, end_email, end_name, end_subtitle, end_summary, start_author, start_email,
    start_name, start_subtitle, start_summary,
};
use crate::dict::{FeedParserDict, Value};
use crate::feed::attrs::Attrs;
use crate::feed::dispatch::Handler::{self, End, Start};
use crate::feed::state::ParserState;

/// Scheme given to tags that come from iTunes categories and keywords.
const ITUNES_SCHEME: &str = "http://www.itunes.com/";

pub(super) const HANDLERS: &[(&str, Handler)] = &[
    ("itunes_author", Start(start_author)),
    ("itunes_author", End(end_author)),
    ("itunes_owner", Start(start_itunes_owner)),
    ("itunes_owner", End(end_itunes_owner)),
    ("itunes_name", Start(start_name)),
    ("itunes_name", End(end_name)),
    ("itunes_email", Start(start_email)),
    ("itunes_email", End(end_email)),
    ("itunes_subtitle", Start(start_subtitle)),
    ("itunes_subtitle", End(end_subtitle)),
    ("itunes_summary", Start(start_summary)),
    ("itunes_summary", End(end_summary)),
    ("itunes_category", Start(start_itunes_category)),
    ("itunes_category", End(end_category)),
    ("itunes_keywords", End(end_itunes_keywords)),
    ("itunes_image", Start(start_itunes_image)),
    ("itunes_link", Start(start_itunes_image)),
    ("itunes_block", End(end_itunes_block)),
    ("itunes_explicit", End(end_itunes_explicit)),
];

/// The owner's name and email are stored as the publisher.
fn start_itunes_owner(state: &mut ParserState, _attrs: Attrs) {
    state.inpublisher = true;
    state.push("publisher", false);
}

fn end_itunes_owner(state: &mut ParserState) {
    state.pop("publisher");
    state.inpublisher = false;
    state.sync_author_detail("publisher");
}

fn start_itunes_category(state: &mut ParserState, attrs: Attrs) {
    state.add_tag(attrs.get("text"), Some(ITUNES_SCHEME), None);
    state.push("category", true);
}

fn end_itunes_keywords(state: &mut ParserState) {
    let value = state.pop("itunes_keywords").unwrap_or_default();
    for term in value.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        state.add_tag(Some(term), Some(ITUNES_SCHEME), None);
    }
}

fn start_itunes_image(state: &mut ParserState, attrs: Attrs) {
    state.push("itunes_image", false);
    if let Some(href) = attrs.get_nonempty("href").or_else(|| attrs.get_nonempty("url")) {
        let image: FeedParserDict = [("href", Value::from(href))].into_iter().collect();
        state.context().set("image", image);
    }
}

fn end_itunes_block(state: &mut ParserState) {
    let blocked = state.pop_unstripped("itunes_block").as_deref() == Some("yes");
    state.context().set("itunes_block", i64::from(blocked));
}

/// `yes` is explicit, `clean` is not, anything else is unknown.
fn end_itunes_explicit(state: &mut ParserState) {
    let explicit = match state.pop_unstripped("itunes_explicit").as_deref() {
        Some("yes") => Value::Bool(true),
        Some("clean") => Value::Bool(false),
        _ => Value::Null,
    };
    state.context().set("itunes_explicit", explicit);
}

#[cfg(test)]
mod tests {
    use super::super::testing::{rss, run, Ev};
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_owner_becomes_publisher() {
        let parsed = run(&rss(
            false,
            vec![
                Ev::Start("itunes:owner", &[]),
                Ev::Start("itunes:name", &[]),
                Ev::Text("Pod Co"),
                Ev::End("itunes:name"),
                Ev::Start("itunes:email", &[]),
                Ev::Text("pod@example.com"),
                Ev::End("itunes:email"),
                Ev::End("itunes:owner"),
            ],
        ));
        let publisher = parsed.feed.get_dict("publisher_detail").unwrap();
        assert_eq!(publisher.get_str("name"), Some("Pod Co"));
        assert_eq!(publisher.get_str("email"), Some("pod@example.com"));
    }

    #[test]
    fn test_categories_and_keywords_are_tags() {
        let parsed = run(&rss(
            false,
            vec![
                Ev::Start("itunes:category", &[("text", "Technology")]),
                Ev::End("itunes:category"),
                Ev::Start("itunes:keywords", &[]),
                Ev::Text("rust, , feeds"),
                Ev::End("itunes:keywords"),
            ],
        ));
        let terms: Vec<_> = parsed
            .feed
            .get_list("tags")
            .unwrap()
            .iter()
            .filter_map(|t| t.as_dict()?.get_str("term"))
            .collect();
        assert_eq!(terms, vec!["Technology", "rust", "feeds"]);
    }

    #[test]
    fn test_block_and_explicit() {
        let parsed = run(&rss(
            true,
            vec![
                Ev::Start("itunes:block", &[]),
                Ev::Text("yes"),
                Ev::End("itunes:block"),
                Ev::Start("itunes:explicit", &[]),
                Ev::Text("clean"),
                Ev::End("itunes:explicit"),
            ],
        ));
        let entry = &parsed.entries[0];
        assert_eq!(entry.get("itunes_block").and_then(Value::as_int), Some(1));
        assert_eq!(entry.get("itunes_explicit").and_then(Value::as_bool), Some(false));
    }

    #[test]
    fn test_explicit_padding_is_not_trimmed() {
        let parsed = run(&rss(
            true,
            vec![Ev::Start("itunes:explicit", &[]), Ev::Text(" yes "), Ev::End("itunes:explicit")],
        ));
        assert_eq!(parsed.entries[0].get("itunes_explicit"), Some(&Value::Null));
    }

    #[test]
    fn test_image_href() {
        let parsed = run(&rss(
            false,
            vec![
                Ev::Start("itunes:image", &[("href", "http://example.com/art.png")]),
                Ev::End("itunes:image"),
            ],
        ));
        let image = parsed.feed.get_dict("image").unwrap();
        assert_eq!(image.get_str("href"), Some("http://example.com/art.png"));
    }
}
