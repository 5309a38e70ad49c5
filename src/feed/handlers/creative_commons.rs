//! Creative Commons licence elements (`cc:` and `creativeCommons:`).

use crate::dict::{FeedParserDict, Value};
use crate::feed::attrs::Attrs;
use crate::feed::dispatch::Handler::{self, End, Start};
use crate::feed::state::ParserState;

pub(super) const HANDLERS: &[(&str, Handler)] = &[
    ("cc_license", Start(start_cc_license)),
    ("creativecommons_license", Start(start_creativecommons_license)),
    ("creativecommons_license", End(end_creativecommons_license)),
];

fn license_link(href: Option<&str>) -> FeedParserDict {
    let mut link: FeedParserDict = [("rel", Value::from("license"))].into_iter().collect();
    if let Some(href) = href.filter(|h| !h.is_empty()) {
        link.set("href", href);
    }
    link
}

/// The licence URI is in `rdf:resource`.
fn start_cc_license(state: &mut ParserState, attrs: Attrs) {
    let link = license_link(state.attribute(&attrs, "rdf:resource"));
    state.context().ensure_list("links").push(link.into());
}

fn start_creativecommons_license(state: &mut ParserState, _attrs: Attrs) {
    state.push("license", true);
}

/// The licence URI is the element text; it ends up as a link only.
fn end_creativecommons_license(state: &mut ParserState) {
    let value = state.pop("license");
    let context = state.context();
    context.ensure_list("links").push(license_link(value.as_deref()).into());
    context.remove("license");
}

#[cfg(test)]
mod tests {
    use super::super::testing::{rss, run, Ev};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cc_license_resource() {
        let parsed = run(&rss(
            true,
            vec![
                Ev::Start("cc:license", &[("rdf:resource", "http://creativecommons.org/licenses/by/4.0/")]),
                Ev::End("cc:license"),
            ],
        ));
        assert_eq!(parsed.entries[0].license(), Some("http://creativecommons.org/licenses/by/4.0/"));
    }

    #[test]
    fn test_creative_commons_text() {
        let parsed = run(&rss(
            false,
            vec![
                Ev::Start("creativeCommons:license", &[]),
                Ev::Text("http://creativecommons.org/licenses/by-sa/4.0/"),
                Ev::End("creativeCommons:license"),
            ],
        ));
        assert_eq!(parsed.feed.license(), Some("http://creativecommons.org/licenses/by-sa/4.0/"));
        assert!(!parsed.feed.contains_raw("license"));
    }
}
