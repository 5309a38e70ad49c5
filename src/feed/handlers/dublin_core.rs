//! Dublin Core (`dc:`) and DCMI terms (`dcterms:`).

use super::rss_atom::{
    end_author, end_category, end_created, end_description, end_language, end_name, end_publisher,
    end_published, end_rights, end_title, end_updated, start_author, start_category, start_created,
    start_description, start_language, start_publisher, start_published, start_rights, start_title,
    start_updated,
};
use crate::datetimes::parse_date;
use crate::dict::FeedParserDict;
use crate::feed::attrs::Attrs;
use crate::feed::dispatch::Handler::{self, End, Start};
use crate::feed::state::ParserState;

pub(super) const HANDLERS: &[(&str, Handler)] = &[
    ("dc_author", Start(start_author)),
    ("dc_author", End(end_author)),
    ("dc_creator", Start(start_author)),
    ("dc_creator", End(end_author)),
    ("dc_contributor", Start(start_dc_contributor)),
    ("dc_contributor", End(end_dc_contributor)),
    ("dc_publisher", Start(start_publisher)),
    ("dc_publisher", End(end_publisher)),
    ("dc_language", Start(start_language)),
    ("dc_language", End(end_language)),
    ("dc_rights", Start(start_rights)),
    ("dc_rights", End(end_rights)),
    ("dc_date", Start(start_updated)),
    ("dc_date", End(end_updated)),
    ("dc_subject", Start(start_category)),
    ("dc_subject", End(end_category)),
    ("dc_title", Start(start_title)),
    ("dc_title", End(end_title)),
    ("dc_description", Start(start_description)),
    ("dc_description", End(end_description)),
    ("dcterms_issued", Start(start_published)),
    ("dcterms_issued", End(end_published)),
    ("dcterms_modified", Start(start_updated)),
    ("dcterms_modified", End(end_updated)),
    ("dcterms_created", Start(start_created)),
    ("dcterms_created", End(end_created)),
    ("dcterms_valid", Start(start_dcterms_valid)),
    ("dcterms_valid", End(end_dcterms_valid)),
];

/// `dc:contributor` holds the name directly.
fn start_dc_contributor(state: &mut ParserState, _attrs: Attrs) {
    state.incontributor = true;
    state.context().ensure_list("contributors").push(FeedParserDict::new().into());
    state.push("name", false);
}

fn end_dc_contributor(state: &mut ParserState) {
    end_name(state);
    state.incontributor = false;
}

fn start_dcterms_valid(state: &mut ParserState, _attrs: Attrs) {
    state.push("validity", true);
}

/// `start=...;end=...` validity periods.
fn end_dcterms_valid(state: &mut ParserState) {
    let value = state.pop("validity").unwrap_or_default();
    for part in value.split(';') {
        let Some((key, date)) = part.split_once('=') else {
            continue;
        };
        let prefix = match key {
            "start" => "validity_start",
            "end" => "validity_end",
            _ => continue,
        };
        state.save(prefix, date, true);
        state.save(&format!("{prefix}_parsed"), parse_date(date), true);
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{rss, run, Ev};
    use crate::dict::Value;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_dc_creator_and_date() {
        let parsed = run(&rss(
            true,
            vec![
                Ev::Start("dc:creator", &[]),
                Ev::Text("Jane Doe"),
                Ev::End("dc:creator"),
                Ev::Start("dc:date", &[]),
                Ev::Text("2024-03-01T12:00:00Z"),
                Ev::End("dc:date"),
            ],
        ));
        let entry = &parsed.entries[0];
        assert_eq!(entry.get_str("author"), Some("Jane Doe"));
        assert_eq!(entry.get_dict("author_detail").unwrap().get_str("name"), Some("Jane Doe"));
        assert_eq!(entry.get_str("updated"), Some("2024-03-01T12:00:00Z"));
        assert!(entry.get("updated_parsed").and_then(Value::as_date).is_some());
        assert_eq!(parsed.namespaces.get("dc").map(String::as_str), Some("http://purl.org/dc/elements/1.1/"));
    }

    #[test]
    fn test_dc_contributor() {
        let parsed = run(&rss(
            true,
            vec![Ev::Start("dc:contributor", &[]), Ev::Text("Helper"), Ev::End("dc:contributor")],
        ));
        let contributors = parsed.entries[0].get_list("contributors").unwrap();
        assert_eq!(contributors[0].as_dict().unwrap().get_str("name"), Some("Helper"));
    }

    #[test]
    fn test_dcterms_valid() {
        let parsed = run(&rss(
            true,
            vec![
                Ev::Start("dcterms:valid", &[]),
                Ev::Text("start=2024-01-01T00:00:00Z;end=2024-12-31T00:00:00Z;scheme=W3C-DTF"),
                Ev::End("dcterms:valid"),
            ],
        ));
        let entry = &parsed.entries[0];
        assert_eq!(entry.get_str("validity_start"), Some("2024-01-01T00:00:00Z"));
        assert_eq!(entry.get_str("validity_end"), Some("2024-12-31T00:00:00Z"));
        assert!(entry.get("validity_end_parsed").and_then(Value::as_date).is_some());
    }

    #[test]
    fn test_dc_subject_is_a_tag() {
        let parsed = run(&rss(
            true,
            vec![Ev::Start("dc:subject", &[]), Ev::Text("history"), Ev::End("dc:subject")],
        ));
        assert_eq!(parsed.entries[0].category(), Some("history"));
    }
}
