//! Podlove Simple Chapters (`psc:`).

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::dict::Value;
use crate::feed::attrs::Attrs;
use crate::feed::dispatch::Handler::{self, End, Start};
use crate::feed::state::ParserState;

pub(super) const HANDLERS: &[(&str, Handler)] = &[
    ("psc_chapters", Start(start_psc_chapters)),
    ("psc_chapters", End(end_psc_chapters)),
    ("psc_chapter", Start(start_psc_chapter)),
];

static START_RE: OnceLock<Regex> = OnceLock::new();

/// Parses a chapter start of the form `[hh:]mm:ss[.mmm]`.
pub(crate) fn parse_chapter_start(start: &str) -> Option<Duration> {
    let re = START_RE.get_or_init(|| {
        Regex::new(r"^((\d{2}):)?(\d{2}):(\d{2})(\.(\d{3}))?$").expect("Failed to compile chapter start regex")
    });
    let caps = re.captures(start)?;
    let number = |i: usize| caps.get(i).map_or(Some(0), |m| m.as_str().parse::<u64>().ok());
    let (hours, minutes, seconds, millis) = (number(2)?, number(3)?, number(4)?, number(6)?);
    Some(Duration::from_millis(((hours * 60 + minutes) * 60 + seconds) * 1000 + millis))
}

/// Only the first chapter list of an entry is collected.
fn start_psc_chapters(state: &mut ParserState, attrs: Attrs) {
    if state.psc_chapters.is_some() {
        return;
    }
    state.psc_chapters = Some(true);
    let mut chapters = attrs.to_dict();
    chapters.insert_raw("chapters", Vec::<Value>::new());
    state.context().set("psc_chapters", chapters);
}

fn end_psc_chapters(state: &mut ParserState) {
    state.psc_chapters = Some(false);
}

fn start_psc_chapter(state: &mut ParserState, attrs: Attrs) {
    if state.psc_chapters != Some(true) {
        return;
    }
    let start = state.attribute(&attrs, "start").unwrap_or("");
    let mut chapter = attrs.to_dict();
    chapter.insert_raw("start_parsed", parse_chapter_start(start));
    if let Some(chapters) = state.context().dict_mut("psc_chapters") {
        chapters.ensure_list("chapters").push(chapter.into());
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{rss, run, Ev};
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_chapter_start() {
        assert_eq!(parse_chapter_start("00:01:02.500"), Some(Duration::from_millis(62_500)));
        assert_eq!(parse_chapter_start("01:00:00"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_chapter_start("05:07"), Some(Duration::from_secs(307)));
        assert_eq!(parse_chapter_start("5:07"), None);
        assert_eq!(parse_chapter_start(""), None);
    }

    #[test]
    fn test_chapters_are_collected_once_per_entry() {
        let parsed = run(&rss(
            true,
            vec![
                Ev::Start("psc:chapters", &[("version", "1.2")]),
                Ev::Start("psc:chapter", &[("start", "00:00:00"), ("title", "Intro")]),
                Ev::End("psc:chapter"),
                Ev::Start("psc:chapter", &[("start", "00:10:00"), ("title", "Main")]),
                Ev::End("psc:chapter"),
                Ev::End("psc:chapters"),
                Ev::Start("psc:chapters", &[]),
                Ev::Start("psc:chapter", &[("start", "00:20:00"), ("title", "Ignored")]),
                Ev::End("psc:chapter"),
                Ev::End("psc:chapters"),
            ],
        ));
        let chapters = parsed.entries[0].get_dict("psc_chapters").unwrap();
        assert_eq!(chapters.get_str("version"), Some("1.2"));
        let list = chapters.get_list("chapters").unwrap();
        assert_eq!(list.len(), 2);
        let main = list[1].as_dict().unwrap();
        assert_eq!(main.get_str("title"), Some("Main"));
        assert_eq!(main.get("start_parsed"), Some(&Value::Duration(Duration::from_secs(600))));
    }
}
