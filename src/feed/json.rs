//! JSON Feed (1.0 and 1.1) mapped onto the same record shape as the XML
//! parsers produce.

use std::io::Read;

use serde::{Deserialize, Deserializer};

use super::state::ParsedFeed;
use crate::datetimes::parse_date;
use crate::dict::{FeedParserDict, Value};
use crate::error::BozoError;
use crate::html::sanitize_html;

const VERSIONS: &[(&str, &str)] = &[
    ("https://jsonfeed.org/version/1", "json1"),
    ("https://jsonfeed.org/version/1.1", "json11"),
];

/// Version reported for documents that do not name a known JSON Feed version.
pub const GENERIC_JSON_VERSION: &str = "json";

#[derive(Debug, Deserialize)]
struct JsonFeed {
    #[serde(default)]
    version: String,
    title: Option<String>,
    home_page_url: Option<String>,
    feed_url: Option<String>,
    description: Option<String>,
    icon: Option<String>,
    language: Option<String>,
    expired: Option<bool>,
    author: Option<JsonAuthor>,
    #[serde(default)]
    authors: Vec<JsonAuthor>,
    #[serde(default)]
    items: Vec<JsonItem>,
}

#[derive(Debug, Deserialize)]
struct JsonItem {
    #[serde(default, deserialize_with = "lenient_string")]
    id: Option<String>,
    url: Option<String>,
    external_url: Option<String>,
    title: Option<String>,
    content_html: Option<String>,
    content_text: Option<String>,
    summary: Option<String>,
    image: Option<String>,
    date_published: Option<String>,
    date_modified: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    author: Option<JsonAuthor>,
    #[serde(default)]
    authors: Vec<JsonAuthor>,
    #[serde(default)]
    attachments: Vec<JsonAttachment>,
}

#[derive(Debug, Deserialize)]
struct JsonAuthor {
    name: Option<String>,
    url: Option<String>,
    avatar: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JsonAttachment {
    url: String,
    mime_type: Option<String>,
    title: Option<String>,
    size_in_bytes: Option<u64>,
    duration_in_seconds: Option<f64>,
}

/// Item ids are strings by the format's rules; numbers show up in practice.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Short version code for a JSON Feed `version` URL.
pub fn version_code(version: &str) -> &'static str {
    VERSIONS
        .iter()
        .find(|(url, _)| *url == version)
        .map_or(GENERIC_JSON_VERSION, |(_, code)| code)
}

/// Decodes a JSON Feed document.
pub(crate) fn parse<R: Read>(source: R, sanitize: bool) -> Result<ParsedFeed, BozoError> {
    let doc: JsonFeed = serde_json::from_reader(source)?;
    let version = version_code(&doc.version);
    if version == GENERIC_JSON_VERSION {
        tracing::debug!(version = %doc.version, "Unrecognized JSON Feed version");
    }

    let mut feed = FeedParserDict::new();
    if let Some(title) = doc.title {
        feed.set("title", title);
    }
    let mut links: Vec<Value> = Vec::new();
    if let Some(home) = doc.home_page_url {
        links.push(link("alternate", &home, Some("text/html")).into());
        feed.set("link", home);
    }
    if let Some(feed_url) = doc.feed_url {
        links.push(link("self", &feed_url, Some("application/feed+json")).into());
    }
    if !links.is_empty() {
        feed.set("links", links);
    }
    if let Some(description) = doc.description {
        feed.set("summary", description);
    }
    if let Some(icon) = doc.icon {
        let image: FeedParserDict = [("href", Value::from(icon))].into_iter().collect();
        feed.set("image", image);
    }
    if let Some(language) = doc.language {
        feed.set("language", language);
    }
    if let Some(expired) = doc.expired {
        feed.set("expired", expired);
    }
    set_authors(&mut feed, doc.author, doc.authors);

    let entries = doc.items.into_iter().map(|item| entry(item, sanitize)).collect();

    Ok(ParsedFeed {
        feed,
        entries,
        version: version.to_owned(),
        namespaces: Default::default(),
    })
}

fn entry(item: JsonItem, sanitize: bool) -> FeedParserDict {
    let mut entry = FeedParserDict::new();
    if let Some(id) = item.id {
        entry.set("id", id);
    }
    if let Some(title) = item.title {
        entry.set("title", title);
    }
    let mut links: Vec<Value> = Vec::new();
    if let Some(url) = item.url {
        links.push(link("alternate", &url, Some("text/html")).into());
        entry.set("link", url);
    }
    if let Some(external) = item.external_url {
        let source: FeedParserDict = [("href", Value::from(external))].into_iter().collect();
        entry.set("source", source);
    }
    for attachment in item.attachments {
        let mut enclosure = link("enclosure", &attachment.url, attachment.mime_type.as_deref());
        if let Some(size) = attachment.size_in_bytes {
            enclosure.set("length", size.to_string());
        }
        if let Some(title) = attachment.title {
            enclosure.set("title", title);
        }
        if let Some(duration) = attachment.duration_in_seconds {
            enclosure.set("duration", duration);
        }
        links.push(enclosure.into());
    }
    if !links.is_empty() {
        entry.set("links", links);
    }

    let mut content = Vec::new();
    if let Some(text) = item.content_text {
        content.push(content_block("text/plain", text));
    }
    if let Some(html) = item.content_html {
        let html = if sanitize { sanitize_html(&html, "text/html") } else { html };
        content.push(content_block("text/html", html));
    }
    match item.summary {
        Some(summary) => entry.set("summary", summary),
        None => {
            let first = content.first().and_then(Value::as_dict).and_then(|c| c.get_str("value"));
            if let Some(first) = first {
                entry.set("summary", first.to_owned());
            }
        }
    }
    if !content.is_empty() {
        entry.set("content", content);
    }

    if let Some(image) = item.image {
        let image: FeedParserDict = [("href", Value::from(image))].into_iter().collect();
        entry.set("image", image);
    }
    if let Some(published) = item.date_published {
        entry.set("published_parsed", parse_date(&published));
        entry.set("published", published);
    }
    if let Some(modified) = item.date_modified {
        entry.set("updated_parsed", parse_date(&modified));
        entry.set("updated", modified);
    }
    if !item.tags.is_empty() {
        let tags: Vec<Value> = item
            .tags
            .into_iter()
            .map(|term| {
                let tag: FeedParserDict = [("term", Value::from(term)), ("scheme", Value::Null), ("label", Value::Null)]
                    .into_iter()
                    .collect();
                tag.into()
            })
            .collect();
        entry.set("tags", tags);
    }
    set_authors(&mut entry, item.author, item.authors);
    entry
}

fn link(rel: &str, href: &str, content_type: Option<&str>) -> FeedParserDict {
    let mut link: FeedParserDict = [("rel", Value::from(rel)), ("href", Value::from(href))].into_iter().collect();
    if let Some(content_type) = content_type {
        link.set("type", content_type);
    }
    link
}

fn content_block(content_type: &str, value: String) -> Value {
    let block: FeedParserDict = [
        ("type", Value::from(content_type)),
        ("language", Value::Null),
        ("base", Value::from("")),
        ("value", Value::from(value)),
    ]
    .into_iter()
    .collect();
    block.into()
}

fn author_detail(author: JsonAuthor) -> FeedParserDict {
    let mut detail = FeedParserDict::new();
    if let Some(name) = author.name {
        detail.set("name", name);
    }
    if let Some(url) = author.url {
        match url.strip_prefix("mailto:") {
            Some(email) => detail.set("email", email.to_owned()),
            None => detail.set("href", url),
        }
    }
    if let Some(avatar) = author.avatar {
        detail.set("image", avatar);
    }
    detail
}

/// Version 1.1 lists `authors`; 1.0 has a single `author`.
fn set_authors(dict: &mut FeedParserDict, author: Option<JsonAuthor>, authors: Vec<JsonAuthor>) {
    let details: Vec<FeedParserDict> = author.into_iter().chain(authors).map(author_detail).collect();
    let Some(first) = details.first() else {
        return;
    };
    if let Some(name) = first.get_str("name") {
        dict.set("author", name.to_owned());
    }
    dict.set("author_detail", first.clone());
    dict.set("authors", details.into_iter().map(Value::from).collect::<Vec<_>>());
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FEED: &str = r#"{
        "version": "https://jsonfeed.org/version/1.1",
        "title": "My Example Feed",
        "home_page_url": "https://example.org/",
        "feed_url": "https://example.org/feed.json",
        "description": "Notes",
        "authors": [{"name": "Jane", "url": "mailto:jane@example.org"}],
        "items": [
            {
                "id": "2",
                "content_text": "This is a second item.",
                "url": "https://example.org/second-item",
                "date_published": "2024-02-01T10:00:00Z",
                "tags": ["a", "b"]
            },
            {
                "id": 1,
                "content_html": "<p>Hello<script>x()</script></p>",
                "url": "https://example.org/initial-post",
                "attachments": [{"url": "https://example.org/a.mp3", "mime_type": "audio/mpeg", "size_in_bytes": 1024}]
            }
        ]
    }"#;

    #[test]
    fn test_version_codes() {
        assert_eq!(version_code("https://jsonfeed.org/version/1"), "json1");
        assert_eq!(version_code("https://jsonfeed.org/version/1.1"), "json11");
        assert_eq!(version_code("https://jsonfeed.org/version/2"), "json");
        assert_eq!(version_code(""), "json");
    }

    #[test]
    fn test_feed_fields() {
        let parsed = parse(FEED.as_bytes(), true).unwrap();
        assert_eq!(parsed.version, "json11");
        assert_eq!(parsed.feed.get_str("title"), Some("My Example Feed"));
        assert_eq!(parsed.feed.get_str("link"), Some("https://example.org/"));
        assert_eq!(parsed.feed.get_str("description"), Some("Notes"));
        assert_eq!(parsed.feed.get_str("author"), Some("Jane"));
        let detail = parsed.feed.get_dict("author_detail").unwrap();
        assert_eq!(detail.get_str("email"), Some("jane@example.org"));
        assert!(parsed.namespaces.is_empty());
    }

    #[test]
    fn test_items() {
        let parsed = parse(FEED.as_bytes(), true).unwrap();
        assert_eq!(parsed.entries.len(), 2);

        let second = &parsed.entries[0];
        assert_eq!(second.get_str("id"), Some("2"));
        assert_eq!(second.get_str("guid"), Some("2"));
        assert_eq!(second.get_str("summary"), Some("This is a second item."));
        assert!(second.get("published_parsed").and_then(Value::as_date).is_some());
        assert_eq!(second.category(), Some("a"));

        let first = &parsed.entries[1];
        assert_eq!(first.get_str("id"), Some("1"));
        let content = first.get_list("content").unwrap()[0].as_dict().unwrap().clone();
        assert_eq!(content.get_str("type"), Some("text/html"));
        assert_eq!(content.get_str("value"), Some("<p>Hello</p>"));
        let enclosures = first.enclosures();
        assert_eq!(enclosures.len(), 1);
        assert_eq!(enclosures[0].get_str("href"), Some("https://example.org/a.mp3"));
        assert_eq!(enclosures[0].get_str("length"), Some("1024"));
    }

    #[test]
    fn test_missing_version_is_generic() {
        let parsed = parse(&br#"{"title": "x", "items": []}"#[..], true).unwrap();
        assert_eq!(parsed.version, "json");
        assert!(parsed.entries.is_empty());
    }

    #[test]
    fn test_invalid_json_is_error() {
        let err = parse(&b"{not json"[..], true).unwrap_err();
        assert_eq!(err.kind(), "JSONDecodeError");
    }
}
