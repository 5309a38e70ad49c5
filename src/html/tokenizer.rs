//! Tolerant tag-soup scanner.
//!
//! Walks markup that need not be well formed and reports what it finds to a
//! [`TagSink`]. Open tags are tracked on a stack so that a closing tag for an
//! outer element also closes everything opened inside it. Anything that does
//! not parse as markup is reported as text.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use super::ELEMENTS_NO_END_TAG;

/// Receiver of scanner events.
pub(crate) trait TagSink {
    fn start_tag(&mut self, tag: &str, attrs: Vec<(String, String)>);
    fn end_tag(&mut self, tag: &str);
    fn text(&mut self, text: &str);
    /// `name` is the digits (or `x` + hex digits) between `&#` and `;`.
    fn char_ref(&mut self, name: &str);
    fn entity_ref(&mut self, name: &str);
    fn cdata(&mut self, text: &str);
    fn comment(&mut self, _text: &str) {}
    fn pi(&mut self, _text: &str) {}
    fn declaration(&mut self, _text: &str) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ScanOptions {
    /// Treat `<tag ... />` as an immediately closed element.
    pub xhtml: bool,
    /// Swallow unterminated comments (up to the next `--...>` or the end of
    /// input) instead of reporting them as text.
    pub swallow_bad_comments: bool,
}

static SHORT_TAG_RE: OnceLock<Regex> = OnceLock::new();

fn short_tag_regex() -> &'static Regex {
    SHORT_TAG_RE.get_or_init(|| Regex::new(r"<([^<>\s]+?)\s*/>").expect("Failed to compile short tag regex"))
}

/// Normalizes input before scanning: stray `<!` becomes text, attribute-less
/// self-closing tags are expanded, and quote character references are
/// replaced by the characters themselves.
pub(crate) fn preprocess(data: &str) -> String {
    let escaped = escape_stray_declarations(data);
    let expanded = short_tag_regex().replace_all(&escaped, |caps: &Captures| {
        let tag = &caps[1];
        if ELEMENTS_NO_END_TAG.contains(&tag) {
            format!("<{tag} />")
        } else {
            format!("<{tag}></{tag}>")
        }
    });
    expanded.replace("&#39;", "'").replace("&#34;", "\"")
}

fn escape_stray_declarations(data: &str) -> String {
    let mut out = String::with_capacity(data.len());
    let mut rest = data;
    while let Some(pos) = rest.find("<!") {
        let after = &rest[pos + 2..];
        let keep = after.starts_with("--")
            || after.starts_with('[')
            || after.get(..7).is_some_and(|s| s.eq_ignore_ascii_case("doctype"));
        out.push_str(&rest[..pos]);
        out.push_str(if keep { "<!" } else { "&lt;!" });
        rest = after;
    }
    out.push_str(rest);
    out
}

/// Scans `data` (already passed through [`preprocess`]) and feeds `sink`.
pub(crate) fn scan<S: TagSink + ?Sized>(data: &str, options: ScanOptions, sink: &mut S) {
    Scanner {
        data,
        bytes: data.as_bytes(),
        options,
        open: Vec::new(),
    }
    .run(sink);
}

struct Scanner<'a> {
    data: &'a str,
    bytes: &'a [u8],
    options: ScanOptions,
    open: Vec<String>,
}

impl Scanner<'_> {
    fn run<S: TagSink + ?Sized>(&mut self, sink: &mut S) {
        let n = self.bytes.len();
        let mut i = 0;
        while i < n {
            let next = self.bytes[i..]
                .iter()
                .position(|b| *b == b'<' || *b == b'&')
                .map_or(n, |p| i + p);
            if next > i {
                sink.text(&self.data[i..next]);
                i = next;
            }
            if i >= n {
                break;
            }
            let consumed = if self.bytes[i] == b'<' {
                self.markup(i, sink)
            } else {
                self.reference(i, sink)
            };
            match consumed {
                Some(end) => i = end,
                None => {
                    // Incomplete construct: the rest of the input is text.
                    sink.text(&self.data[i..]);
                    break;
                }
            }
        }
    }

    /// Handles a construct starting with `<`. Returns the index after it, or
    /// `None` when the construct runs off the end of the input.
    fn markup<S: TagSink + ?Sized>(&mut self, i: usize, sink: &mut S) -> Option<usize> {
        let rest = &self.bytes[i + 1..];
        match rest.first() {
            Some(b) if b.is_ascii_alphabetic() => self.start_tag(i, sink),
            Some(b'/') if rest.get(1).is_some_and(u8::is_ascii_alphabetic) => self.end_tag(i, sink),
            Some(b'!') if rest.starts_with(b"!--") => self.comment(i, sink),
            Some(b'?') => {
                let end = find(self.bytes, i + 2, b">")?;
                sink.pi(&self.data[i + 2..end]);
                Some(end + 1)
            }
            Some(b'!') if rest.starts_with(b"![CDATA[") => {
                let start = i + 9;
                match find(self.bytes, start, b"]]>") {
                    Some(end) => {
                        sink.cdata(&self.data[start..end]);
                        Some(end + 3)
                    }
                    None => {
                        sink.cdata(&self.data[start..]);
                        Some(self.bytes.len())
                    }
                }
            }
            Some(b'!') => {
                let end = find(self.bytes, i + 2, b">")?;
                sink.declaration(&self.data[i + 2..end]);
                Some(end + 1)
            }
            Some(_) => {
                sink.text("<");
                Some(i + 1)
            }
            None => None,
        }
    }

    fn start_tag<S: TagSink + ?Sized>(&mut self, i: usize, sink: &mut S) -> Option<usize> {
        let end = self.tag_end(i + 1)?;
        let name_end = (i + 1..end)
            .find(|&k| !is_tag_name_byte(self.bytes[k]))
            .unwrap_or(end);
        let tag = self.data[i + 1..name_end].to_ascii_lowercase();
        let attrs = parse_attributes(&self.data[name_end..end]);
        let closes = self.bytes[end] == b'>';
        let self_closing = closes && end > i + 1 && self.bytes[end - 1] == b'/';

        sink.start_tag(&tag, attrs);
        if self.options.xhtml && self_closing {
            sink.end_tag(&tag);
        } else {
            self.open.push(tag);
        }
        Some(if closes { end + 1 } else { end })
    }

    fn end_tag<S: TagSink + ?Sized>(&mut self, i: usize, sink: &mut S) -> Option<usize> {
        let end = self.tag_end(i + 2)?;
        let tag = self.data[i + 2..end].trim().to_ascii_lowercase();
        match self.open.iter().rposition(|t| *t == tag) {
            Some(found) => {
                while self.open.len() > found {
                    if let Some(open) = self.open.pop() {
                        sink.end_tag(&open);
                    }
                }
            }
            None => sink.end_tag(&tag),
        }
        Some(if self.bytes[end] == b'>' { end + 1 } else { end })
    }

    fn comment<S: TagSink + ?Sized>(&mut self, i: usize, sink: &mut S) -> Option<usize> {
        let start = i + 4;
        if let Some(end) = find(self.bytes, start, b"-->") {
            sink.comment(&self.data[start..end]);
            return Some(end + 3);
        }
        if !self.options.swallow_bad_comments {
            return None;
        }
        let mut k = start;
        while let Some(dash) = find(self.bytes, k, b"--") {
            let tail = &self.bytes[dash + 2..];
            match tail.iter().position(|b| *b == b'>') {
                Some(p) if !tail[..p].contains(&b'>') => return Some(dash + 2 + p + 1),
                _ => k = dash + 1,
            }
        }
        Some(self.bytes.len())
    }

    /// Finds the `<` or `>` that ends a tag, skipping quoted attribute values.
    fn tag_end(&self, from: usize) -> Option<usize> {
        let mut k = from;
        while k < self.bytes.len() {
            match self.bytes[k] {
                b'<' | b'>' => return Some(k),
                q @ (b'"' | b'\'') => match self.bytes[k + 1..].iter().position(|b| *b == q) {
                    Some(p) => k += p + 2,
                    None => k += 1,
                },
                _ => k += 1,
            }
        }
        None
    }

    /// Handles a construct starting with `&`.
    fn reference<S: TagSink + ?Sized>(&mut self, i: usize, sink: &mut S) -> Option<usize> {
        let rest = &self.bytes[i + 1..];
        if rest.first() == Some(&b'#') {
            let body = &rest[1..];
            let (digits, hex) = match body.first() {
                Some(b'x' | b'X') => (body[1..].iter().take_while(|b| b.is_ascii_hexdigit()).count(), true),
                _ => (body.iter().take_while(|b| b.is_ascii_digit()).count(), false),
            };
            let name_len = digits + usize::from(hex);
            if digits > 0 && body.get(name_len) == Some(&b';') {
                let start = i + 2;
                sink.char_ref(&self.data[start..start + name_len]);
                return Some(start + name_len + 1);
            }
            if i + 2 + name_len >= self.bytes.len() {
                return None;
            }
            sink.text(&self.data[i..i + 2 + name_len]);
            return Some(i + 2 + name_len);
        }
        if rest.first().is_some_and(u8::is_ascii_alphabetic) {
            let len = rest
                .iter()
                .take_while(|b| b.is_ascii_alphanumeric() || **b == b'-' || **b == b'.')
                .count();
            let after = i + 1 + len;
            return match self.bytes.get(after) {
                None => None,
                Some(b';') => {
                    sink.entity_ref(&self.data[i + 1..after]);
                    Some(after + 1)
                }
                Some(b) if !b.is_ascii_alphanumeric() => {
                    sink.entity_ref(&self.data[i + 1..after]);
                    Some(after)
                }
                Some(_) => {
                    sink.text(&self.data[i..after]);
                    Some(after)
                }
            };
        }
        if rest.is_empty() {
            return None;
        }
        sink.text("&");
        Some(i + 1)
    }
}

fn is_tag_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b':')
}

fn find(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| from + p)
}

fn is_attr_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_attr_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | ':' | '.' | '_')
}

fn is_unquoted_value_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "[]-./,:;+*%?!&$()_#=~'\"@".contains(c)
}

/// Parses `name`, `name=value`, `name='value'` and `name="value"` pairs.
/// A name without a value gets its own name as value. Parsing stops at the
/// first thing that is not an attribute (typically a trailing `/`).
pub(crate) fn parse_attributes(raw: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut rest = raw;
    loop {
        rest = rest.trim_start();
        let Some(first) = rest.chars().next() else { break };
        if !is_attr_name_start(first) {
            break;
        }
        let name_len = rest.find(|c| !is_attr_name_char(c)).unwrap_or(rest.len());
        let name = rest[..name_len].to_ascii_lowercase();
        rest = &rest[name_len..];

        let after_ws = rest.trim_start();
        if let Some(value_part) = after_ws.strip_prefix('=') {
            let value_part = value_part.trim_start();
            let (value, remaining) = match value_part.chars().next() {
                Some(q @ ('"' | '\'')) => match value_part[1..].find(q) {
                    Some(close) => (&value_part[1..1 + close], &value_part[close + 2..]),
                    None => split_unquoted(value_part),
                },
                _ => split_unquoted(value_part),
            };
            attrs.push((name, value.to_owned()));
            rest = remaining;
        } else {
            attrs.push((name.clone(), name));
        }
    }
    attrs
}

fn split_unquoted(s: &str) -> (&str, &str) {
    let len = s.find(|c| !is_unquoted_value_char(c)).unwrap_or(s.len());
    (&s[..len], &s[len..])
}
