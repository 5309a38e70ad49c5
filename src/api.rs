//! Parse orchestration: obtain the bytes, resolve the encoding, then try the
//! strict XML adapter, the loose adapter and the JSON mapper in turn.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::datetimes::parse_date;
use crate::dict::FeedParserDict;
use crate::doctype::replace_doctype;
use crate::encoding::{convert_stream_to_utf8, convert_text, convert_to_utf8, Utf8Document};
use crate::error::{serialize_bozo, BozoError};
use crate::feed::fetcher::{Fetch, HttpFetcher, RequestOptions};
use crate::feed::state::{Mode, ParsedFeed, ParserState, StateOptions};
use crate::feed::{json, loose, strict};
use crate::util::make_safe_absolute_uri;
use crate::Headers;

/// A byte source that can be rewound between parse attempts.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Where a feed comes from.
pub enum FeedSource {
    /// Retrieved with the HTTP collaborator.
    Url(String),
    Path(PathBuf),
    Bytes(Vec<u8>),
    /// Already-decoded text; no byte decoding takes place.
    Text(String),
    /// A stream that cannot be rewound; read into memory up front.
    Reader(Box<dyn Read + Send>),
    /// A stream that is rewound between attempts instead of buffered.
    Seekable(Box<dyn ReadSeek + Send>),
}

impl FeedSource {
    /// Classifies a command-line style argument: an `http`, `https` or
    /// `feed` URL, an existing file, or else the document itself.
    pub fn guess(input: &str) -> Self {
        let scheme = input.split_once(':').map(|(scheme, _)| scheme.to_ascii_lowercase());
        if matches!(scheme.as_deref(), Some("http" | "https" | "feed")) {
            return FeedSource::Url(input.to_owned());
        }
        let path = Path::new(input);
        if !input.contains('\0') && !input.contains('<') && path.is_file() {
            return FeedSource::Path(path.to_owned());
        }
        FeedSource::Text(input.to_owned())
    }
}

impl std::fmt::Debug for FeedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedSource::Url(url) => f.debug_tuple("Url").field(url).finish(),
            FeedSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            FeedSource::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            FeedSource::Text(text) => f.debug_tuple("Text").field(&text.len()).finish(),
            FeedSource::Reader(_) => f.write_str("Reader(..)"),
            FeedSource::Seekable(_) => f.write_str("Seekable(..)"),
        }
    }
}

impl From<Vec<u8>> for FeedSource {
    fn from(bytes: Vec<u8>) -> Self {
        FeedSource::Bytes(bytes)
    }
}

impl From<&[u8]> for FeedSource {
    fn from(bytes: &[u8]) -> Self {
        FeedSource::Bytes(bytes.to_vec())
    }
}

impl From<String> for FeedSource {
    fn from(text: String) -> Self {
        FeedSource::Text(text)
    }
}

impl From<&str> for FeedSource {
    fn from(text: &str) -> Self {
        FeedSource::Text(text.to_owned())
    }
}

impl From<PathBuf> for FeedSource {
    fn from(path: PathBuf) -> Self {
        FeedSource::Path(path)
    }
}

/// Caller-tunable parse behavior.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Merged over the HTTP response headers (or used as the only headers
    /// when nothing was fetched).
    pub response_headers: Headers,
    pub resolve_relative_uris: bool,
    pub sanitize_html: bool,
    /// Resolve the encoding from a bounded prefix of binary sources
    /// instead of the whole document.
    pub optimistic_encoding_detection: bool,
    pub request: RequestOptions,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            response_headers: Headers::new(),
            resolve_relative_uris: true,
            sanitize_html: true,
            optimistic_encoding_detection: true,
            request: RequestOptions::default(),
        }
    }
}

/// What the environment lets the orchestrator use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Try the strict XML adapter before the loose one.
    pub strict_parser: bool,
    /// Use statistical charset detection in the encoding fallback chain.
    pub charset_detection: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            strict_parser: true,
            charset_detection: true,
        }
    }
}

/// The outcome of a parse. Always produced, however bad the input.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParseResult {
    pub feed: FeedParserDict,
    pub entries: Vec<FeedParserDict>,
    /// Set when the input violated some norm; see `bozo_exception`.
    pub bozo: bool,
    #[serde(serialize_with = "serialize_bozo")]
    pub bozo_exception: Option<BozoError>,
    pub encoding: Option<String>,
    pub version: Option<String>,
    pub namespaces: BTreeMap<String, String>,
    pub headers: Headers,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_parsed: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ParseResult {
    /// Records a problem; the most recent one is reported.
    fn record(&mut self, err: BozoError) {
        tracing::debug!(kind = err.kind(), error = %err, "Recorded bozo condition");
        self.bozo = true;
        self.bozo_exception = Some(err);
    }
}

/// The parse entry point, configured once and reusable across documents.
pub struct FeedParser {
    options: ParseOptions,
    capabilities: Capabilities,
    fetcher: Option<Box<dyn Fetch + Send + Sync>>,
}

impl std::fmt::Debug for FeedParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedParser")
            .field("options", &self.options)
            .field("capabilities", &self.capabilities)
            .field("fetcher", &self.fetcher.as_ref().map(|_| ".."))
            .finish()
    }
}

impl Default for FeedParser {
    fn default() -> Self {
        Self::new(ParseOptions::default())
    }
}

/// Input after the source has been opened.
enum Opened {
    Text(String),
    Stream(Box<dyn ReadSeek + Send>),
}

impl FeedParser {
    pub fn new(options: ParseOptions) -> Self {
        Self {
            options,
            capabilities: Capabilities::default(),
            fetcher: None,
        }
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Replaces the default [`HttpFetcher`] used for [`FeedSource::Url`].
    pub fn with_fetcher(mut self, fetcher: impl Fetch + Send + Sync + 'static) -> Self {
        self.fetcher = Some(Box::new(fetcher));
        self
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Parses `source`. Problems are reported through `bozo` and
    /// `bozo_exception`; this never fails.
    pub fn parse(&self, source: impl Into<FeedSource>) -> ParseResult {
        let mut result = ParseResult::default();

        let opened = match self.open(source.into(), &mut result) {
            Ok(Some(opened)) => opened,
            Ok(None) => return result,
            Err(err) => {
                result.record(err);
                return result;
            }
        };

        for (name, value) in &self.options.response_headers {
            result.headers.insert(name.to_lowercase(), value.clone());
        }

        let detect = self.capabilities.charset_detection;
        let outcome = match opened {
            Opened::Text(text) => {
                let doc = convert_text(&result.headers, &text, detect);
                self.parse_document(doc, &mut result)
            }
            Opened::Stream(mut stream) if self.options.optimistic_encoding_detection => {
                match convert_stream_to_utf8(&result.headers, &mut stream, detect) {
                    Ok(doc) => self.parse_document(doc, &mut result),
                    Err(err) => Err(err),
                }
            }
            Opened::Stream(mut stream) => {
                let mut data = Vec::new();
                match stream.read_to_end(&mut data) {
                    Ok(_) => {
                        let doc = Utf8Document::from_conversion(convert_to_utf8(&result.headers, &data, detect));
                        self.parse_document(doc, &mut result)
                    }
                    Err(err) => Err(err),
                }
            }
        };
        if let Err(err) = outcome {
            result.record(err.into());
        }
        result
    }

    /// Turns `source` into something readable. `Ok(None)` means there is
    /// nothing to parse and the result is already final.
    fn open(&self, source: FeedSource, result: &mut ParseResult) -> Result<Option<Opened>, BozoError> {
        let stream: Box<dyn ReadSeek + Send> = match source {
            FeedSource::Url(url) => {
                let response = match &self.fetcher {
                    Some(fetcher) => fetcher.get(&url, &self.options.request),
                    None => HttpFetcher::new().and_then(|f| f.get(&url, &self.options.request)),
                }
                .map_err(|e| BozoError::Transport(e.to_string()))?;

                result.etag = response.headers.get("etag").cloned();
                if let Some(modified) = response.headers.get("last-modified").filter(|m| !m.is_empty()) {
                    result.modified_parsed = parse_date(modified);
                    result.modified = Some(modified.clone());
                }
                result.href = Some(response.url);
                result.status = Some(response.status);
                result.headers = response.headers;
                Box::new(Cursor::new(response.body))
            }
            FeedSource::Path(path) => Box::new(File::open(&path)?),
            FeedSource::Bytes(bytes) => Box::new(Cursor::new(bytes)),
            FeedSource::Text(text) => {
                return Ok((!text.is_empty()).then_some(Opened::Text(text)));
            }
            FeedSource::Reader(mut reader) => {
                let mut data = Vec::new();
                reader.read_to_end(&mut data)?;
                Box::new(Cursor::new(data))
            }
            FeedSource::Seekable(stream) => stream,
        };
        Ok(is_nonempty(stream)?.map(Opened::Stream))
    }

    fn parse_document<R: Read + Seek>(
        &self,
        mut doc: Utf8Document<R>,
        result: &mut ParseResult,
    ) -> io::Result<()> {
        result.encoding = doc.is_known().then(|| doc.encoding.clone());
        if let Some(err) = doc.error.take() {
            result.record(err);
        }

        let mut use_json = doc.is_json();
        let mut use_strict = doc.is_known() && self.capabilities.strict_parser;

        let doctype = replace_doctype(doc.prefix());
        doc.set_prefix(doctype.data);
        result.version = doctype.version.map(str::to_owned);

        let state_options = StateOptions {
            base_uri: self.base_uri(result),
            base_lang: result.headers.get("content-language").cloned(),
            encoding: doc.encoding.clone(),
            resolve_relative_uris: self.options.resolve_relative_uris,
            sanitize_html: self.options.sanitize_html,
            entities: doctype.entities,
        };

        let mut parsed = ParsedFeed::default();

        if use_strict && !use_json {
            let mut state = ParserState::new(Mode::Strict, state_options.clone());
            let outcome = doc
                .reader()
                .map_err(BozoError::from)
                .and_then(|reader| strict::parse(BufReader::new(reader), &mut state));
            match outcome {
                Ok(()) => parsed = state.finish(),
                Err(err) => {
                    tracing::debug!(error = %err, "Strict parse failed; retrying with the loose parser");
                    result.record(err);
                    use_strict = false;
                }
            }
        }

        if !use_strict && !use_json {
            let text = doc.read_to_string_lossy()?;
            let mut state = ParserState::new(Mode::Loose, state_options);
            loose::parse(&text, &mut state);
            parsed = state.finish();
            if parsed.is_empty() {
                tracing::debug!("Loose parse found no feed data; trying JSON");
                use_json = true;
            }
        }

        if use_json {
            result.version = None;
            let outcome = doc
                .reader_lossy()
                .map_err(BozoError::from)
                .and_then(|reader| json::parse(reader, self.options.sanitize_html));
            parsed = match outcome {
                Ok(parsed) => parsed,
                Err(err) => {
                    result.record(err);
                    ParsedFeed::default()
                }
            };
        }

        result.feed = parsed.feed;
        result.entries = parsed.entries;
        if result.version.is_none() && !parsed.version.is_empty() {
            result.version = Some(parsed.version);
        }
        result.namespaces = parsed.namespaces;
        Ok(())
    }

    /// The fetched URL resolved against `Content-Location`, restricted to
    /// acceptable absolute URIs.
    fn base_uri(&self, result: &ParseResult) -> String {
        let content_location = result.headers.get("content-location").map_or("", String::as_str);
        let href = result.href.as_deref().unwrap_or("");
        let joined = make_safe_absolute_uri(href, Some(content_location));
        if !joined.is_empty() {
            return joined;
        }
        let location = make_safe_absolute_uri(content_location, None);
        if !location.is_empty() {
            return location;
        }
        href.to_owned()
    }
}

/// Peeks one byte and rewinds; `None` for an empty stream.
fn is_nonempty(mut stream: Box<dyn ReadSeek + Send>) -> io::Result<Option<Box<dyn ReadSeek + Send>>> {
    let start = stream.stream_position()?;
    let mut byte = [0u8; 1];
    let read = stream.read(&mut byte)?;
    stream.seek(SeekFrom::Start(start))?;
    Ok((read > 0).then_some(stream))
}

/// Parses `source` with default options.
///
/// # Examples
///
/// ```
/// let result = feedparse::parse("<feed><title>T</title><entry><id>1</id></entry></feed>");
/// assert_eq!(result.feed.get_str("title"), Some("T"));
/// assert_eq!(result.entries[0].get_str("id"), Some("1"));
/// ```
pub fn parse(source: impl Into<FeedSource>) -> ParseResult {
    FeedParser::default().parse(source)
}
