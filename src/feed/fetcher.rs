use std::io::Read;
use std::time::Duration;

use chrono::{DateTime, Utc};
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, CONTENT_ENCODING, IF_MODIFIED_SINCE, IF_NONE_MATCH, REFERER, USER_AGENT};
use thiserror::Error;

use crate::Headers;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const MAX_FEED_SIZE: usize = 10 * 1024 * 1024;
const MAX_REDIRECTS: usize = 10;

/// `Accept` header preferring feed media types.
pub const ACCEPT_HEADER: &str = "application/atom+xml,application/rdf+xml,application/rss+xml,\
application/x-netcdf,application/xml;q=0.9,text/xml;q=0.2,*/*;q=0.1";

/// Default `User-Agent` sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!(
    "feedparse/",
    env!("CARGO_PKG_VERSION"),
    " +https://github.com/dhofheinz/feedparse"
);

/// Errors that can occur while retrieving a feed over HTTP.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, timeout, invalid header)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Response body exceeded the configured size limit
    #[error("Response too large (limit {0} bytes)")]
    ResponseTooLarge(usize),
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Reading the response body failed
    #[error("Failed to read response body: {0}")]
    Body(#[from] std::io::Error),
}

/// Per-request settings for the HTTP collaborator.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Sent as `If-None-Match`.
    pub etag: Option<String>,
    /// Sent as `If-Modified-Since`.
    pub modified: Option<DateTime<Utc>>,
    pub user_agent: String,
    pub referrer: Option<String>,
    /// Added to every request; these override the defaults above.
    pub extra_headers: Headers,
    pub timeout: Duration,
    pub max_body_bytes: usize,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            etag: None,
            modified: None,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            referrer: None,
            extra_headers: Headers::new(),
            timeout: DEFAULT_TIMEOUT,
            max_body_bytes: MAX_FEED_SIZE,
        }
    }
}

/// What the HTTP collaborator hands back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchResponse {
    /// Decompressed body.
    pub body: Vec<u8>,
    /// Response headers with lowercased names.
    pub headers: Headers,
    pub status: u16,
    /// URL after redirects.
    pub url: String,
}

/// Retrieves a document by URL.
pub trait Fetch {
    fn get(&self, url: &str, options: &RequestOptions) -> Result<FetchResponse, FetchError>;
}

/// Blocking HTTP client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl Fetch for HttpFetcher {
    fn get(&self, url: &str, options: &RequestOptions) -> Result<FetchResponse, FetchError> {
        let url = normalize_feed_url(url);
        let mut request = self
            .client
            .get(&url)
            .timeout(options.timeout)
            .header(USER_AGENT, options.user_agent.as_str())
            .header(ACCEPT, ACCEPT_HEADER)
            .header(ACCEPT_ENCODING, "gzip, deflate");
        if let Some(etag) = &options.etag {
            request = request.header(IF_NONE_MATCH, etag.as_str());
        }
        if let Some(modified) = &options.modified {
            request = request.header(IF_MODIFIED_SINCE, http_date(modified));
        }
        if let Some(referrer) = &options.referrer {
            request = request.header(REFERER, referrer.as_str());
        }
        for (name, value) in &options.extra_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %url, status = %status, "Non-success HTTP status");
        }

        let mut headers = Headers::new();
        for (name, value) in response.headers() {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            headers
                .entry(name.as_str().to_lowercase())
                .and_modify(|existing: &mut String| {
                    existing.push_str(", ");
                    existing.push_str(&value);
                })
                .or_insert(value);
        }
        let final_url = response.url().to_string();
        let encoding = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map(str::to_ascii_lowercase);

        let raw = read_limited_bytes(response, options.max_body_bytes)?;
        let body = match encoding.as_deref() {
            Some("gzip" | "x-gzip") => decompress(GzDecoder::new(raw.as_slice()), options.max_body_bytes, &url)
                .unwrap_or(raw),
            Some("deflate") => decompress(ZlibDecoder::new(raw.as_slice()), options.max_body_bytes, &url)
                .or_else(|| decompress(DeflateDecoder::new(raw.as_slice()), options.max_body_bytes, &url))
                .unwrap_or(raw),
            _ => raw,
        };

        Ok(FetchResponse {
            body,
            headers,
            status: status.as_u16(),
            url: final_url,
        })
    }
}

/// Rewrites `feed:` URLs (`feed://host/x`, `feed:https://host/x`) to HTTP.
pub fn normalize_feed_url(url: &str) -> String {
    let trimmed = url.trim();
    match trimmed.get(..5) {
        Some(scheme) if scheme.eq_ignore_ascii_case("feed:") => {
            let rest = &trimmed[5..];
            if rest.starts_with("//") {
                format!("http:{rest}")
            } else {
                rest.to_owned()
            }
        }
        _ => trimmed.to_owned(),
    }
}

/// RFC 7231 `IMF-fixdate`.
fn http_date(date: &DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// A body that fails to decompress is kept as received.
fn decompress<R: Read>(decoder: R, limit: usize, url: &str) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    match decoder.take(limit as u64 + 1).read_to_end(&mut out) {
        Ok(_) if out.len() <= limit => Some(out),
        Ok(_) => {
            tracing::warn!(url = %url, limit, "Decompressed body exceeds size limit; keeping raw body");
            None
        }
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "Failed to decompress response body");
            None
        }
    }
}

fn read_limited_bytes(response: reqwest::blocking::Response, limit: usize) -> Result<Vec<u8>, FetchError> {
    // Capture Content-Length for completeness check
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    response.take(limit as u64 + 1).read_to_end(&mut bytes)?;
    if bytes.len() > limit {
        return Err(FetchError::ResponseTooLarge(limit));
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
