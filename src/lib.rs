//! Universal feed parser.
//!
//! Parses RSS (0.9x, 1.0, 2.0), Atom (0.3, 1.0), CDF and JSON Feed
//! documents into one normalized, dictionary-shaped data model. Malformed
//! input never fails a parse: the problem is recorded on the result as
//! `bozo` and the best available data is returned.
//!
//! ```
//! let result = feedparse::parse(
//!     r#"<rss version="2.0"><channel><title>News</title>
//!        <item><title>Hello</title><guid>urn:1</guid></item></channel></rss>"#,
//! );
//! assert_eq!(result.version.as_deref(), Some("rss20"));
//! assert_eq!(result.feed.get_str("title"), Some("News"));
//! assert_eq!(result.entries[0].get_str("title"), Some("Hello"));
//! ```

pub mod api;
pub mod config;
pub mod datetimes;
pub mod dict;
pub mod doctype;
pub mod encoding;
pub mod error;
pub mod feed;
pub mod html;
pub mod namespaces;
pub mod util;

/// HTTP-style headers keyed by lowercased name.
pub type Headers = std::collections::BTreeMap<String, String>;

pub use api::{parse, Capabilities, FeedParser, FeedSource, ParseOptions, ParseResult, ReadSeek};
pub use config::{Config, ConfigError};
pub use datetimes::parse_date;
pub use dict::{FeedParserDict, Lookup, Value};
pub use error::BozoError;
pub use feed::fetcher::{Fetch, FetchError, FetchResponse, HttpFetcher, RequestOptions};
