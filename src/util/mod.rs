//! Utility functions shared by the parsers and the HTML processors.
//!
//! This module provides:
//!
//! - **Text processing**: XML escaping, HTML detection, Windows-1252 and
//!   double-encoded UTF-8 repair
//! - **URL handling**: relative reference resolution and scheme allow-listing
//!
//! # Examples
//!
//! ```
//! use feedparse::util::{make_safe_absolute_uri, xml_escape};
//!
//! assert_eq!(xml_escape("a&b"), "a&amp;b");
//! assert_eq!(make_safe_absolute_uri("http://example.com/", Some("x")), "http://example.com/x");
//! ```

mod text;
mod uri;

pub use self::text::{
    decode_markup_entities, fix_double_encoded_utf8, looks_like_html, translate_cp1252,
    xml_escape, xml_escape_attr,
};
pub use self::uri::{make_safe_absolute_uri, scheme_of, urljoin, ACCEPTABLE_URI_SCHEMES};
