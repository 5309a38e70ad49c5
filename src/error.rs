//! Error taxonomy recorded on a [`ParseResult`](crate::ParseResult).
//!
//! Nothing in this module is ever returned from [`parse`](crate::parse):
//! every condition is captured as `bozo = true` plus the error value in
//! `bozo_exception`, and the parse continues with the best data available.

use serde::Serializer;
use thiserror::Error;

/// A recoverable problem found while parsing a feed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BozoError {
    /// The `Content-Type` header named a media type that is not XML or JSON.
    #[error("{0}")]
    NonXmlContentType(String),
    /// The document decoded under a different encoding than the one it declared.
    #[error("{0}")]
    CharacterEncodingOverride(String),
    /// No encoding in the fallback chain could decode the document.
    #[error("{0}")]
    CharacterEncodingUnknown(String),
    /// A qualified name used a prefix that was never bound to a namespace URI.
    #[error("'{0}' is not associated with a namespace")]
    UndeclaredNamespace(String),
    /// The strict XML reader rejected the document.
    #[error("XML parse error: {0}")]
    Xml(String),
    /// The JSON feed could not be decoded.
    #[error("JSON feed error: {0}")]
    Json(String),
    /// The HTTP collaborator failed to retrieve the document.
    #[error("Request failed: {0}")]
    Transport(String),
    /// A local file or stream could not be read.
    #[error("Failed to read feed: {0}")]
    Io(String),
}

impl BozoError {
    /// Short class name of the error, stable across message changes.
    pub fn kind(&self) -> &'static str {
        match self {
            BozoError::NonXmlContentType(_) => "NonXMLContentType",
            BozoError::CharacterEncodingOverride(_) => "CharacterEncodingOverride",
            BozoError::CharacterEncodingUnknown(_) => "CharacterEncodingUnknown",
            BozoError::UndeclaredNamespace(_) => "UndeclaredNamespace",
            BozoError::Xml(_) => "XMLParseError",
            BozoError::Json(_) => "JSONDecodeError",
            BozoError::Transport(_) => "TransportError",
            BozoError::Io(_) => "IOError",
        }
    }
}

impl From<std::io::Error> for BozoError {
    fn from(err: std::io::Error) -> Self {
        BozoError::Io(err.to_string())
    }
}

impl From<quick_xml::Error> for BozoError {
    fn from(err: quick_xml::Error) -> Self {
        BozoError::Xml(err.to_string())
    }
}

impl From<serde_json::Error> for BozoError {
    fn from(err: serde_json::Error) -> Self {
        BozoError::Json(err.to_string())
    }
}

/// Serializes an optional error as `{"kind": ..., "message": ...}` or `null`.
pub(crate) fn serialize_bozo<S>(err: &Option<BozoError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    use serde::ser::SerializeMap;

    match err {
        None => serializer.serialize_none(),
        Some(err) => {
            let mut map = serializer.serialize_map(Some(2))?;
            map.serialize_entry("kind", err.kind())?;
            map.serialize_entry("message", &err.to_string())?;
            map.end()
        }
    }
}
