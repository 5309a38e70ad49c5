//! Feed parsing: the content model state machine and the adapters that
//! drive it.
//!
//! - [`state`] - the parser state shared by both XML adapters
//! - [`strict`] - namespace-aware adapter over `quick-xml`
//! - [`loose`] - tag-soup adapter for documents that are not well formed
//! - [`json`] - JSON Feed mapper
//! - [`fetcher`] - blocking HTTP collaborator
//!
//! Element handlers live in per-namespace modules under `handlers` and are
//! merged into one dispatch table keyed by normalized tag name.

mod attrs;
mod dispatch;
pub mod fetcher;
mod handlers;
pub mod json;
pub(crate) mod loose;
pub mod state;
pub(crate) mod strict;

pub use fetcher::{Fetch, FetchError, FetchResponse, HttpFetcher, RequestOptions};
pub use state::{Mode, ParsedFeed, ParserState, StateOptions};
