//! Element handlers, one module per vocabulary.
//!
//! Each module exports a `HANDLERS` slice of `(handler key, handler)`
//! pairs. Keys are the lowercased `prefix_local` names; elements of the
//! core RSS and Atom vocabularies have no prefix.

mod admin;
mod creative_commons;
mod dublin_core;
mod georss;
mod itunes;
mod media;
mod podlove;
mod rss_atom;

use super::dispatch::Handler;

/// Every vocabulary's handlers, merged by the dispatch table.
pub(crate) const MODULES: &[&[(&str, Handler)]] = &[
    rss_atom::HANDLERS,
    dublin_core::HANDLERS,
    itunes::HANDLERS,
    media::HANDLERS,
    podlove::HANDLERS,
    creative_commons::HANDLERS,
    georss::HANDLERS,
    admin::HANDLERS,
];
