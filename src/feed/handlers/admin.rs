//! RSS administrative elements (`admin:`), which carry their value in
//! `rdf:resource`.

use crate::dict::{FeedParserDict, Value};
use crate::feed::attrs::Attrs;
use crate::feed::dispatch::Handler::{self, Start};
use crate::feed::state::ParserState;

pub(super) const HANDLERS: &[(&str, Handler)] = &[
    ("admin_generatoragent", Start(start_admin_generatoragent)),
    ("admin_errorreportsto", Start(start_admin_errorreportsto)),
];

/// Stores the `rdf:resource` value under `key` as if it were element text
/// and returns the attribute.
fn store_resource<'a>(state: &mut ParserState, attrs: &'a Attrs, key: &str) -> Option<&'a str> {
    state.push(key, true);
    let value = state.attribute(attrs, "rdf:resource").filter(|v| !v.is_empty());
    if let Some(value) = value {
        state.append_top_text(value);
    }
    state.pop(key);
    value
}

fn start_admin_generatoragent(state: &mut ParserState, attrs: Attrs) {
    let value = store_resource(state, &attrs, "generator");
    let detail: FeedParserDict = [("href", Value::from(value))].into_iter().collect();
    state.context().set("generator_detail", detail);
}

fn start_admin_errorreportsto(state: &mut ParserState, attrs: Attrs) {
    store_resource(state, &attrs, "errorreportsto");
}
