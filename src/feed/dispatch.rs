//! Element dispatch table.
//!
//! Every namespace module contributes a slice of `(handler key, handler)`
//! pairs; they are merged once into two maps keyed by the lowercased
//! `prefix_local` name produced by [`NamespaceScope::handler_key`].
//!
//! [`NamespaceScope::handler_key`]: crate::namespaces::NamespaceScope::handler_key

use std::collections::HashMap;
use std::sync::OnceLock;

use super::attrs::Attrs;
use super::handlers;
use super::state::ParserState;

pub(crate) type StartFn = fn(&mut ParserState, Attrs);
pub(crate) type EndFn = fn(&mut ParserState);

/// One side of an element handler.
#[derive(Clone, Copy)]
pub(crate) enum Handler {
    Start(StartFn),
    End(EndFn),
}

/// Start and end handlers keyed by handler key.
pub(crate) struct DispatchTable {
    starts: HashMap<&'static str, StartFn>,
    ends: HashMap<&'static str, EndFn>,
}

impl DispatchTable {
    fn from_modules(modules: &[&'static [(&'static str, Handler)]]) -> Self {
        let mut table = Self {
            starts: HashMap::new(),
            ends: HashMap::new(),
        };
        for (key, handler) in modules.iter().flat_map(|m| m.iter()) {
            match handler {
                Handler::Start(f) => {
                    table.starts.insert(key, *f);
                }
                Handler::End(f) => {
                    table.ends.insert(key, *f);
                }
            }
        }
        table
    }

    pub(crate) fn start(&self, key: &str) -> Option<StartFn> {
        self.starts.get(key).copied()
    }

    pub(crate) fn end(&self, key: &str) -> Option<EndFn> {
        self.ends.get(key).copied()
    }
}

static TABLE: OnceLock<DispatchTable> = OnceLock::new();

pub(crate) fn dispatch_table() -> &'static DispatchTable {
    TABLE.get_or_init(|| DispatchTable::from_modules(handlers::MODULES))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_no_key_is_registered_twice() {
        let mut starts = HashSet::new();
        let mut ends = HashSet::new();
        for (key, handler) in handlers::MODULES.iter().flat_map(|m| m.iter()) {
            let fresh = match handler {
                Handler::Start(_) => starts.insert(*key),
                Handler::End(_) => ends.insert(*key),
            };
            assert!(fresh, "duplicate handler for {key}");
        }
    }

    #[test]
    fn test_keys_are_lowercase() {
        for (key, _) in handlers::MODULES.iter().flat_map(|m| m.iter()) {
            assert_eq!(*key, key.to_lowercase());
        }
    }

    #[test]
    fn test_lookup() {
        let table = dispatch_table();
        assert!(table.start("item").is_some());
        assert!(table.end("entry").is_some());
        assert!(table.start("dc_creator").is_some());
        assert!(table.start("no_such_element").is_none());
        // Keywords are only collected on the way out.
        assert!(table.start("itunes_keywords").is_none());
        assert!(table.end("itunes_keywords").is_some());
    }
}
