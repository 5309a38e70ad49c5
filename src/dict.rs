//! The generic record type used for the feed and for every entry.
//!
//! A [`FeedParserDict`] is a string-keyed map of [`Value`]s with a fixed
//! alias table applied on reads and writes, so legacy field names (`channel`,
//! `guid`, `description`, `modified`, ...) observe the same storage as the
//! current ones.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

/// A single field value inside a [`FeedParserDict`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(DateTime<Utc>),
    Duration(#[serde(serialize_with = "serialize_duration")] Duration),
    List(Vec<Value>),
    Dict(FeedParserDict),
}

fn serialize_duration<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&FeedParserDict> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut FeedParserDict> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(d),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Loose truthiness: null, `false`, `0`, empty strings and empty
    /// containers are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Date(_) | Value::Duration(_) => true,
            Value::List(l) => !l.is_empty(),
            Value::Dict(d) => !d.is_empty(),
        }
    }

    /// Replaces a non-dict value with an empty dict and returns it.
    pub(crate) fn force_dict(&mut self) -> &mut FeedParserDict {
        if !matches!(self, Value::Dict(_)) {
            *self = Value::Dict(FeedParserDict::new());
        }
        match self {
            Value::Dict(d) => d,
            _ => unreachable!("value was just replaced by a dict"),
        }
    }

    /// Replaces a non-list value with an empty list and returns it.
    pub(crate) fn force_list(&mut self) -> &mut Vec<Value> {
        if !matches!(self, Value::List(_)) {
            *self = Value::List(Vec::new());
        }
        match self {
            Value::List(l) => l,
            _ => unreachable!("value was just replaced by a list"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d)
    }
}

impl From<Duration> for Value {
    fn from(d: Duration) -> Self {
        Value::Duration(d)
    }
}

impl From<FeedParserDict> for Value {
    fn from(d: FeedParserDict) -> Self {
        Value::Dict(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(l: Vec<Value>) -> Self {
        Value::List(l)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// ============================================================================
// Alias table
// ============================================================================

/// Legacy key to canonical key(s). Reads try each canonical key in order;
/// writes go to the first one.
const KEYMAP: &[(&str, &[&str])] = &[
    ("channel", &["feed"]),
    ("items", &["entries"]),
    ("guid", &["id"]),
    ("date", &["updated"]),
    ("date_parsed", &["updated_parsed"]),
    ("description", &["summary", "subtitle"]),
    ("description_detail", &["summary_detail", "subtitle_detail"]),
    ("url", &["href"]),
    ("modified", &["updated"]),
    ("modified_parsed", &["updated_parsed"]),
    ("issued", &["published"]),
    ("issued_parsed", &["published_parsed"]),
    ("copyright", &["rights"]),
    ("copyright_detail", &["rights_detail"]),
    ("tagline", &["subtitle"]),
    ("tagline_detail", &["subtitle_detail"]),
];

fn aliases(key: &str) -> Option<&'static [&'static str]> {
    KEYMAP.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Key that a write through `key` lands on.
pub fn canonical_key(key: &str) -> &str {
    match aliases(key) {
        Some(targets) => targets[0],
        None => key,
    }
}

/// Result of [`FeedParserDict::lookup`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lookup<'a> {
    pub value: &'a Value,
    /// Set when the requested key was absent and a deprecated substitute
    /// key answered instead.
    pub fallback: Option<&'static str>,
}

/// String-keyed record with alias-aware access.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FeedParserDict {
    map: BTreeMap<String, Value>,
}

impl FeedParserDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Reads `key` through the alias table, reporting deprecated fallbacks.
    ///
    /// `updated` and `updated_parsed` fall back to `published` and
    /// `published_parsed` when absent; `category` reads the first tag's term
    /// and `license` the first `rel="license"` link.
    pub fn lookup(&self, key: &str) -> Option<Lookup<'_>> {
        let plain = |value| Lookup { value, fallback: None };
        match key {
            "category" => {
                let tag = self.map.get("tags")?.as_list()?.first()?.as_dict()?;
                tag.map.get("term").map(plain)
            }
            "license" => self.links().find_map(|link| {
                (link.get_str("rel") == Some("license"))
                    .then(|| link.map.get("href"))
                    .flatten()
                    .map(plain)
            }),
            "updated" | "updated_parsed" => {
                if let Some(value) = self.map.get(key) {
                    return Some(plain(value));
                }
                let substitute = if key == "updated" { "published" } else { "published_parsed" };
                let value = self.map.get(substitute)?;
                tracing::warn!(
                    key,
                    substitute,
                    "deprecated fallback: `{key}` is absent, answering with `{substitute}`"
                );
                Some(Lookup { value, fallback: Some(substitute) })
            }
            _ => {
                if let Some(targets) = aliases(key) {
                    if let Some(value) = targets.iter().find_map(|k| self.map.get(*k)) {
                        return Some(plain(value));
                    }
                }
                self.map.get(key).map(plain)
            }
        }
    }

    /// Reads `key` through the alias table.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.lookup(key).map(|l| l.value)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_dict(&self, key: &str) -> Option<&FeedParserDict> {
        self.get(key).and_then(Value::as_dict)
    }

    pub fn get_list(&self, key: &str) -> Option<&[Value]> {
        self.get(key).and_then(Value::as_list)
    }

    /// Reads `key` exactly as stored, ignoring aliases.
    pub fn get_raw(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }

    /// Alias-aware membership; `updated`/`updated_parsed` only count when
    /// stored under their own name.
    pub fn contains(&self, key: &str) -> bool {
        match key {
            "updated" | "updated_parsed" => self.map.contains_key(key),
            _ => self.get(key).is_some(),
        }
    }

    pub fn contains_raw(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Writes `value` under the canonical key for `key`.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.map.insert(canonical_key(key).to_owned(), value.into());
    }

    /// Writes `value` under `key` exactly, bypassing the alias table.
    pub(crate) fn insert_raw(&mut self, key: &str, value: impl Into<Value>) {
        self.map.insert(key.to_owned(), value.into());
    }

    /// Writes `value` only when `key` is not already present.
    pub fn set_default(&mut self, key: &str, value: impl Into<Value>) -> &mut Value {
        let canonical = canonical_key(key).to_owned();
        if !self.contains(key) {
            self.map.insert(canonical.clone(), value.into());
        }
        // An alias can be answered by a secondary canonical key.
        let existing = aliases(key)
            .and_then(|targets| targets.iter().find(|k| self.map.contains_key(**k)))
            .map(|k| (*k).to_owned())
            .unwrap_or(canonical);
        self.map.entry(existing).or_insert(Value::Null)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.map.get_mut(canonical_key(key))
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.map.remove(canonical_key(key))
    }

    /// Returns the list stored at `key`, creating (or replacing a non-list
    /// value with) an empty one.
    pub fn ensure_list(&mut self, key: &str) -> &mut Vec<Value> {
        self.map
            .entry(canonical_key(key).to_owned())
            .or_insert_with(|| Value::List(Vec::new()))
            .force_list()
    }

    /// Returns the dict stored at `key`, creating (or replacing a non-dict
    /// value with) an empty one.
    pub fn ensure_dict(&mut self, key: &str) -> &mut FeedParserDict {
        self.map
            .entry(canonical_key(key).to_owned())
            .or_insert_with(|| Value::Dict(FeedParserDict::new()))
            .force_dict()
    }

    pub fn dict_mut(&mut self, key: &str) -> Option<&mut FeedParserDict> {
        self.get_mut(key).and_then(Value::as_dict_mut)
    }

    /// Last dict inside the list stored at `key`.
    pub fn last_dict_mut(&mut self, key: &str) -> Option<&mut FeedParserDict> {
        match self.get_mut(key)? {
            Value::List(items) => items.last_mut().and_then(Value::as_dict_mut),
            _ => None,
        }
    }

    /// Copies every entry of `other` into `self`, overwriting.
    pub fn update(&mut self, other: FeedParserDict) {
        self.map.extend(other.map);
    }

    fn links(&self) -> impl Iterator<Item = &FeedParserDict> {
        self.map
            .get("links")
            .and_then(Value::as_list)
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_dict)
    }

    /// First tag term, if any.
    pub fn category(&self) -> Option<&str> {
        self.get_str("category")
    }

    /// First `rel="license"` link target, if any.
    pub fn license(&self) -> Option<&str> {
        self.get_str("license")
    }

    /// Links with `rel="enclosure"`, without their `rel` key.
    pub fn enclosures(&self) -> Vec<FeedParserDict> {
        self.links()
            .filter(|link| link.get_str("rel") == Some("enclosure"))
            .map(|link| {
                link.iter()
                    .filter(|(k, _)| *k != "rel")
                    .map(|(k, v)| (k.to_owned(), v.clone()))
                    .collect()
            })
            .collect()
    }
}

/// Builds a dict from raw pairs without applying aliases.
impl FromIterator<(String, Value)> for FeedParserDict {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

impl<'a> FromIterator<(&'a str, Value)> for FeedParserDict {
    fn from_iter<I: IntoIterator<Item = (&'a str, Value)>>(iter: I) -> Self {
        iter.into_iter().map(|(k, v)| (k.to_owned(), v)).collect()
    }
}
