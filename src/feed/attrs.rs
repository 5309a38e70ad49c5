use crate::dict::{FeedParserDict, Value};

/// Normalized attributes of one start tag, in document order.
///
/// Keys are lowercased and unique; a repeated key keeps its first position
/// and its last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attrs(Vec<(String, String)>);

impl Attrs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Non-empty value of `key`.
    pub fn get_nonempty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|(k, _)| k == key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key.to_owned(), value)),
        }
    }

    pub fn set_default(&mut self, key: &str, value: impl Into<String>) {
        if !self.contains(key) {
            self.0.push((key.to_owned(), value.into()));
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self.0.iter().position(|(k, _)| k == key)?;
        Some(self.0.remove(pos).1)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copies the attributes into a dict, keys as written.
    pub fn to_dict(&self) -> FeedParserDict {
        self.iter().map(|(k, v)| (k, Value::from(v))).collect()
    }

    /// Serializes as ` name="value"` pairs for re-emitted inline markup.
    /// Values from the tag-soup scanner still carry their references, so
    /// `escape` is off for them and only quotes are escaped.
    pub fn to_markup(&self, escape: bool) -> String {
        self.iter()
            .map(|(k, v)| {
                if escape {
                    format!(" {}=\"{}\"", k, crate::util::xml_escape_attr(v))
                } else {
                    format!(" {}=\"{}\"", k, v.replace('"', "&quot;"))
                }
            })
            .collect()
    }
}

impl FromIterator<(String, String)> for Attrs {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut attrs = Attrs::new();
        for (k, v) in iter {
            attrs.set(&k, v);
        }
        attrs
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Attrs {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        iter.into_iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect()
    }
}
