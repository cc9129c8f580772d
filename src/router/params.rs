use std::collections::HashMap;

/// Key under which a trailing `*` segment stores the rest of the path.
pub const WILDCARD: &str = "*";

/// Path parameters captured while resolving a route.
///
/// Owned by exactly one request context and cleared, not freed, when the
/// context goes back to the pool.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Params {
    inner: HashMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner.get(name).map(String::as_str)
    }

    /// The remainder captured by a `*` segment.
    pub fn wildcard(&self) -> Option<&str> {
        self.get(WILDCARD)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub(crate) fn insert(&mut self, name: &str, value: &str) {
        self.inner.insert(name.to_string(), value.to_string());
    }

    pub(crate) fn clear(&mut self) {
        self.inner.clear();
    }
}
