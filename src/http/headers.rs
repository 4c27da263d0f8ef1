//! Order-preserving header list with case-insensitive lookup.

/// HTTP header fields in the order they were received or added.
///
/// ```
/// use chatrelay::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Content-Type", "application/json");
/// headers.set("content-type", "text/plain; charset=utf-8");
///
/// assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain; charset=utf-8"));
/// assert_eq!(headers.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Appends a header entry, keeping any existing values for the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Replaces every value of `name` with a single `value`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.inner.push((name, value.into()));
    }

    /// Returns the first value for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Removes all entries named `name`. Returns `true` if any were removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.inner.len();
        self.inner.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.inner.len() < before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let mut h = Headers::new();
        h.insert("Content-Length", "12");
        assert_eq!(h.get("content-length"), Some("12"));
        assert_eq!(h.get("CONTENT-LENGTH"), Some("12"));
        assert!(h.contains("Content-length"));
        assert!(!h.contains("content-type"));
    }

    #[test]
    fn set_replaces_all_values() {
        let mut h = Headers::new();
        h.insert("Vary", "Origin");
        h.insert("vary", "Accept");
        h.set("Vary", "Origin");
        assert_eq!(h.len(), 1);
        assert_eq!(h.get("vary"), Some("Origin"));
    }

    #[test]
    fn remove_reports_whether_anything_changed() {
        let mut h = Headers::new();
        h.insert("Connection", "close");
        assert!(h.remove("connection"));
        assert!(h.is_empty());
        assert!(!h.remove("connection"));
    }

    #[test]
    fn iteration_keeps_insertion_order() {
        let mut h = Headers::new();
        h.insert("B", "2");
        h.insert("A", "1");
        let names: Vec<_> = h.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["B", "A"]);
    }
}
