//! Resource descriptors produced by the parser and consumed by the loader.

use std::fmt;

use url::Url;

use crate::error::ResourceError;

/// The kind of an external resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Script,
    Style,
}

impl ResourceKind {
    /// Content type sent with the fetch for this kind.
    pub fn content_type(self) -> &'static str {
        match self {
            ResourceKind::Script => "text/javascript",
            ResourceKind::Style => "text/css",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Script => "script",
            ResourceKind::Style => "style",
        })
    }
}

/// Element attributes in source order. Names are lowercased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<(String, String)>);

impl Attributes {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Value of the first attribute called `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Append an attribute. Duplicate names keep the first occurrence, as
    /// HTML does.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into().to_ascii_lowercase();
        if !self.contains(&name) {
            self.0.push((name, value.into()));
        }
    }

    /// A copy without the attribute called `name`.
    pub fn without(&self, name: &str) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(key, _)| !key.eq_ignore_ascii_case(name))
                .cloned()
                .collect(),
        )
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attrs = Attributes::new();
        for (k, v) in iter {
            attrs.push(k, v);
        }
        attrs
    }
}

/// An external script or stylesheet referenced by an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    /// Absolute URL of the resource.
    pub url: Url,
    pub kind: ResourceKind,
    /// Every attribute of the referencing element except `src`/`href`.
    pub attributes: Attributes,
}

impl ResourceDescriptor {
    pub fn script(url: Url) -> Self {
        Self {
            url,
            kind: ResourceKind::Script,
            attributes: Attributes::new(),
        }
    }

    pub fn style(url: Url) -> Self {
        Self {
            url,
            kind: ResourceKind::Style,
            attributes: Attributes::new(),
        }
    }
}

/// A successfully fetched resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedResource {
    pub url: Url,
    pub kind: ResourceKind,
    /// Full response body.
    pub content: String,
}

/// Outcome of loading one resource.
pub type ResourceLoadResult = std::result::Result<LoadedResource, ResourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_keep_order_and_first_duplicate() {
        let attrs: Attributes = [("Type", "module"), ("defer", ""), ("type", "text/javascript")]
            .into_iter()
            .collect();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs.get("type"), Some("module"));
        let names: Vec<_> = attrs.iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["type", "defer"]);
    }

    #[test]
    fn test_attributes_without() {
        let attrs: Attributes = [("src", "a.js"), ("async", "")].into_iter().collect();
        let rest = attrs.without("SRC");
        assert!(!rest.contains("src"));
        assert!(rest.contains("async"));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(ResourceKind::Script.content_type(), "text/javascript");
        assert_eq!(ResourceKind::Style.content_type(), "text/css");
    }
}
