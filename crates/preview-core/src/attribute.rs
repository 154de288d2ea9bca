use serde::{Deserialize, Serialize};

/// A named multi-value string list attached to a [`crate::SourceAsset`],
/// [`crate::GeneratedAsset`] or [`crate::Template`].
///
/// The attribute key namespace is open per entity kind — new keys can appear
/// without a schema change. `first`/`has` on the owning entity are the
/// universal accessors; typed readers (`size()`, `pages()`, ...) parse on
/// top of this at read time rather than storing a second, typed copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub values: Vec<String>,
}

impl Attribute {
    pub fn new(key: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            key: key.into(),
            values,
        }
    }

    pub fn single(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, vec![value.into()])
    }

    pub fn first(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }
}

/// Shared by every entity that carries an open attribute bag.
pub trait AttributeBag {
    fn attributes(&self) -> &[Attribute];
    fn attributes_mut(&mut self) -> &mut Vec<Attribute>;

    /// The first value stored under `key`, if any.
    fn first(&self, key: &str) -> Option<&str> {
        self.attributes()
            .iter()
            .find(|a| a.key == key)
            .and_then(Attribute::first)
    }

    /// All values stored under `key`.
    fn values(&self, key: &str) -> &[String] {
        self.attributes()
            .iter()
            .find(|a| a.key == key)
            .map_or(&[], |a| a.values.as_slice())
    }

    fn has(&self, key: &str) -> bool {
        self.attributes().iter().any(|a| a.key == key)
    }

    /// Append a new attribute, returning a clone of what was stored (mirrors
    /// the Go `AddAttribute` return value, used by callers that immediately
    /// want to log or re-use it).
    fn add_attribute(&mut self, key: impl Into<String>, values: Vec<String>) -> Attribute {
        let attribute = Attribute::new(key, values);
        self.attributes_mut().push(attribute.clone());
        attribute
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bag(Vec<Attribute>);
    impl AttributeBag for Bag {
        fn attributes(&self) -> &[Attribute] {
            &self.0
        }
        fn attributes_mut(&mut self) -> &mut Vec<Attribute> {
            &mut self.0
        }
    }

    #[test]
    fn first_returns_the_lead_value() {
        let bag = Bag(vec![Attribute::new("size", vec!["42".into()])]);
        assert_eq!(bag.first("size"), Some("42"));
        assert_eq!(bag.first("missing"), None);
    }

    #[test]
    fn has_checks_key_presence_only() {
        let bag = Bag(vec![Attribute::new("pages", vec![])]);
        assert!(bag.has("pages"));
        assert!(!bag.has("height"));
    }

    #[test]
    fn add_attribute_appends_and_returns_clone() {
        let mut bag = Bag(Vec::new());
        let added = bag.add_attribute("page", vec!["3".into()]);
        assert_eq!(added.key, "page");
        assert_eq!(bag.first("page"), Some("3"));
    }
}
