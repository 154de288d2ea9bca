use serde::{Deserialize, Serialize};

use crate::attribute::{Attribute, AttributeBag};

/// Well-known [`SourceAsset`] kinds. Open per spec ("`kind ∈ {origin, pdf,
/// …}`") — represented as a newtype rather than a closed enum so future
/// derived kinds (e.g. a new renderer's own intermediate) don't need a
/// schema change, while still giving the two kinds the core already knows
/// about named constructors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceAssetKind(pub String);

impl SourceAssetKind {
    pub const ORIGIN: &'static str = "origin";
    pub const PDF: &'static str = "pdf";

    pub fn origin() -> Self {
        Self(Self::ORIGIN.to_string())
    }

    pub fn pdf() -> Self {
        Self(Self::PDF.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceAssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SourceAssetKind {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

pub mod source_asset_attribute {
    pub const SIZE: &str = "size";
    pub const SOURCE: &str = "source";
    pub const TYPE: &str = "type";
    pub const PAGES: &str = "pages";
}

/// The logical identity of a user-provided file, possibly existing in
/// multiple kinds (`origin`, `pdf`, …). Identity is `(id, kind)`; a single
/// upload can have several rows, one per kind, e.g. the original upload plus
/// a PDF intermediate derived by the document render agent.
///
/// Created once by the ingest path or the document agent; immutable
/// thereafter (spec §3 Lifecycle).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAsset {
    pub id: String,
    pub kind: SourceAssetKind,
    pub attributes: Vec<Attribute>,
    pub created_at: i64,
    pub updated_at: i64,
    pub created_by: String,
    pub updated_by: String,
}

impl AttributeBag for SourceAsset {
    fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }
    fn attributes_mut(&mut self) -> &mut Vec<Attribute> {
        &mut self.attributes
    }
}

impl SourceAsset {
    pub fn new(id: impl Into<String>, kind: SourceAssetKind, node: impl Into<String>, now: i64) -> Self {
        let node = node.into();
        Self {
            id: id.into(),
            kind,
            attributes: Vec::new(),
            created_at: now,
            updated_at: now,
            created_by: node.clone(),
            updated_by: node,
        }
    }

    /// Candidate download URLs, in submission order. The image/document
    /// agents try each in turn, the first success winning (spec §4.5 step 7,
    /// §4.6 step 4).
    pub fn source_urls(&self) -> &[String] {
        self.values(source_asset_attribute::SOURCE)
    }

    /// Parsed `size` attribute (bytes). Missing/unparseable is surfaced as
    /// `None` rather than an error — only the render agents turn this into a
    /// terminal failure, per DESIGN NOTES "typed accessors ... parse at read
    /// time".
    pub fn size(&self) -> Option<u64> {
        self.first(source_asset_attribute::SIZE)
            .and_then(|v| v.parse().ok())
    }

    /// Parsed `pages` attribute, present on `pdf`-kind assets.
    pub fn pages(&self) -> Option<u32> {
        self.first(source_asset_attribute::PAGES)
            .and_then(|v| v.parse().ok())
    }

    /// The extension-style `type` attribute, e.g. `"jpg"`, `"pdf"`, `"docx"`.
    pub fn file_type(&self) -> Option<&str> {
        self.first(source_asset_attribute::TYPE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_parses_numeric_attribute() {
        let mut asset = SourceAsset::new("abc", SourceAssetKind::origin(), "node-1", 0);
        asset.add_attribute(source_asset_attribute::SIZE, vec!["252990".into()]);
        assert_eq!(asset.size(), Some(252_990));
    }

    #[test]
    fn size_is_none_when_unparseable() {
        let mut asset = SourceAsset::new("abc", SourceAssetKind::origin(), "node-1", 0);
        asset.add_attribute(source_asset_attribute::SIZE, vec!["not-a-number".into()]);
        assert_eq!(asset.size(), None);
    }

    #[test]
    fn source_urls_preserve_order() {
        let mut asset = SourceAsset::new("abc", SourceAssetKind::origin(), "node-1", 0);
        asset.add_attribute(
            source_asset_attribute::SOURCE,
            vec!["file:///a".into(), "http://b".into()],
        );
        assert_eq!(asset.source_urls(), ["file:///a", "http://b"]);
    }

    #[test]
    fn roundtrip_through_json_is_a_fixpoint() {
        let mut asset = SourceAsset::new("abc", SourceAssetKind::pdf(), "node-1", 10);
        asset.add_attribute(source_asset_attribute::PAGES, vec!["3".into()]);
        let json = serde_json::to_string(&asset).unwrap();
        let back: SourceAsset = serde_json::from_str(&json).unwrap();
        assert_eq!(asset, back);
    }
}
