use serde::{Deserialize, Serialize};

use crate::attribute::{Attribute, AttributeBag};

/// The pool name an agent serves. Closed per spec ("renderer (kind: `image`
/// or `document`)") — unlike [`crate::SourceAssetKind`], new renderer kinds
/// require a code change anyway (a new agent type), so a sum type fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    Image,
    Document,
}

impl RendererKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Document => "document",
        }
    }
}

impl std::fmt::Display for RendererKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RendererKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "document" => Ok(Self::Document),
            other => Err(format!("unknown renderer kind: {other}")),
        }
    }
}

/// Named size bucket used both by templates (`placeholderSize`) and by the
/// placeholder-asset lookup (external collaborator, see [`crate::preview_info`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaceholderSize {
    Small,
    Medium,
    Large,
    Jumbo,
}

impl PlaceholderSize {
    pub const ALL: [Self; 4] = [Self::Small, Self::Medium, Self::Large, Self::Jumbo];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Jumbo => "jumbo",
        }
    }
}

impl std::fmt::Display for PlaceholderSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PlaceholderSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            "jumbo" => Ok(Self::Jumbo),
            other => Err(format!("unknown placeholder size: {other}")),
        }
    }
}

pub mod template_attribute {
    pub const WIDTH: &str = "width";
    pub const HEIGHT: &str = "height";
    pub const OUTPUT: &str = "output";
    pub const PLACEHOLDER_SIZE: &str = "placeholderSize";
}

/// A named rendition recipe. Process-wide static configuration; the default
/// set (seeded by both storage backends) preserves the four legacy ids from
/// `original_source/common/templates.go` so deployments that migrate keep
/// addressing the same renditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub renderer: RendererKind,
    pub group: String,
    pub attributes: Vec<Attribute>,
}

impl AttributeBag for Template {
    fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }
    fn attributes_mut(&mut self) -> &mut Vec<Attribute> {
        &mut self.attributes
    }
}

impl Template {
    pub fn placeholder_size(&self) -> Option<PlaceholderSize> {
        self.first(template_attribute::PLACEHOLDER_SIZE)
            .and_then(|v| v.parse().ok())
    }

    pub fn height(&self) -> Option<&str> {
        self.first(template_attribute::HEIGHT)
    }

    pub fn width(&self) -> Option<&str> {
        self.first(template_attribute::WIDTH)
    }

    pub fn output(&self) -> Option<&str> {
        self.first(template_attribute::OUTPUT)
    }

    fn raster(id: &str, width: &str, height: &str, placeholder_size: PlaceholderSize) -> Self {
        Self {
            id: id.to_string(),
            renderer: RendererKind::Image,
            group: DEFAULT_TEMPLATE_GROUP.to_string(),
            attributes: vec![
                Attribute::single(template_attribute::WIDTH, width),
                Attribute::single(template_attribute::HEIGHT, height),
                Attribute::single(template_attribute::OUTPUT, "jpg"),
                Attribute::single(template_attribute::PLACEHOLDER_SIZE, placeholder_size.as_str()),
            ],
        }
    }
}

/// Shared partition key for the default templates, carried over from the
/// original `Group: "4C96"` literal so the work index's prefix layout stays
/// identical across a migration.
pub const DEFAULT_TEMPLATE_GROUP: &str = "4C96";

/// The document-conversion template's own partition key. The retrieved
/// original never defines a document-renderer template (it only wires the
/// constant name, `common.RenderAgentDocument`, without a literal), so this
/// group is SPEC_FULL's own addition — kept distinct from
/// [`DEFAULT_TEMPLATE_GROUP`] so the image and document work indexes don't
/// share a partition key (see DESIGN.md).
pub const DEFAULT_DOCUMENT_TEMPLATE_GROUP: &str = "D0C1";

pub const DEFAULT_TEMPLATE_JUMBO_ID: &str = "04a2c710-8872-4c88-9c75-a67175d3a8e7";
pub const DEFAULT_TEMPLATE_LARGE_ID: &str = "2eee7c27-75e2-4682-9920-9a4e14caa433";
pub const DEFAULT_TEMPLATE_MEDIUM_ID: &str = "a89a6a0d-51d9-4d99-b278-0c5dfc538984";
pub const DEFAULT_TEMPLATE_SMALL_ID: &str = "eaa7be0e-354f-482c-ac75-75cbdafecb6e";
pub const DEFAULT_TEMPLATE_DOCUMENT_ID: &str = "7b9f9e9b-5d7a-4a1a-9f0e-3a6f0e6f9c31";

/// The four raster templates plus the one document-conversion template that
/// every backend seeds on construction (spec §3 Template).
pub fn default_templates() -> Vec<Template> {
    vec![
        Template::raster(DEFAULT_TEMPLATE_JUMBO_ID, "1040", "780", PlaceholderSize::Jumbo),
        Template::raster(DEFAULT_TEMPLATE_LARGE_ID, "520", "390", PlaceholderSize::Large),
        Template::raster(DEFAULT_TEMPLATE_MEDIUM_ID, "500", "376", PlaceholderSize::Medium),
        Template::raster(DEFAULT_TEMPLATE_SMALL_ID, "250", "188", PlaceholderSize::Small),
        Template {
            id: DEFAULT_TEMPLATE_DOCUMENT_ID.to_string(),
            renderer: RendererKind::Document,
            group: DEFAULT_DOCUMENT_TEMPLATE_GROUP.to_string(),
            attributes: vec![Attribute::single(template_attribute::OUTPUT, "pdf")],
        },
    ]
}

/// The four legacy raster template ids, in jumbo/large/medium/small order —
/// the set the document agent fans derived pages out to (spec §4.6 step 12).
pub fn default_raster_template_ids() -> [&'static str; 4] {
    [
        DEFAULT_TEMPLATE_JUMBO_ID,
        DEFAULT_TEMPLATE_LARGE_ID,
        DEFAULT_TEMPLATE_MEDIUM_ID,
        DEFAULT_TEMPLATE_SMALL_ID,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_templates_carry_legacy_ids() {
        let templates = default_templates();
        assert_eq!(templates.len(), 5);
        assert!(templates.iter().any(|t| t.id == DEFAULT_TEMPLATE_JUMBO_ID));
        assert!(templates
            .iter()
            .filter(|t| t.renderer == RendererKind::Image)
            .all(|t| t.group == DEFAULT_TEMPLATE_GROUP));
    }

    #[test]
    fn placeholder_size_round_trips_through_attribute() {
        let templates = default_templates();
        let small = templates
            .iter()
            .find(|t| t.id == DEFAULT_TEMPLATE_SMALL_ID)
            .unwrap();
        assert_eq!(small.placeholder_size(), Some(PlaceholderSize::Small));
    }

    #[test]
    fn renderer_kind_round_trips_wire_form() {
        assert_eq!("image".parse::<RendererKind>().unwrap(), RendererKind::Image);
        assert_eq!(RendererKind::Document.to_string(), "document");
    }
}
