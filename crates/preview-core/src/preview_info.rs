use std::collections::BTreeMap;

use crate::attribute::AttributeBag;
use crate::generated_asset::GeneratedAsset;
use crate::generated_asset::GeneratedAssetStatus;
use crate::signer::UrlSigner;
use crate::template::{PlaceholderSize, Template};

/// Resolves `(file-kind, size) -> (path, width, height)` for the static
/// placeholder image set. The actual placeholder-asset loader stays an
/// external collaborator per spec §1 Non-goals; this trait is the contract
/// [`assemble`] needs to exercise in tests without depending on a concrete
/// loader.
pub trait PlaceholderResolver {
    fn resolve(&self, file_type: &str, size: PlaceholderSize) -> (String, u32, u32);
}

/// One size slot of a `previewInfo` entry (spec §6
/// `GET /api/v1/preview/{id}`).
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewSlot {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub expires: i64,
    pub is_final: bool,
    pub is_placeholder: bool,
    pub page: u32,
}

/// One page's worth of preview slots — the four `small|medium|large|jumbo`
/// entries nested under each `previewInfo` in a client-facing response.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewInfoCollection {
    pub page: u32,
    pub small: PreviewSlot,
    pub medium: PreviewSlot,
    pub large: PreviewSlot,
    pub jumbo: PreviewSlot,
}

impl PreviewInfoCollection {
    fn slot(&self, size: PlaceholderSize) -> &PreviewSlot {
        match size {
            PlaceholderSize::Small => &self.small,
            PlaceholderSize::Medium => &self.medium,
            PlaceholderSize::Large => &self.large,
            PlaceholderSize::Jumbo => &self.jumbo,
        }
    }
}

/// Pure data-assembly logic behind `GET /api/v1/preview/{id}` (spec §6). No
/// HTTP types at all — an external route-wiring layer calls this and
/// serializes the result however it likes.
///
/// Groups `generated_assets` by `page`, and for each page picks — per
/// placeholder-size slot — the most recently updated row matching a
/// template of that size ("for any given id the latest row wins", spec §3).
/// Unknown ids (`generated_assets` empty) produce a single all-placeholder
/// collection with `page = 0` (spec §8 scenario 4).
pub fn assemble(
    generated_assets: &[GeneratedAsset],
    templates: &[Template],
    file_type: &str,
    signer: &UrlSigner,
    placeholders: &dyn PlaceholderResolver,
    now_nanos: i64,
) -> Vec<PreviewInfoCollection> {
    if generated_assets.is_empty() {
        return vec![unknown_collection(file_type, signer, placeholders, now_nanos)];
    }

    let mut by_page: BTreeMap<u32, Vec<&GeneratedAsset>> = BTreeMap::new();
    for asset in generated_assets {
        by_page.entry(asset.page()).or_default().push(asset);
    }

    by_page
        .into_iter()
        .map(|(page, assets)| {
            let mut slots = [None, None, None, None];
            for size in PlaceholderSize::ALL {
                slots[size_index(size)] = latest_for_size(&assets, templates, size)
                    .map(|asset| slot_for(asset, size, signer, placeholders, file_type, now_nanos));
            }
            let mut slots = slots.into_iter();
            PreviewInfoCollection {
                page,
                small: slots
                    .next()
                    .flatten()
                    .unwrap_or_else(|| placeholder_slot(file_type, signer, placeholders, PlaceholderSize::Small, page, now_nanos)),
                medium: slots
                    .next()
                    .flatten()
                    .unwrap_or_else(|| placeholder_slot(file_type, signer, placeholders, PlaceholderSize::Medium, page, now_nanos)),
                large: slots
                    .next()
                    .flatten()
                    .unwrap_or_else(|| placeholder_slot(file_type, signer, placeholders, PlaceholderSize::Large, page, now_nanos)),
                jumbo: slots
                    .next()
                    .flatten()
                    .unwrap_or_else(|| placeholder_slot(file_type, signer, placeholders, PlaceholderSize::Jumbo, page, now_nanos)),
            }
        })
        .collect()
}

const fn size_index(size: PlaceholderSize) -> usize {
    match size {
        PlaceholderSize::Small => 0,
        PlaceholderSize::Medium => 1,
        PlaceholderSize::Large => 2,
        PlaceholderSize::Jumbo => 3,
    }
}

fn latest_for_size<'a>(
    assets: &[&'a GeneratedAsset],
    templates: &[Template],
    size: PlaceholderSize,
) -> Option<&'a GeneratedAsset> {
    assets
        .iter()
        .copied()
        .filter(|asset| {
            templates
                .iter()
                .find(|t| t.id == asset.template_id)
                .and_then(Template::placeholder_size)
                == Some(size)
        })
        .max_by_key(|asset| asset.updated_at)
}

fn slot_for(
    asset: &GeneratedAsset,
    size: PlaceholderSize,
    signer: &UrlSigner,
    placeholders: &dyn PlaceholderResolver,
    file_type: &str,
    now_nanos: i64,
) -> PreviewSlot {
    match asset.status {
        GeneratedAssetStatus::Complete => {
            let (url, expires) = signer.sign(&asset.location, now_nanos);
            let width = asset
                .first(crate::generated_asset::generated_asset_attribute::IMAGE_WIDTH)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            let height = asset
                .first(crate::generated_asset::generated_asset_attribute::IMAGE_HEIGHT)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            PreviewSlot {
                url,
                width,
                height,
                expires,
                is_final: true,
                is_placeholder: false,
                page: asset.page(),
            }
        }
        GeneratedAssetStatus::Failed(_) => {
            let mut slot = placeholder_slot(file_type, signer, placeholders, size, asset.page(), now_nanos);
            slot.is_final = true;
            slot
        }
        GeneratedAssetStatus::Waiting | GeneratedAssetStatus::Scheduled | GeneratedAssetStatus::Processing => {
            let mut slot = placeholder_slot(file_type, signer, placeholders, size, asset.page(), now_nanos);
            slot.is_final = false;
            slot
        }
    }
}

fn placeholder_slot(
    file_type: &str,
    signer: &UrlSigner,
    placeholders: &dyn PlaceholderResolver,
    size: PlaceholderSize,
    page: u32,
    now_nanos: i64,
) -> PreviewSlot {
    let (path, width, height) = placeholders.resolve(file_type, size);
    let (url, expires) = signer.sign(&path, now_nanos);
    PreviewSlot {
        url,
        width,
        height,
        expires,
        is_final: true,
        is_placeholder: true,
        page,
    }
}

fn unknown_collection(
    file_type: &str,
    signer: &UrlSigner,
    placeholders: &dyn PlaceholderResolver,
    now_nanos: i64,
) -> PreviewInfoCollection {
    PreviewInfoCollection {
        page: 0,
        small: placeholder_slot(file_type, signer, placeholders, PlaceholderSize::Small, 0, now_nanos),
        medium: placeholder_slot(file_type, signer, placeholders, PlaceholderSize::Medium, 0, now_nanos),
        large: placeholder_slot(file_type, signer, placeholders, PlaceholderSize::Large, 0, now_nanos),
        jumbo: placeholder_slot(file_type, signer, placeholders, PlaceholderSize::Jumbo, 0, now_nanos),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generated_asset::generated_asset_attribute;
    use crate::template::default_templates;

    struct StubPlaceholders;
    impl PlaceholderResolver for StubPlaceholders {
        fn resolve(&self, file_type: &str, size: PlaceholderSize) -> (String, u32, u32) {
            (format!("/static/{file_type}/{}", size.as_str()), 1, 1)
        }
    }

    fn signer() -> UrlSigner {
        UrlSigner::new("secret", 300)
    }

    #[test]
    fn unknown_id_yields_single_all_placeholder_collection() {
        let collections = assemble(&[], &default_templates(), "unknown", &signer(), &StubPlaceholders, 0);
        assert_eq!(collections.len(), 1);
        let info = &collections[0];
        assert_eq!(info.page, 0);
        for size in PlaceholderSize::ALL {
            let slot = info.slot(size);
            assert!(slot.is_placeholder);
            assert!(slot.is_final);
        }
    }

    #[test]
    fn completed_asset_resolves_to_final_non_placeholder_slot() {
        let templates = default_templates();
        let small_template = templates
            .iter()
            .find(|t| t.placeholder_size() == Some(PlaceholderSize::Small))
            .unwrap();

        let mut asset = GeneratedAsset::new(
            "g1",
            "src",
            "origin",
            &small_template.id,
            "local:///src/small/0",
            "node",
            100,
        );
        asset.status = GeneratedAssetStatus::Complete;
        asset.add_attribute(generated_asset_attribute::IMAGE_WIDTH, vec!["250".into()]);
        asset.add_attribute(generated_asset_attribute::IMAGE_HEIGHT, vec!["188".into()]);

        let collections = assemble(&[asset], &templates, "jpg", &signer(), &StubPlaceholders, 0);
        assert_eq!(collections.len(), 1);
        let slot = &collections[0].small;
        assert!(slot.is_final);
        assert!(!slot.is_placeholder);
        assert_eq!(slot.width, 250);
    }

    #[test]
    fn failed_asset_is_final_but_placeholder() {
        let templates = default_templates();
        let small_template = templates
            .iter()
            .find(|t| t.placeholder_size() == Some(PlaceholderSize::Small))
            .unwrap();
        let mut asset = GeneratedAsset::new("g1", "src", "origin", &small_template.id, "local:///x", "node", 0);
        asset.status = GeneratedAssetStatus::Failed(crate::error::ErrorCode::CouldNotResizeImage);

        let collections = assemble(&[asset], &templates, "jpg", &signer(), &StubPlaceholders, 0);
        let slot = &collections[0].small;
        assert!(slot.is_final);
        assert!(slot.is_placeholder);
    }

    #[test]
    fn latest_row_wins_when_resubmitted() {
        let templates = default_templates();
        let small_template = templates
            .iter()
            .find(|t| t.placeholder_size() == Some(PlaceholderSize::Small))
            .unwrap();

        let mut older = GeneratedAsset::new("g1", "src", "origin", &small_template.id, "local:///old", "node", 10);
        older.status = GeneratedAssetStatus::Complete;

        let mut newer = GeneratedAsset::new("g2", "src", "origin", &small_template.id, "local:///new", "node", 20);
        newer.status = GeneratedAssetStatus::Processing;

        let collections = assemble(&[older, newer], &templates, "jpg", &signer(), &StubPlaceholders, 0);
        assert!(!collections[0].small.is_final);
    }

    #[test]
    fn multi_page_document_groups_by_page() {
        let templates = default_templates();
        let small_template = templates
            .iter()
            .find(|t| t.placeholder_size() == Some(PlaceholderSize::Small))
            .unwrap();

        let mut page0 = GeneratedAsset::new("g1", "src", "pdf", &small_template.id, "local:///0", "node", 0);
        page0.status = GeneratedAssetStatus::Complete;
        let mut page1 = GeneratedAsset::new("g2", "src", "pdf", &small_template.id, "local:///1", "node", 0);
        page1.add_attribute(generated_asset_attribute::PAGE, vec!["1".into()]);
        page1.status = GeneratedAssetStatus::Complete;

        let collections = assemble(&[page0, page1], &templates, "pdf", &signer(), &StubPlaceholders, 0);
        assert_eq!(collections.len(), 2);
        assert_eq!(collections[0].page, 0);
        assert_eq!(collections[1].page, 1);
    }
}
