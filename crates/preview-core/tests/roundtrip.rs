use preview_core::{
    assemble, default_templates, now_nanos, source_asset_attribute, AttributeBag, GeneratedAsset,
    GeneratedAssetStatus, PlaceholderResolver, PlaceholderSize, SourceAsset, SourceAssetKind,
    UrlSigner,
};

struct FixturePlaceholders;
impl PlaceholderResolver for FixturePlaceholders {
    fn resolve(&self, file_type: &str, size: PlaceholderSize) -> (String, u32, u32) {
        (format!("/static/{file_type}/{}", size.as_str()), 1, 1)
    }
}

#[test]
fn happy_path_jpeg_preview_info_has_four_final_slots() {
    let templates = default_templates();
    let now = now_nanos();

    let mut origin = SourceAsset::new("ABC", SourceAssetKind::origin(), "node-1", now);
    origin.add_attribute(source_asset_attribute::SOURCE, vec!["file:///tmp/x.jpg".into()]);
    origin.add_attribute(source_asset_attribute::TYPE, vec!["jpg".into()]);
    origin.add_attribute(source_asset_attribute::SIZE, vec!["252990".into()]);

    let generated: Vec<GeneratedAsset> = templates
        .iter()
        .filter(|t| t.placeholder_size().is_some())
        .map(|t| {
            let mut g = GeneratedAsset::new(
                preview_core::new_time_ordered_id(),
                &origin.id,
                origin.kind.as_str(),
                &t.id,
                format!("local:///ABC/{}/0", t.placeholder_size().unwrap()),
                "node-1",
                now,
            );
            g.status = GeneratedAssetStatus::Complete;
            g
        })
        .collect();

    let signer = UrlSigner::new("secret", 300);
    let collections = assemble(&generated, &templates, "jpg", &signer, &FixturePlaceholders, now);

    assert_eq!(collections.len(), 1);
    let info = &collections[0];
    for slot in [&info.small, &info.medium, &info.large, &info.jumbo] {
        assert!(slot.is_final);
        assert!(!slot.is_placeholder);
    }
}

#[test]
fn unknown_file_id_falls_back_to_all_placeholder_slots() {
    let templates = default_templates();
    let signer = UrlSigner::new("secret", 300);
    let collections = assemble(&[], &templates, "unknown", &signer, &FixturePlaceholders, 0);

    assert_eq!(collections.len(), 1);
    assert_eq!(collections[0].page, 0);
    assert!(collections[0].small.is_placeholder);
    assert!(collections[0].small.is_final);
}
