use std::sync::Arc;

use preview_core::{GeneratedAsset, GeneratedAssetStatus, RendererKind, DEFAULT_TEMPLATE_SMALL_ID};
use preview_storage::{
    GeneratedAssetRepository, InMemoryGeneratedAssetRepository, InMemoryTemplateRepository,
    SledStorage, TemplateRepository,
};

#[tokio::test]
async fn in_memory_backend_never_returns_a_claimed_row_as_work() {
    let templates = Arc::new(InMemoryTemplateRepository::default());
    let repo = InMemoryGeneratedAssetRepository::new(templates);

    for i in 0..5 {
        let asset = GeneratedAsset::new(
            format!("g{i}"),
            "src",
            "origin",
            DEFAULT_TEMPLATE_SMALL_ID,
            format!("local:///g{i}"),
            "node-1",
            0,
        );
        repo.store(asset).await.unwrap();
    }

    let work = repo.find_work_for_service(RendererKind::Image, 3).await.unwrap();
    assert_eq!(work.len(), 3);

    for asset in &work {
        let mut scheduled = asset.clone();
        scheduled.status = GeneratedAssetStatus::Scheduled;
        repo.update(scheduled).await.unwrap();
    }

    let remaining = repo.find_work_for_service(RendererKind::Image, 10).await.unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(|a| !work.iter().any(|w| w.id == a.id)));
}

#[tokio::test]
async fn sled_backend_separates_image_and_document_work_by_template_group() {
    let dir = tempfile::tempdir().unwrap();
    let storage = SledStorage::open(dir.path().join("db")).unwrap();

    let document_templates = TemplateRepository::find_by_renderer(&storage, RendererKind::Document)
        .await
        .unwrap();
    let document_template_id = document_templates[0].id.clone();

    let image_asset = GeneratedAsset::new(
        "img-1",
        "src",
        "origin",
        DEFAULT_TEMPLATE_SMALL_ID,
        "local:///img-1",
        "node-1",
        0,
    );
    let document_asset = GeneratedAsset::new(
        "doc-1",
        "src",
        "origin",
        document_template_id,
        "local:///doc-1",
        "node-1",
        0,
    );

    GeneratedAssetRepository::store(&storage, image_asset).await.unwrap();
    GeneratedAssetRepository::store(&storage, document_asset).await.unwrap();

    let image_work = storage.find_work_for_service(RendererKind::Image, 10).await.unwrap();
    let document_work = storage
        .find_work_for_service(RendererKind::Document, 10)
        .await
        .unwrap();

    assert_eq!(image_work.len(), 1);
    assert_eq!(image_work[0].id, "img-1");
    assert_eq!(document_work.len(), 1);
    assert_eq!(document_work[0].id, "doc-1");
}
