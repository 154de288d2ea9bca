use async_trait::async_trait;
use preview_core::{GeneratedAsset, RendererKind, SourceAsset, Template};

use crate::error::Result;

/// Repository over [`SourceAsset`] rows (spec §4.4).
#[async_trait]
pub trait SourceAssetRepository: Send + Sync {
    async fn store(&self, source_asset: SourceAsset) -> Result<()>;

    /// Zero or more rows for `id`; the preview-info view filters by `kind`.
    async fn find_by_source_asset_id(&self, id: &str) -> Result<Vec<SourceAsset>>;
}

/// Repository over [`GeneratedAsset`] rows, including the waiting/active
/// secondary indexes that make "find pending work for service X" a cheap
/// bounded query (spec §4.4).
#[async_trait]
pub trait GeneratedAssetRepository: Send + Sync {
    /// Insert into `generated_assets`, and if `status = waiting`, also into
    /// the waiting index. Atomic per spec: either both rows exist or
    /// neither.
    async fn store(&self, generated_asset: GeneratedAsset) -> Result<()>;

    /// Update `status`/`attributes`. Transitioning into `scheduled` or
    /// `processing` removes the row from the waiting index and adds it to
    /// the active index; transitioning into `complete` or `failed:*`
    /// removes it from the active index. This is the ownership-claim write
    /// for dispatch (spec §4.4 Concurrency): the first update that also
    /// deletes the waiting-index row wins.
    async fn update(&self, generated_asset: GeneratedAsset) -> Result<()>;

    async fn find_by_id(&self, id: &str) -> Result<Option<GeneratedAsset>>;

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<GeneratedAsset>>;

    async fn find_by_source_asset_id(&self, source_asset_id: &str) -> Result<Vec<GeneratedAsset>>;

    /// Resolve `renderer`'s primary template group (any template with that
    /// renderer suffices), scan the waiting index for up to `n` ids within
    /// that group, and load the corresponding rows. Ordering is not a
    /// correctness property, but implementations prefer time-ordered ids.
    async fn find_work_for_service(&self, renderer: RendererKind, n: usize) -> Result<Vec<GeneratedAsset>>;
}

/// Repository over [`Template`] rows (spec §4.4, §3). Both backends seed the
/// default template set on construction.
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn store(&self, template: Template) -> Result<()>;

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Template>>;

    async fn find_by_renderer(&self, renderer: RendererKind) -> Result<Vec<Template>>;
}
