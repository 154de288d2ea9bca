//! Entity model, error taxonomy, configuration, URL signing, and the
//! preview-info assembly contract for the preview rendering service.
//!
//! This crate carries no HTTP types and no storage backend of its own — it
//! is the shared vocabulary that `preview-storage` and `preview-render`
//! build on, and the thing an external HTTP route-wiring layer would
//! depend on to serialize responses.

mod attribute;
mod config;
mod error;
mod generated_asset;
mod preview_info;
mod signer;
mod source_asset;
mod template;

pub use attribute::{Attribute, AttributeBag};
pub use config::{
    AppConfig, AssetApiConfig, CommonConfig, DownloaderConfig, HttpConfig, RenderAgentConfig,
    SimpleApiConfig, StorageBackend, StorageConfig, UploaderConfig,
};
pub use error::{Error, ErrorCode, Result};
pub use generated_asset::{generated_asset_attribute, GeneratedAsset, GeneratedAssetStatus};
pub use preview_info::{assemble, PlaceholderResolver, PreviewInfoCollection, PreviewSlot};
pub use signer::UrlSigner;
pub use source_asset::{source_asset_attribute, SourceAsset, SourceAssetKind};
pub use template::{
    default_raster_template_ids, default_templates, template_attribute, PlaceholderSize,
    RendererKind, Template, DEFAULT_DOCUMENT_TEMPLATE_GROUP, DEFAULT_TEMPLATE_DOCUMENT_ID,
    DEFAULT_TEMPLATE_GROUP, DEFAULT_TEMPLATE_JUMBO_ID, DEFAULT_TEMPLATE_LARGE_ID,
    DEFAULT_TEMPLATE_MEDIUM_ID, DEFAULT_TEMPLATE_SMALL_ID,
};

/// Current time in nanoseconds since the Unix epoch, matching the audit
/// field resolution used throughout the entity model
/// (`created_at`/`updated_at`, spec §3).
pub fn now_nanos() -> i64 {
    i64::try_from(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos(),
    )
    .unwrap_or(i64::MAX)
}

/// A fresh time-ordered id (UUIDv7), used for `GeneratedAsset::id` so index
/// scans over the work index yield FIFO-ish behavior (spec §3).
pub fn new_time_ordered_id() -> String {
    uuid::Uuid::now_v7().to_string()
}
