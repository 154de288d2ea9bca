//! Repository traits over the preview-core entity model, plus an in-memory
//! and a sled-backed implementation of each.
//!
//! Neither backend is a generic key-value cache: both enforce the waiting
//! and active secondary indexes that dispatch relies on, so this crate is
//! closer in shape to the original's `GeneratedAssetStorageManager`
//! implementations than to the teacher's `DiskCache`.

mod error;
mod memory;
mod repository;
mod sled_backend;

pub use error::{Error, Result};
pub use memory::{
    InMemoryGeneratedAssetRepository, InMemorySourceAssetRepository, InMemoryTemplateRepository,
};
pub use repository::{GeneratedAssetRepository, SourceAssetRepository, TemplateRepository};
pub use sled_backend::SledStorage;
