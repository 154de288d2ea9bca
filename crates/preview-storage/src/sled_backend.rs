use std::path::Path;

use async_trait::async_trait;
use preview_core::{default_templates, now_nanos, GeneratedAsset, RendererKind, SourceAsset, Template};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use tracing::debug;

use crate::error::{Error, Result};
use crate::repository::{GeneratedAssetRepository, SourceAssetRepository, TemplateRepository};

/// Composite keys join parts with a null byte, same convention as the
/// teacher's `CacheKey`: it can't collide across part boundaries.
fn waiting_key(group: &str, id: &str) -> Vec<u8> {
    format!("{group}\0{id}").into_bytes()
}

/// Durable storage opened from a single `sled::Db`, one `Tree` per row kind
/// plus the waiting/active secondary indexes: one `sled::open`, `Error::from`
/// on I/O failure, generalized from a single cache tree to five.
pub struct SledStorage {
    db: Db,
    source_assets: Tree,
    generated_assets: Tree,
    waiting: Tree,
    active: Tree,
    templates: Tree,
}

impl SledStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = sled::open(path)?;
        let source_assets = db.open_tree("source_assets")?;
        let generated_assets = db.open_tree("generated_assets")?;
        let waiting = db.open_tree("waiting_generated_assets")?;
        let active = db.open_tree("active_generated_assets")?;
        let templates = db.open_tree("templates")?;

        if templates.is_empty() {
            for template in default_templates() {
                let bytes = serde_json::to_vec(&template)?;
                templates.insert(template.id.as_bytes(), bytes)?;
            }
            templates.flush()?;
            debug!("seeded default templates into sled storage at {}", path.display());
        }

        Ok(Self {
            db,
            source_assets,
            generated_assets,
            waiting,
            active,
            templates,
        })
    }

    async fn template_group(&self, template_id: &str) -> Result<String> {
        let bytes = self
            .templates
            .get(template_id.as_bytes())?
            .ok_or_else(|| Error::CouldNotBeUpdated(template_id.to_string()))?;
        let template: Template = serde_json::from_slice(&bytes)?;
        Ok(template.group)
    }
}

#[async_trait]
impl SourceAssetRepository for SledStorage {
    async fn store(&self, source_asset: SourceAsset) -> Result<()> {
        let key = format!("{}\0{}", source_asset.id, source_asset.kind);
        let bytes = serde_json::to_vec(&source_asset)?;
        self.source_assets.insert(key.as_bytes(), bytes)?;
        self.source_assets.flush_async().await?;
        Ok(())
    }

    async fn find_by_source_asset_id(&self, id: &str) -> Result<Vec<SourceAsset>> {
        let prefix = format!("{id}\0");
        let mut rows = Vec::new();
        for entry in self.source_assets.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = entry?;
            rows.push(serde_json::from_slice(&bytes)?);
        }
        Ok(rows)
    }
}

#[async_trait]
impl TemplateRepository for SledStorage {
    async fn store(&self, template: Template) -> Result<()> {
        let bytes = serde_json::to_vec(&template)?;
        self.templates.insert(template.id.as_bytes(), bytes)?;
        self.templates.flush_async().await?;
        Ok(())
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Template>> {
        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(bytes) = self.templates.get(id.as_bytes())? {
                rows.push(serde_json::from_slice(&bytes)?);
            }
        }
        Ok(rows)
    }

    async fn find_by_renderer(&self, renderer: RendererKind) -> Result<Vec<Template>> {
        let mut rows = Vec::new();
        for entry in &self.templates {
            let (_, bytes) = entry?;
            let template: Template = serde_json::from_slice(&bytes)?;
            if template.renderer == renderer {
                rows.push(template);
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl GeneratedAssetRepository for SledStorage {
    async fn store(&self, generated_asset: GeneratedAsset) -> Result<()> {
        let group = self.template_group(&generated_asset.template_id).await?;
        let bytes = serde_json::to_vec(&generated_asset)?;
        let is_waiting = generated_asset.status.is_waiting();
        let is_active = generated_asset.status.is_active();
        let id = generated_asset.id.clone();

        (&self.generated_assets, &self.waiting, &self.active)
            .transaction(|(rows, waiting, active)| {
                rows.insert(id.as_bytes(), bytes.as_slice())?;
                if is_waiting {
                    waiting.insert(waiting_key(&group, &id), id.as_bytes())?;
                } else if is_active {
                    active.insert(id.as_bytes(), &[])?;
                }
                Ok::<_, ConflictableTransactionError<Error>>(())
            })
            .map_err(transaction_error)?;

        self.db.flush_async().await?;
        Ok(())
    }

    async fn update(&self, mut generated_asset: GeneratedAsset) -> Result<()> {
        let group = self.template_group(&generated_asset.template_id).await?;
        let id = generated_asset.id.clone();
        generated_asset.updated_at = now_nanos();
        let new_status = generated_asset.status;

        let result = (&self.generated_assets, &self.waiting, &self.active)
            .transaction(move |(rows, waiting, active)| {
                let existing = rows
                    .get(id.as_bytes())?
                    .ok_or_else(|| {
                        ConflictableTransactionError::Abort(Error::CouldNotBeUpdated(id.clone()))
                    })?;
                let previous: GeneratedAsset = serde_json::from_slice(&existing)
                    .map_err(|e| ConflictableTransactionError::Abort(Error::Serialize(e)))?;

                if matches!(new_status, preview_core::GeneratedAssetStatus::Scheduled)
                    && !previous.status.is_waiting()
                {
                    return Err(ConflictableTransactionError::Abort(Error::CouldNotBeUpdated(
                        id.clone(),
                    )));
                }

                let key = waiting_key(&group, &id);
                if new_status.is_active() {
                    waiting.remove(key)?;
                    active.insert(id.as_bytes(), &[])?;
                } else if new_status.is_terminal() {
                    waiting.remove(key)?;
                    active.remove(id.as_bytes())?;
                } else if new_status.is_waiting() {
                    waiting.insert(key, id.as_bytes())?;
                    active.remove(id.as_bytes())?;
                }

                let bytes = serde_json::to_vec(&generated_asset)
                    .map_err(|e| ConflictableTransactionError::Abort(Error::Serialize(e)))?;
                rows.insert(id.as_bytes(), bytes)?;
                Ok(())
            });

        result.map_err(transaction_error)?;
        self.db.flush_async().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<GeneratedAsset>> {
        match self.generated_assets.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<GeneratedAsset>> {
        let mut rows = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(bytes) = self.generated_assets.get(id.as_bytes())? {
                rows.push(serde_json::from_slice(&bytes)?);
            }
        }
        Ok(rows)
    }

    async fn find_by_source_asset_id(&self, source_asset_id: &str) -> Result<Vec<GeneratedAsset>> {
        let mut rows = Vec::new();
        for entry in &self.generated_assets {
            let (_, bytes) = entry?;
            let asset: GeneratedAsset = serde_json::from_slice(&bytes)?;
            if asset.source_asset_id == source_asset_id {
                rows.push(asset);
            }
        }
        Ok(rows)
    }

    async fn find_work_for_service(&self, renderer: RendererKind, n: usize) -> Result<Vec<GeneratedAsset>> {
        let templates = TemplateRepository::find_by_renderer(self, renderer).await?;
        let Some(group) = templates.first().map(|t| t.group.clone()) else {
            return Ok(Vec::new());
        };

        let prefix = format!("{group}\0");
        let mut ids = Vec::new();
        for entry in self.waiting.scan_prefix(prefix.as_bytes()).take(n) {
            let (_, id_bytes) = entry?;
            ids.push(String::from_utf8_lossy(&id_bytes).into_owned());
        }

        self.find_by_ids(&ids).await
    }
}

fn transaction_error(err: TransactionError<Error>) -> Error {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => Error::SledTransaction(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use preview_core::{GeneratedAssetStatus, DEFAULT_TEMPLATE_SMALL_ID};

    fn open_temp() -> (SledStorage, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = SledStorage::open(dir.path().join("db")).unwrap();
        (storage, dir)
    }

    #[tokio::test]
    async fn seeded_templates_are_queryable_by_renderer() {
        let (storage, _dir) = open_temp();
        let image_templates = storage.find_by_renderer(RendererKind::Image).await.unwrap();
        assert_eq!(image_templates.len(), 4);
    }

    #[tokio::test]
    async fn waiting_asset_surfaces_as_work_then_disappears_once_scheduled() {
        let (storage, _dir) = open_temp();
        let asset = GeneratedAsset::new(
            "g1",
            "src",
            "origin",
            DEFAULT_TEMPLATE_SMALL_ID,
            "local:///g1",
            "node-1",
            0,
        );
        GeneratedAssetRepository::store(&storage, asset.clone()).await.unwrap();

        let work = storage.find_work_for_service(RendererKind::Image, 10).await.unwrap();
        assert_eq!(work.len(), 1);

        let mut scheduled = asset;
        scheduled.status = GeneratedAssetStatus::Scheduled;
        storage.update(scheduled).await.unwrap();

        let work = storage.find_work_for_service(RendererKind::Image, 10).await.unwrap();
        assert!(work.is_empty());
    }

    #[tokio::test]
    async fn racing_claims_on_the_same_row_only_one_wins() {
        let (storage, _dir) = open_temp();
        let asset = GeneratedAsset::new(
            "g1",
            "src",
            "origin",
            DEFAULT_TEMPLATE_SMALL_ID,
            "local:///g1",
            "node-1",
            0,
        );
        GeneratedAssetRepository::store(&storage, asset.clone()).await.unwrap();

        let mut claim_a = asset.clone();
        claim_a.status = GeneratedAssetStatus::Scheduled;
        let mut claim_b = asset;
        claim_b.status = GeneratedAssetStatus::Scheduled;

        assert!(storage.update(claim_a).await.is_ok());
        assert!(storage.update(claim_b).await.is_err());
    }
}
