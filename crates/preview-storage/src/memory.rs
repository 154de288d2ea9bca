use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use preview_core::{
    default_templates, now_nanos, GeneratedAsset, GeneratedAssetStatus, RendererKind, SourceAsset,
    Template,
};
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::repository::{GeneratedAssetRepository, SourceAssetRepository, TemplateRepository};

/// In-memory template repository. Seeds the default template set on
/// construction (spec §3, §4.4).
pub struct InMemoryTemplateRepository {
    templates: RwLock<Vec<Template>>,
}

impl Default for InMemoryTemplateRepository {
    fn default() -> Self {
        Self {
            templates: RwLock::new(default_templates()),
        }
    }
}

#[async_trait]
impl TemplateRepository for InMemoryTemplateRepository {
    async fn store(&self, template: Template) -> Result<()> {
        self.templates.write().await.push(template);
        Ok(())
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Template>> {
        let templates = self.templates.read().await;
        Ok(templates
            .iter()
            .filter(|t| ids.iter().any(|id| id == &t.id))
            .cloned()
            .collect())
    }

    async fn find_by_renderer(&self, renderer: RendererKind) -> Result<Vec<Template>> {
        let templates = self.templates.read().await;
        Ok(templates
            .iter()
            .filter(|t| t.renderer == renderer)
            .cloned()
            .collect())
    }
}

/// In-memory source asset repository (spec §4.4). A linear store guarded by
/// a single `RwLock`, mirroring `inMemorySourceAssetStorageManager`.
#[derive(Default)]
pub struct InMemorySourceAssetRepository {
    assets: RwLock<Vec<SourceAsset>>,
}

#[async_trait]
impl SourceAssetRepository for InMemorySourceAssetRepository {
    async fn store(&self, source_asset: SourceAsset) -> Result<()> {
        self.assets.write().await.push(source_asset);
        Ok(())
    }

    async fn find_by_source_asset_id(&self, id: &str) -> Result<Vec<SourceAsset>> {
        let assets = self.assets.read().await;
        Ok(assets.iter().filter(|a| a.id == id).cloned().collect())
    }
}

struct Inner {
    assets: Vec<GeneratedAsset>,
    /// `(template_group, id)` pairs currently `waiting` — the work index.
    waiting: HashSet<(String, String)>,
    /// ids currently `scheduled`/`processing` — the active set.
    active: HashSet<String>,
}

/// In-memory generated asset repository enforcing the waiting/active index
/// invariants explicitly (spec §8 property tests), stricter than the
/// original's in-memory revision, which skips them — see DESIGN.md "Open
/// Question decisions" #6.
pub struct InMemoryGeneratedAssetRepository {
    inner: RwLock<Inner>,
    templates: Arc<dyn TemplateRepository>,
}

impl InMemoryGeneratedAssetRepository {
    pub fn new(templates: Arc<dyn TemplateRepository>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                assets: Vec::new(),
                waiting: HashSet::new(),
                active: HashSet::new(),
            }),
            templates,
        }
    }

    async fn template_group(&self, template_id: &str) -> Result<String> {
        let templates = self
            .templates
            .find_by_ids(&[template_id.to_string()])
            .await
            .map_err(|_| Error::CouldNotBeUpdated(template_id.to_string()))?;
        templates
            .first()
            .map(|t| t.group.clone())
            .ok_or_else(|| Error::CouldNotBeUpdated(template_id.to_string()))
    }

    /// A `Scheduled` claim only succeeds from `Waiting`; any other source
    /// status means another caller already claimed this row (spec §4.4
    /// Concurrency: "the first update that also successfully deletes from
    /// the waiting index wins ownership").
    fn valid_transition(previous: GeneratedAssetStatus, next: GeneratedAssetStatus) -> bool {
        if matches!(next, GeneratedAssetStatus::Scheduled) {
            return matches!(previous, GeneratedAssetStatus::Waiting);
        }
        true
    }
}

#[async_trait]
impl GeneratedAssetRepository for InMemoryGeneratedAssetRepository {
    async fn store(&self, generated_asset: GeneratedAsset) -> Result<()> {
        let group = self.template_group(&generated_asset.template_id).await?;
        let mut inner = self.inner.write().await;
        if generated_asset.status.is_waiting() {
            inner
                .waiting
                .insert((group, generated_asset.id.clone()));
        } else if generated_asset.status.is_active() {
            inner.active.insert(generated_asset.id.clone());
        }
        inner.assets.push(generated_asset);
        Ok(())
    }

    async fn update(&self, mut generated_asset: GeneratedAsset) -> Result<()> {
        let group = self.template_group(&generated_asset.template_id).await?;
        let mut inner = self.inner.write().await;

        let idx = inner
            .assets
            .iter()
            .position(|a| a.id == generated_asset.id)
            .ok_or_else(|| Error::CouldNotBeUpdated(generated_asset.id.clone()))?;
        let previous_status = inner.assets[idx].status;

        if !Self::valid_transition(previous_status, generated_asset.status) {
            return Err(Error::CouldNotBeUpdated(generated_asset.id.clone()));
        }

        let key = (group, generated_asset.id.clone());
        if generated_asset.status.is_active() {
            inner.waiting.remove(&key);
            inner.active.insert(generated_asset.id.clone());
        } else if generated_asset.status.is_terminal() {
            inner.waiting.remove(&key);
            inner.active.remove(&generated_asset.id);
        } else if generated_asset.status.is_waiting() {
            inner.waiting.insert(key);
            inner.active.remove(&generated_asset.id);
        }

        generated_asset.updated_at = now_nanos();
        inner.assets[idx] = generated_asset;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<GeneratedAsset>> {
        let inner = self.inner.read().await;
        Ok(inner.assets.iter().find(|a| a.id == id).cloned())
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<GeneratedAsset>> {
        let inner = self.inner.read().await;
        Ok(inner
            .assets
            .iter()
            .filter(|a| ids.iter().any(|id| id == &a.id))
            .cloned()
            .collect())
    }

    async fn find_by_source_asset_id(&self, source_asset_id: &str) -> Result<Vec<GeneratedAsset>> {
        let inner = self.inner.read().await;
        Ok(inner
            .assets
            .iter()
            .filter(|a| a.source_asset_id == source_asset_id)
            .cloned()
            .collect())
    }

    async fn find_work_for_service(&self, renderer: RendererKind, n: usize) -> Result<Vec<GeneratedAsset>> {
        let templates = self
            .templates
            .find_by_renderer(renderer)
            .await
            .map_err(|_| Error::CouldNotBeUpdated(renderer.to_string()))?;
        let Some(group) = templates.first().map(|t| t.group.clone()) else {
            return Ok(Vec::new());
        };

        let inner = self.inner.read().await;
        let ids: Vec<String> = inner
            .waiting
            .iter()
            .filter(|(g, _)| g == &group)
            .take(n)
            .map(|(_, id)| id.clone())
            .collect();

        Ok(inner
            .assets
            .iter()
            .filter(|a| ids.contains(&a.id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use preview_core::{DEFAULT_TEMPLATE_SMALL_ID, DEFAULT_TEMPLATE_GROUP};

    fn fresh_asset(id: &str) -> GeneratedAsset {
        GeneratedAsset::new(
            id,
            "src",
            "origin",
            DEFAULT_TEMPLATE_SMALL_ID,
            format!("local:///{id}"),
            "node-1",
            0,
        )
    }

    #[tokio::test]
    async fn waiting_row_appears_in_work_index() {
        let templates = Arc::new(InMemoryTemplateRepository::default());
        let repo = InMemoryGeneratedAssetRepository::new(templates);
        repo.store(fresh_asset("g1")).await.unwrap();

        let work = repo.find_work_for_service(RendererKind::Image, 10).await.unwrap();
        assert_eq!(work.len(), 1);
        assert_eq!(work[0].id, "g1");
    }

    #[tokio::test]
    async fn scheduling_removes_row_from_waiting_index() {
        let templates = Arc::new(InMemoryTemplateRepository::default());
        let repo = InMemoryGeneratedAssetRepository::new(templates);
        let mut asset = fresh_asset("g1");
        repo.store(asset.clone()).await.unwrap();

        asset.status = GeneratedAssetStatus::Scheduled;
        repo.update(asset).await.unwrap();

        let work = repo.find_work_for_service(RendererKind::Image, 10).await.unwrap();
        assert!(work.is_empty());
    }

    #[tokio::test]
    async fn second_concurrent_claim_on_same_row_loses() {
        let templates = Arc::new(InMemoryTemplateRepository::default());
        let repo = InMemoryGeneratedAssetRepository::new(templates);
        let asset = fresh_asset("g1");
        repo.store(asset.clone()).await.unwrap();

        let mut claim_a = asset.clone();
        claim_a.status = GeneratedAssetStatus::Scheduled;
        let mut claim_b = asset;
        claim_b.status = GeneratedAssetStatus::Scheduled;

        assert!(repo.update(claim_a).await.is_ok());
        assert!(repo.update(claim_b).await.is_err());
    }

    #[tokio::test]
    async fn group_not_found_for_template_yields_error() {
        let templates = Arc::new(InMemoryTemplateRepository::default());
        let repo = InMemoryGeneratedAssetRepository::new(templates);
        let asset = GeneratedAsset::new("g1", "src", "origin", "missing-template", "local:///g1", "node", 0);
        assert!(repo.store(asset).await.is_err());
    }

    #[test]
    fn default_template_group_constant_matches_templates() {
        assert_eq!(DEFAULT_TEMPLATE_GROUP, "4C96");
    }
}
