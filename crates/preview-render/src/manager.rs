use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use preview_core::{GeneratedAsset, GeneratedAssetStatus, RendererKind, SourceAsset};
use preview_storage::{GeneratedAssetRepository, SourceAssetRepository, TemplateRepository};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::document_agent::DerivedWorkSink;
use crate::status::{RenderStatus, WorkChannelReceiver, WorkChannelSender, STATUS_CHANNEL_CAPACITY, WORK_CHANNEL_CAPACITY};

/// How often the dispatcher loop tops up active work even absent a status
/// event (spec §4.7: "wakes every 5 s (or on status events)").
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Grace the manager gives each agent to drain in-flight work on shutdown
/// before it stops waiting (spec §4.7 Shutdown, §5 Cancellation).
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// `CreateWork`'s short-circuit admission cap, a multiple of the pool's
/// steady-state `maxWork` (spec §4.7 "under a short-circuit cap (`maxWork ×
/// 4`)").
const SHORT_CIRCUIT_MULTIPLIER: usize = 4;

/// A render agent the manager can register and dispatch work to. Both
/// [`crate::ImageRenderAgent`] and [`crate::DocumentRenderAgent`] already
/// expose an inherent `run` with this exact shape; this trait just lets
/// [`RenderAgentManager::add_agent`] be generic over either.
#[async_trait]
pub trait RenderAgent: Send + Sync + 'static {
    async fn run(self: Arc<Self>, work: WorkChannelReceiver, status: mpsc::Sender<RenderStatus>);
}

#[async_trait]
impl RenderAgent for crate::ImageRenderAgent {
    async fn run(self: Arc<Self>, work: WorkChannelReceiver, status: mpsc::Sender<RenderStatus>) {
        Self::run(self, work, status).await;
    }
}

#[async_trait]
impl RenderAgent for crate::DocumentRenderAgent {
    async fn run(self: Arc<Self>, work: WorkChannelReceiver, status: mpsc::Sender<RenderStatus>) {
        Self::run(self, work, status).await;
    }
}

/// Per-kind pool state: one work-channel sender per registered agent
/// instance, the in-flight set, and the admission-control cap. Spec §5
/// "Shared-resource policy": all of this sits behind one mutex.
struct Pool {
    senders: Vec<WorkChannelSender>,
    active_work: HashSet<String>,
    max_work: usize,
    max_work_increase: usize,
}

impl Pool {
    fn new(max_work_increase: usize) -> Self {
        Self {
            senders: Vec::new(),
            active_work: HashSet::new(),
            max_work: 0,
            max_work_increase,
        }
    }
}

/// Read-only introspection of one renderer kind's pool, for an (external)
/// admin surface (spec §6 `/admin/renderAgents`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub kind: RendererKind,
    pub agent_count: usize,
    pub active_work: usize,
    pub max_work: usize,
}

/// Per-kind work pools, dispatcher loop, and admission control (spec §4.7).
///
/// Owns no agents directly — [`RenderAgentManager::add_agent`] spawns the
/// agent's own `run` loop and keeps only its work-channel sender and a
/// [`JoinHandle`] for shutdown. The original's single shared per-kind
/// channel with N competing consumers becomes N per-agent channels with
/// round-robin dispatch here: ownership of a `GeneratedAsset` is still
/// claimed exclusively through `generated_assets.update`, so which agent a
/// given id lands on is immaterial to correctness (see DESIGN.md).
pub struct RenderAgentManager {
    generated_assets: Arc<dyn GeneratedAssetRepository>,
    source_assets: Arc<dyn SourceAssetRepository>,
    templates: Arc<dyn TemplateRepository>,
    pools: Mutex<HashMap<RendererKind, Pool>>,
    agent_handles: Mutex<Vec<JoinHandle<()>>>,
    status_tx: mpsc::Sender<RenderStatus>,
    status_rx: Mutex<Option<mpsc::Receiver<RenderStatus>>>,
    round_robin: AtomicUsize,
    stop: tokio::sync::Notify,
    node_id: String,
}

impl RenderAgentManager {
    pub fn new(
        generated_assets: Arc<dyn GeneratedAssetRepository>,
        source_assets: Arc<dyn SourceAssetRepository>,
        templates: Arc<dyn TemplateRepository>,
        node_id: impl Into<String>,
    ) -> Arc<Self> {
        let (status_tx, status_rx) = mpsc::channel(STATUS_CHANNEL_CAPACITY);
        Arc::new(Self {
            generated_assets,
            source_assets,
            templates,
            pools: Mutex::new(HashMap::new()),
            agent_handles: Mutex::new(Vec::new()),
            status_tx,
            status_rx: Mutex::new(Some(status_rx)),
            round_robin: AtomicUsize::new(0),
            stop: tokio::sync::Notify::new(),
            node_id: node_id.into(),
        })
    }

    /// Register one more instance of `agent` for `kind`, growing that pool's
    /// `max_work` cap by `max_work_increase` (spec §4.7 "grown by a
    /// configurable increment each time an agent is added") and spawning its
    /// work loop.
    pub fn add_agent<A: RenderAgent>(self: &Arc<Self>, kind: RendererKind, agent: Arc<A>, max_work_increase: usize) {
        let (tx, rx) = mpsc::channel(WORK_CHANNEL_CAPACITY);
        {
            let mut pools = self.pools.lock().unwrap_or_else(|e| e.into_inner());
            let pool = pools.entry(kind).or_insert_with(|| Pool::new(max_work_increase));
            pool.senders.push(tx);
            pool.max_work += max_work_increase;
        }

        let status_tx = self.status_tx.clone();
        let handle = tokio::spawn(agent.run(rx, status_tx));
        self.agent_handles.lock().unwrap_or_else(|e| e.into_inner()).push(handle);
        info!(%kind, "registered render agent");
    }

    /// Spawn the single dispatcher task (spec §4.7, §5 "Exactly one
    /// dispatcher task per manager"). Consumes the status receiver created in
    /// [`RenderAgentManager::new`]; calling this a second time is a no-op.
    pub fn spawn_dispatcher(self: &Arc<Self>) {
        let Some(mut status_rx) = self.status_rx.lock().unwrap_or_else(|e| e.into_inner()).take() else {
            warn!("dispatcher already spawned; ignoring duplicate call");
            return;
        };
        let manager = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        manager.poll_all().await;
                    }
                    status = status_rx.recv() => {
                        match status {
                            Some(status) => {
                                manager.retire(&status);
                                manager.poll_all().await;
                            }
                            None => break,
                        }
                    }
                    () = manager.stop.notified() => break,
                }
            }
        });
    }

    /// Remove a terminal id from its pool's active-work set (spec §4.7 "On
    /// every received `RenderStatus` whose status is `complete` or starts
    /// with `failed`, remove the id from `activeWork[status.service]`").
    fn retire(&self, status: &RenderStatus) {
        if !status.status.is_terminal() {
            return;
        }
        let mut pools = self.pools.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pool) = pools.get_mut(&status.renderer) {
            pool.active_work.remove(&status.generated_asset_id);
        }
    }

    async fn poll_all(&self) {
        let kinds: Vec<RendererKind> = self
            .pools
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect();
        for kind in kinds {
            self.poll_kind(kind).await;
        }
    }

    async fn poll_kind(&self, kind: RendererKind) {
        let Some((budget, senders)) = self.pool_budget(kind) else {
            return;
        };
        if budget == 0 {
            return;
        }

        let candidates = match self.generated_assets.find_work_for_service(kind, budget).await {
            Ok(candidates) => candidates,
            Err(err) => {
                error!(%kind, %err, "find_work_for_service failed");
                return;
            }
        };

        for asset in candidates {
            self.claim_and_dispatch(kind, asset, &senders).await;
        }
    }

    fn pool_budget(&self, kind: RendererKind) -> Option<(usize, Vec<WorkChannelSender>)> {
        let pools = self.pools.lock().unwrap_or_else(|e| e.into_inner());
        let pool = pools.get(&kind)?;
        if pool.senders.is_empty() {
            return None;
        }
        let budget = pool.max_work.saturating_sub(pool.active_work.len());
        Some((budget, pool.senders.clone()))
    }

    /// The ownership-claim write: transition `asset` to `scheduled`. Only
    /// the caller whose `update` also deletes the waiting-index row wins
    /// (spec §4.4 Concurrency); losers' `update` returns an error and the id
    /// is simply left for another dispatcher to find.
    async fn claim_and_dispatch(&self, kind: RendererKind, mut asset: GeneratedAsset, senders: &[WorkChannelSender]) {
        let id = asset.id.clone();
        asset.status = GeneratedAssetStatus::Scheduled;
        asset.updated_by.clone_from(&self.node_id);

        if self.generated_assets.update(asset).await.is_err() {
            return;
        }

        {
            let mut pools = self.pools.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(pool) = pools.get_mut(&kind) {
                pool.active_work.insert(id.clone());
            }
        }
        self.dispatch(kind, senders, id);
    }

    fn dispatch(&self, kind: RendererKind, senders: &[WorkChannelSender], id: String) {
        if senders.is_empty() {
            return;
        }
        let index = self.round_robin.fetch_add(1, Ordering::Relaxed) % senders.len();
        if let Err(err) = senders[index].try_send(id) {
            warn!(%kind, %err, "dispatch channel rejected id; row stays claimed but undelivered");
        }
    }

    async fn renderer_for_template(&self, template_id: &str) -> Option<RendererKind> {
        self.templates
            .find_by_ids(std::slice::from_ref(&template_id.to_string()))
            .await
            .ok()?
            .into_iter()
            .next()
            .map(|t| t.renderer)
    }

    /// The ingest fast-path (spec §4.7 `CreateWork`): store `source`, then
    /// for each of `generated` either admit it directly into its pool's
    /// active set and dispatch immediately, or leave it `waiting` for the
    /// poller.
    pub async fn create_work(&self, source: SourceAsset, generated: Vec<GeneratedAsset>) {
        if let Err(err) = self.source_assets.store(source).await {
            error!(%err, "failed to store source asset");
            return;
        }
        for asset in generated {
            self.create_generated_asset(asset).await;
        }
    }

    async fn create_generated_asset(&self, mut asset: GeneratedAsset) {
        let Some(kind) = self.renderer_for_template(&asset.template_id).await else {
            warn!(template_id = %asset.template_id, "no template found for generated asset id; storing as waiting");
            if let Err(err) = self.generated_assets.store(asset).await {
                error!(%err, "failed to store generated asset");
            }
            return;
        };

        let (under_cap, senders) = {
            let pools = self.pools.lock().unwrap_or_else(|e| e.into_inner());
            match pools.get(&kind) {
                Some(pool) if !pool.senders.is_empty() => {
                    let cap = pool.max_work.saturating_mul(SHORT_CIRCUIT_MULTIPLIER);
                    (pool.active_work.len() < cap, pool.senders.clone())
                }
                _ => (false, Vec::new()),
            }
        };

        if under_cap {
            asset.status = GeneratedAssetStatus::Scheduled;
        }
        let id = asset.id.clone();

        if let Err(err) = self.generated_assets.store(asset).await {
            error!(%err, "failed to store generated asset");
            return;
        }

        if under_cap {
            {
                let mut pools = self.pools.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(pool) = pools.get_mut(&kind) {
                    pool.active_work.insert(id.clone());
                }
            }
            self.dispatch(kind, &senders, id);
        }
    }

    /// Introspection snapshot for an (external) admin surface.
    pub fn snapshot(&self) -> Vec<PoolSnapshot> {
        self.pools
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(kind, pool)| PoolSnapshot {
                kind: *kind,
                agent_count: pool.senders.len(),
                active_work: pool.active_work.len(),
                max_work: pool.max_work,
            })
            .collect()
    }

    /// Signal the dispatcher to stop, close every pool's work channels so
    /// agents drain and exit, then wait up to [`SHUTDOWN_GRACE`] per agent
    /// before force-returning (spec §4.7 Shutdown, §5 Cancellation).
    pub async fn shutdown(&self) {
        self.stop.notify_one();
        {
            let mut pools = self.pools.lock().unwrap_or_else(|e| e.into_inner());
            for pool in pools.values_mut() {
                pool.senders.clear();
            }
        }

        let handles = std::mem::take(&mut *self.agent_handles.lock().unwrap_or_else(|e| e.into_inner()));
        for handle in handles {
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                warn!("agent did not drain within shutdown grace period; force-returning");
            }
        }
    }
}

#[async_trait]
impl DerivedWorkSink for RenderAgentManager {
    async fn create_derived_work(&self, source: SourceAsset, derived: Vec<GeneratedAsset>) {
        self.create_work(source, derived).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use preview_core::{now_nanos, DEFAULT_TEMPLATE_SMALL_ID};
    use preview_storage::{InMemoryGeneratedAssetRepository, InMemorySourceAssetRepository, InMemoryTemplateRepository};

    struct EchoAgent;

    #[async_trait]
    impl RenderAgent for EchoAgent {
        async fn run(self: Arc<Self>, mut work: WorkChannelReceiver, status: mpsc::Sender<RenderStatus>) {
            while let Some(id) = work.recv().await {
                let _ = status
                    .send(RenderStatus {
                        generated_asset_id: id,
                        status: GeneratedAssetStatus::Complete,
                        renderer: RendererKind::Image,
                    })
                    .await;
            }
        }
    }

    fn build_manager() -> (Arc<RenderAgentManager>, Arc<dyn GeneratedAssetRepository>) {
        let templates = Arc::new(InMemoryTemplateRepository::default());
        let generated: Arc<dyn GeneratedAssetRepository> =
            Arc::new(InMemoryGeneratedAssetRepository::new(templates.clone()));
        let sources: Arc<dyn SourceAssetRepository> = Arc::new(InMemorySourceAssetRepository::default());
        let manager = RenderAgentManager::new(generated.clone(), sources, templates, "node-1");
        (manager, generated)
    }

    #[tokio::test]
    async fn fast_path_dispatches_immediately_under_cap() {
        let (manager, generated) = build_manager();
        manager.add_agent(RendererKind::Image, Arc::new(EchoAgent), 5);
        manager.spawn_dispatcher();

        let source = preview_core::SourceAsset::new("s1", preview_core::SourceAssetKind::origin(), "node-1", now_nanos());
        let asset = GeneratedAsset::new("g1", "s1", "origin", DEFAULT_TEMPLATE_SMALL_ID, "local:///g1", "node-1", now_nanos());
        manager.create_work(source, vec![asset]).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        let stored = generated.find_by_id("g1").await.unwrap().unwrap();
        assert_eq!(stored.status, GeneratedAssetStatus::Complete);
    }

    #[tokio::test]
    async fn over_cap_work_stays_waiting_until_polled() {
        let (manager, generated) = build_manager();
        manager.add_agent(RendererKind::Image, Arc::new(EchoAgent), 1);

        let source = preview_core::SourceAsset::new("s1", preview_core::SourceAssetKind::origin(), "node-1", now_nanos());
        let mut assets = Vec::new();
        for i in 0..10 {
            assets.push(GeneratedAsset::new(
                format!("g{i}"),
                "s1",
                "origin",
                DEFAULT_TEMPLATE_SMALL_ID,
                format!("local:///g{i}"),
                "node-1",
                now_nanos(),
            ));
        }
        manager.create_work(source, assets).await;

        let waiting = generated.find_work_for_service(RendererKind::Image, 100).await.unwrap();
        assert!(!waiting.is_empty(), "some work should remain waiting past the short-circuit cap");
    }

    #[tokio::test]
    async fn snapshot_reports_registered_agent_counts() {
        let (manager, _generated) = build_manager();
        manager.add_agent(RendererKind::Image, Arc::new(EchoAgent), 5);
        manager.add_agent(RendererKind::Image, Arc::new(EchoAgent), 5);

        let snapshot = manager.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].agent_count, 2);
        assert_eq!(snapshot[0].max_work, 10);
    }

    #[tokio::test]
    async fn shutdown_drains_agents_and_closes_channels() {
        let (manager, _generated) = build_manager();
        manager.add_agent(RendererKind::Image, Arc::new(EchoAgent), 5);
        manager.spawn_dispatcher();
        manager.shutdown().await;
    }
}
