use preview_core::{GeneratedAssetStatus, RendererKind};

/// An in-flight or terminal status emitted by a render agent as it commits
/// progress, consumed by the render-agent manager's dispatcher loop to keep
/// `active_work` accurate (spec: "Render agent" status channel, grounded in
/// `original_source/render/definition.go`'s `RenderStatus`).
#[derive(Debug, Clone)]
pub struct RenderStatus {
    pub generated_asset_id: String,
    pub status: GeneratedAssetStatus,
    pub renderer: RendererKind,
}

/// Work dispatched to a render agent by id; the dispatcher sends the
/// `GeneratedAsset` id, the agent loads the row itself (mirrors
/// `RenderAgentWorkChannel` — `chan string` in the original).
pub type WorkChannelSender = tokio::sync::mpsc::Sender<String>;
pub type WorkChannelReceiver = tokio::sync::mpsc::Receiver<String>;

/// Capacity of a render agent's dispatch channel (spec §9).
pub const WORK_CHANNEL_CAPACITY: usize = 200;

/// Capacity of the manager's aggregate status channel (spec §9).
pub const STATUS_CHANNEL_CAPACITY: usize = 100;
