//! Process wiring for the preview rendering service: loads configuration,
//! builds the storage backend and render agents it describes, and runs the
//! render-agent manager to completion.
//!
//! HTTP ingest, the asset-serving route, and the admin surface are external
//! collaborators that would sit in front of this process and call into
//! `preview-core`/`preview-storage`/`preview-render` directly; this binary
//! carries none of them. `--submit` exists only to exercise the pipeline
//! end to end without that HTTP layer.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use preview_core::{
    default_raster_template_ids, new_time_ordered_id, now_nanos, source_asset_attribute, AppConfig,
    AttributeBag, RendererKind, SourceAsset, SourceAssetKind, StorageBackend,
};
use preview_render::{
    DefaultDownloader, DocumentRenderAgent, ImageRenderAgent, LocalUploader, ObjectStoreUploader,
    RenderAgentManager, TemporaryFileRegistry, Uploader,
};
use preview_storage::{
    GeneratedAssetRepository, InMemoryGeneratedAssetRepository, InMemorySourceAssetRepository,
    InMemoryTemplateRepository, SledStorage, SourceAssetRepository, TemplateRepository,
};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "preview-daemon")]
#[command(author, version, about = "Render-agent host for the preview rendering service", long_about = None)]
struct Args {
    /// Config file path (TOML or JSON). Falls back to `./config.toml`, then built-in defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output (repeatable).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Enqueue a local file as an origin `SourceAsset` on startup, standing
    /// in for the out-of-scope HTTP ingest route.
    #[arg(long)]
    submit: Option<PathBuf>,

    /// File type attribute (extension) to record for `--submit`.
    #[arg(long, default_value = "jpg")]
    submit_type: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    FmtSubscriber::builder().with_max_level(log_level).with_target(false).init();

    let config = AppConfig::load(args.config.as_deref());
    info!(node_id = %config.common.node_id, backend = ?config.storage.backend, "starting preview-daemon");

    tokio::fs::create_dir_all(&config.common.base_path)
        .await
        .with_context(|| format!("failed to create base path {}", config.common.base_path.display()))?;

    let (source_assets, generated_assets, templates) = open_storage(&config).await?;
    let registry = TemporaryFileRegistry::new();
    let no_tram_hosts: Vec<String> = Vec::new();
    let tram_hosts: &[String] = if config.downloader.tram_enabled {
        &config.downloader.tram_hosts
    } else {
        &no_tram_hosts
    };
    let downloader: Arc<dyn preview_render::Downloader> = Arc::new(DefaultDownloader::new(
        config.downloader.base_path.clone(),
        config.downloader.local_storage_root.clone(),
        registry.clone(),
        tram_hosts,
    ));
    let uploader = build_uploader(&config)?;

    let manager = RenderAgentManager::new(
        generated_assets.clone(),
        source_assets.clone(),
        templates.clone(),
        config.common.node_id.clone(),
    );

    if config.image_magick_render_agent.enabled {
        register_image_agents(
            &manager,
            &config,
            &source_assets,
            &generated_assets,
            &templates,
            &downloader,
            &uploader,
            &registry,
        );
    }

    if config.document_render_agent.enabled {
        register_document_agents(
            &manager,
            &config,
            &source_assets,
            &generated_assets,
            &templates,
            &downloader,
            &uploader,
            &registry,
        )
        .await?;
    }

    manager.spawn_dispatcher();

    if let Some(path) = &args.submit {
        submit_file(&manager, path, &args.submit_type, &config.common.node_id).await?;
    }

    info!("preview-daemon ready, waiting for shutdown signal");
    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    info!("shutdown signal received, draining render agents");
    manager.shutdown().await;

    Ok(())
}

type Repositories = (
    Arc<dyn SourceAssetRepository>,
    Arc<dyn GeneratedAssetRepository>,
    Arc<dyn TemplateRepository>,
);

async fn open_storage(config: &AppConfig) -> Result<Repositories> {
    match config.storage.backend {
        StorageBackend::Memory => {
            let templates: Arc<dyn TemplateRepository> = Arc::new(InMemoryTemplateRepository::default());
            let source_assets: Arc<dyn SourceAssetRepository> = Arc::new(InMemorySourceAssetRepository::default());
            let generated_assets: Arc<dyn GeneratedAssetRepository> =
                Arc::new(InMemoryGeneratedAssetRepository::new(templates.clone()));
            Ok((source_assets, generated_assets, templates))
        }
        StorageBackend::Sled => {
            let path = config
                .storage
                .sled_path
                .clone()
                .unwrap_or_else(|| config.common.base_path.join("sled"));
            let storage = Arc::new(
                SledStorage::open(&path).with_context(|| format!("failed to open sled storage at {}", path.display()))?,
            );
            let source_assets: Arc<dyn SourceAssetRepository> = storage.clone();
            let generated_assets: Arc<dyn GeneratedAssetRepository> = storage.clone();
            let templates: Arc<dyn TemplateRepository> = storage;
            Ok((source_assets, generated_assets, templates))
        }
    }
}

fn build_uploader(config: &AppConfig) -> Result<Arc<dyn Uploader>> {
    if !config.uploader.s3_endpoints.is_empty() {
        let uploader = ObjectStoreUploader::new(&config.uploader.s3_buckets, &config.uploader.s3_endpoints)
            .context("object store uploader requires at least one endpoint")?;
        return Ok(Arc::new(uploader));
    }
    Ok(Arc::new(LocalUploader::new(config.uploader.local_asset_root.clone())))
}

#[allow(clippy::too_many_arguments)]
fn register_image_agents(
    manager: &Arc<RenderAgentManager>,
    config: &AppConfig,
    source_assets: &Arc<dyn SourceAssetRepository>,
    generated_assets: &Arc<dyn GeneratedAssetRepository>,
    templates: &Arc<dyn TemplateRepository>,
    downloader: &Arc<dyn preview_render::Downloader>,
    uploader: &Arc<dyn Uploader>,
    registry: &TemporaryFileRegistry,
) {
    let agent_config = &config.image_magick_render_agent;
    if !preview_render::tool_on_path("convert") {
        warn!("`convert` not found on PATH; image render agents will fail until ImageMagick is installed");
    }

    for _ in 0..agent_config.count {
        let agent = Arc::new(ImageRenderAgent::new(
            source_assets.clone(),
            generated_assets.clone(),
            templates.clone(),
            downloader.clone(),
            uploader.clone(),
            registry.clone(),
            Some(Duration::from_secs(agent_config.timeout_secs)),
        ));
        manager.add_agent(RendererKind::Image, agent, agent_config.max_work_increase);
    }
    info!(count = agent_config.count, "registered image render agents");
}

#[allow(clippy::too_many_arguments)]
async fn register_document_agents(
    manager: &Arc<RenderAgentManager>,
    config: &AppConfig,
    source_assets: &Arc<dyn SourceAssetRepository>,
    generated_assets: &Arc<dyn GeneratedAssetRepository>,
    templates: &Arc<dyn TemplateRepository>,
    downloader: &Arc<dyn preview_render::Downloader>,
    uploader: &Arc<dyn Uploader>,
    registry: &TemporaryFileRegistry,
) -> Result<()> {
    let agent_config = &config.document_render_agent;
    let soffice_path = if agent_config.tool_path.is_empty() { "soffice".to_string() } else { agent_config.tool_path.clone() };
    if !tool_resolvable(&soffice_path) {
        warn!(tool = %soffice_path, "soffice not found on PATH; document render agents will fail until LibreOffice is installed");
    }

    let conversion_base = config.common.base_path.join("document-conversions");
    tokio::fs::create_dir_all(&conversion_base)
        .await
        .with_context(|| format!("failed to create document conversion directory {}", conversion_base.display()))?;

    for _ in 0..agent_config.count {
        let agent = Arc::new(DocumentRenderAgent::new(
            source_assets.clone(),
            generated_assets.clone(),
            templates.clone(),
            downloader.clone(),
            uploader.clone(),
            registry.clone(),
            Arc::clone(manager) as Arc<dyn preview_render::DerivedWorkSink>,
            soffice_path.clone(),
            conversion_base.clone(),
            Some(Duration::from_secs(agent_config.timeout_secs)),
        ));
        manager.add_agent(RendererKind::Document, agent, agent_config.max_work_increase);
    }
    info!(count = agent_config.count, "registered document render agents");
    Ok(())
}

fn tool_resolvable(tool: &str) -> bool {
    let path = PathBuf::from(tool);
    if path.is_absolute() {
        return path.is_file();
    }
    preview_render::tool_on_path(tool)
}

/// Enqueue `path` as an `origin` `SourceAsset` with one `GeneratedAsset` per
/// default raster template, mirroring what an HTTP ingest route would do on
/// receiving a new upload (spec §4.7 `CreateWork`).
async fn submit_file(manager: &Arc<RenderAgentManager>, path: &std::path::Path, file_type: &str, node_id: &str) -> Result<()> {
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("failed to stat submitted file {}", path.display()))?;
    let now = now_nanos();
    let source_id = new_time_ordered_id();

    let mut source = SourceAsset::new(source_id.clone(), SourceAssetKind::origin(), node_id, now);
    source.add_attribute(source_asset_attribute::SIZE, vec![metadata.len().to_string()]);
    source.add_attribute(source_asset_attribute::TYPE, vec![file_type.to_string()]);
    source.add_attribute(
        source_asset_attribute::SOURCE,
        vec![format!("file://{}", path.display())],
    );

    let generated = default_raster_template_ids()
        .into_iter()
        .map(|template_id| {
            let location = format!("local:///{source_id}/{template_id}");
            preview_core::GeneratedAsset::new(new_time_ordered_id(), source_id.clone(), SourceAssetKind::ORIGIN, template_id, location, node_id, now)
        })
        .collect();

    info!(source_id, path = %path.display(), "submitted file for rendering");
    manager.create_work(source, generated).await;
    Ok(())
}
