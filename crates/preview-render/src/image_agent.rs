use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use preview_core::{generated_asset_attribute, now_nanos, ErrorCode, GeneratedAssetStatus, RendererKind};
use preview_storage::{GeneratedAssetRepository, SourceAssetRepository, TemplateRepository};
use tokio::process::Command;
use tracing::{error, info};

use crate::downloader::Downloader;
use crate::process::run_with_timeout;
use crate::status::{RenderStatus, WorkChannelReceiver};
use crate::tempfile_registry::TemporaryFileRegistry;
use crate::uploader::Uploader;

/// `convert` invocations should not hang the worker forever; on elapse the
/// child is killed and the outcome mapped to `failed:CouldNotResizeImage`
/// (spec §5 per-kind external-process timeout).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Implements the image render agent's 13-step state machine verbatim from
/// `original_source/render/imagemagick.go`: load, mark processing, resolve
/// source/template, download, resize via the external `convert` tool,
/// upload, decode dimensions, mark complete.
pub struct ImageRenderAgent {
    source_assets: Arc<dyn SourceAssetRepository>,
    generated_assets: Arc<dyn GeneratedAssetRepository>,
    templates: Arc<dyn TemplateRepository>,
    downloader: Arc<dyn Downloader>,
    uploader: Arc<dyn Uploader>,
    registry: TemporaryFileRegistry,
    timeout: Duration,
}

impl ImageRenderAgent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_assets: Arc<dyn SourceAssetRepository>,
        generated_assets: Arc<dyn GeneratedAssetRepository>,
        templates: Arc<dyn TemplateRepository>,
        downloader: Arc<dyn Downloader>,
        uploader: Arc<dyn Uploader>,
        registry: TemporaryFileRegistry,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            source_assets,
            generated_assets,
            templates,
            downloader,
            uploader,
            registry,
            timeout: timeout.unwrap_or(DEFAULT_TIMEOUT),
        }
    }

    /// Runs the agent's work loop until `work` closes. Each dispatched id is
    /// rendered to completion before the next is taken, matching the
    /// original's single-goroutine-per-agent model.
    pub async fn run(self: Arc<Self>, mut work: WorkChannelReceiver, status: tokio::sync::mpsc::Sender<RenderStatus>) {
        while let Some(id) = work.recv().await {
            info!(id, "received dispatch message");
            self.render(&id, &status).await;
        }
    }

    async fn render(&self, id: &str, status: &tokio::sync::mpsc::Sender<RenderStatus>) {
        let Ok(Some(mut generated_asset)) = self.generated_assets.find_by_id(id).await else {
            error!(id, "no generated asset with that id can be retrieved from storage");
            return;
        };

        generated_asset.status = GeneratedAssetStatus::Processing;
        if self.generated_assets.update(generated_asset.clone()).await.is_err() {
            error!(id, "failed to mark generated asset as processing");
        }

        let terminal = self.render_inner(&generated_asset).await;
        self.commit(generated_asset, terminal, status).await;
    }

    async fn render_inner(
        &self,
        generated_asset: &preview_core::GeneratedAsset,
    ) -> Result<Vec<(String, String)>, ErrorCode> {
        let source_assets = self
            .source_assets
            .find_by_source_asset_id(&generated_asset.source_asset_id)
            .await
            .map_err(|_| ErrorCode::UnableToFindSourceAssetsById)?;
        let source_asset = source_assets
            .into_iter()
            .find(|a| a.kind.as_str() == generated_asset.source_asset_type)
            .ok_or(ErrorCode::NoSourceAssetsFoundForId)?;

        let file_type = source_asset
            .file_type()
            .ok_or(ErrorCode::CouldNotDetermineFileType)?
            .to_string();

        let templates = self
            .templates
            .find_by_ids(std::slice::from_ref(&generated_asset.template_id))
            .await
            .map_err(|_| ErrorCode::UnableToFindTemplatesById)?;
        let template = templates.into_iter().next().ok_or(ErrorCode::NoTemplatesFoundForId)?;

        let size: u32 = template
            .height()
            .ok_or(ErrorCode::CouldNotDetermineRenderSize)?
            .parse()
            .map_err(|_| ErrorCode::CouldNotDetermineRenderSize)?;

        let source_file = self
            .try_download(source_asset.source_urls(), &source_asset.id)
            .await
            .ok_or(ErrorCode::NoDownloadUrlsWork)?;

        let destination = PathBuf::from(format!("{}-{}.jpg", source_file.path().display(), template.id));
        let destination_handle = self.registry.create(destination.clone());

        let page = generated_asset.page();
        let result = match file_type.as_str() {
            "pdf" => self.render_pdf_page(source_file.path(), &destination, size, page).await,
            "gif" => self.render_gif_frame(source_file.path(), &destination, size).await,
            _ => self.resize(source_file.path(), &destination, size).await,
        };
        source_file.release();
        if result.is_err() {
            destination_handle.release();
            return Err(ErrorCode::CouldNotResizeImage);
        }

        self.uploader
            .upload(&generated_asset.location, &destination)
            .await
            .map_err(|_| ErrorCode::CouldNotUploadAsset)?;

        let (width, height) = decode_bounds(&destination).map_err(|_| ErrorCode::CouldNotDetermineRenderSize)?;
        let file_size = tokio::fs::metadata(&destination)
            .await
            .map_err(|_| ErrorCode::CouldNotDetermineFileSize)?
            .len();

        destination_handle.release();

        Ok(vec![
            (generated_asset_attribute::IMAGE_HEIGHT.to_string(), height.to_string()),
            (generated_asset_attribute::IMAGE_WIDTH.to_string(), width.to_string()),
            (generated_asset_attribute::FILE_SIZE.to_string(), file_size.to_string()),
        ])
    }

    async fn try_download(
        &self,
        urls: &[String],
        source_key: &str,
    ) -> Option<crate::tempfile_registry::TemporaryFile> {
        for url in urls {
            if let Ok(file) = self.downloader.download(url, source_key).await {
                return Some(file);
            }
        }
        None
    }

    async fn resize(&self, source: &std::path::Path, destination: &std::path::Path, size: u32) -> crate::error::Result<()> {
        let mut command = Command::new("convert");
        command.arg(source).arg("-resize").arg(size.to_string()).arg(destination);
        run_with_timeout(command, self.timeout, "convert").await
    }

    async fn render_pdf_page(
        &self,
        source: &std::path::Path,
        destination: &std::path::Path,
        size: u32,
        page: u32,
    ) -> crate::error::Result<()> {
        let mut command = Command::new("convert");
        command
            .arg("-colorspace")
            .arg("RGB")
            .arg(format!("{}[{page}]", source.display()))
            .arg("-resize")
            .arg(size.to_string())
            .arg("+adjoin")
            .arg(destination);
        run_with_timeout(command, self.timeout, "convert").await
    }

    async fn render_gif_frame(&self, source: &std::path::Path, destination: &std::path::Path, size: u32) -> crate::error::Result<()> {
        let mut command = Command::new("convert");
        command
            .arg(format!("{}[0]", source.display()))
            .arg("-resize")
            .arg(size.to_string())
            .arg(destination);
        run_with_timeout(command, self.timeout, "convert").await
    }

    async fn commit(
        &self,
        mut generated_asset: preview_core::GeneratedAsset,
        outcome: Result<Vec<(String, String)>, ErrorCode>,
        status: &tokio::sync::mpsc::Sender<RenderStatus>,
    ) {
        let final_status = match outcome {
            Ok(attributes) => {
                for (key, value) in attributes {
                    generated_asset.add_attribute(key, vec![value]);
                }
                GeneratedAssetStatus::Complete
            }
            Err(code) => GeneratedAssetStatus::Failed(code),
        };

        generated_asset.status = final_status;
        generated_asset.updated_at = now_nanos();
        if let Err(err) = self.generated_assets.update(generated_asset.clone()).await {
            error!(id = %generated_asset.id, %err, "failed to commit terminal status");
        }

        let _ = status
            .send(RenderStatus {
                generated_asset_id: generated_asset.id,
                status: final_status,
                renderer: RendererKind::Image,
            })
            .await;
    }
}

fn decode_bounds(path: &std::path::Path) -> image::ImageResult<(u32, u32)> {
    let image = image::open(path)?;
    Ok((image.width(), image.height()))
}
