use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use preview_core::{
    default_raster_template_ids, new_time_ordered_id, now_nanos, source_asset_attribute,
    ErrorCode, GeneratedAsset, GeneratedAssetStatus, RendererKind, SourceAsset, SourceAssetKind,
};
use preview_storage::{GeneratedAssetRepository, SourceAssetRepository, TemplateRepository};
use regex::Regex;
use std::sync::LazyLock;
use tokio::process::Command;
use tracing::{error, info};

use crate::downloader::Downloader;
use crate::process::run_with_timeout;
use crate::status::{RenderStatus, WorkChannelReceiver};
use crate::tempfile_registry::TemporaryFileRegistry;
use crate::uploader::Uploader;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

static PDF_PAGE_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Pages:\s+(\d+)").expect("static pattern is valid"));

/// Hands newly created `GeneratedAsset`s back to the render-agent manager so
/// they re-enter the same admission path as ingress-created work, without
/// the document agent holding a concrete manager reference (DESIGN NOTES
/// "Cyclic references (agent ↔ manager)").
#[async_trait::async_trait]
pub trait DerivedWorkSink: Send + Sync {
    async fn create_derived_work(&self, source: SourceAsset, derived: Vec<GeneratedAsset>);
}

/// Implements the document render agent's 13-step flow from
/// `original_source/render/document.go`: convert to PDF via `soffice`,
/// count pages via `pdfinfo`, then fan out one `GeneratedAsset` per
/// page/raster-template pair.
pub struct DocumentRenderAgent {
    source_assets: Arc<dyn SourceAssetRepository>,
    generated_assets: Arc<dyn GeneratedAssetRepository>,
    templates: Arc<dyn TemplateRepository>,
    downloader: Arc<dyn Downloader>,
    uploader: Arc<dyn Uploader>,
    registry: TemporaryFileRegistry,
    derived_work: Arc<dyn DerivedWorkSink>,
    soffice_path: String,
    temp_base_path: PathBuf,
    timeout: Duration,
}

impl DocumentRenderAgent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_assets: Arc<dyn SourceAssetRepository>,
        generated_assets: Arc<dyn GeneratedAssetRepository>,
        templates: Arc<dyn TemplateRepository>,
        downloader: Arc<dyn Downloader>,
        uploader: Arc<dyn Uploader>,
        registry: TemporaryFileRegistry,
        derived_work: Arc<dyn DerivedWorkSink>,
        soffice_path: impl Into<String>,
        temp_base_path: impl Into<PathBuf>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            source_assets,
            generated_assets,
            templates,
            downloader,
            uploader,
            registry,
            derived_work,
            soffice_path: soffice_path.into(),
            temp_base_path: temp_base_path.into(),
            timeout: timeout.unwrap_or(DEFAULT_TIMEOUT),
        }
    }

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

        let outcome = self.render_inner(&generated_asset).await;
        self.commit(generated_asset, outcome, status).await;
    }

    async fn render_inner(&self, generated_asset: &GeneratedAsset) -> Result<(), ErrorCode> {
        let source_asset = self
            .source_assets
            .find_by_source_asset_id(&generated_asset.source_asset_id)
            .await
            .map_err(|_| ErrorCode::UnableToFindSourceAssetsById)?
            .into_iter()
            .find(|a| a.kind.as_str() == generated_asset.source_asset_type)
            .ok_or(ErrorCode::NoSourceAssetsFoundForId)?;

        let source_file = self
            .try_download(source_asset.source_urls(), &source_asset.id)
            .await
            .ok_or(ErrorCode::NoDownloadUrlsWork)?;

        let conversion_dir = self.temp_base_path.join(new_time_ordered_id());
        tokio::fs::create_dir_all(&conversion_dir)
            .await
            .map_err(|_| ErrorCode::NotImplemented)?;
        let conversion_dir_handle = self.registry.create(conversion_dir.clone());

        let convert_result = self.convert_to_pdf(source_file.path(), &conversion_dir).await;
        source_file.release();
        if convert_result.is_err() {
            conversion_dir_handle.release();
            return Err(ErrorCode::CouldNotResizeImage);
        }

        let rendered = list_pdfs(&conversion_dir).await.map_err(|_| ErrorCode::NotImplemented)?;
        let [pdf_path] = rendered.as_slice() else {
            conversion_dir_handle.release();
            return Err(ErrorCode::NotImplemented);
        };

        let pages = count_pdf_pages(pdf_path).await.map_err(|_| ErrorCode::NotImplemented)?;

        self.uploader
            .upload(&generated_asset.location, pdf_path)
            .await
            .map_err(|_| ErrorCode::CouldNotUploadAsset)?;

        let file_size = tokio::fs::metadata(pdf_path)
            .await
            .map_err(|_| ErrorCode::CouldNotDetermineFileSize)?
            .len();
        conversion_dir_handle.release();

        let now = now_nanos();
        let mut pdf_source_asset =
            SourceAsset::new(source_asset.id.clone(), SourceAssetKind::pdf(), "preview-render", now);
        pdf_source_asset.add_attribute(source_asset_attribute::SIZE, vec![file_size.to_string()]);
        pdf_source_asset.add_attribute(source_asset_attribute::PAGES, vec![pages.to_string()]);
        pdf_source_asset.add_attribute(
            source_asset_attribute::SOURCE,
            vec![generated_asset.location.clone()],
        );
        pdf_source_asset.add_attribute(source_asset_attribute::TYPE, vec!["pdf".to_string()]);

        let raster_templates = self
            .templates
            .find_by_ids(&default_raster_template_ids().map(String::from))
            .await
            .map_err(|_| ErrorCode::NotImplemented)?;

        let mut derived = Vec::new();
        for page in 0..pages {
            for template in &raster_templates {
                let placeholder_size = template.placeholder_size().ok_or(ErrorCode::NotImplemented)?;
                let location = self.uploader.url(&pdf_source_asset.id, &template.id, placeholder_size, page);
                let mut derived_asset = GeneratedAsset::new(
                    new_time_ordered_id(),
                    pdf_source_asset.id.clone(),
                    SourceAssetKind::PDF,
                    template.id.clone(),
                    location,
                    "preview-render",
                    now,
                );
                derived_asset.add_attribute(preview_core::generated_asset_attribute::PAGE, vec![page.to_string()]);
                derived.push(derived_asset);
            }
        }

        self.derived_work
            .create_derived_work(pdf_source_asset, derived)
            .await;

        Ok(())
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

    async fn convert_to_pdf(&self, source: &std::path::Path, outdir: &std::path::Path) -> crate::error::Result<()> {
        let mut command = Command::new(&self.soffice_path);
        command
            .arg("--headless")
            .arg("--nologo")
            .arg("--nofirststartwizard")
            .arg("--convert-to")
            .arg("pdf")
            .arg(source)
            .arg("--outdir")
            .arg(outdir);
        run_with_timeout(command, self.timeout, "soffice").await
    }

    async fn commit(&self, mut generated_asset: GeneratedAsset, outcome: Result<(), ErrorCode>, status: &tokio::sync::mpsc::Sender<RenderStatus>) {
        let final_status = match outcome {
            Ok(()) => GeneratedAssetStatus::Complete,
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
                renderer: RendererKind::Document,
            })
            .await;
    }
}

async fn list_pdfs(dir: &std::path::Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("pdf")) {
            paths.push(path);
        }
    }
    Ok(paths)
}

async fn count_pdf_pages(path: &std::path::Path) -> crate::error::Result<u32> {
    let mut command = Command::new("pdfinfo");
    command.arg(path);
    let output = command.output().await?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(PDF_PAGE_COUNT
        .captures(&stdout)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_count_regex_matches_pdfinfo_output() {
        let sample = "Title: report\nPages:          12\nPage size: 612 x 792 pts";
        let captures = PDF_PAGE_COUNT.captures(sample).unwrap();
        assert_eq!(&captures[1], "12");
    }
}
