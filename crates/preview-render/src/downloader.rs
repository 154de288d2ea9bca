use std::path::{Path, PathBuf};

use async_trait::async_trait;
use preview_core::{new_time_ordered_id, ErrorCode};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::hashring::HashRing;
use crate::tempfile_registry::{TemporaryFile, TemporaryFileRegistry};

/// Retrieves a remote or local file and hands back a registry-tracked
/// temporary file, grounded in `original_source/common/downloader.go`.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// `source_key` is the owning source asset id, used only to pick a tram
    /// host when the proxy fleet is enabled.
    async fn download(&self, url: &str, source_key: &str) -> Result<TemporaryFile, ErrorCode>;
}

pub struct DefaultDownloader {
    base_path: PathBuf,
    local_storage_root: PathBuf,
    registry: TemporaryFileRegistry,
    tram_ring: Option<HashRing>,
    client: reqwest::Client,
}

impl DefaultDownloader {
    pub fn new(
        base_path: impl Into<PathBuf>,
        local_storage_root: impl Into<PathBuf>,
        registry: TemporaryFileRegistry,
        tram_hosts: &[String],
    ) -> Self {
        Self {
            base_path: base_path.into(),
            local_storage_root: local_storage_root.into(),
            registry,
            tram_ring: HashRing::new(tram_hosts),
            client: reqwest::Client::new(),
        }
    }

    fn fresh_destination(&self) -> PathBuf {
        self.base_path.join(new_time_ordered_id())
    }

    async fn copy_into(&self, source: &Path, destination: &Path) -> std::io::Result<()> {
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match tokio::fs::hard_link(source, destination).await {
            Ok(()) => Ok(()),
            Err(_) => {
                tokio::fs::copy(source, destination).await?;
                Ok(())
            }
        }
    }

    fn tram_url(&self, url: &str, source_key: &str) -> String {
        match &self.tram_ring {
            Some(ring) => {
                let host = ring.hash(source_key);
                format!(
                    "http://{host}/?url={}&alias={}",
                    urlencoding::encode(url),
                    urlencoding::encode(source_key)
                )
            }
            None => url.to_string(),
        }
    }

    async fn handle_file(&self, url: &str) -> Result<TemporaryFile, ErrorCode> {
        let path = Path::new(&url[7..]);
        let destination = self.fresh_destination();
        self.copy_into(path, &destination)
            .await
            .map_err(|_| ErrorCode::UnknownError)?;
        debug!(?path, ?destination, "copied file:// source into registry");
        Ok(self.registry.create(destination))
    }

    async fn handle_local(&self, url: &str) -> Result<TemporaryFile, ErrorCode> {
        let path = self.local_storage_root.join(&url[8..]);
        let destination = self.fresh_destination();
        self.copy_into(&path, &destination)
            .await
            .map_err(|_| ErrorCode::UnknownError)?;
        debug!(?path, ?destination, "copied local:// source into registry");
        Ok(self.registry.create(destination))
    }

    async fn handle_http(&self, url: &str, source_key: &str) -> Result<TemporaryFile, ErrorCode> {
        let fetch_url = self.tram_url(url, source_key);
        let destination = self.fresh_destination();
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|_| ErrorCode::UnknownError)?;
        }

        let response = self
            .client
            .get(&fetch_url)
            .send()
            .await
            .map_err(|_| ErrorCode::UnknownError)?;
        let mut file = tokio::fs::File::create(&destination)
            .await
            .map_err(|_| ErrorCode::UnknownError)?;
        let bytes = response.bytes().await.map_err(|_| ErrorCode::UnknownError)?;
        file.write_all(&bytes).await.map_err(|_| ErrorCode::UnknownError)?;

        info!(bytes = bytes.len(), destination = %destination.display(), "downloaded http(s) source");
        Ok(self.registry.create(destination))
    }
}

#[async_trait]
impl Downloader for DefaultDownloader {
    async fn download(&self, url: &str, source_key: &str) -> Result<TemporaryFile, ErrorCode> {
        info!(url, "attempting to download");
        if let Some(stripped) = url.strip_prefix("file://") {
            let _ = stripped;
            self.handle_file(url).await
        } else if url.starts_with("local://") {
            self.handle_local(url).await
        } else if url.starts_with("http://") || url.starts_with("https://") {
            self.handle_http(url, source_key).await
        } else {
            Err(ErrorCode::NotImplemented)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_scheme_copies_into_a_fresh_path() {
        let source_dir = tempfile::tempdir().unwrap();
        let base_dir = tempfile::tempdir().unwrap();
        let source_path = source_dir.path().join("src.bin");
        tokio::fs::write(&source_path, b"hello").await.unwrap();

        let downloader = DefaultDownloader::new(
            base_dir.path(),
            base_dir.path(),
            TemporaryFileRegistry::new(),
            &[],
        );
        let url = format!("file://{}", source_path.display());
        let result = downloader.download(&url, "source-key").await.unwrap();

        assert_eq!(tokio::fs::read(result.path()).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn unknown_scheme_is_not_implemented() {
        let base_dir = tempfile::tempdir().unwrap();
        let downloader = DefaultDownloader::new(
            base_dir.path(),
            base_dir.path(),
            TemporaryFileRegistry::new(),
            &[],
        );
        let result = downloader.download("ftp://example.com/x", "k").await;
        assert_eq!(result.unwrap_err(), ErrorCode::NotImplemented);
    }
}
