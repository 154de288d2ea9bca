use std::path::{Path, PathBuf};

use async_trait::async_trait;
use preview_core::{ErrorCode, PlaceholderSize};
use tracing::info;

use crate::hashring::HashRing;

/// Persists a rendered file to its final destination and, separately,
/// computes the destination URL that a not-yet-rendered `GeneratedAsset`
/// should carry as `location`, grounded in
/// `original_source/common/uploader.go`.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, destination: &str, path: &Path) -> Result<(), ErrorCode>;

    /// The reverse mapping the dispatcher uses to pre-fill
    /// `GeneratedAsset.location` before the file has actually been rendered.
    fn url(&self, source_asset_id: &str, template_id: &str, placeholder_size: PlaceholderSize, page: u32) -> String;
}

/// `local://<rel>` destinations, copied under a shared asset root.
pub struct LocalUploader {
    asset_root: PathBuf,
}

impl LocalUploader {
    pub fn new(asset_root: impl Into<PathBuf>) -> Self {
        Self {
            asset_root: asset_root.into(),
        }
    }
}

#[async_trait]
impl Uploader for LocalUploader {
    async fn upload(&self, destination: &str, path: &Path) -> Result<(), ErrorCode> {
        let Some(rel) = destination.strip_prefix("local://") else {
            return Err(ErrorCode::UploaderDoesNotSupportUrl);
        };
        let target = self.asset_root.join(rel);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|_| ErrorCode::CouldNotUploadAsset)?;
        }
        tokio::fs::copy(path, &target)
            .await
            .map_err(|_| ErrorCode::CouldNotUploadAsset)?;
        info!(destination, target = %target.display(), "uploaded to local asset root");
        Ok(())
    }

    fn url(&self, source_asset_id: &str, _template_id: &str, placeholder_size: PlaceholderSize, page: u32) -> String {
        format!("local:///{source_asset_id}/{placeholder_size}/{page}")
    }
}

/// `s3://<bucket>/<key>` destinations, resolved via a bucket hash ring onto
/// one of a configured set of S3-compatible HTTP endpoints and `PUT` with
/// `reqwest`. No AWS SDK crate exists in the retrieved corpus; this models
/// object storage as a plain HTTP PUT rather than pulling in an unrelated
/// dependency.
pub struct ObjectStoreUploader {
    bucket_ring: Option<HashRing>,
    endpoint_ring: HashRing,
    client: reqwest::Client,
}

impl ObjectStoreUploader {
    pub fn new(buckets: &[String], endpoints: &[String]) -> Option<Self> {
        let endpoint_ring = HashRing::new(endpoints)?;
        Some(Self {
            bucket_ring: HashRing::new(buckets),
            endpoint_ring,
            client: reqwest::Client::new(),
        })
    }

    fn endpoint_for(&self, bucket: &str) -> &str {
        self.endpoint_ring.hash(bucket)
    }
}

#[async_trait]
impl Uploader for ObjectStoreUploader {
    async fn upload(&self, destination: &str, path: &Path) -> Result<(), ErrorCode> {
        let Some(rest) = destination.strip_prefix("s3://") else {
            return Err(ErrorCode::UploaderDoesNotSupportUrl);
        };
        let Some((bucket, key)) = rest.split_once('/') else {
            return Err(ErrorCode::UploaderDoesNotSupportUrl);
        };
        if self.bucket_ring.is_none() {
            return Err(ErrorCode::UploaderDoesNotSupportUrl);
        }

        let endpoint = self.endpoint_for(bucket);
        let payload = tokio::fs::read(path).await.map_err(|_| ErrorCode::CouldNotUploadAsset)?;
        let put_url = format!("http://{endpoint}/{bucket}/{key}");

        let response = self
            .client
            .put(&put_url)
            .header("content-type", "application/octet-stream")
            .body(payload)
            .send()
            .await
            .map_err(|_| ErrorCode::CouldNotUploadAsset)?;

        if !response.status().is_success() {
            return Err(ErrorCode::CouldNotUploadAsset);
        }
        info!(destination, put_url, "uploaded to object store endpoint");
        Ok(())
    }

    fn url(&self, source_asset_id: &str, _template_id: &str, placeholder_size: PlaceholderSize, page: u32) -> String {
        format!("s3://previews/{source_asset_id}/{placeholder_size}/{page}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_uploader_copies_into_asset_root() {
        let source_dir = tempfile::tempdir().unwrap();
        let asset_root = tempfile::tempdir().unwrap();
        let source_path = source_dir.path().join("rendered.jpg");
        tokio::fs::write(&source_path, b"jpeg-bytes").await.unwrap();

        let uploader = LocalUploader::new(asset_root.path());
        uploader.upload("local://images/a.jpg", &source_path).await.unwrap();

        let target = asset_root.path().join("images/a.jpg");
        assert_eq!(tokio::fs::read(target).await.unwrap(), b"jpeg-bytes");
    }

    #[tokio::test]
    async fn local_uploader_rejects_non_local_destination() {
        let asset_root = tempfile::tempdir().unwrap();
        let uploader = LocalUploader::new(asset_root.path());
        let result = uploader.upload("s3://bucket/key", Path::new("/dev/null")).await;
        assert_eq!(result.unwrap_err(), ErrorCode::UploaderDoesNotSupportUrl);
    }

    #[test]
    fn local_uploader_url_embeds_placeholder_size_and_page() {
        let uploader = LocalUploader::new("/tmp/assets");
        let url = uploader.url("source-1", "template-1", PlaceholderSize::Medium, 3);
        assert_eq!(url, "local:///source-1/medium/3");
    }

    #[test]
    fn object_store_uploader_needs_at_least_one_endpoint() {
        assert!(ObjectStoreUploader::new(&["bucket".into()], &[]).is_none());
    }
}
