use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;

/// Durable object storage for rendered videos
///
/// The bucket is append-only from this system's perspective; object names
/// are timestamp-prefixed so concurrent uploads never collide.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload an object
    async fn put(
        &self,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
        cache_control: &str,
    ) -> Result<()>;

    /// Mark an object publicly readable
    async fn make_public(&self, name: &str) -> Result<()>;

    /// Public URL for an uploaded object
    fn public_url(&self, name: &str) -> String;
}

/// Cloud bucket store speaking the JSON object API
pub struct GcsStore {
    client: reqwest::Client,
    config: StorageConfig,
}

impl GcsStore {
    pub fn new(config: StorageConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.upload_timeout))
            .build()?;
        Ok(Self { client, config })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn api_base(&self) -> &str {
        self.config.api_base.trim_end_matches('/')
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn put(
        &self,
        name: &str,
        bytes: Vec<u8>,
        content_type: &str,
        cache_control: &str,
    ) -> Result<()> {
        let upload_url = format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.api_base(),
            self.config.bucket,
            name
        );

        info!("☁️  Uploading {} ({} bytes)", name, bytes.len());

        let response = self
            .authorize(self.client.post(&upload_url))
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await
            .context("Storage upload request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Storage upload error {}: {}", status, text));
        }

        // Cache metadata is cosmetic; a failure here never fails the upload
        let metadata_url = format!(
            "{}/storage/v1/b/{}/o/{}",
            self.api_base(),
            self.config.bucket,
            name
        );
        let patch = self
            .authorize(self.client.patch(&metadata_url))
            .json(&serde_json::json!({ "cacheControl": cache_control }))
            .send()
            .await;
        match patch {
            Ok(response) if response.status().is_success() => {
                debug!("Set cacheControl on {}", name)
            }
            Ok(response) => warn!(
                "Failed to set cacheControl on {}: {}",
                name,
                response.status()
            ),
            Err(e) => warn!("Failed to set cacheControl on {}: {}", name, e),
        }

        Ok(())
    }

    async fn make_public(&self, name: &str) -> Result<()> {
        let acl_url = format!(
            "{}/storage/v1/b/{}/o/{}/acl",
            self.api_base(),
            self.config.bucket,
            name
        );

        let response = self
            .authorize(self.client.post(&acl_url))
            .json(&serde_json::json!({ "entity": "allUsers", "role": "READER" }))
            .send()
            .await
            .context("Storage ACL request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Storage ACL error {}: {}", status, text));
        }

        Ok(())
    }

    fn public_url(&self, name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.public_base.trim_end_matches('/'),
            self.config.bucket,
            name
        )
    }
}

/// Filesystem-backed store for local runs and tests
pub struct FsStore {
    root: PathBuf,
    public_base: String,
}

impl FsStore {
    pub fn new(root: PathBuf, public_base: impl Into<String>) -> Self {
        Self {
            root,
            public_base: public_base.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for FsStore {
    async fn put(
        &self,
        name: &str,
        bytes: Vec<u8>,
        _content_type: &str,
        _cache_control: &str,
    ) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(name);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("💾 Stored {}", path.display());
        Ok(())
    }

    async fn make_public(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn public_url(&self, name: &str) -> String {
        format!("{}/{}", self.public_base.trim_end_matches('/'), name)
    }
}

/// Pick a store implementation from configuration
///
/// A configured local directory wins; otherwise the cloud bucket is used.
pub fn build_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    if let Some(local_dir) = &config.local_dir {
        info!("💾 Using filesystem store at {}", local_dir.display());
        return Ok(Arc::new(FsStore::new(
            local_dir.clone(),
            config.public_base.clone(),
        )));
    }

    Ok(Arc::new(GcsStore::new(config.clone())?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_fs_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::new(dir.path().join("videos"), "http://localhost/videos");

        store
            .put("123_clip.mp4", b"mp4 bytes".to_vec(), "video/mp4", "public")
            .await
            .unwrap();
        store.make_public("123_clip.mp4").await.unwrap();

        let written = std::fs::read(dir.path().join("videos/123_clip.mp4")).unwrap();
        assert_eq!(written, b"mp4 bytes");
        assert_eq!(
            store.public_url("123_clip.mp4"),
            "http://localhost/videos/123_clip.mp4"
        );
    }

    #[test]
    fn test_gcs_public_url() {
        let config = StorageConfig {
            bucket: "clipcast-videos".to_string(),
            ..StorageConfig::default()
        };
        let store = GcsStore::new(config).unwrap();
        assert_eq!(
            store.public_url("42_episode.mp4"),
            "https://storage.googleapis.com/clipcast-videos/42_episode.mp4"
        );
    }

    #[test]
    fn test_build_store_prefers_local_dir() {
        let config = StorageConfig {
            local_dir: Some(PathBuf::from("/tmp/clipcast-test")),
            ..StorageConfig::default()
        };
        assert!(build_store(&config).is_ok());
    }
}
