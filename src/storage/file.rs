//! Filesystem image storage

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::storage::{base64, ImageStorage};

/// Stores images as files under a base directory and hands out URLs under
/// a public prefix
pub struct FileImageStorage {
    storage_path: PathBuf,
    url_prefix: String,
}

impl FileImageStorage {
    pub fn new(storage_path: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        Self {
            storage_path: storage_path.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    /// Ensure the storage directory exists
    pub async fn ensure_storage_dir(&self) -> Result<()> {
        if !fs::try_exists(&self.storage_path).await? {
            fs::create_dir_all(&self.storage_path).await?;
            debug!(path = ?self.storage_path, "Created storage directory");
        }
        Ok(())
    }

    /// Full path for a stored filename
    pub fn get_path(&self, filename: &str) -> PathBuf {
        self.storage_path.join(filename)
    }
}

#[async_trait]
impl ImageStorage for FileImageStorage {
    async fn put(&self, data: &[u8], content_type: &str) -> Result<String> {
        self.ensure_storage_dir().await?;

        let content_type = base64::sniff_content_type(data).unwrap_or(content_type);
        let filename = format!("{}.{}", Uuid::new_v4(), base64::extension_for(content_type));
        let file_path = self.storage_path.join(&filename);

        fs::write(&file_path, data).await?;

        debug!(path = ?file_path, size = data.len(), "Saved image file");

        Ok(format!("{}/{}", self.url_prefix, filename))
    }
}
