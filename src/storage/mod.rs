//! Image storage collaborator: turns generated bytes into stable URLs

pub mod base64;
pub mod file;

use async_trait::async_trait;

use crate::error::Result;

/// Destination for generated image bytes. Implementations must be safe to
/// retry and return a URL that keeps resolving.
#[async_trait]
pub trait ImageStorage: Send + Sync {
    /// Store `data` and return its public URL
    async fn put(&self, data: &[u8], content_type: &str) -> Result<String>;
}
