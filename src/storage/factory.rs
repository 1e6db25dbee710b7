use std::sync::Arc;

use super::config::StorageConfig;
use super::error::StorageResult;
use super::object_store::ObjectStoreProvider;
use super::provider::StorageProvider;

/// Factory for creating storage providers
pub struct StorageProviderFactory;

impl StorageProviderFactory {
    /// Create a storage provider from a configuration.
    ///
    /// Every backend (local, memory, AWS S3, Azure, GCS) is served by the
    /// object_store based [`ObjectStoreProvider`].
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// * Required configuration options are missing
    /// * The storage provider cannot be initialized
    pub async fn from_config(config: StorageConfig) -> StorageResult<Arc<dyn StorageProvider>> {
        let provider = ObjectStoreProvider::new(config).await?;
        Ok(Arc::new(provider))
    }
}
