//! BlobStore implementations: in-memory and local disk.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

use docflow_core::io::{object_key, BlobError, BlobStore};
use docflow_core::types::DocumentId;

/// In-memory object store for tests and development.
#[derive(Default)]
pub struct InMemoryBlobStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_count(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects
            .read()
            .map(|o| o.contains_key(key))
            .unwrap_or(false)
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put_document(
        &self,
        document_id: &DocumentId,
        filename: &str,
        content: &[u8],
    ) -> Result<String, BlobError> {
        let key = object_key(document_id, filename);
        let mut objects = self
            .objects
            .write()
            .map_err(|e| BlobError::Internal(e.to_string()))?;
        objects.insert(key.clone(), content.to_vec());
        Ok(key)
    }

    async fn get_document(&self, object_key: &str) -> Result<Vec<u8>, BlobError> {
        let objects = self
            .objects
            .read()
            .map_err(|e| BlobError::Internal(e.to_string()))?;
        objects
            .get(object_key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(object_key.to_string()))
    }
}

/// Local-disk object store. Object keys map to `<root>/<document_id>/<filename>`.
pub struct LocalDirBlobStore {
    root: PathBuf,
}

impl LocalDirBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, BlobError> {
        let relative = Path::new(key);
        // keys are always relative and must not climb out of the root
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(BlobError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStore for LocalDirBlobStore {
    async fn put_document(
        &self,
        document_id: &DocumentId,
        filename: &str,
        content: &[u8],
    ) -> Result<String, BlobError> {
        let key = object_key(document_id, filename);
        let path = self.resolve(&key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        Ok(key)
    }

    async fn get_document(&self, object_key: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.resolve(object_key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(object_key.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }
}
