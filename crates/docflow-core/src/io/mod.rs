//! Object storage abstraction.
//!
//! Storage-neutral contract: callers address documents by
//! `document_id/filename` object keys and never see backend details.
//! Read-after-write consistency is assumed of implementations.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::DocumentId;

/// Storage-neutral blob errors.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for BlobError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

/// Canonical object key layout.
pub fn object_key(document_id: &DocumentId, filename: &str) -> String {
    format!("{}/{}", document_id, filename)
}

/// The object store capability.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store document bytes under `document_id/filename`; returns the object
    /// key. Overwriting the same key with the same bytes is a safe replay.
    async fn put_document(
        &self,
        document_id: &DocumentId,
        filename: &str,
        content: &[u8],
    ) -> Result<String, BlobError>;

    async fn get_document(&self, object_key: &str) -> Result<Vec<u8>, BlobError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_layout() {
        let id = DocumentId::new("abc-123");
        assert_eq!(object_key(&id, "payslip.txt"), "abc-123/payslip.txt");
    }
}
