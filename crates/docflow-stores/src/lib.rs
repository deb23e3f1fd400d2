//! # Docflow Stores
//!
//! In-memory `DocumentStore`/`BlobStore` implementations for development and
//! testing, plus a local-disk blob store. Production Postgres backends live in
//! the `docflow-stores-backends` plugin.

mod blob_store;
mod document_store;

pub use blob_store::{InMemoryBlobStore, LocalDirBlobStore};
pub use document_store::InMemoryDocumentStore;

pub use docflow_core::io::{BlobError, BlobStore};
pub use docflow_core::store::{DocumentStore, StoreError};
