//! Postgres store backend implementation.

pub mod document_store;
pub mod migrations;

pub use document_store::PostgresDocumentStore;
pub use migrations::run_migrations;

pub use docflow_core::store::{DocumentStore, StoreError};
