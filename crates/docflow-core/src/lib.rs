//! # Docflow Core
//!
//! Domain types and pure decision logic for the document-intake pipeline:
//! - strongly-typed document, audit, and review records
//! - the extraction payload variants and their JSON schema text
//! - the strict JSON normalizer applied to every model output
//! - the per-document-type business rule validator
//! - capability traits for the relational document store and the object store
//!
//! This crate performs no I/O. Side-effectful implementations live in
//! `docflow-stores` (in-memory / local disk) and `docflow-stores-backends`
//! (Postgres); the activity layer that drives them lives in `docflow-engine`.

pub mod io;
pub mod normalizer;
pub mod rules;
pub mod store;
pub mod types;
