//! Idempotent schema setup for the document store.

use sqlx::PgPool;

use docflow_core::store::StoreError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id              TEXT PRIMARY KEY,
    filename        TEXT NOT NULL,
    object_key      TEXT,
    raw_text        TEXT,
    doc_type        TEXT NOT NULL DEFAULT 'unknown',
    status          TEXT NOT NULL,
    current_json    JSONB,
    final_json      JSONB,
    confidence      DOUBLE PRECISION,
    rejected_reason TEXT,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_documents_status ON documents (status);
CREATE INDEX IF NOT EXISTS idx_documents_doc_type ON documents (doc_type);

CREATE TABLE IF NOT EXISTS extraction_attempts (
    id          BIGSERIAL PRIMARY KEY,
    document_id TEXT NOT NULL,
    phase       TEXT NOT NULL,
    output      TEXT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_extraction_attempts_document
    ON extraction_attempts (document_id, id);

CREATE TABLE IF NOT EXISTS audit_log (
    id          BIGSERIAL PRIMARY KEY,
    document_id TEXT NOT NULL,
    state       TEXT NOT NULL,
    detail      JSONB NOT NULL DEFAULT '{}'::jsonb,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_audit_log_document ON audit_log (document_id, id);

CREATE TABLE IF NOT EXISTS review_queue (
    document_id  TEXT PRIMARY KEY,
    failed_rules TEXT[] NOT NULL DEFAULT '{}',
    current_json JSONB,
    status       TEXT NOT NULL,
    created_at   TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at   TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#;

/// Apply the schema. Safe to run on every startup.
pub async fn run_migrations(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| StoreError::Internal(e.to_string()))?;
    Ok(())
}
