//! Postgres implementation of the document store.
//!
//! All SQL is runtime-checked (`sqlx::query`, not the compile-time macros) so
//! builds do not require a live database. Conditional upserts preserve
//! populated fields; `queue_review` commits the review item and the document
//! status in one transaction.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::str::FromStr;

use docflow_core::store::{DocumentStore, StoreError};
use docflow_core::types::{
    AttemptPhase, AuditState, DocType, DocumentId, DocumentRecord, DocumentStatus,
    ReviewQueueItem, ReviewQueueStatus,
};

/// Postgres-backed document store.
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    /// Connect and return a store. Does not run migrations; call
    /// [`crate::run_migrations`] separately at startup.
    pub async fn connect(dsn: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(dsn)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn internal(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => StoreError::Connection(err.to_string()),
        other => StoreError::Internal(other.to_string()),
    }
}

fn parse_field<T: FromStr<Err = String>>(value: &str) -> Result<T, StoreError> {
    value.parse().map_err(StoreError::Serialization)
}

// Canonical payload bytes are JSON already; rebinding them as jsonb keeps the
// parameter type unambiguous for Postgres.
fn payload_json(payload: &[u8]) -> Result<Value, StoreError> {
    serde_json::from_slice(payload).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<DocumentRecord, StoreError> {
    let doc_type: String = row.try_get("doc_type").map_err(internal)?;
    let status: String = row.try_get("status").map_err(internal)?;
    let current_json: Option<String> = row.try_get("current_json").map_err(internal)?;
    let final_json: Option<String> = row.try_get("final_json").map_err(internal)?;

    Ok(DocumentRecord {
        id: DocumentId::new(row.try_get::<String, _>("id").map_err(internal)?),
        filename: row.try_get("filename").map_err(internal)?,
        object_key: row
            .try_get::<Option<String>, _>("object_key")
            .map_err(internal)?
            .unwrap_or_default(),
        raw_text: row
            .try_get::<Option<String>, _>("raw_text")
            .map_err(internal)?
            .unwrap_or_default(),
        doc_type: parse_field::<DocType>(&doc_type)?,
        status: parse_field::<DocumentStatus>(&status)?,
        current_json: current_json.map(String::into_bytes),
        final_json: final_json.map(String::into_bytes),
        confidence: row
            .try_get::<Option<f64>, _>("confidence")
            .map_err(internal)?
            .unwrap_or(0.0),
        rejected_reason: row.try_get("rejected_reason").map_err(internal)?,
        created_at: row.try_get("created_at").map_err(internal)?,
        updated_at: row.try_get("updated_at").map_err(internal)?,
    })
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn create_received(
        &self,
        document_id: &DocumentId,
        filename: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, filename, status, doc_type)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(document_id.as_str())
        .bind(filename)
        .bind(DocumentStatus::Received.as_str())
        .bind(DocType::Unknown.as_str())
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn set_object_key(
        &self,
        document_id: &DocumentId,
        object_key: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE documents
            SET object_key = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(document_id.as_str())
        .bind(object_key)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn upsert_document(&self, record: DocumentRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, filename, object_key, raw_text, doc_type, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                filename = EXCLUDED.filename,
                object_key = CASE
                    WHEN documents.object_key IS NULL OR documents.object_key = ''
                    THEN EXCLUDED.object_key ELSE documents.object_key END,
                raw_text = CASE
                    WHEN documents.raw_text IS NULL OR documents.raw_text = ''
                    THEN EXCLUDED.raw_text ELSE documents.raw_text END,
                doc_type = CASE
                    WHEN documents.doc_type = $7
                    THEN EXCLUDED.doc_type ELSE documents.doc_type END,
                status = EXCLUDED.status,
                updated_at = NOW()
            "#,
        )
        .bind(record.id.as_str())
        .bind(&record.filename)
        .bind(&record.object_key)
        .bind(&record.raw_text)
        .bind(record.doc_type.as_str())
        .bind(record.status.as_str())
        .bind(DocType::Unknown.as_str())
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn get_document(
        &self,
        document_id: &DocumentId,
    ) -> Result<Option<DocumentRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, filename, object_key, raw_text, doc_type, status,
                   current_json::text AS current_json,
                   final_json::text AS final_json,
                   confidence, rejected_reason, created_at, updated_at
            FROM documents
            WHERE id = $1
            "#,
        )
        .bind(document_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn update_classification(
        &self,
        document_id: &DocumentId,
        doc_type: DocType,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE documents
            SET doc_type = $2, status = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(document_id.as_str())
        .bind(doc_type.as_str())
        .bind(DocumentStatus::Classified.as_str())
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn insert_audit(
        &self,
        document_id: &DocumentId,
        state: AuditState,
        detail: Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (document_id, state, detail)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(document_id.as_str())
        .bind(state.as_str())
        .bind(detail)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn save_model_output(
        &self,
        document_id: &DocumentId,
        phase: AttemptPhase,
        output: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO extraction_attempts (document_id, phase, output)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(document_id.as_str())
        .bind(phase.as_str())
        .bind(output)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn save_current_extraction(
        &self,
        document_id: &DocumentId,
        payload: &[u8],
        confidence: f64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE documents
            SET current_json = $2,
                confidence = $3,
                status = $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(document_id.as_str())
        .bind(payload_json(payload)?)
        .bind(confidence)
        .bind(DocumentStatus::Extracted.as_str())
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn current_extraction(
        &self,
        document_id: &DocumentId,
    ) -> Result<Option<(Vec<u8>, f64)>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT current_json::text AS current_json, COALESCE(confidence, 0) AS confidence
            FROM documents
            WHERE id = $1
            "#,
        )
        .bind(document_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(internal)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let payload: Option<String> = row.try_get("current_json").map_err(internal)?;
        let confidence: f64 = row.try_get("confidence").map_err(internal)?;
        Ok(payload
            .filter(|p| !p.is_empty())
            .map(|p| (p.into_bytes(), confidence)))
    }

    async fn queue_review(
        &self,
        document_id: &DocumentId,
        failed_rules: &[String],
        current_json: &[u8],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(internal)?;

        sqlx::query(
            r#"
            INSERT INTO review_queue (document_id, failed_rules, current_json, status)
            VALUES ($1, $2, $3, 'PENDING')
            ON CONFLICT (document_id) DO UPDATE SET
                failed_rules = EXCLUDED.failed_rules,
                current_json = EXCLUDED.current_json,
                status = 'PENDING',
                updated_at = NOW()
            "#,
        )
        .bind(document_id.as_str())
        .bind(failed_rules)
        .bind(payload_json(current_json)?)
        .execute(&mut *tx)
        .await
        .map_err(internal)?;

        sqlx::query(
            r#"
            UPDATE documents
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(document_id.as_str())
        .bind(DocumentStatus::NeedsReview.as_str())
        .execute(&mut *tx)
        .await
        .map_err(internal)?;

        tx.commit().await.map_err(internal)
    }

    async fn resolve_review(
        &self,
        document_id: &DocumentId,
        decision: ReviewQueueStatus,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE review_queue
            SET status = $2, updated_at = NOW()
            WHERE document_id = $1
            "#,
        )
        .bind(document_id.as_str())
        .bind(decision.as_str())
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn save_final_result(
        &self,
        document_id: &DocumentId,
        payload: Option<&[u8]>,
        confidence: f64,
        status: DocumentStatus,
        rejected_reason: Option<&str>,
    ) -> Result<(), StoreError> {
        let payload = payload.map(payload_json).transpose()?;
        sqlx::query(
            r#"
            UPDATE documents
            SET final_json = CASE WHEN $2 IS NULL THEN final_json ELSE $2 END,
                confidence = $3,
                status = $4,
                rejected_reason = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(document_id.as_str())
        .bind(payload)
        .bind(confidence)
        .bind(status.as_str())
        .bind(rejected_reason)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn document_status(
        &self,
        document_id: &DocumentId,
    ) -> Result<Option<(DocumentStatus, DocType)>, StoreError> {
        let row = sqlx::query(r#"SELECT status, doc_type FROM documents WHERE id = $1"#)
            .bind(document_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let status: String = row.try_get("status").map_err(internal)?;
        let doc_type: String = row.try_get("doc_type").map_err(internal)?;
        Ok(Some((
            parse_field::<DocumentStatus>(&status)?,
            parse_field::<DocType>(&doc_type)?,
        )))
    }

    async fn list_pending_reviews(&self) -> Result<Vec<ReviewQueueItem>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT document_id, failed_rules, current_json::text AS current_json, status
            FROM review_queue
            WHERE status = 'PENDING'
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let status: String = row.try_get("status").map_err(internal)?;
            let current_json: Option<String> = row.try_get("current_json").map_err(internal)?;
            items.push(ReviewQueueItem {
                document_id: DocumentId::new(
                    row.try_get::<String, _>("document_id").map_err(internal)?,
                ),
                failed_rules: row.try_get("failed_rules").map_err(internal)?,
                current_json: current_json.unwrap_or_default().into_bytes(),
                status: parse_field::<ReviewQueueStatus>(&status)?,
            });
        }
        Ok(items)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(())
    }
}
