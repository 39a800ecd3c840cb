//! Postgres-backed contract history store
//!
//! One table holds all three record variants, distinguished by the
//! record_type tag. The detail payload crosses the plain-structure
//! boundary (`ContractDetail::to_plain`) before it is bound to the insert;
//! a payload that cannot become plain JSON is a loud persistence error,
//! never a silently-missing record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sc_core::model::{ContractDetail, ContractRecord};
use sc_core::{ContractStore, PersistenceError, StoreCounts};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

pub struct PgContractStore {
    pool: PgPool,
}

impl PgContractStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RecordRow {
    id: Uuid,
    record_type: String,
    contract_name: String,
    original_code: String,
    success: bool,
    created_at: DateTime<Utc>,
    detail: serde_json::Value,
}

impl RecordRow {
    fn into_record(self) -> ContractRecord {
        ContractRecord {
            id: self.id,
            contract_name: self.contract_name,
            original_code: self.original_code,
            created_at: self.created_at,
            success: self.success,
            detail: ContractDetail::from_plain(&self.record_type, self.detail),
        }
    }
}

fn storage_error(e: sqlx::Error) -> PersistenceError {
    PersistenceError::Storage(e.to_string())
}

#[async_trait]
impl ContractStore for PgContractStore {
    async fn insert(&self, record: &ContractRecord) -> Result<(), PersistenceError> {
        let detail = record
            .detail
            .to_plain()
            .map_err(PersistenceError::Serialization)?;

        sqlx::query(
            "INSERT INTO contract_records (id, record_type, contract_name, original_code, success, created_at, detail) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(record.id)
        .bind(record.detail.type_tag())
        .bind(&record.contract_name)
        .bind(&record.original_code)
        .bind(record.success)
        .bind(record.created_at)
        .bind(&detail)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    async fn list(&self, skip: i64, limit: i64) -> Result<Vec<ContractRecord>, PersistenceError> {
        let rows = sqlx::query_as::<_, RecordRow>(
            "SELECT id, record_type, contract_name, original_code, success, created_at, detail \
             FROM contract_records ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(rows.into_iter().map(RecordRow::into_record).collect())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, PersistenceError> {
        let result = sqlx::query("DELETE FROM contract_records WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn counts(&self) -> Result<StoreCounts, PersistenceError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contract_records")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;

        let by_type = |record_type: &'static str| {
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM contract_records WHERE record_type = $1",
            )
            .bind(record_type)
            .fetch_one(&self.pool)
        };

        let analyses = by_type("analysis").await.map_err(storage_error)?;
        let rewrites = by_type("rewrite").await.map_err(storage_error)?;
        let generations = by_type("generation").await.map_err(storage_error)?;

        let failures: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM contract_records WHERE NOT success")
                .fetch_one(&self.pool)
                .await
                .map_err(storage_error)?;

        Ok(StoreCounts {
            total,
            analyses,
            rewrites,
            generations,
            failures,
        })
    }
}
