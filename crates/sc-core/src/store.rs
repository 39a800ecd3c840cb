//! Persistence seam for contract history records
//!
//! The pipeline only talks to `ContractStore`; the Postgres implementation
//! lives in the API crate, and `MemoryStore` backs tests and database-less
//! development runs.

use crate::model::ContractRecord;
use crate::PersistenceError;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Aggregate record counts for the stats endpoint
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreCounts {
    pub total: i64,
    pub analyses: i64,
    pub rewrites: i64,
    pub generations: i64,
    pub failures: i64,
}

#[async_trait]
pub trait ContractStore: Send + Sync {
    /// Append one record. Implementations must pass the detail payload
    /// through the plain-structure boundary and surface any failure; a
    /// record is written whole or not at all.
    async fn insert(&self, record: &ContractRecord) -> Result<(), PersistenceError>;

    /// Records newest-first, offset/limit paginated.
    async fn list(&self, skip: i64, limit: i64) -> Result<Vec<ContractRecord>, PersistenceError>;

    /// Hard-remove one record. Returns false when the id was not present.
    async fn delete(&self, id: Uuid) -> Result<bool, PersistenceError>;

    async fn counts(&self) -> Result<StoreCounts, PersistenceError>;
}

/// In-memory store used by tests and when no database is configured
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<ContractRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContractStore for MemoryStore {
    async fn insert(&self, record: &ContractRecord) -> Result<(), PersistenceError> {
        // Exercise the same serialization boundary as the real store so a
        // non-plain payload fails here too, not only in production.
        record.detail.to_plain().map_err(PersistenceError::Serialization)?;
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn list(&self, skip: i64, limit: i64) -> Result<Vec<ContractRecord>, PersistenceError> {
        let records = self.records.read().await;
        let mut ordered: Vec<ContractRecord> = records.iter().rev().cloned().collect();
        // Stable sort keeps reverse-insertion order for equal timestamps.
        ordered.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(ordered
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, PersistenceError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.id != id);
        Ok(records.len() != before)
    }

    async fn counts(&self) -> Result<StoreCounts, PersistenceError> {
        let records = self.records.read().await;
        let mut counts = StoreCounts {
            total: records.len() as i64,
            ..Default::default()
        };
        for record in records.iter() {
            match record.detail.type_tag() {
                "analysis" => counts.analyses += 1,
                "rewrite" => counts.rewrites += 1,
                "generation" => counts.generations += 1,
                _ => {}
            }
            if !record.success {
                counts.failures += 1;
            }
        }
        Ok(counts)
    }
}
