//! Transactional batch upserts
//!
//! Records carry a natural key and are written with conflict-based merge
//! semantics: insert on absent key, overwrite mutable fields on conflict,
//! never duplicate a row. That makes re-applying a batch after a
//! crash-and-resume safe by construction.
//!
//! Each data source picks one of two transaction modes explicitly:
//!
//! - [`TxMode::WholeBatch`]: one transaction per batch; the first failure
//!   rolls everything back and surfaces the error (zero successes).
//! - [`TxMode::PerRecord`]: one short transaction per record; failures are
//!   collected per record and the rest of the batch still commits.

use async_trait::async_trait;
use msync_common::{Result, SyncError};
use sqlx::postgres::PgConnection;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::warn;

/// Per-source transaction scope choice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    WholeBatch,
    PerRecord,
}

/// One record that failed to persist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    pub key: String,
    pub error: String,
}

/// Result of one batch upsert
#[derive(Debug, Default)]
pub struct UpsertOutcome {
    pub success_count: usize,
    pub failures: Vec<RecordFailure>,
}

/// Transactional record store, the relational collaborator boundary.
///
/// `begin`/`commit`/`rollback` scope one transaction; `write` runs inside the
/// currently open scope. Concrete implementations hold a [`PgTxScope`]; tests
/// substitute in-memory stores.
#[async_trait]
pub trait UpsertStore: Send {
    type Record: Send + Sync;

    /// Natural key of a record, for failure reporting.
    fn key(&self, record: &Self::Record) -> String;

    async fn begin(&mut self) -> Result<()>;
    async fn write(&mut self, record: &Self::Record) -> Result<()>;
    async fn commit(&mut self) -> Result<()>;
    async fn rollback(&mut self) -> Result<()>;
}

/// Drives batches through an [`UpsertStore`] under the configured mode
#[derive(Debug, Clone)]
pub struct UpsertEngine {
    mode: TxMode,
}

impl UpsertEngine {
    pub fn new(mode: TxMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> TxMode {
        self.mode
    }

    pub async fn upsert<S>(&self, store: &mut S, batch: &[S::Record]) -> Result<UpsertOutcome>
    where
        S: UpsertStore,
    {
        if batch.is_empty() {
            return Ok(UpsertOutcome::default());
        }

        match self.mode {
            TxMode::WholeBatch => self.upsert_whole(store, batch).await,
            TxMode::PerRecord => self.upsert_per_record(store, batch).await,
        }
    }

    async fn upsert_whole<S>(&self, store: &mut S, batch: &[S::Record]) -> Result<UpsertOutcome>
    where
        S: UpsertStore,
    {
        store.begin().await?;

        for record in batch {
            if let Err(err) = store.write(record).await {
                let key = store.key(record);
                if let Err(rollback_err) = store.rollback().await {
                    warn!(error = %rollback_err, "rollback failed after write error");
                }
                return Err(SyncError::Persistence {
                    key,
                    message: err.to_string(),
                });
            }
        }

        store.commit().await?;
        Ok(UpsertOutcome {
            success_count: batch.len(),
            failures: Vec::new(),
        })
    }

    async fn upsert_per_record<S>(
        &self,
        store: &mut S,
        batch: &[S::Record],
    ) -> Result<UpsertOutcome>
    where
        S: UpsertStore,
    {
        let mut outcome = UpsertOutcome::default();

        for record in batch {
            store.begin().await?;
            match store.write(record).await {
                Ok(()) => match store.commit().await {
                    Ok(()) => outcome.success_count += 1,
                    Err(err) => outcome.failures.push(RecordFailure {
                        key: store.key(record),
                        error: err.to_string(),
                    }),
                },
                Err(err) => {
                    outcome.failures.push(RecordFailure {
                        key: store.key(record),
                        error: err.to_string(),
                    });
                    if let Err(rollback_err) = store.rollback().await {
                        warn!(error = %rollback_err, "rollback failed after write error");
                    }
                },
            }
        }

        if !outcome.failures.is_empty() {
            warn!(
                failed = outcome.failures.len(),
                succeeded = outcome.success_count,
                "batch committed with per-record failures"
            );
        }

        Ok(outcome)
    }
}

/// Postgres transaction scope shared by the concrete stores.
///
/// Wraps the pool plus the currently open transaction so stores only supply
/// their `write` SQL.
pub struct PgTxScope {
    pool: PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgTxScope {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, tx: None }
    }

    pub async fn begin(&mut self) -> Result<()> {
        if self.tx.is_none() {
            self.tx = Some(self.pool.begin().await?);
        }
        Ok(())
    }

    pub async fn commit(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit().await?;
        }
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        Ok(())
    }

    /// The connection of the open transaction. Calling this outside a
    /// `begin`/`commit` scope is a bug in the store.
    pub fn conn(&mut self) -> Result<&mut PgConnection> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| SyncError::Internal("no open transaction".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    /// In-memory store keyed by id; configurable failing key, commit applies
    /// the staged writes.
    struct MemoryStore {
        committed: BTreeMap<u64, String>,
        staged: Vec<(u64, String)>,
        in_tx: bool,
        fail_on: Option<u64>,
        rollbacks: usize,
    }

    impl MemoryStore {
        fn new(fail_on: Option<u64>) -> Self {
            Self {
                committed: BTreeMap::new(),
                staged: Vec::new(),
                in_tx: false,
                fail_on,
                rollbacks: 0,
            }
        }
    }

    #[async_trait]
    impl UpsertStore for MemoryStore {
        type Record = (u64, String);

        fn key(&self, record: &(u64, String)) -> String {
            record.0.to_string()
        }

        async fn begin(&mut self) -> Result<()> {
            self.in_tx = true;
            self.staged.clear();
            Ok(())
        }

        async fn write(&mut self, record: &(u64, String)) -> Result<()> {
            assert!(self.in_tx, "write outside transaction");
            if self.fail_on == Some(record.0) {
                return Err(SyncError::Persistence {
                    key: record.0.to_string(),
                    message: "null value in column violates not-null constraint".into(),
                });
            }
            self.staged.push(record.clone());
            Ok(())
        }

        async fn commit(&mut self) -> Result<()> {
            for (key, value) in self.staged.drain(..) {
                self.committed.insert(key, value);
            }
            self.in_tx = false;
            Ok(())
        }

        async fn rollback(&mut self) -> Result<()> {
            self.staged.clear();
            self.in_tx = false;
            self.rollbacks += 1;
            Ok(())
        }
    }

    fn batch(count: u64) -> Vec<(u64, String)> {
        (1..=count).map(|i| (i, format!("record-{i}"))).collect()
    }

    #[tokio::test]
    async fn test_per_record_mode_isolates_one_failure() {
        let engine = UpsertEngine::new(TxMode::PerRecord);
        let mut store = MemoryStore::new(Some(47));

        let outcome = engine.upsert(&mut store, &batch(100)).await.unwrap();

        assert_eq!(outcome.success_count, 99);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].key, "47");
        assert_eq!(store.committed.len(), 99);
        assert!(!store.committed.contains_key(&47));
    }

    #[tokio::test]
    async fn test_whole_batch_mode_rolls_back_on_failure() {
        let engine = UpsertEngine::new(TxMode::WholeBatch);
        let mut store = MemoryStore::new(Some(47));

        let result = engine.upsert(&mut store, &batch(100)).await;

        match result {
            Err(SyncError::Persistence { key, .. }) => assert_eq!(key, "47"),
            other => panic!("expected persistence error, got {other:?}"),
        }
        assert_eq!(store.committed.len(), 0);
        assert_eq!(store.rollbacks, 1);
    }

    #[tokio::test]
    async fn test_whole_batch_mode_commits_clean_batch() {
        let engine = UpsertEngine::new(TxMode::WholeBatch);
        let mut store = MemoryStore::new(None);

        let outcome = engine.upsert(&mut store, &batch(10)).await.unwrap();

        assert_eq!(outcome.success_count, 10);
        assert!(outcome.failures.is_empty());
        assert_eq!(store.committed.len(), 10);
    }

    #[tokio::test]
    async fn test_reapplying_batch_is_idempotent() {
        let engine = UpsertEngine::new(TxMode::PerRecord);
        let mut store = MemoryStore::new(None);
        let records = batch(25);

        engine.upsert(&mut store, &records).await.unwrap();
        let first = store.committed.clone();

        let outcome = engine.upsert(&mut store, &records).await.unwrap();

        assert_eq!(outcome.success_count, 25);
        assert_eq!(store.committed, first);
        assert_eq!(store.committed.len(), 25);
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let engine = UpsertEngine::new(TxMode::WholeBatch);
        let mut store = MemoryStore::new(None);

        let outcome = engine.upsert(&mut store, &[]).await.unwrap();

        assert_eq!(outcome.success_count, 0);
        assert!(outcome.failures.is_empty());
        assert!(!store.in_tx);
    }
}
