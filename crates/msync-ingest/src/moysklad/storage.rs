//! MoySklad persistence
//!
//! Stores and product totals upsert on their UUIDs; per-store details are
//! append-only under a snapshot id created once per run, so every run is a
//! dated inventory photograph.

use crate::moysklad::models::{MsStore, ProductTotal, StockDetail};
use async_trait::async_trait;
use msync_common::Result;
use msync_core::upsert::{PgTxScope, UpsertStore};
use sqlx::PgPool;

/// Open a new snapshot row and return its id.
pub async fn create_snapshot(pool: &PgPool) -> Result<i64> {
    let id: i64 =
        sqlx::query_scalar("INSERT INTO ms_snapshots (collected_at) VALUES (now()) RETURNING id")
            .fetch_one(pool)
            .await?;
    Ok(id)
}

pub struct MsStoreStore {
    scope: PgTxScope,
}

impl MsStoreStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            scope: PgTxScope::new(pool),
        }
    }
}

#[async_trait]
impl UpsertStore for MsStoreStore {
    type Record = MsStore;

    fn key(&self, store: &MsStore) -> String {
        store.id.to_string()
    }

    async fn begin(&mut self) -> Result<()> {
        self.scope.begin().await
    }

    async fn write(&mut self, store: &MsStore) -> Result<()> {
        let address = store.address_text();
        let conn = self.scope.conn()?;
        sqlx::query(
            r#"
            INSERT INTO ms_stores (uuid, name, code, external_code, address)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (uuid) DO UPDATE SET
                name = EXCLUDED.name,
                code = EXCLUDED.code,
                external_code = EXCLUDED.external_code,
                address = EXCLUDED.address,
                updated_at = now()
            "#,
        )
        .bind(store.id)
        .bind(&store.name)
        .bind(&store.code)
        .bind(&store.external_code)
        .bind(address)
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.scope.commit().await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.scope.rollback().await
    }
}

/// Append-only detail lines; the snapshot id keeps re-runs from colliding.
pub struct StockDetailStore {
    scope: PgTxScope,
}

impl StockDetailStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            scope: PgTxScope::new(pool),
        }
    }
}

#[async_trait]
impl UpsertStore for StockDetailStore {
    type Record = StockDetail;

    fn key(&self, detail: &StockDetail) -> String {
        format!(
            "{}/{}/{}",
            detail.snapshot_id, detail.product_uuid, detail.store_uuid
        )
    }

    async fn begin(&mut self) -> Result<()> {
        self.scope.begin().await
    }

    async fn write(&mut self, detail: &StockDetail) -> Result<()> {
        let conn = self.scope.conn()?;
        sqlx::query(
            r#"
            INSERT INTO ms_stock_details (
                snapshot_id, product_uuid, store_uuid, stock, reserve, in_transit
            ) VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (snapshot_id, product_uuid, store_uuid) DO UPDATE SET
                stock = EXCLUDED.stock,
                reserve = EXCLUDED.reserve,
                in_transit = EXCLUDED.in_transit
            "#,
        )
        .bind(detail.snapshot_id)
        .bind(detail.product_uuid)
        .bind(detail.store_uuid)
        .bind(detail.stock)
        .bind(detail.reserve)
        .bind(detail.in_transit)
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.scope.commit().await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.scope.rollback().await
    }
}

pub struct ProductTotalStore {
    scope: PgTxScope,
}

impl ProductTotalStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            scope: PgTxScope::new(pool),
        }
    }
}

#[async_trait]
impl UpsertStore for ProductTotalStore {
    type Record = (ProductTotal, i64);

    fn key(&self, record: &(ProductTotal, i64)) -> String {
        record.0.product_uuid.to_string()
    }

    async fn begin(&mut self) -> Result<()> {
        self.scope.begin().await
    }

    async fn write(&mut self, record: &(ProductTotal, i64)) -> Result<()> {
        let (total, snapshot_id) = record;
        let conn = self.scope.conn()?;
        sqlx::query(
            r#"
            INSERT INTO ms_product_totals (
                product_uuid, article, name,
                total_stock, total_reserve, total_in_transit, snapshot_id
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (product_uuid) DO UPDATE SET
                article = EXCLUDED.article,
                name = EXCLUDED.name,
                total_stock = EXCLUDED.total_stock,
                total_reserve = EXCLUDED.total_reserve,
                total_in_transit = EXCLUDED.total_in_transit,
                snapshot_id = EXCLUDED.snapshot_id,
                updated_at = now()
            "#,
        )
        .bind(total.product_uuid)
        .bind(&total.article)
        .bind(&total.name)
        .bind(total.total_stock)
        .bind(total.total_reserve)
        .bind(total.total_in_transit)
        .bind(snapshot_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.scope.commit().await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.scope.rollback().await
    }
}
