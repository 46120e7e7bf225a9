//! Ozon persistence
//!
//! Postings upsert on `posting_number`, stock lines on `sku`. Both streams
//! run in per-record transaction mode so one malformed record cannot sink a
//! whole page.

use crate::ozon::models::{OzonStock, Posting, Scheme};
use async_trait::async_trait;
use msync_common::Result;
use msync_core::upsert::{PgTxScope, UpsertStore};
use sqlx::PgPool;

fn json_or(value: &serde_json::Value, fallback: serde_json::Value) -> serde_json::Value {
    if value.is_null() {
        fallback
    } else {
        value.clone()
    }
}

pub struct OzonOrderStore {
    scope: PgTxScope,
    scheme: Scheme,
}

impl OzonOrderStore {
    pub fn new(pool: PgPool, scheme: Scheme) -> Self {
        Self {
            scope: PgTxScope::new(pool),
            scheme,
        }
    }
}

#[async_trait]
impl UpsertStore for OzonOrderStore {
    type Record = Posting;

    fn key(&self, posting: &Posting) -> String {
        posting.posting_number.clone()
    }

    async fn begin(&mut self) -> Result<()> {
        self.scope.begin().await
    }

    async fn write(&mut self, posting: &Posting) -> Result<()> {
        let scheme = self.scheme.as_str();
        let conn = self.scope.conn()?;
        sqlx::query(
            r#"
            INSERT INTO ozon_orders (
                posting_number, order_id, order_number, status,
                delivery_method_id, tpl_integration_type,
                created_at, in_process_at, shipment_date, delivering_date,
                products, analytics_data, financial_data, scheme
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (posting_number) DO UPDATE SET
                status = EXCLUDED.status,
                products = EXCLUDED.products,
                analytics_data = EXCLUDED.analytics_data,
                financial_data = EXCLUDED.financial_data,
                updated_at = now()
            "#,
        )
        .bind(&posting.posting_number)
        .bind(posting.order_id)
        .bind(&posting.order_number)
        .bind(&posting.status)
        .bind(posting.delivery_method.as_ref().and_then(|method| method.id))
        .bind(&posting.tpl_integration_type)
        .bind(posting.created_at)
        .bind(posting.in_process_at)
        .bind(posting.shipment_date)
        .bind(posting.delivering_date)
        .bind(json_or(&posting.products, serde_json::json!([])))
        .bind(json_or(&posting.analytics_data, serde_json::json!({})))
        .bind(json_or(&posting.financial_data, serde_json::json!({})))
        .bind(scheme)
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

pub struct OzonStockStore {
    scope: PgTxScope,
}

impl OzonStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            scope: PgTxScope::new(pool),
        }
    }
}

#[async_trait]
impl UpsertStore for OzonStockStore {
    type Record = OzonStock;

    fn key(&self, stock: &OzonStock) -> String {
        stock.sku.to_string()
    }

    async fn begin(&mut self) -> Result<()> {
        self.scope.begin().await
    }

    async fn write(&mut self, stock: &OzonStock) -> Result<()> {
        let conn = self.scope.conn()?;
        sqlx::query(
            r#"
            INSERT INTO ozon_remains (
                sku, product_id, item_code,
                fbo_visible_amount, fbo_present_amount, synced_at
            ) VALUES ($1, $2, $3, $4, $5, now())
            ON CONFLICT (sku) DO UPDATE SET
                product_id = EXCLUDED.product_id,
                item_code = EXCLUDED.item_code,
                fbo_visible_amount = EXCLUDED.fbo_visible_amount,
                fbo_present_amount = EXCLUDED.fbo_present_amount,
                synced_at = now()
            "#,
        )
        .bind(stock.sku)
        .bind(stock.product_id)
        .bind(&stock.item_code)
        .bind(stock.fbo_visible_amount)
        .bind(stock.fbo_present_amount)
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
