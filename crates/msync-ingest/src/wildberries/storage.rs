//! Wildberries persistence
//!
//! Conflict-based upserts keyed by the natural keys: `srid` for orders,
//! `nm_id` for cards, `(nm_id, warehouse, size)` for remains. On conflict only
//! the mutable fields are overwritten; identity fields stay untouched.

use crate::wildberries::models::{WbCard, WbOrder, WbRemain};
use async_trait::async_trait;
use msync_common::Result;
use msync_core::upsert::{PgTxScope, UpsertStore};
use sqlx::PgPool;

pub struct WbOrderStore {
    scope: PgTxScope,
}

impl WbOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            scope: PgTxScope::new(pool),
        }
    }
}

#[async_trait]
impl UpsertStore for WbOrderStore {
    type Record = WbOrder;

    fn key(&self, order: &WbOrder) -> String {
        order.srid.clone()
    }

    async fn begin(&mut self) -> Result<()> {
        self.scope.begin().await
    }

    async fn write(&mut self, order: &WbOrder) -> Result<()> {
        let conn = self.scope.conn()?;
        sqlx::query(
            r#"
            INSERT INTO wb_orders (
                srid, g_number, date, last_change_date, supplier_article,
                tech_size, barcode, total_price, discount_percent, warehouse_name,
                is_cancel, country_name, oblast_okrug_name, region_name,
                nm_id, category, brand
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (srid) DO UPDATE SET
                last_change_date = EXCLUDED.last_change_date,
                is_cancel = EXCLUDED.is_cancel,
                total_price = EXCLUDED.total_price,
                synced_at = now()
            "#,
        )
        .bind(&order.srid)
        .bind(&order.g_number)
        .bind(order.date)
        .bind(order.last_change_date)
        .bind(&order.supplier_article)
        .bind(&order.tech_size)
        .bind(&order.barcode)
        .bind(order.total_price)
        .bind(order.discount_percent)
        .bind(&order.warehouse_name)
        .bind(order.is_cancel)
        .bind(&order.country_name)
        .bind(&order.oblast_okrug_name)
        .bind(&order.region_name)
        .bind(order.nm_id)
        .bind(&order.category)
        .bind(&order.brand)
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

pub struct WbCardStore {
    scope: PgTxScope,
}

impl WbCardStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            scope: PgTxScope::new(pool),
        }
    }
}

fn json_or(value: &serde_json::Value, fallback: serde_json::Value) -> serde_json::Value {
    if value.is_null() {
        fallback
    } else {
        value.clone()
    }
}

#[async_trait]
impl UpsertStore for WbCardStore {
    type Record = WbCard;

    fn key(&self, card: &WbCard) -> String {
        card.nm_id.to_string()
    }

    async fn begin(&mut self) -> Result<()> {
        self.scope.begin().await
    }

    async fn write(&mut self, card: &WbCard) -> Result<()> {
        let updated_at =
            card.updated_at.as_deref().and_then(crate::wildberries::models::wb_time::parse);

        let conn = self.scope.conn()?;
        sqlx::query(
            r#"
            INSERT INTO wb_cards (
                nm_id, vendor_code, brand, title, description,
                category, subject, characteristics, sizes, photos,
                video, dimensions, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (nm_id) DO UPDATE SET
                vendor_code = EXCLUDED.vendor_code,
                brand = EXCLUDED.brand,
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                category = EXCLUDED.category,
                subject = EXCLUDED.subject,
                characteristics = EXCLUDED.characteristics,
                sizes = EXCLUDED.sizes,
                photos = EXCLUDED.photos,
                video = EXCLUDED.video,
                dimensions = EXCLUDED.dimensions,
                updated_at = EXCLUDED.updated_at,
                synced_at = now()
            "#,
        )
        .bind(card.nm_id)
        .bind(&card.vendor_code)
        .bind(&card.brand)
        .bind(&card.title)
        .bind(&card.description)
        .bind(&card.category)
        .bind(&card.subject)
        .bind(json_or(&card.characteristics, serde_json::json!([])))
        .bind(json_or(&card.sizes, serde_json::json!([])))
        .bind(json_or(&card.photos, serde_json::json!([])))
        .bind(&card.video)
        .bind(json_or(&card.dimensions, serde_json::json!({})))
        .bind(updated_at)
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

pub struct WbRemainStore {
    scope: PgTxScope,
}

impl WbRemainStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            scope: PgTxScope::new(pool),
        }
    }
}

#[async_trait]
impl UpsertStore for WbRemainStore {
    type Record = WbRemain;

    fn key(&self, remain: &WbRemain) -> String {
        format!("{}/{}/{}", remain.nm_id, remain.warehouse, remain.size)
    }

    async fn begin(&mut self) -> Result<()> {
        self.scope.begin().await
    }

    async fn write(&mut self, remain: &WbRemain) -> Result<()> {
        let conn = self.scope.conn()?;
        sqlx::query(
            r#"
            INSERT INTO wb_remains (nm_id, size, warehouse, quantity, barcode)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (nm_id, warehouse, size) DO UPDATE SET
                quantity = EXCLUDED.quantity,
                barcode = EXCLUDED.barcode,
                synced_at = now()
            "#,
        )
        .bind(remain.nm_id)
        .bind(&remain.size)
        .bind(&remain.warehouse)
        .bind(remain.quantity)
        .bind(&remain.barcode)
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
