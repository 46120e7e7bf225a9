//! MoySklad API payloads and normalized records

use serde::Deserialize;
use std::collections::HashMap;
use tracing::warn;
use uuid::Uuid;

/// Generic list envelope: rows plus paging metadata
#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub rows: Vec<T>,
    #[serde(default)]
    pub meta: Option<ListMeta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListMeta {
    #[serde(default)]
    pub size: Option<u64>,
}

/// One warehouse from `/entity/store`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MsStore {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub external_code: Option<String>,
    /// Address arrives as a plain string or a structured object depending on
    /// account settings.
    #[serde(default)]
    pub address: Option<serde_json::Value>,
}

impl MsStore {
    pub fn address_text(&self) -> Option<String> {
        match &self.address {
            Some(serde_json::Value::String(text)) => Some(text.clone()),
            Some(value) if !value.is_null() => Some(value.to_string()),
            _ => None,
        }
    }
}

/// Entity reference carrying the href the UUID is extracted from
#[derive(Debug, Clone, Deserialize)]
pub struct EntityMeta {
    #[serde(default)]
    pub href: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductRef {
    #[serde(default)]
    pub meta: Option<EntityMeta>,
    #[serde(default)]
    pub article: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreRef {
    #[serde(default)]
    pub meta: Option<EntityMeta>,
}

/// One row of the stock-by-store report
#[derive(Debug, Clone, Deserialize)]
pub struct StockRow {
    #[serde(default)]
    pub product: Option<ProductRef>,
    #[serde(rename = "stockByStore", default)]
    pub stock_by_store: Vec<StockByStore>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockByStore {
    #[serde(default)]
    pub store: Option<StoreRef>,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub reserve: f64,
    #[serde(default)]
    pub in_transit: f64,
}

/// Normalized per-store stock line
#[derive(Debug, Clone, PartialEq)]
pub struct StockDetail {
    pub snapshot_id: i64,
    pub product_uuid: Uuid,
    pub store_uuid: Uuid,
    pub stock: f64,
    pub reserve: f64,
    pub in_transit: f64,
}

/// Per-product aggregate accumulated across the whole report
#[derive(Debug, Clone, PartialEq)]
pub struct ProductTotal {
    pub product_uuid: Uuid,
    pub article: Option<String>,
    pub name: Option<String>,
    pub total_stock: f64,
    pub total_reserve: f64,
    pub total_in_transit: f64,
}

/// Last path segment of an entity href, as a UUID.
pub fn uuid_from_href(href: &str) -> Option<Uuid> {
    let path = href.split('?').next().unwrap_or(href);
    let segment = path.rsplit('/').next()?;
    Uuid::parse_str(segment).ok()
}

/// Flatten report rows into per-store details and fold them into the running
/// per-product totals. Rows without a product UUID are skipped with a warning.
pub fn normalize_stock_rows(
    rows: &[StockRow],
    snapshot_id: i64,
    totals: &mut HashMap<Uuid, ProductTotal>,
) -> Vec<StockDetail> {
    let mut details = Vec::new();

    for row in rows {
        let product_uuid = row
            .product
            .as_ref()
            .and_then(|product| product.meta.as_ref())
            .and_then(|meta| meta.href.as_deref())
            .and_then(uuid_from_href);

        let Some(product_uuid) = product_uuid else {
            warn!("skipping report row without a product uuid");
            continue;
        };

        let entry = totals.entry(product_uuid).or_insert_with(|| ProductTotal {
            product_uuid,
            article: None,
            name: None,
            total_stock: 0.0,
            total_reserve: 0.0,
            total_in_transit: 0.0,
        });
        if let Some(product) = &row.product {
            if entry.article.is_none() {
                entry.article = product.article.clone();
            }
            if entry.name.is_none() {
                entry.name = product.name.clone();
            }
        }

        for stock_item in &row.stock_by_store {
            let store_uuid = stock_item
                .store
                .as_ref()
                .and_then(|store| store.meta.as_ref())
                .and_then(|meta| meta.href.as_deref())
                .and_then(uuid_from_href);

            let Some(store_uuid) = store_uuid else {
                continue;
            };

            details.push(StockDetail {
                snapshot_id,
                product_uuid,
                store_uuid,
                stock: stock_item.quantity,
                reserve: stock_item.reserve,
                in_transit: stock_item.in_transit,
            });

            entry.total_stock += stock_item.quantity;
            entry.total_reserve += stock_item.reserve;
            entry.total_in_transit += stock_item.in_transit;
        }
    }

    details
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRODUCT: &str = "11111111-2222-3333-4444-555555555555";
    const STORE_A: &str = "aaaaaaaa-0000-0000-0000-000000000001";
    const STORE_B: &str = "aaaaaaaa-0000-0000-0000-000000000002";

    fn row(product: &str, stocks: &[(&str, f64, f64, f64)]) -> StockRow {
        StockRow {
            product: Some(ProductRef {
                meta: Some(EntityMeta {
                    href: Some(format!(
                        "https://api.moysklad.ru/api/remap/1.2/entity/product/{product}"
                    )),
                }),
                article: Some("A-1".into()),
                name: Some("Widget".into()),
            }),
            stock_by_store: stocks
                .iter()
                .map(|(store, quantity, reserve, in_transit)| StockByStore {
                    store: Some(StoreRef {
                        meta: Some(EntityMeta {
                            href: Some(format!(
                                "https://api.moysklad.ru/api/remap/1.2/entity/store/{store}?x=1"
                            )),
                        }),
                    }),
                    quantity: *quantity,
                    reserve: *reserve,
                    in_transit: *in_transit,
                })
                .collect(),
        }
    }

    #[test]
    fn test_uuid_from_href_strips_query() {
        let href = format!("https://host/entity/store/{STORE_A}?expand=owner");
        assert_eq!(uuid_from_href(&href), Uuid::parse_str(STORE_A).ok());
        assert!(uuid_from_href("https://host/entity/store/not-a-uuid").is_none());
    }

    #[test]
    fn test_normalization_builds_details_and_totals() {
        let rows = vec![row(PRODUCT, &[(STORE_A, 10.0, 2.0, 1.0), (STORE_B, 5.0, 0.0, 0.0)])];
        let mut totals = HashMap::new();

        let details = normalize_stock_rows(&rows, 7, &mut totals);

        assert_eq!(details.len(), 2);
        assert_eq!(details[0].snapshot_id, 7);
        assert_eq!(details[1].stock, 5.0);

        let total = &totals[&Uuid::parse_str(PRODUCT).unwrap()];
        assert_eq!(total.total_stock, 15.0);
        assert_eq!(total.total_reserve, 2.0);
        assert_eq!(total.article.as_deref(), Some("A-1"));
    }

    #[test]
    fn test_totals_accumulate_across_pages() {
        let mut totals = HashMap::new();

        normalize_stock_rows(&[row(PRODUCT, &[(STORE_A, 10.0, 0.0, 0.0)])], 7, &mut totals);
        normalize_stock_rows(&[row(PRODUCT, &[(STORE_B, 4.0, 0.0, 0.0)])], 7, &mut totals);

        let total = &totals[&Uuid::parse_str(PRODUCT).unwrap()];
        assert_eq!(total.total_stock, 14.0);
    }

    #[test]
    fn test_rows_without_product_are_skipped() {
        let rows = vec![StockRow {
            product: None,
            stock_by_store: Vec::new(),
        }];
        let mut totals = HashMap::new();

        let details = normalize_stock_rows(&rows, 1, &mut totals);

        assert!(details.is_empty());
        assert!(totals.is_empty());
    }
}
