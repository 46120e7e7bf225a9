//! Wildberries API payloads and normalized records

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Timestamp handling for the statistics API, which sends naive local
/// (Moscow) timestamps without an offset. Everything is carried as UTC
/// internally; RFC 3339 strings are accepted as-is.
pub(crate) mod wb_time {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use chrono_tz::Europe::Moscow;
    use serde::{Deserialize, Deserializer};

    pub fn parse(value: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(dt.with_timezone(&Utc));
        }
        let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
            .ok()?;
        Moscow
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}

/// One supplier order from the statistics API.
///
/// `srid` is the stable record id used for dedup; `last_change_date` is the
/// pagination high-water mark.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WbOrder {
    pub srid: String,
    #[serde(default)]
    pub g_number: Option<String>,
    #[serde(with = "wb_time")]
    pub date: DateTime<Utc>,
    #[serde(with = "wb_time")]
    pub last_change_date: DateTime<Utc>,
    #[serde(default)]
    pub supplier_article: Option<String>,
    #[serde(default)]
    pub tech_size: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub total_price: f64,
    #[serde(default)]
    pub discount_percent: f64,
    #[serde(default)]
    pub warehouse_name: Option<String>,
    #[serde(default)]
    pub is_cancel: bool,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub oblast_okrug_name: Option<String>,
    #[serde(default)]
    pub region_name: Option<String>,
    #[serde(default)]
    pub nm_id: Option<i64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
}

/// Content API card listing response
#[derive(Debug, Clone, Deserialize)]
pub struct CardsResponse {
    #[serde(default)]
    pub cards: Vec<WbCard>,
    #[serde(default)]
    pub cursor: Option<CardsCursor>,
}

/// Server-issued continuation cursor for the card listing
#[derive(Debug, Clone, Deserialize)]
pub struct CardsCursor {
    #[serde(rename = "updatedAt", default)]
    pub updated_at: Option<String>,
    #[serde(rename = "nmID", default)]
    pub nm_id: Option<i64>,
    #[serde(default)]
    pub total: Option<i64>,
}

/// One product card from the content API
#[derive(Debug, Clone, Deserialize)]
pub struct WbCard {
    #[serde(rename = "nmID")]
    pub nm_id: i64,
    #[serde(rename = "vendorCode", default)]
    pub vendor_code: String,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub characteristics: serde_json::Value,
    #[serde(default)]
    pub sizes: serde_json::Value,
    #[serde(default)]
    pub photos: serde_json::Value,
    #[serde(default)]
    pub video: Option<String>,
    #[serde(default)]
    pub dimensions: serde_json::Value,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: Option<String>,
}

/// Warehouse remains report: task creation response
#[derive(Debug, Clone, Deserialize)]
pub struct RemainsTaskResponse {
    #[serde(default)]
    pub data: Option<RemainsTaskData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemainsTaskData {
    #[serde(rename = "taskId", default)]
    pub task_id: Option<String>,
}

/// Warehouse remains report: status response. The status field has been seen
/// both at the top level and nested under `data`.
#[derive(Debug, Clone, Deserialize)]
pub struct RemainsStatusResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub data: Option<RemainsStatusData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemainsStatusData {
    #[serde(default)]
    pub status: Option<String>,
}

impl RemainsStatusResponse {
    pub fn status(&self) -> Option<&str> {
        self.status
            .as_deref()
            .or_else(|| self.data.as_ref().and_then(|d| d.status.as_deref()))
    }
}

/// Warehouse remains download payload: a bare array or wrapped in `data`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RemainsDownload {
    Items(Vec<WbRemainItem>),
    Wrapped {
        #[serde(default)]
        data: Vec<WbRemainItem>,
    },
}

impl RemainsDownload {
    pub fn into_items(self) -> Vec<WbRemainItem> {
        match self {
            RemainsDownload::Items(items) => items,
            RemainsDownload::Wrapped { data } => data,
        }
    }
}

/// One report row: a product with its per-warehouse quantities
#[derive(Debug, Clone, Deserialize)]
pub struct WbRemainItem {
    #[serde(rename = "nmId", alias = "nmID", alias = "nm_id", default)]
    pub nm_id: Option<i64>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(rename = "techSize", default)]
    pub tech_size: Option<String>,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub warehouses: Vec<WbRemainWarehouse>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WbRemainWarehouse {
    #[serde(rename = "warehouseName", default)]
    pub warehouse_name: Option<String>,
    #[serde(default)]
    pub quantity: i64,
}

/// Normalized remains line, one per product/size/warehouse
#[derive(Debug, Clone, PartialEq)]
pub struct WbRemain {
    pub nm_id: i64,
    pub size: String,
    pub warehouse: String,
    pub quantity: i64,
    pub barcode: Option<String>,
}

/// Placeholder id for report rows that arrive without a product id.
pub const UNKNOWN_NM_ID: i64 = 999_999;

/// Flatten report rows into one record per warehouse.
pub fn normalize_remains(items: Vec<WbRemainItem>) -> Vec<WbRemain> {
    let mut flattened = Vec::new();

    for item in items {
        let nm_id = item.nm_id.unwrap_or(UNKNOWN_NM_ID);
        let size = item
            .size
            .or(item.tech_size)
            .unwrap_or_default();

        for warehouse in item.warehouses {
            let Some(name) = warehouse.warehouse_name else {
                continue;
            };
            flattened.push(WbRemain {
                nm_id,
                size: size.clone(),
                warehouse: name,
                quantity: warehouse.quantity,
                barcode: item.barcode.clone(),
            });
        }
    }

    flattened
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_wb_time_parses_naive_moscow() {
        // 12:00 Moscow == 09:00 UTC
        let parsed = wb_time::parse("2024-06-01T12:00:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_wb_time_parses_rfc3339() {
        let parsed = wb_time::parse("2024-06-01T12:00:00Z").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_order_deserializes_with_sparse_fields() {
        let order: WbOrder = serde_json::from_str(
            r#"{
                "srid": "w1.2.3",
                "date": "2024-06-01T10:00:00",
                "lastChangeDate": "2024-06-01T11:30:00",
                "totalPrice": 1290.5,
                "isCancel": false,
                "nmId": 123456
            }"#,
        )
        .unwrap();

        assert_eq!(order.srid, "w1.2.3");
        assert_eq!(order.nm_id, Some(123_456));
        assert_eq!(order.total_price, 1290.5);
        assert!(order.brand.is_none());
    }

    #[test]
    fn test_remains_normalization_flattens_warehouses() {
        let items = vec![WbRemainItem {
            nm_id: Some(42),
            size: None,
            tech_size: Some("M".into()),
            barcode: Some("4607004".into()),
            warehouses: vec![
                WbRemainWarehouse {
                    warehouse_name: Some("Koledino".into()),
                    quantity: 10,
                },
                WbRemainWarehouse {
                    warehouse_name: Some("Kazan".into()),
                    quantity: 3,
                },
                WbRemainWarehouse {
                    warehouse_name: None,
                    quantity: 99,
                },
            ],
        }];

        let flattened = normalize_remains(items);

        assert_eq!(flattened.len(), 2);
        assert_eq!(flattened[0].size, "M");
        assert_eq!(flattened[0].warehouse, "Koledino");
        assert_eq!(flattened[1].quantity, 3);
    }

    #[test]
    fn test_remains_missing_nm_id_gets_placeholder() {
        let items = vec![WbRemainItem {
            nm_id: None,
            size: None,
            tech_size: None,
            barcode: None,
            warehouses: vec![WbRemainWarehouse {
                warehouse_name: Some("Tula".into()),
                quantity: 1,
            }],
        }];

        let flattened = normalize_remains(items);
        assert_eq!(flattened[0].nm_id, UNKNOWN_NM_ID);
    }

    #[test]
    fn test_remains_download_shapes() {
        let bare: RemainsDownload = serde_json::from_str(r#"[{"nmId": 1}]"#).unwrap();
        assert_eq!(bare.into_items().len(), 1);

        let wrapped: RemainsDownload =
            serde_json::from_str(r#"{"data": [{"nmId": 1}, {"nmId": 2}]}"#).unwrap();
        assert_eq!(wrapped.into_items().len(), 2);
    }
}
