use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One validated sales row, ready to be written to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleRecord {
    pub shop: String,
    pub product: String,
    pub category: String,
    pub quantity: i64,
    pub price: f64,
    /// Signed: a sale can be made at a loss.
    pub benefits: f64,
    pub time_of_sale: DateTime<Utc>,
}

impl SaleRecord {
    pub fn revenue(&self) -> f64 {
        self.quantity as f64 * self.price
    }
}

/// A row as read back from the store, with its surrogate key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSale {
    pub id: i64,
    #[serde(flatten)]
    pub record: SaleRecord,
}

/// Aggregates served by `GET /stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesStats {
    /// sum(quantity * price)
    pub total_revenue: f64,
    /// avg(price), rounded to cents.
    pub average_price: f64,
    /// Category with the largest summed quantity.
    pub top_category: String,
    /// Shop with the largest summed quantity.
    pub top_shop: String,
    /// Number of stored rows.
    pub total_sales: i64,
}

/// Placeholder used when there is no data to rank.
pub const NOT_AVAILABLE: &str = "N/A";

impl SalesStats {
    pub fn empty() -> Self {
        Self {
            total_revenue: 0.0,
            average_price: 0.0,
            top_category: NOT_AVAILABLE.to_string(),
            top_shop: NOT_AVAILABLE.to_string(),
            total_sales: 0,
        }
    }

    /// Compute the aggregates in memory over a set of records.
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a SaleRecord>,
    {
        let mut count = 0i64;
        let mut revenue = 0.0;
        let mut price_sum = 0.0;
        let mut by_category: HashMap<&str, i64> = HashMap::new();
        let mut by_shop: HashMap<&str, i64> = HashMap::new();

        for r in records {
            count += 1;
            revenue += r.revenue();
            price_sum += r.price;
            *by_category.entry(r.category.as_str()).or_default() += r.quantity;
            *by_shop.entry(r.shop.as_str()).or_default() += r.quantity;
        }

        if count == 0 {
            return Self::empty();
        }

        Self {
            total_revenue: revenue,
            average_price: round_cents(price_sum / count as f64),
            top_category: top_key(&by_category),
            top_shop: top_key(&by_shop),
            total_sales: count,
        }
    }
}

pub fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Largest value wins; ties broken by name so the result is stable.
fn top_key(counts: &HashMap<&str, i64>) -> String {
    counts
        .iter()
        .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(k, _)| k.to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}
