//! Versioned CSV schemas.
//!
//! Every variant produces the same canonical [`SaleRecord`](crate::SaleRecord);
//! a variant only decides which columns a file must carry and what fills the
//! ones it doesn't.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SalesError;

pub const COL_SHOP: &str = "shop";
pub const COL_PRODUCT: &str = "product";
pub const COL_CATEGORY: &str = "category";
pub const COL_QUANTITY: &str = "quantity";
pub const COL_PRICE: &str = "price";
pub const COL_BENEFITS: &str = "benefits";
pub const COL_TIME_OF_SALE: &str = "time_of_sale";

/// Canonical column order, matching the `sales` table.
pub const ALL_COLUMNS: &[&str] = &[
    COL_SHOP,
    COL_PRODUCT,
    COL_CATEGORY,
    COL_QUANTITY,
    COL_PRICE,
    COL_BENEFITS,
    COL_TIME_OF_SALE,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaleSchema {
    /// Current layout: every column required.
    #[default]
    Sales,
    /// Legacy product feed: `product,category,price,updatedAt`.
    ProductData,
}

impl SaleSchema {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sales => "sales",
            Self::ProductData => "product_data",
        }
    }

    pub fn required_columns(&self) -> &'static [&'static str] {
        match self {
            Self::Sales => ALL_COLUMNS,
            Self::ProductData => &[COL_PRODUCT, COL_CATEGORY, COL_PRICE, COL_TIME_OF_SALE],
        }
    }

    /// Other header names a column may appear under, tried in order after
    /// the canonical name.
    pub fn aliases(&self, column: &str) -> &'static [&'static str] {
        match (self, column) {
            (Self::ProductData, COL_TIME_OF_SALE) => &["updatedAt", "updated_at"],
            _ => &[],
        }
    }

    /// Raw value used for a column this schema does not require.
    pub fn default_for(&self, column: &str) -> Option<&'static str> {
        match (self, column) {
            (Self::ProductData, COL_SHOP) => Some("unknown"),
            (Self::ProductData, COL_QUANTITY) => Some("1"),
            (Self::ProductData, COL_BENEFITS) => Some("0"),
            _ => None,
        }
    }
}

impl fmt::Display for SaleSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SaleSchema {
    type Err = SalesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sales" | "sale" => Ok(Self::Sales),
            "product_data" | "productdata" => Ok(Self::ProductData),
            other => Err(SalesError::UnknownSchema(other.to_string())),
        }
    }
}
