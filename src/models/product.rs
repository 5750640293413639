use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{i18n::Language, ledger::Stocked};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub sku: String,
    pub barcode: Option<String>,
    pub rfid_tag: Option<String>,
    pub quantity: i32,
    pub min_stock_level: i32,
    pub unit_price: Decimal,
    pub location: Option<String>,
    pub category_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.min_stock_level
    }

    pub fn total_value(&self) -> Decimal {
        Decimal::from(self.quantity) * self.unit_price
    }

    // Template helpers
    pub fn description_text(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }

    pub fn barcode_text(&self) -> &str {
        self.barcode.as_deref().unwrap_or("")
    }

    pub fn rfid_text(&self) -> &str {
        self.rfid_tag.as_deref().unwrap_or("")
    }

    pub fn location_text(&self) -> &str {
        self.location.as_deref().unwrap_or("")
    }

    pub fn has_barcode(&self) -> bool {
        self.barcode.as_deref().is_some_and(|b| !b.is_empty())
    }
}

impl Stocked for Product {
    fn stock_id(&self) -> Uuid {
        self.id
    }

    fn on_hand(&self) -> i32 {
        self.quantity
    }

    fn set_on_hand(&mut self, quantity: i32, at: DateTime<Utc>) {
        self.quantity = quantity;
        self.updated_at = at;
    }
}

/// Product row joined with its category names for list pages.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProductListing {
    #[sqlx(flatten)]
    pub product: Product,
    pub category_name_en: Option<String>,
    pub category_name_bg: Option<String>,
}

impl ProductListing {
    pub fn category_name(&self, language: &Language) -> &str {
        let name = match language {
            Language::Bg => self.category_name_bg.as_deref(),
            Language::En => self.category_name_en.as_deref(),
        };
        name.unwrap_or("")
    }
}

/// Validated input for creating a product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub sku: String,
    pub barcode: Option<String>,
    pub rfid_tag: Option<String>,
    pub initial_quantity: i32,
    pub min_stock_level: i32,
    pub unit_price: Decimal,
    pub location: Option<String>,
    pub category_id: Option<Uuid>,
}

/// Editable fields; quantity is deliberately absent.
#[derive(Debug, Clone)]
pub struct ProductChanges {
    pub name: String,
    pub description: Option<String>,
    pub sku: String,
    pub barcode: Option<String>,
    pub rfid_tag: Option<String>,
    pub min_stock_level: i32,
    pub unit_price: Decimal,
    pub location: Option<String>,
    pub category_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ProductSummary {
    pub id: Uuid,
    pub name: String,
    pub sku: String,
    pub barcode: Option<String>,
    pub quantity: i32,
}

impl From<Product> for ProductSummary {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            name: product.name,
            sku: product.sku,
            barcode: product.barcode,
            quantity: product.quantity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{apply_movement, MovementType};
    use std::str::FromStr;

    fn product(quantity: i32, min_stock_level: i32, price: &str) -> Product {
        let now = Utc::now();
        Product {
            id: Uuid::new_v4(),
            name: "Cable".into(),
            description: None,
            sku: "CBL-1".into(),
            barcode: None,
            rfid_tag: None,
            quantity,
            min_stock_level,
            unit_price: Decimal::from_str(price).unwrap(),
            location: None,
            category_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn low_stock_includes_threshold() {
        assert!(product(10, 10, "1").is_low_stock());
        assert!(product(3, 10, "1").is_low_stock());
        assert!(!product(11, 10, "1").is_low_stock());
    }

    #[test]
    fn total_value_multiplies_price() {
        assert_eq!(product(4, 0, "2.50").total_value(), Decimal::from_str("10.00").unwrap());
    }

    #[test]
    fn ledger_bumps_updated_at() {
        let mut p = product(5, 2, "1");
        let before = p.updated_at;
        let m = apply_movement(&mut p, "out", 2, None, None).unwrap();
        assert_eq!(m.movement_type, MovementType::Out);
        assert_eq!(p.quantity, 3);
        assert!(p.updated_at >= before);
        assert_eq!(p.updated_at, m.created_at);
    }
}
