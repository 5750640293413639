use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    i18n::Language,
    ledger::{LedgerEntry, MovementType},
};

/// Persisted ledger row. Never updated once inserted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StockMovement {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Option<Uuid>,
    pub movement_type: String,
    pub quantity: i32,
    pub previous_quantity: i32,
    pub new_quantity: i32,
    pub notes: Option<String>,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StockMovement {
    pub fn kind(&self) -> Option<MovementType> {
        self.movement_type.parse().ok()
    }

    pub fn type_label(&self, language: &Language) -> &'static str {
        match self.kind() {
            Some(MovementType::In) => language.t("Stock in"),
            Some(MovementType::Out) => language.t("Stock out"),
            Some(MovementType::Adjustment) => language.t("Adjustment"),
            None => "?",
        }
    }

    pub fn notes_text(&self) -> &str {
        self.notes.as_deref().unwrap_or("")
    }

    pub fn reference_text(&self) -> &str {
        self.reference.as_deref().unwrap_or("")
    }

    /// Quantity as shown in history tables: `+3`, `-2`, `-5`.
    pub fn signed_display(&self) -> String {
        let delta = match self.kind() {
            Some(MovementType::Out) => -self.quantity,
            _ => self.quantity,
        };
        if delta > 0 {
            format!("+{delta}")
        } else {
            delta.to_string()
        }
    }
}

impl LedgerEntry for StockMovement {
    fn previous_quantity(&self) -> i32 {
        self.previous_quantity
    }

    fn new_quantity(&self) -> i32 {
        self.new_quantity
    }
}

/// Movement joined with its product and acting user for history tables.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MovementListing {
    #[sqlx(flatten)]
    pub movement: StockMovement,
    pub product_name: String,
    pub product_sku: String,
    pub username: Option<String>,
}

impl MovementListing {
    pub fn username_text(&self) -> &str {
        self.username.as_deref().unwrap_or("-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movement(movement_type: &str, quantity: i32) -> StockMovement {
        StockMovement {
            id: Uuid::now_v7(),
            product_id: Uuid::new_v4(),
            user_id: None,
            movement_type: movement_type.into(),
            quantity,
            previous_quantity: 0,
            new_quantity: 0,
            notes: None,
            reference: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn signed_display_reflects_direction() {
        assert_eq!(movement("in", 3).signed_display(), "+3");
        assert_eq!(movement("out", 2).signed_display(), "-2");
        assert_eq!(movement("adjustment", -5).signed_display(), "-5");
        assert_eq!(movement("adjustment", 0).signed_display(), "0");
    }

    #[test]
    fn type_label_is_translated() {
        assert_eq!(movement("out", 1).type_label(&Language::En), "Stock out");
        assert_eq!(movement("adjustment", 1).type_label(&Language::Bg), "Корекция");
    }

    #[test]
    fn unknown_stored_type_has_no_kind() {
        assert_eq!(movement("in", 1).kind(), Some(MovementType::In));
        assert_eq!(movement("transfer", 1).kind(), None);
    }
}
