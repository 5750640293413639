//! Persists ledger movements. Every change to `products.quantity` goes through
//! [`record_movement`] (or [`create_product`] for the opening balance), which
//! applies the ledger rule to a row locked for the duration of the transaction.

use sqlx::PgConnection;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    database::{unique_violation, Database},
    ledger::{self, LedgerError, MovementKind},
    models::{NewProduct, Product, StockMovement},
    services::audit::Actor,
};

pub const INITIAL_STOCK_NOTE: &str = "Initial stock";

#[derive(Debug, Error)]
pub enum StockError {
    #[error("product {0} not found")]
    ProductNotFound(Uuid),
    #[error("quantity must be greater than zero")]
    InvalidQuantity,
    #[error("insufficient stock: {available} available, {requested} requested")]
    InsufficientStock { available: i32, requested: i32 },
    #[error("{0} already exists")]
    Duplicate(&'static str),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// What to do when an `out` asks for more than is on hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverdrawPolicy {
    /// Remove what is there and stop at zero.
    Clamp,
    /// Refuse with [`StockError::InsufficientStock`].
    Reject,
}

#[derive(Debug, Clone)]
pub struct MovementRequest {
    pub kind: MovementKind,
    pub notes: Option<String>,
    pub reference: Option<String>,
    pub overdraw: OverdrawPolicy,
}

impl MovementRequest {
    pub fn new(kind: MovementKind) -> Self {
        Self { kind, notes: None, reference: None, overdraw: OverdrawPolicy::Reject }
    }

    pub fn notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn reference(mut self, reference: Option<String>) -> Self {
        self.reference = reference;
        self
    }

    pub fn overdraw(mut self, policy: OverdrawPolicy) -> Self {
        self.overdraw = policy;
        self
    }

    /// Boundary checks made before any row is touched.
    pub fn validate(&self) -> Result<(), StockError> {
        match self.kind {
            MovementKind::In(q) | MovementKind::Out(q) if q <= 0 => Err(StockError::InvalidQuantity),
            MovementKind::SetAbsolute(q) if q < 0 => Err(StockError::InvalidQuantity),
            _ => Ok(()),
        }
    }

    /// `Some` when the request must be refused for the given on-hand quantity.
    fn overdraw_error(&self, available: i32) -> Option<StockError> {
        match (self.kind, self.overdraw) {
            (MovementKind::Out(q), OverdrawPolicy::Reject) if q.saturating_abs() > available => {
                Some(StockError::InsufficientStock { available, requested: q.saturating_abs() })
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MovementOutcome {
    pub product: Product,
    pub movement: StockMovement,
}

pub async fn record_movement(
    db: &Database,
    product_id: Uuid,
    request: MovementRequest,
    actor: &Actor,
) -> Result<MovementOutcome, StockError> {
    request.validate()?;

    let mut tx = db.begin().await?;

    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1 FOR UPDATE")
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StockError::ProductNotFound(product_id))?;

    let outcome = apply_locked(&mut tx, product, &request, actor).await?;
    tx.commit().await?;

    log::info!(
        "stock {} on {} ({}): {} -> {}",
        outcome.movement.movement_type,
        outcome.product.sku,
        outcome.product.id,
        outcome.movement.previous_quantity,
        outcome.movement.new_quantity
    );
    Ok(outcome)
}

/// Applies `request` to a product the caller already holds locked (or has
/// just inserted) inside the open transaction `conn`.
async fn apply_locked(
    conn: &mut PgConnection,
    mut product: Product,
    request: &MovementRequest,
    actor: &Actor,
) -> Result<MovementOutcome, StockError> {
    if let Some(err) = request.overdraw_error(product.quantity) {
        return Err(err);
    }

    let pending = ledger::apply(&mut product, request.kind, request.notes.clone(), request.reference.clone())?;

    sqlx::query("UPDATE products SET quantity = $1, updated_at = $2 WHERE id = $3")
        .bind(product.quantity)
        .bind(product.updated_at)
        .bind(product.id)
        .execute(&mut *conn)
        .await?;

    let movement = sqlx::query_as::<_, StockMovement>(
        r#"
        INSERT INTO stock_movements
            (id, product_id, user_id, movement_type, quantity, previous_quantity, new_quantity, notes, reference, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(pending.id)
    .bind(pending.product_id)
    .bind(actor.user_id)
    .bind(pending.movement_type.as_str())
    .bind(pending.quantity)
    .bind(pending.previous_quantity)
    .bind(pending.new_quantity)
    .bind(&pending.notes)
    .bind(&pending.reference)
    .bind(pending.created_at)
    .fetch_one(&mut *conn)
    .await?;

    Ok(MovementOutcome { product, movement })
}

/// Inserts a product at zero stock and, when `initial_quantity` is positive,
/// books the opening balance as an `in` movement in the same transaction.
pub async fn create_product(
    db: &Database,
    new: NewProduct,
    actor: &Actor,
) -> Result<(Product, Option<StockMovement>), StockError> {
    if new.initial_quantity < 0 {
        return Err(StockError::InvalidQuantity);
    }

    let mut tx = db.begin().await?;

    let product = sqlx::query_as::<_, Product>(
        r#"
        INSERT INTO products
            (id, name, description, sku, barcode, rfid_tag, quantity, min_stock_level, unit_price, location, category_id)
        VALUES ($1, $2, $3, $4, $5, $6, 0, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&new.name)
    .bind(&new.description)
    .bind(&new.sku)
    .bind(&new.barcode)
    .bind(&new.rfid_tag)
    .bind(new.min_stock_level)
    .bind(new.unit_price)
    .bind(&new.location)
    .bind(new.category_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(duplicate_or_database)?;

    let (product, movement) = if new.initial_quantity > 0 {
        let request = MovementRequest::new(MovementKind::In(new.initial_quantity))
            .notes(Some(INITIAL_STOCK_NOTE.to_string()));
        let outcome = apply_locked(&mut tx, product, &request, actor).await?;
        (outcome.product, Some(outcome.movement))
    } else {
        (product, None)
    };

    tx.commit().await?;
    log::info!("created product {} ({}) with {} on hand", product.sku, product.id, product.quantity);
    Ok((product, movement))
}

/// Maps unique-constraint violations on products to the offending field.
pub fn duplicate_or_database(err: sqlx::Error) -> StockError {
    match unique_violation(&err).as_deref() {
        Some("products_sku_key") => StockError::Duplicate("SKU"),
        Some("products_barcode_key") => StockError::Duplicate("Barcode"),
        Some("products_rfid_tag_key") => StockError::Duplicate("RFID tag"),
        _ => StockError::Database(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    use crate::services::catalog;

    #[test]
    fn in_and_out_need_positive_quantities() {
        assert!(matches!(
            MovementRequest::new(MovementKind::In(0)).validate(),
            Err(StockError::InvalidQuantity)
        ));
        assert!(matches!(
            MovementRequest::new(MovementKind::Out(-2)).validate(),
            Err(StockError::InvalidQuantity)
        ));
        assert!(MovementRequest::new(MovementKind::In(1)).validate().is_ok());
    }

    #[test]
    fn adjustments_accept_zero_but_not_negative_targets() {
        assert!(MovementRequest::new(MovementKind::SetAbsolute(0)).validate().is_ok());
        assert!(MovementRequest::new(MovementKind::SetAbsolute(-1)).validate().is_err());
        assert!(MovementRequest::new(MovementKind::AdjustBy(-4)).validate().is_ok());
    }

    #[test]
    fn reject_policy_refuses_overdraw() {
        let request = MovementRequest::new(MovementKind::Out(5));
        assert!(matches!(
            request.overdraw_error(3),
            Some(StockError::InsufficientStock { available: 3, requested: 5 })
        ));
        assert!(request.overdraw_error(5).is_none());
    }

    #[test]
    fn clamp_policy_lets_the_ledger_floor_at_zero() {
        let request = MovementRequest::new(MovementKind::Out(5)).overdraw(OverdrawPolicy::Clamp);
        assert!(request.overdraw_error(3).is_none());
    }

    #[test]
    fn other_database_errors_pass_through() {
        assert!(matches!(
            duplicate_or_database(sqlx::Error::RowNotFound),
            StockError::Database(sqlx::Error::RowNotFound)
        ));
    }

    fn new_product(sku: &str, initial_quantity: i32) -> NewProduct {
        NewProduct {
            name: format!("Test product {sku}"),
            description: None,
            sku: sku.to_string(),
            barcode: None,
            rfid_tag: None,
            initial_quantity,
            min_stock_level: 5,
            unit_price: Decimal::new(250, 2),
            location: None,
            category_id: None,
        }
    }

    async fn movement_count(db: &Database, product_id: Uuid) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM stock_movements WHERE product_id = $1")
            .bind(product_id)
            .fetch_one(db)
            .await
            .unwrap()
    }

    async fn on_hand(db: &Database, product_id: Uuid) -> i32 {
        catalog::get_product(db, product_id).await.unwrap().unwrap().quantity
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn opening_balance_is_a_single_in_movement(db: Database) {
        let (product, movement) = create_product(&db, new_product("OPEN-1", 7), &Actor::system()).await.unwrap();

        assert_eq!(product.quantity, 7);
        let movement = movement.unwrap();
        assert_eq!(movement.movement_type, "in");
        assert_eq!((movement.previous_quantity, movement.new_quantity, movement.quantity), (0, 7, 7));
        assert_eq!(movement.notes.as_deref(), Some(INITIAL_STOCK_NOTE));

        let history = catalog::movement_history(&db, product.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(ledger::verify_history(&history, on_hand(&db, product.id).await), Ok(()));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn zero_opening_balance_writes_no_movement(db: Database) {
        let (product, movement) = create_product(&db, new_product("OPEN-0", 0), &Actor::system()).await.unwrap();
        assert!(movement.is_none());
        assert_eq!(movement_count(&db, product.id).await, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn duplicate_sku_rolls_back_the_insert(db: Database) {
        create_product(&db, new_product("DUP-1", 3), &Actor::system()).await.unwrap();

        let err = create_product(&db, new_product("DUP-1", 9), &Actor::system()).await.unwrap_err();
        assert!(matches!(err, StockError::Duplicate("SKU")));

        let products: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products").fetch_one(&db).await.unwrap();
        let movements: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stock_movements").fetch_one(&db).await.unwrap();
        assert_eq!((products, movements), (1, 1));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn recorded_movement_updates_product_and_ledger_together(db: Database) {
        let (product, _) = create_product(&db, new_product("MOVE-1", 5), &Actor::system()).await.unwrap();

        let outcome = record_movement(&db, product.id, MovementRequest::new(MovementKind::Out(2)), &Actor::system())
            .await
            .unwrap();
        assert_eq!(outcome.product.quantity, 3);
        assert_eq!((outcome.movement.previous_quantity, outcome.movement.new_quantity), (5, 3));

        let history = catalog::movement_history(&db, product.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(ledger::verify_history(&history, on_hand(&db, product.id).await), Ok(()));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn rejected_overdraw_writes_nothing(db: Database) {
        let (product, _) = create_product(&db, new_product("SHORT-1", 3), &Actor::system()).await.unwrap();

        let err = record_movement(&db, product.id, MovementRequest::new(MovementKind::Out(5)), &Actor::system())
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::InsufficientStock { available: 3, requested: 5 }));

        assert_eq!(on_hand(&db, product.id).await, 3);
        assert_eq!(movement_count(&db, product.id).await, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn overflowing_receipt_writes_nothing(db: Database) {
        let (product, _) = create_product(&db, new_product("BIG-1", 10), &Actor::system()).await.unwrap();

        let err = record_movement(&db, product.id, MovementRequest::new(MovementKind::In(i32::MAX)), &Actor::system())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StockError::Ledger(LedgerError::QuantityOverflow { on_hand: 10, requested: i32::MAX })
        ));

        assert_eq!(on_hand(&db, product.id).await, 10);
        assert_eq!(movement_count(&db, product.id).await, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn failed_movement_insert_rolls_back_the_quantity_update(db: Database) {
        let (product, _) = create_product(&db, new_product("ATOM-1", 4), &Actor::system()).await.unwrap();

        // No such user: the product UPDATE succeeds, then the movement INSERT hits the foreign key.
        let stranger = Actor::system().with_user(Uuid::new_v4());
        let err = record_movement(&db, product.id, MovementRequest::new(MovementKind::In(6)), &stranger)
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::Database(_)));

        assert_eq!(on_hand(&db, product.id).await, 4);
        assert_eq!(movement_count(&db, product.id).await, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn unknown_product_is_reported(db: Database) {
        let missing = Uuid::new_v4();
        let err = record_movement(&db, missing, MovementRequest::new(MovementKind::In(1)), &Actor::system())
            .await
            .unwrap_err();
        assert!(matches!(err, StockError::ProductNotFound(id) if id == missing));
    }
}
