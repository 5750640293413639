//! Product and category queries outside the ledger path.

use rust_decimal::Decimal;
use sqlx::{FromRow, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    database::Database,
    ledger::HistoryBreak,
    models::{Category, MovementListing, Product, ProductChanges, ProductListing, StockMovement},
    services::stock::{duplicate_or_database, StockError},
};

#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub category_id: Option<Uuid>,
    pub low_stock: bool,
}

impl ProductFilter {
    fn push_where(&self, query: &mut QueryBuilder<'_, Postgres>) {
        query.push(" WHERE 1 = 1");
        if let Some(search) = &self.search {
            let pattern = format!("%{}%", escape_like(search));
            query.push(" AND (p.name ILIKE ").push_bind(pattern.clone());
            query.push(" OR p.sku ILIKE ").push_bind(pattern.clone());
            query.push(" OR p.barcode ILIKE ").push_bind(pattern).push(")");
        }
        if let Some(category_id) = self.category_id {
            query.push(" AND p.category_id = ").push_bind(category_id);
        }
        if self.low_stock {
            query.push(" AND p.quantity <= p.min_stock_level");
        }
    }
}

fn escape_like(value: &str) -> String {
    value.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

pub async fn count_products(db: &Database, filter: &ProductFilter) -> Result<i64, sqlx::Error> {
    let mut query = QueryBuilder::new("SELECT COUNT(*) FROM products p");
    filter.push_where(&mut query);
    query.build_query_scalar::<i64>().fetch_one(db).await
}

pub async fn list_products(
    db: &Database,
    filter: &ProductFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<ProductListing>, sqlx::Error> {
    let mut query = QueryBuilder::new(
        "SELECT p.*, c.name_en AS category_name_en, c.name_bg AS category_name_bg \
         FROM products p LEFT JOIN categories c ON c.id = p.category_id",
    );
    filter.push_where(&mut query);
    query.push(" ORDER BY p.name LIMIT ").push_bind(limit);
    query.push(" OFFSET ").push_bind(offset);
    query.build_query_as::<ProductListing>().fetch_all(db).await
}

pub async fn get_product(db: &Database, id: Uuid) -> Result<Option<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await
}

/// Exact match on barcode, RFID tag or SKU, in that order of preference.
pub async fn find_by_code(db: &Database, code: &str) -> Result<Option<Product>, sqlx::Error> {
    let code = code.trim();
    if code.is_empty() {
        return Ok(None);
    }
    sqlx::query_as::<_, Product>(
        r#"
        SELECT * FROM products
        WHERE barcode = $1 OR rfid_tag = $1 OR sku = $1
        ORDER BY CASE WHEN barcode = $1 THEN 0 WHEN rfid_tag = $1 THEN 1 ELSE 2 END
        LIMIT 1
        "#,
    )
    .bind(code)
    .fetch_optional(db)
    .await
}

pub async fn search_products(db: &Database, term: &str, limit: i64) -> Result<Vec<Product>, sqlx::Error> {
    let pattern = format!("%{}%", escape_like(term.trim()));
    sqlx::query_as::<_, Product>(
        "SELECT * FROM products WHERE name ILIKE $1 OR sku ILIKE $1 OR barcode ILIKE $1 ORDER BY name LIMIT $2",
    )
    .bind(pattern)
    .bind(limit)
    .fetch_all(db)
    .await
}

/// Updates everything except quantity, which only the ledger moves.
pub async fn update_product(db: &Database, id: Uuid, changes: &ProductChanges) -> Result<Product, StockError> {
    sqlx::query_as::<_, Product>(
        r#"
        UPDATE products
        SET name = $2, description = $3, sku = $4, barcode = $5, rfid_tag = $6,
            min_stock_level = $7, unit_price = $8, location = $9, category_id = $10, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&changes.name)
    .bind(&changes.description)
    .bind(&changes.sku)
    .bind(&changes.barcode)
    .bind(&changes.rfid_tag)
    .bind(changes.min_stock_level)
    .bind(changes.unit_price)
    .bind(&changes.location)
    .bind(changes.category_id)
    .fetch_optional(db)
    .await
    .map_err(duplicate_or_database)?
    .ok_or(StockError::ProductNotFound(id))
}

/// Deletes a product and, through the foreign key, its movement history.
/// Returns the row as it was and how many movements went with it.
pub async fn delete_product(db: &Database, id: Uuid) -> Result<(Product, i64), StockError> {
    let mut tx = db.begin().await?;

    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StockError::ProductNotFound(id))?;

    let movements = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM stock_movements WHERE product_id = $1")
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM products WHERE id = $1").bind(id).execute(&mut *tx).await?;
    tx.commit().await?;

    log::info!("deleted product {} ({}) with {} movements", product.sku, product.id, movements);
    Ok((product, movements))
}

/// Newest first.
pub async fn product_movements(db: &Database, product_id: Uuid, limit: i64) -> Result<Vec<MovementListing>, sqlx::Error> {
    sqlx::query_as::<_, MovementListing>(
        r#"
        SELECT m.*, p.name AS product_name, p.sku AS product_sku, u.username
        FROM stock_movements m
        JOIN products p ON p.id = m.product_id
        LEFT JOIN users u ON u.id = m.user_id
        WHERE m.product_id = $1
        ORDER BY m.created_at DESC, m.id DESC
        LIMIT $2
        "#,
    )
    .bind(product_id)
    .bind(limit)
    .fetch_all(db)
    .await
}

/// Full history, oldest first, for replaying the ledger.
pub async fn movement_history(db: &Database, product_id: Uuid) -> Result<Vec<StockMovement>, sqlx::Error> {
    sqlx::query_as::<_, StockMovement>(
        "SELECT * FROM stock_movements WHERE product_id = $1 ORDER BY created_at, id",
    )
    .bind(product_id)
    .fetch_all(db)
    .await
}

/// First broken link and closing balance of a product's movement chain.
#[derive(Debug, Clone, Default, FromRow)]
pub struct ChainSummary {
    pub gap_index: Option<i64>,
    pub gap_expected: Option<i32>,
    pub gap_found: Option<i32>,
    pub last_new_quantity: Option<i32>,
}

impl ChainSummary {
    pub fn verdict(&self, on_hand: i32) -> Result<(), HistoryBreak> {
        if let (Some(index), Some(expected), Some(found)) = (self.gap_index, self.gap_expected, self.gap_found) {
            return Err(HistoryBreak::Gap { index: index as usize, expected, found });
        }
        match self.last_new_quantity {
            Some(ledger) if ledger != on_hand => Err(HistoryBreak::Drift { ledger, on_hand }),
            _ => Ok(()),
        }
    }
}

/// Replays the ledger in the database and returns only the summary row.
/// Agrees with `ledger::verify_history` over [`movement_history`].
pub async fn chain_summary(db: &Database, product_id: Uuid) -> Result<ChainSummary, sqlx::Error> {
    sqlx::query_as::<_, ChainSummary>(
        r#"
        WITH chain AS (
            SELECT previous_quantity,
                   new_quantity,
                   LAG(new_quantity) OVER w AS prior_new,
                   ROW_NUMBER() OVER w - 1 AS idx
            FROM stock_movements
            WHERE product_id = $1
            WINDOW w AS (ORDER BY created_at, id)
        )
        SELECT g.idx AS gap_index,
               g.prior_new AS gap_expected,
               g.previous_quantity AS gap_found,
               l.new_quantity AS last_new_quantity
        FROM (SELECT 1) AS one
        LEFT JOIN LATERAL (
            SELECT idx, prior_new, previous_quantity
            FROM chain
            WHERE prior_new IS NOT NULL AND prior_new <> previous_quantity
            ORDER BY idx
            LIMIT 1
        ) g ON TRUE
        LEFT JOIN LATERAL (
            SELECT new_quantity FROM chain ORDER BY idx DESC LIMIT 1
        ) l ON TRUE
        "#,
    )
    .bind(product_id)
    .fetch_one(db)
    .await
}

pub async fn recent_movements(db: &Database, limit: i64) -> Result<Vec<MovementListing>, sqlx::Error> {
    sqlx::query_as::<_, MovementListing>(
        r#"
        SELECT m.*, p.name AS product_name, p.sku AS product_sku, u.username
        FROM stock_movements m
        JOIN products p ON p.id = m.product_id
        LEFT JOIN users u ON u.id = m.user_id
        ORDER BY m.created_at DESC, m.id DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(db)
    .await
}

pub async fn all_products(db: &Database) -> Result<Vec<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>("SELECT * FROM products ORDER BY sku").fetch_all(db).await
}

#[derive(Debug, Clone, FromRow)]
pub struct InventoryTotals {
    pub product_count: i64,
    pub low_stock_count: i64,
    pub total_value: Decimal,
}

pub async fn inventory_totals(db: &Database) -> Result<InventoryTotals, sqlx::Error> {
    sqlx::query_as::<_, InventoryTotals>(
        r#"
        SELECT COUNT(*) AS product_count,
               COUNT(*) FILTER (WHERE quantity <= min_stock_level) AS low_stock_count,
               COALESCE(SUM(quantity * unit_price), 0)::NUMERIC(14, 2) AS total_value
        FROM products
        "#,
    )
    .fetch_one(db)
    .await
}

pub async fn low_stock_products(db: &Database, limit: i64) -> Result<Vec<Product>, sqlx::Error> {
    sqlx::query_as::<_, Product>(
        "SELECT * FROM products WHERE quantity <= min_stock_level ORDER BY quantity, name LIMIT $1",
    )
    .bind(limit)
    .fetch_all(db)
    .await
}

pub async fn list_categories(db: &Database) -> Result<Vec<Category>, sqlx::Error> {
    sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY name_en").fetch_all(db).await
}

pub async fn create_category(
    db: &Database,
    name_en: &str,
    name_bg: &str,
    description: Option<&str>,
) -> Result<Category, sqlx::Error> {
    sqlx::query_as::<_, Category>(
        "INSERT INTO categories (id, name_en, name_bg, description) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(name_en)
    .bind(name_bg)
    .bind(description)
    .fetch_one(db)
    .await
}
