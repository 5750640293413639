//! Barcode/RFID scanner pages and the JSON endpoint used by handheld scanners.

use std::str::FromStr;

use askama::Template;
use axum::{
    extract::{Form, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_cookies::Cookies;

use crate::{
    app::AppState,
    error::AppError,
    filters,
    i18n::Language,
    ledger::MovementKind,
    middleware::{rate_limit::SCAN_API, CurrentUser, RequestMeta},
    models::{Product, ProductSummary},
    services::{
        audit,
        catalog,
        stock::{self, MovementOutcome, MovementRequest, StockError},
        Actor,
    },
    utils::{forms, Flash},
};

use super::{inventory::stock_error_message, render, PageContext};

#[derive(Template)]
#[template(path = "scanner/index.html")]
struct ScannerTemplate {
    page: PageContext,
}

#[derive(Template)]
#[template(path = "scanner/lookup.html")]
struct LookupTemplate {
    page: PageContext,
    code: String,
    product: Option<Product>,
}

#[derive(Template)]
#[template(path = "scanner/stock.html")]
struct ScanStockTemplate {
    page: PageContext,
    direction: Direction,
    product: Option<Product>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    In,
    Out,
}

impl Direction {
    fn kind(&self, quantity: i32) -> MovementKind {
        match self {
            Direction::In => MovementKind::In(quantity),
            Direction::Out => MovementKind::Out(quantity),
        }
    }

    fn audit_action(&self) -> &'static str {
        match self {
            Direction::In => "stock_in_scan",
            Direction::Out => "stock_out_scan",
        }
    }

    fn title(&self, lang: &Language) -> &'static str {
        match self {
            Direction::In => lang.t("Stock in"),
            Direction::Out => lang.t("Stock out"),
        }
    }

    fn path(&self) -> &'static str {
        match self {
            Direction::In => "/scanner/stock-in",
            Direction::Out => "/scanner/stock-out",
        }
    }

    fn is_out(&self) -> bool {
        matches!(self, Direction::Out)
    }
}

#[derive(Debug)]
enum ScanError {
    UnknownCode(String),
    Stock(StockError),
}

impl ScanError {
    fn message(&self, lang: Language) -> String {
        match self {
            ScanError::UnknownCode(code) => format!("{}: {}", lang.t("No product found for code"), code),
            ScanError::Stock(e) => stock_error_message(lang, e),
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ScanError::UnknownCode(_) | ScanError::Stock(StockError::ProductNotFound(_)) => StatusCode::NOT_FOUND,
            ScanError::Stock(StockError::Database(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ScanError::Stock(_) => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Deserialize)]
pub struct LookupForm {
    #[serde(default)]
    code: String,
}

#[derive(Deserialize)]
pub struct ScanStockForm {
    #[serde(default)]
    code: String,
    #[serde(default)]
    quantity: String,
    notes: Option<String>,
    reference: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanAction {
    Lookup,
    StockIn,
    StockOut,
}

impl FromStr for ScanAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lookup" => Ok(ScanAction::Lookup),
            "stock_in" => Ok(ScanAction::StockIn),
            "stock_out" => Ok(ScanAction::StockOut),
            _ => Err(()),
        }
    }
}

#[derive(Deserialize)]
pub struct ScanRequest {
    code: String,
    action: String,
    #[serde(default = "one")]
    quantity: i32,
}

fn one() -> i32 {
    1
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    success: bool,
    message: String,
    product: Option<ProductSummary>,
    low_stock: bool,
}

/// Finds the product behind `code` and books a scan-driven movement on it.
async fn scan_movement(
    state: &AppState,
    code: &str,
    direction: Direction,
    quantity: i32,
    notes: Option<String>,
    reference: Option<String>,
    actor: &Actor,
) -> Result<MovementOutcome, ScanError> {
    let product = catalog::find_by_code(&state.db, code)
        .await
        .map_err(|e| ScanError::Stock(e.into()))?
        .ok_or_else(|| ScanError::UnknownCode(code.trim().to_string()))?;

    let request = MovementRequest::new(direction.kind(quantity)).notes(notes).reference(reference);
    let outcome = stock::record_movement(&state.db, product.id, request, actor)
        .await
        .map_err(ScanError::Stock)?;

    audit::record(
        &state.db,
        actor,
        direction.audit_action(),
        Some("product"),
        Some(product.id),
        Some(json!({
            "code": code.trim(),
            "quantity": outcome.movement.quantity,
            "previous_quantity": outcome.movement.previous_quantity,
            "new_quantity": outcome.movement.new_quantity,
        })),
    )
    .await;
    Ok(outcome)
}

async fn lookup_code(state: &AppState, code: &str, actor: &Actor) -> Result<Option<Product>, AppError> {
    let product = catalog::find_by_code(&state.db, code).await?;
    if let Some(product) = &product {
        audit::record(
            &state.db,
            actor,
            "product_scanned",
            Some("product"),
            Some(product.id),
            Some(json!({ "code": code.trim() })),
        )
        .await;
    }
    Ok(product)
}

pub async fn index(user: CurrentUser, cookies: Cookies) -> Result<Html<String>, AppError> {
    render(&ScannerTemplate { page: PageContext::for_user(&user, &cookies) })
}

pub async fn lookup_page(user: CurrentUser, cookies: Cookies) -> Result<Html<String>, AppError> {
    render(&LookupTemplate {
        page: PageContext::for_user(&user, &cookies),
        code: String::new(),
        product: None,
    })
}

pub async fn lookup(
    user: CurrentUser,
    cookies: Cookies,
    State(state): State<AppState>,
    meta: RequestMeta,
    Form(form): Form<LookupForm>,
) -> Result<Html<String>, AppError> {
    let mut page = PageContext::for_user(&user, &cookies);
    let product = lookup_code(&state, &form.code, &meta.actor(Some(user.id))).await?;
    if product.is_none() {
        page.flashes.push(Flash::warning(ScanError::UnknownCode(form.code.trim().to_string()).message(user.lang)));
    }

    render(&LookupTemplate { page, code: form.code.trim().to_string(), product })
}

fn stock_page(user: &CurrentUser, cookies: &Cookies, direction: Direction) -> Result<Html<String>, AppError> {
    render(&ScanStockTemplate {
        page: PageContext::for_user(user, cookies),
        direction,
        product: None,
    })
}

pub async fn stock_in_page(user: CurrentUser, cookies: Cookies) -> Result<Html<String>, AppError> {
    stock_page(&user, &cookies, Direction::In)
}

pub async fn stock_out_page(user: CurrentUser, cookies: Cookies) -> Result<Html<String>, AppError> {
    stock_page(&user, &cookies, Direction::Out)
}

async fn scan_stock_form(
    user: CurrentUser,
    cookies: Cookies,
    state: AppState,
    meta: RequestMeta,
    form: ScanStockForm,
    direction: Direction,
) -> Result<Html<String>, AppError> {
    let lang = user.lang;
    let mut page = PageContext::for_user(&user, &cookies);

    let quantity = match forms::parse_or(Some(form.quantity.as_str()), 1) {
        Ok(quantity) => quantity,
        Err(()) => {
            page.flashes.push(Flash::danger(lang.t("Quantity must be a whole number")));
            return render(&ScanStockTemplate { page, direction, product: None });
        }
    };

    let result = scan_movement(
        &state,
        &form.code,
        direction,
        quantity,
        forms::non_empty(form.notes.as_deref()),
        forms::non_empty(form.reference.as_deref()),
        &meta.actor(Some(user.id)),
    )
    .await;

    let product = match result {
        Ok(outcome) => {
            page.flashes.push(Flash::success(format!(
                "{}: {} ({} -> {})",
                lang.t("Stock updated"),
                outcome.product.name,
                outcome.movement.previous_quantity,
                outcome.movement.new_quantity
            )));
            if direction.is_out() && outcome.product.is_low_stock() {
                page.flashes.push(Flash::warning(lang.t("Stock is at or below the minimum level")));
            }
            Some(outcome.product)
        }
        Err(ScanError::Stock(StockError::Database(e))) => return Err(e.into()),
        Err(e) => {
            page.flashes.push(Flash::danger(e.message(lang)));
            None
        }
    };

    render(&ScanStockTemplate { page, direction, product })
}

pub async fn stock_in(
    user: CurrentUser,
    cookies: Cookies,
    State(state): State<AppState>,
    meta: RequestMeta,
    Form(form): Form<ScanStockForm>,
) -> Result<Html<String>, AppError> {
    scan_stock_form(user, cookies, state, meta, form, Direction::In).await
}

pub async fn stock_out(
    user: CurrentUser,
    cookies: Cookies,
    State(state): State<AppState>,
    meta: RequestMeta,
    Form(form): Form<ScanStockForm>,
) -> Result<Html<String>, AppError> {
    scan_stock_form(user, cookies, state, meta, form, Direction::Out).await
}

fn scan_reply(status: StatusCode, success: bool, message: String, product: Option<Product>) -> Response {
    let low_stock = product.as_ref().is_some_and(Product::is_low_stock);
    let body = ScanResponse {
        success,
        message,
        product: product.map(ProductSummary::from),
        low_stock,
    };
    (status, Json(body)).into_response()
}

pub async fn api_scan(
    user: CurrentUser,
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(request): Json<ScanRequest>,
) -> Result<Response, AppError> {
    let lang = user.lang;
    if !state.limiter.check("scan_api", &user.id.to_string(), SCAN_API) {
        log::warn!("scan API rate limit hit for {}", user.username);
        return Err(AppError::RateLimited);
    }

    let Ok(action) = request.action.parse::<ScanAction>() else {
        return Ok(scan_reply(StatusCode::BAD_REQUEST, false, lang.t("Invalid action").to_string(), None));
    };
    let actor = meta.actor(Some(user.id));

    let direction = match action {
        ScanAction::Lookup => {
            let product = lookup_code(&state, &request.code, &actor).await?;
            return Ok(match product {
                Some(product) => scan_reply(StatusCode::OK, true, lang.t("Product found").to_string(), Some(product)),
                None => {
                    let message = ScanError::UnknownCode(request.code.trim().to_string()).message(lang);
                    scan_reply(StatusCode::NOT_FOUND, false, message, None)
                }
            });
        }
        ScanAction::StockIn => Direction::In,
        ScanAction::StockOut => Direction::Out,
    };

    match scan_movement(&state, &request.code, direction, request.quantity, None, None, &actor).await {
        Ok(outcome) => Ok(scan_reply(StatusCode::OK, true, lang.t("Stock updated").to_string(), Some(outcome.product))),
        Err(ScanError::Stock(StockError::Database(e))) => Err(e.into()),
        Err(e) => Ok(scan_reply(e.status(), false, e.message(lang), None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn parses_scan_actions() {
        assert_eq!("stock_out".parse::<ScanAction>(), Ok(ScanAction::StockOut));
        assert!("transfer".parse::<ScanAction>().is_err());
    }

    #[test]
    fn scan_quantity_defaults_to_one() {
        let request: ScanRequest = serde_json::from_str(r#"{"code":"3800123","action":"stock_in"}"#).unwrap();
        assert_eq!(request.quantity, 1);
    }

    #[test]
    fn scan_errors_map_to_statuses() {
        assert_eq!(ScanError::UnknownCode("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ScanError::Stock(StockError::InsufficientStock { available: 0, requested: 1 }).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ScanError::Stock(StockError::ProductNotFound(Uuid::nil())).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn direction_picks_movement_kind() {
        assert_eq!(Direction::In.kind(3), MovementKind::In(3));
        assert_eq!(Direction::Out.kind(2), MovementKind::Out(2));
        assert_eq!(Direction::Out.audit_action(), "stock_out_scan");
    }
}
