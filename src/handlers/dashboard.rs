use askama::Template;
use axum::{
    extract::State,
    response::{Html, Redirect},
};
use rust_decimal::Decimal;
use tower_cookies::Cookies;

use crate::{
    app::AppState,
    error::AppError,
    filters,
    middleware::{get_current_user, CurrentUser},
    models::{Category, MovementListing, Product},
    services::catalog,
};

use super::{render, PageContext};

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    page: PageContext,
    product_count: i64,
    low_stock_count: i64,
    total_value: Decimal,
    low_stock: Vec<Product>,
    recent_movements: Vec<MovementListing>,
    categories: Vec<Category>,
}

pub async fn index(cookies: Cookies, State(state): State<AppState>) -> Redirect {
    match get_current_user(&cookies, &state.db, &state.config.jwt_secret).await {
        Some(_) => Redirect::to("/dashboard"),
        None => Redirect::to("/auth/login"),
    }
}

pub async fn dashboard(
    user: CurrentUser,
    cookies: Cookies,
    State(state): State<AppState>,
) -> Result<Html<String>, AppError> {
    let totals = catalog::inventory_totals(&state.db).await?;

    let template = DashboardTemplate {
        page: PageContext::for_user(&user, &cookies),
        product_count: totals.product_count,
        low_stock_count: totals.low_stock_count,
        total_value: totals.total_value,
        low_stock: catalog::low_stock_products(&state.db, 10).await?,
        recent_movements: catalog::recent_movements(&state.db, 10).await?,
        categories: catalog::list_categories(&state.db).await?,
    };
    render(&template)
}
