use askama::Template;
use axum::{
    extract::{Form, Path, Query, State},
    http::header,
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    app::AppState,
    error::AppError,
    filters,
    i18n::Language,
    ledger::{LedgerError, MovementKind, MovementType},
    middleware::{CurrentUser, RequestMeta},
    models::{Category, MovementListing, NewProduct, Product, ProductChanges, ProductListing, ProductSummary},
    services::{
        audit,
        catalog::{self, ProductFilter},
        stock::{self, MovementRequest, StockError},
    },
    utils::{barcode, forms, Flash, Pagination},
};

use super::{redirect_with, render, PageContext};

const DETAIL_MOVEMENTS: i64 = 50;
const SEARCH_MIN_CHARS: usize = 2;
const SEARCH_LIMIT: i64 = 10;

#[derive(Template)]
#[template(path = "inventory/products.html")]
struct ProductsTemplate {
    page: PageContext,
    products: Vec<ProductListing>,
    categories: Vec<Category>,
    search: String,
    category_id: String,
    low_stock: bool,
    pagination: Pagination,
    query_suffix: String,
}

#[derive(Template)]
#[template(path = "inventory/product_detail.html")]
struct ProductDetailTemplate {
    page: PageContext,
    product: Product,
    category_name: String,
    movements: Vec<MovementListing>,
    movement_types: [MovementType; 3],
    ledger_ok: bool,
    ledger_message: String,
}

#[derive(Template)]
#[template(path = "inventory/product_form.html")]
struct ProductFormTemplate {
    page: PageContext,
    action: String,
    is_edit: bool,
    form: ProductForm,
    categories: Vec<Category>,
}

#[derive(Template)]
#[template(path = "inventory/categories.html")]
struct CategoriesTemplate {
    page: PageContext,
    categories: Vec<Category>,
}

#[derive(Template)]
#[template(path = "inventory/category_form.html")]
struct CategoryFormTemplate {
    page: PageContext,
    form: CategoryForm,
}

#[derive(Deserialize)]
pub struct ProductsQuery {
    search: Option<String>,
    category: Option<String>,
    low_stock: Option<String>,
    page: Option<String>,
}

/// Product form as posted; also carries values back into the form on errors.
#[derive(Debug, Default, Deserialize)]
pub struct ProductForm {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    sku: String,
    #[serde(default)]
    barcode: String,
    #[serde(default)]
    rfid_tag: String,
    #[serde(default)]
    quantity: String,
    #[serde(default)]
    min_stock_level: String,
    #[serde(default)]
    unit_price: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    category_id: String,
}

impl ProductForm {
    fn from_product(product: &Product) -> Self {
        Self {
            name: product.name.clone(),
            description: product.description_text().to_string(),
            sku: product.sku.clone(),
            barcode: product.barcode_text().to_string(),
            rfid_tag: product.rfid_text().to_string(),
            quantity: product.quantity.to_string(),
            min_stock_level: product.min_stock_level.to_string(),
            unit_price: product.unit_price.to_string(),
            location: product.location_text().to_string(),
            category_id: product.category_id.map(|id| id.to_string()).unwrap_or_default(),
        }
    }

    fn is_selected(&self, category: &Category) -> bool {
        self.category_id == category.id.to_string()
    }

    /// Validates the editable fields. Errors are UI labels ready for translation.
    fn changes(&self, default_min_stock: i32) -> Result<ProductChanges, &'static str> {
        let name = forms::non_empty(Some(self.name.as_str()));
        let sku = forms::non_empty(Some(self.sku.as_str()));
        let (Some(name), Some(sku)) = (name, sku) else {
            return Err("Name and SKU are required");
        };

        let min_stock_level = forms::parse_or(Some(self.min_stock_level.as_str()), default_min_stock)
            .ok()
            .filter(|m| *m >= 0)
            .ok_or("Minimum stock level must be a whole number of zero or more")?;
        let unit_price = forms::parse_decimal(Some(self.unit_price.as_str()))
            .ok()
            .filter(|p| !p.is_sign_negative())
            .ok_or("Unit price must be a number of zero or more")?;

        Ok(ProductChanges {
            name,
            description: forms::non_empty(Some(self.description.as_str())),
            sku,
            barcode: forms::non_empty(Some(self.barcode.as_str())),
            rfid_tag: forms::non_empty(Some(self.rfid_tag.as_str())),
            min_stock_level,
            unit_price,
            location: forms::non_empty(Some(self.location.as_str())),
            category_id: forms::parse_uuid(Some(self.category_id.as_str())),
        })
    }

    fn new_product(&self, default_min_stock: i32) -> Result<NewProduct, &'static str> {
        let changes = self.changes(default_min_stock)?;
        let initial_quantity = forms::parse_or(Some(self.quantity.as_str()), 0)
            .ok()
            .filter(|q| *q >= 0)
            .ok_or("Quantity must be a whole number of zero or more")?;

        Ok(NewProduct {
            name: changes.name,
            description: changes.description,
            sku: changes.sku,
            barcode: changes.barcode,
            rfid_tag: changes.rfid_tag,
            initial_quantity,
            min_stock_level: changes.min_stock_level,
            unit_price: changes.unit_price,
            location: changes.location,
            category_id: changes.category_id,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryForm {
    #[serde(default)]
    name_en: String,
    #[serde(default)]
    name_bg: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
pub struct StockForm {
    movement_type: String,
    quantity: String,
    notes: Option<String>,
    reference: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
}

/// Human-readable message for a failed stock or product write.
pub fn stock_error_message(lang: Language, err: &StockError) -> String {
    match err {
        StockError::InvalidQuantity => lang.t("Quantity must be greater than zero").to_string(),
        StockError::InsufficientStock { available, requested } => format!(
            "{}: {} {}, {} {}",
            lang.t("Insufficient stock"),
            available,
            lang.t("available"),
            requested,
            lang.t("requested")
        ),
        StockError::Duplicate(field) => format!("{} {}", lang.t(*field), lang.t("already exists")),
        StockError::Ledger(LedgerError::InvalidMovementType(_)) => lang.t("Invalid movement type").to_string(),
        StockError::Ledger(LedgerError::QuantityOverflow { .. }) => lang.t("Quantity is too large").to_string(),
        StockError::ProductNotFound(_) => lang.t("Product not found").to_string(),
        StockError::Database(_) => lang.t("Something went wrong. Please try again.").to_string(),
    }
}

fn listing_suffix(search: &str, category_id: &str, low_stock: bool) -> String {
    let mut suffix = String::new();
    if !search.is_empty() {
        suffix.push_str(&format!("&search={}", urlencoding::encode(search)));
    }
    if !category_id.is_empty() {
        suffix.push_str(&format!("&category={}", urlencoding::encode(category_id)));
    }
    if low_stock {
        suffix.push_str("&low_stock=on");
    }
    suffix
}

pub async fn products_list(
    user: CurrentUser,
    cookies: Cookies,
    State(state): State<AppState>,
    Query(query): Query<ProductsQuery>,
) -> Result<Html<String>, AppError> {
    let filter = ProductFilter {
        search: forms::non_empty(query.search.as_deref()),
        category_id: forms::parse_uuid(query.category.as_deref()),
        low_stock: forms::is_checked(query.low_stock.as_deref()),
    };

    let total = catalog::count_products(&state.db, &filter).await?;
    let page = query.page.as_deref().and_then(|p| p.trim().parse::<u32>().ok());
    let pagination = Pagination::new(page, state.config.items_per_page, total);
    let products = catalog::list_products(&state.db, &filter, pagination.limit(), pagination.offset()).await?;

    let search = filter.search.clone().unwrap_or_default();
    let category_id = filter.category_id.map(|id| id.to_string()).unwrap_or_default();

    let template = ProductsTemplate {
        page: PageContext::for_user(&user, &cookies),
        products,
        categories: catalog::list_categories(&state.db).await?,
        query_suffix: listing_suffix(&search, &category_id, filter.low_stock),
        search,
        category_id,
        low_stock: filter.low_stock,
        pagination,
    };
    render(&template)
}

pub async fn product_form(
    user: CurrentUser,
    cookies: Cookies,
    State(state): State<AppState>,
) -> Result<Html<String>, AppError> {
    let form = ProductForm {
        quantity: "0".to_string(),
        min_stock_level: state.config.low_stock_threshold.to_string(),
        unit_price: "0.00".to_string(),
        ..ProductForm::default()
    };

    let template = ProductFormTemplate {
        page: PageContext::for_user(&user, &cookies),
        action: "/inventory/product/add".to_string(),
        is_edit: false,
        form,
        categories: catalog::list_categories(&state.db).await?,
    };
    render(&template)
}

async fn form_with_error(
    state: &AppState,
    user: &CurrentUser,
    cookies: &Cookies,
    action: String,
    is_edit: bool,
    form: ProductForm,
    message: String,
) -> Result<Response, AppError> {
    let mut page = PageContext::for_user(user, cookies);
    page.flashes.push(Flash::danger(message));

    let template = ProductFormTemplate {
        page,
        action,
        is_edit,
        form,
        categories: catalog::list_categories(&state.db).await?,
    };
    Ok(render(&template)?.into_response())
}

pub async fn create_product(
    user: CurrentUser,
    cookies: Cookies,
    State(state): State<AppState>,
    meta: RequestMeta,
    Form(form): Form<ProductForm>,
) -> Result<Response, AppError> {
    let action = "/inventory/product/add".to_string();
    let new = match form.new_product(state.config.low_stock_threshold) {
        Ok(new) => new,
        Err(label) => {
            let message = user.lang.t(label).to_string();
            return form_with_error(&state, &user, &cookies, action, false, form, message).await;
        }
    };

    let actor = meta.actor(Some(user.id));
    let (product, _) = match stock::create_product(&state.db, new, &actor).await {
        Ok(created) => created,
        Err(StockError::Database(e)) => return Err(e.into()),
        Err(e) => {
            let message = stock_error_message(user.lang, &e);
            return form_with_error(&state, &user, &cookies, action, false, form, message).await;
        }
    };

    audit::record(
        &state.db,
        &actor,
        "product_created",
        Some("product"),
        Some(product.id),
        Some(json!({ "sku": product.sku, "name": product.name, "initial_quantity": product.quantity })),
    )
    .await;

    let location = format!("/inventory/product/{}", product.id);
    Ok(redirect_with(&cookies, &location, Flash::success(user.lang.t("Product created"))).into_response())
}

pub async fn product_detail(
    user: CurrentUser,
    cookies: Cookies,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Html<String>, AppError> {
    let product = catalog::get_product(&state.db, id).await?.ok_or(AppError::NotFound)?;
    let movements = catalog::product_movements(&state.db, id, DETAIL_MOVEMENTS).await?;
    let chain = catalog::chain_summary(&state.db, id).await?;

    let (ledger_ok, ledger_message) = match chain.verdict(product.quantity) {
        Ok(()) => (true, String::new()),
        Err(e) => {
            log::warn!("ledger check failed for product {}: {}", product.sku, e);
            (false, e.to_string())
        }
    };

    let category_name = match product.category_id {
        Some(category_id) => catalog::list_categories(&state.db)
            .await?
            .into_iter()
            .find(|c| c.id == category_id)
            .map(|c| c.name(&user.lang).to_string())
            .unwrap_or_default(),
        None => String::new(),
    };

    let template = ProductDetailTemplate {
        page: PageContext::for_user(&user, &cookies),
        product,
        category_name,
        movements,
        movement_types: MovementType::ALL,
        ledger_ok,
        ledger_message,
    };
    render(&template)
}

pub async fn product_edit_form(
    user: CurrentUser,
    cookies: Cookies,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Html<String>, AppError> {
    let product = catalog::get_product(&state.db, id).await?.ok_or(AppError::NotFound)?;

    let template = ProductFormTemplate {
        page: PageContext::for_user(&user, &cookies),
        action: format!("/inventory/product/{}/edit", product.id),
        is_edit: true,
        form: ProductForm::from_product(&product),
        categories: catalog::list_categories(&state.db).await?,
    };
    render(&template)
}

pub async fn update_product(
    user: CurrentUser,
    cookies: Cookies,
    State(state): State<AppState>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    Form(form): Form<ProductForm>,
) -> Result<Response, AppError> {
    let action = format!("/inventory/product/{id}/edit");
    let changes = match form.changes(state.config.low_stock_threshold) {
        Ok(changes) => changes,
        Err(label) => {
            let message = user.lang.t(label).to_string();
            return form_with_error(&state, &user, &cookies, action, true, form, message).await;
        }
    };

    let product = match catalog::update_product(&state.db, id, &changes).await {
        Ok(product) => product,
        Err(e @ (StockError::Duplicate(_) | StockError::InvalidQuantity)) => {
            let message = stock_error_message(user.lang, &e);
            return form_with_error(&state, &user, &cookies, action, true, form, message).await;
        }
        Err(e) => return Err(e.into()),
    };

    audit::record(
        &state.db,
        &meta.actor(Some(user.id)),
        "product_updated",
        Some("product"),
        Some(product.id),
        Some(json!({ "sku": product.sku, "name": product.name })),
    )
    .await;

    let location = format!("/inventory/product/{}", product.id);
    Ok(redirect_with(&cookies, &location, Flash::success(user.lang.t("Product updated"))).into_response())
}

pub async fn delete_product(
    user: CurrentUser,
    cookies: Cookies,
    State(state): State<AppState>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
) -> Result<Redirect, AppError> {
    let (product, movement_count) = catalog::delete_product(&state.db, id).await?;

    audit::record(
        &state.db,
        &meta.actor(Some(user.id)),
        "product_deleted",
        Some("product"),
        Some(product.id),
        Some(json!({
            "sku": product.sku,
            "name": product.name,
            "final_quantity": product.quantity,
            "movement_count": movement_count,
        })),
    )
    .await;

    Ok(redirect_with(&cookies, "/inventory/products", Flash::success(user.lang.t("Product deleted"))))
}

pub async fn record_stock(
    user: CurrentUser,
    cookies: Cookies,
    State(state): State<AppState>,
    meta: RequestMeta,
    Path(id): Path<Uuid>,
    Form(form): Form<StockForm>,
) -> Result<Redirect, AppError> {
    let lang = user.lang;
    let location = format!("/inventory/product/{id}");

    let Ok(quantity) = form.quantity.trim().parse::<i32>() else {
        return Ok(redirect_with(&cookies, &location, Flash::danger(lang.t("Quantity must be a whole number"))));
    };
    let kind = match MovementKind::parse(form.movement_type.trim(), quantity) {
        Ok(kind) => kind,
        Err(_) => {
            return Ok(redirect_with(&cookies, &location, Flash::danger(lang.t("Invalid movement type"))));
        }
    };

    let request = MovementRequest::new(kind)
        .notes(forms::non_empty(form.notes.as_deref()))
        .reference(forms::non_empty(form.reference.as_deref()));
    let actor = meta.actor(Some(user.id));

    let outcome = match stock::record_movement(&state.db, id, request, &actor).await {
        Ok(outcome) => outcome,
        Err(e @ (StockError::ProductNotFound(_) | StockError::Database(_))) => return Err(e.into()),
        Err(e) => return Ok(redirect_with(&cookies, &location, Flash::danger(stock_error_message(lang, &e)))),
    };

    audit::record(
        &state.db,
        &actor,
        "stock_adjusted",
        Some("product"),
        Some(id),
        Some(json!({
            "movement_id": outcome.movement.id,
            "movement_type": outcome.movement.movement_type,
            "quantity": outcome.movement.quantity,
            "previous_quantity": outcome.movement.previous_quantity,
            "new_quantity": outcome.movement.new_quantity,
        })),
    )
    .await;

    if outcome.product.is_low_stock() {
        crate::utils::flash::push(&cookies, Flash::warning(lang.t("Stock is at or below the minimum level")));
    }
    Ok(redirect_with(&cookies, &location, Flash::success(lang.t("Stock updated"))))
}

pub async fn product_barcode(
    _user: CurrentUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let product = catalog::get_product(&state.db, id).await?.ok_or(AppError::NotFound)?;
    if !product.has_barcode() {
        return Err(AppError::NotFound);
    }

    let svg = barcode::code128_svg(product.barcode_text()).map_err(|e| AppError::BadRequest(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response())
}

pub async fn categories_list(
    user: CurrentUser,
    cookies: Cookies,
    State(state): State<AppState>,
) -> Result<Html<String>, AppError> {
    let template = CategoriesTemplate {
        page: PageContext::for_user(&user, &cookies),
        categories: catalog::list_categories(&state.db).await?,
    };
    render(&template)
}

pub async fn category_form(user: CurrentUser, cookies: Cookies) -> Result<Html<String>, AppError> {
    let template = CategoryFormTemplate {
        page: PageContext::for_user(&user, &cookies),
        form: CategoryForm::default(),
    };
    render(&template)
}

pub async fn create_category(
    user: CurrentUser,
    cookies: Cookies,
    State(state): State<AppState>,
    meta: RequestMeta,
    Form(form): Form<CategoryForm>,
) -> Result<Response, AppError> {
    let name_en = forms::non_empty(Some(form.name_en.as_str()));
    let name_bg = forms::non_empty(Some(form.name_bg.as_str()));
    let (Some(name_en), Some(name_bg)) = (name_en, name_bg) else {
        let mut page = PageContext::for_user(&user, &cookies);
        page.flashes.push(Flash::danger(user.lang.t("Both names are required")));
        return Ok(render(&CategoryFormTemplate { page, form })?.into_response());
    };
    let description = forms::non_empty(Some(form.description.as_str()));

    let category = catalog::create_category(&state.db, &name_en, &name_bg, description.as_deref()).await?;
    audit::record(
        &state.db,
        &meta.actor(Some(user.id)),
        "category_created",
        Some("category"),
        Some(category.id),
        Some(json!({ "name_en": category.name_en, "name_bg": category.name_bg })),
    )
    .await;

    Ok(redirect_with(&cookies, "/inventory/categories", Flash::success(user.lang.t("Category created"))).into_response())
}

pub async fn api_search(
    _user: CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<ProductSummary>>, AppError> {
    let term = query.q.unwrap_or_default();
    if term.trim().chars().count() < SEARCH_MIN_CHARS {
        return Ok(Json(Vec::new()));
    }

    let products = catalog::search_products(&state.db, &term, SEARCH_LIMIT).await?;
    Ok(Json(products.into_iter().map(ProductSummary::from).collect()))
}
