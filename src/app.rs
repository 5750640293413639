use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, FromRef},
    http::{header, HeaderValue},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_cookies::CookieManagerLayer;
use tower_http::{services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer};

use crate::{config::AppConfig, database::Database, handlers, middleware::RateLimiter};

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; img-src 'self' data:; style-src 'self' 'unsafe-inline'; script-src 'self' 'unsafe-inline'";

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Arc<AppConfig>,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(db: Database, config: AppConfig) -> Self {
        Self {
            db,
            config: Arc::new(config),
            limiter: Arc::new(RateLimiter::new()),
        }
    }
}

impl FromRef<AppState> for Database {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

pub fn create_router(state: AppState) -> Router {
    let static_dir = state.config.static_dir.clone();
    let production = state.config.is_production();

    let router = Router::new()
        .route("/", get(handlers::dashboard::index))
        .route("/dashboard", get(handlers::dashboard::dashboard))
        .route("/language/:lang", get(handlers::language::set_language))

        // Authentication
        .route("/auth/login", get(handlers::auth::login_page).post(handlers::auth::login))
        .route("/auth/verify-2fa", get(handlers::auth::verify_2fa_page).post(handlers::auth::verify_2fa))
        .route("/auth/logout", get(handlers::auth::logout))
        .route("/auth/register", get(handlers::auth::register).post(handlers::auth::register))
        .route("/auth/profile", get(handlers::auth::profile))
        .route("/auth/setup-2fa", get(handlers::auth::setup_2fa_page).post(handlers::auth::setup_2fa))
        .route("/auth/users", get(handlers::auth::users_list))

        // Inventory
        .route("/inventory/products", get(handlers::inventory::products_list))
        .route(
            "/inventory/product/add",
            get(handlers::inventory::product_form).post(handlers::inventory::create_product),
        )
        .route("/inventory/product/:id", get(handlers::inventory::product_detail))
        .route(
            "/inventory/product/:id/edit",
            get(handlers::inventory::product_edit_form).post(handlers::inventory::update_product),
        )
        .route("/inventory/product/:id/delete", post(handlers::inventory::delete_product))
        .route("/inventory/product/:id/stock", post(handlers::inventory::record_stock))
        .route("/inventory/product/:id/barcode", get(handlers::inventory::product_barcode))
        .route("/inventory/categories", get(handlers::inventory::categories_list))
        .route(
            "/inventory/category/add",
            get(handlers::inventory::category_form).post(handlers::inventory::create_category),
        )
        .route("/inventory/api/search", get(handlers::inventory::api_search))

        // Scanner
        .route("/scanner/", get(handlers::scanner::index))
        .route("/scanner/lookup", get(handlers::scanner::lookup_page).post(handlers::scanner::lookup))
        .route("/scanner/stock-in", get(handlers::scanner::stock_in_page).post(handlers::scanner::stock_in))
        .route("/scanner/stock-out", get(handlers::scanner::stock_out_page).post(handlers::scanner::stock_out))
        .route("/scanner/api/scan", post(handlers::scanner::api_scan))

        // Static files
        .nest_service("/static", ServeDir::new(static_dir))

        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CookieManagerLayer::new())
                .layer(DefaultBodyLimit::max(1024 * 1024)),
        )
        .with_state(state);

    if production {
        router.layer(
            ServiceBuilder::new()
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::STRICT_TRANSPORT_SECURITY,
                    HeaderValue::from_static("max-age=31536000; includeSubDomains"),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::X_FRAME_OPTIONS,
                    HeaderValue::from_static("SAMEORIGIN"),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::X_XSS_PROTECTION,
                    HeaderValue::from_static("1; mode=block"),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::CONTENT_SECURITY_POLICY,
                    HeaderValue::from_static(CONTENT_SECURITY_POLICY),
                )),
        )
    } else {
        router
    }
}
