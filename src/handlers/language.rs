use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::Redirect,
};
use tower_cookies::{Cookie, Cookies};

use crate::{
    app::AppState,
    i18n::{Language, LANGUAGE_COOKIE},
    middleware::get_current_user,
    services::users,
};

const ONE_YEAR_SECS: i64 = 365 * 24 * 60 * 60;

/// Local part of the Referer, so the switch lands back on the same page.
fn back_to(headers: &HeaderMap) -> String {
    headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .and_then(|referer| referer.parse::<axum::http::Uri>().ok())
        .and_then(|uri| uri.path_and_query().map(|pq| pq.as_str().to_string()))
        .filter(|path| path.starts_with('/') && !path.starts_with("//"))
        .unwrap_or_else(|| "/".to_string())
}

pub async fn set_language(
    Path(code): Path<String>,
    cookies: Cookies,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Redirect {
    let Some(language) = Language::from_code(&code) else {
        return Redirect::to(&back_to(&headers));
    };

    cookies.add(
        Cookie::build((LANGUAGE_COOKIE, language.code()))
            .path("/")
            .max_age(time::Duration::seconds(ONE_YEAR_SECS))
            .build(),
    );

    if let Some(user) = get_current_user(&cookies, &state.db, &state.config.jwt_secret).await {
        if let Err(e) = users::set_language(&state.db, user.id, language).await {
            log::warn!("failed to store language for {}: {}", user.username, e);
        }
    }

    Redirect::to(&back_to(&headers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn referer_is_reduced_to_local_path() {
        let mut headers = HeaderMap::new();
        headers.insert(header::REFERER, HeaderValue::from_static("http://localhost:8000/inventory/products?page=3"));
        assert_eq!(back_to(&headers), "/inventory/products?page=3");
    }

    #[test]
    fn missing_referer_goes_home() {
        assert_eq!(back_to(&HeaderMap::new()), "/");
    }
}
