use std::convert::Infallible;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, Uri},
    response::{IntoResponse, Redirect, Response},
};
use serde::Serialize;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    app::AppState,
    database::Database,
    error::AppError,
    i18n::{Language, LANGUAGE_COOKIE},
    models::RoleName,
    services::users,
    utils::{auth::SESSION_COOKIE, verify_token, TokenPurpose},
};

#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    /// UI language for this request, after cookie and browser negotiation.
    pub lang: Language,
    pub roles: Vec<String>,
    pub is_admin: bool,
    pub has_two_factor: bool,
}

/// Resolves the session cookie to an active user. Invalid or expired tokens,
/// deleted users and deactivated accounts all yield `None`.
pub async fn get_current_user(cookies: &Cookies, db: &Database, secret: &str) -> Option<CurrentUser> {
    let token = cookies.get(SESSION_COOKIE)?.value().to_string();
    let claims = verify_token(&token, secret, TokenPurpose::Session).ok()?;
    let user_id = claims.user_id()?;

    let user = match users::find_by_id(db, user_id).await {
        Ok(Some(user)) if user.is_active => user,
        Ok(_) => return None,
        Err(e) => {
            log::error!("failed to load session user {}: {}", user_id, e);
            return None;
        }
    };
    let roles = users::role_names(db, user.id).await.unwrap_or_default();

    Some(CurrentUser {
        id: user.id,
        is_admin: roles.iter().any(|r| r == RoleName::Admin.as_str()),
        has_two_factor: user.has_two_factor(),
        lang: user.language(),
        email: user.email,
        username: user.username,
        roles,
    })
}

pub fn login_redirect(uri: &Uri) -> Redirect {
    let next = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    Redirect::to(&format!("/auth/login?next={}", urlencoding::encode(next)))
}

fn negotiate(parts: &Parts, cookies: Option<&Cookies>, account: Option<Language>, default: Language) -> Language {
    let cookie = cookies.and_then(|c| c.get(LANGUAGE_COOKIE)).map(|c| c.value().to_string());
    let accept = parts.headers.get(header::ACCEPT_LANGUAGE).and_then(|v| v.to_str().ok());
    Language::resolve(cookie.as_deref(), account, accept, default)
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Redirect;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let cookies = Cookies::from_request_parts(parts, state)
            .await
            .map_err(|_| login_redirect(&parts.uri))?;

        let mut user = get_current_user(&cookies, &state.db, &state.config.jwt_secret)
            .await
            .ok_or_else(|| login_redirect(&parts.uri))?;
        user.lang = negotiate(parts, Some(&cookies), Some(user.lang), state.config.default_language);
        Ok(user)
    }
}

/// A signed-in user holding the Admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;
        if !user.is_admin {
            log::warn!("user {} denied admin page {}", user.username, parts.uri.path());
            return Err(AppError::Forbidden.into_response());
        }
        Ok(AdminUser(user))
    }
}

/// UI language for pages that do not require a session.
#[derive(Debug, Clone, Copy)]
pub struct Lang(pub Language);

#[async_trait]
impl FromRequestParts<AppState> for Lang {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let cookies = Cookies::from_request_parts(parts, state).await.ok();
        Ok(Lang(negotiate(parts, cookies.as_ref(), None, state.config.default_language)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::LOCATION;

    #[test]
    fn redirect_keeps_path_and_query() {
        let uri: Uri = "/inventory/products?page=2".parse().unwrap();
        let response = login_redirect(&uri).into_response();
        assert_eq!(
            response.headers().get(LOCATION).unwrap(),
            "/auth/login?next=%2Finventory%2Fproducts%3Fpage%3D2"
        );
    }
}
