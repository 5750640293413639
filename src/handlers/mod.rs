pub mod auth;
pub mod dashboard;
pub mod inventory;
pub mod language;
pub mod scanner;

use askama::Template;
use axum::response::{Html, Redirect};
use tower_cookies::Cookies;

use crate::{
    error::AppError,
    i18n::Language,
    middleware::CurrentUser,
    utils::{flash, Flash},
};

/// Everything the shared layout needs: language, navigation state and the
/// flash messages queued by the previous request.
pub struct PageContext {
    pub lang: Language,
    pub user_name: String,
    pub is_authenticated: bool,
    pub is_admin: bool,
    pub flashes: Vec<Flash>,
}

impl PageContext {
    pub fn for_user(user: &CurrentUser, cookies: &Cookies) -> Self {
        Self {
            lang: user.lang,
            user_name: user.username.clone(),
            is_authenticated: true,
            is_admin: user.is_admin,
            flashes: flash::take(cookies),
        }
    }

    pub fn anonymous(lang: Language, cookies: &Cookies) -> Self {
        Self {
            lang,
            user_name: String::new(),
            is_authenticated: false,
            is_admin: false,
            flashes: flash::take(cookies),
        }
    }

    pub fn t(&self, key: &'static str) -> &'static str {
        self.lang.t(key)
    }

    pub fn lang_code(&self) -> &'static str {
        self.lang.code()
    }
}

pub fn render<T: Template>(template: &T) -> Result<Html<String>, AppError> {
    Ok(Html(template.render()?))
}

/// Queues `message` and redirects to `to`.
pub fn redirect_with(cookies: &Cookies, to: &str, message: Flash) -> Redirect {
    flash::push(cookies, message);
    Redirect::to(to)
}
