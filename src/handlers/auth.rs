use askama::Template;
use axum::{
    extract::{Form, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use chrono::Duration;
use serde::Deserialize;
use serde_json::json;
use tower_cookies::{cookie::SameSite, Cookie, Cookies};

use crate::{
    app::AppState,
    error::AppError,
    filters,
    middleware::{
        auth::get_current_user,
        rate_limit::{LOGIN, TWO_FACTOR},
        AdminUser, CurrentUser, Lang, RequestMeta,
    },
    models::{AuditLog, User, UserListing},
    services::{audit, users},
    utils::{
        auth::{PENDING_2FA_COOKIE, SESSION_COOKIE},
        create_token, forms, totp, verify_password, verify_token, Claims, Flash, TokenPurpose,
    },
};

use super::{redirect_with, render, PageContext};

const PENDING_2FA_MINUTES: i64 = 5;
const REMEMBER_ME_DAYS: i64 = 30;

#[derive(Template)]
#[template(path = "auth/login.html")]
struct LoginTemplate {
    page: PageContext,
    next: String,
}

#[derive(Template)]
#[template(path = "auth/verify_2fa.html")]
struct Verify2faTemplate {
    page: PageContext,
    next: String,
}

#[derive(Template)]
#[template(path = "auth/profile.html")]
struct ProfileTemplate {
    page: PageContext,
    user: User,
    roles: String,
    activity: Vec<AuditLog>,
}

#[derive(Template)]
#[template(path = "auth/setup_2fa.html")]
struct Setup2faTemplate {
    page: PageContext,
    enabled: bool,
    secret: String,
    qr_svg: String,
}

#[derive(Template)]
#[template(path = "auth/users.html")]
struct UsersTemplate {
    page: PageContext,
    users: Vec<UserListing>,
}

#[derive(Deserialize)]
pub struct NextQuery {
    next: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginForm {
    username: String,
    password: String,
    remember_me: Option<String>,
    next: Option<String>,
}

#[derive(Deserialize)]
pub struct CodeForm {
    code: Option<String>,
    next: Option<String>,
}

fn login_location(next: Option<&str>) -> String {
    match forms::safe_next(next) {
        Some(next) => format!("/auth/login?next={}", urlencoding::encode(&next)),
        None => "/auth/login".to_string(),
    }
}

fn session_cookie(name: &'static str, token: String, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((name, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

fn remove_cookie(cookies: &Cookies, name: &'static str) {
    cookies.remove(Cookie::build(name).path("/").build());
}

/// Issues the session cookie and records the login.
async fn start_session(state: &AppState, cookies: &Cookies, user: &User, remember: bool) -> Result<(), AppError> {
    let lifetime = if remember {
        Duration::days(REMEMBER_ME_DAYS).num_seconds()
    } else {
        state.config.session_lifetime_secs
    };

    let mut claims = Claims::new(user.id, user.email.clone(), TokenPurpose::Session, Duration::seconds(lifetime));
    claims.remember = remember;
    let token = create_token(&claims, &state.config.jwt_secret)
        .map_err(|e| AppError::Internal(format!("failed to sign session token: {e}")))?;

    cookies.add(session_cookie(SESSION_COOKIE, token, lifetime, state.config.cookie_secure));

    if let Err(e) = users::record_login(&state.db, user.id).await {
        log::warn!("failed to update last login for {}: {}", user.username, e);
    }
    Ok(())
}

pub async fn login_page(
    cookies: Cookies,
    State(state): State<AppState>,
    Lang(lang): Lang,
    Query(query): Query<NextQuery>,
) -> Result<Response, AppError> {
    if get_current_user(&cookies, &state.db, &state.config.jwt_secret).await.is_some() {
        return Ok(Redirect::to("/dashboard").into_response());
    }

    let template = LoginTemplate {
        page: PageContext::anonymous(lang, &cookies),
        next: forms::safe_next(query.next.as_deref()).unwrap_or_default(),
    };
    Ok(render(&template)?.into_response())
}

pub async fn login(
    cookies: Cookies,
    State(state): State<AppState>,
    Lang(lang): Lang,
    meta: RequestMeta,
    Form(form): Form<LoginForm>,
) -> Result<Redirect, AppError> {
    let back = login_location(form.next.as_deref());

    if !state.limiter.check("login", meta.client_key(), LOGIN) {
        log::warn!("login rate limit hit for {}", meta.client_key());
        return Err(AppError::RateLimited);
    }

    let user = users::find_for_login(&state.db, &form.username).await?;
    let user = match user {
        Some(user) if verify_password(&form.password, &user.password_hash).unwrap_or(false) => user,
        _ => {
            log::warn!("failed login for {:?} from {}", form.username, meta.client_key());
            audit::record(
                &state.db,
                &meta.actor(None),
                "login_failed",
                None,
                None,
                Some(json!({ "login": form.username })),
            )
            .await;
            return Ok(redirect_with(&cookies, &back, Flash::danger(lang.t("Invalid username or password"))));
        }
    };

    if !user.is_active {
        audit::record(
            &state.db,
            &meta.actor(Some(user.id)),
            "login_failed",
            Some("user"),
            Some(user.id),
            Some(json!({ "reason": "inactive" })),
        )
        .await;
        return Ok(redirect_with(&cookies, &back, Flash::danger(lang.t("This account is disabled"))));
    }

    let remember = forms::is_checked(form.remember_me.as_deref());
    let next = forms::safe_next(form.next.as_deref());

    if user.has_two_factor() {
        let mut claims = Claims::new(
            user.id,
            user.email.clone(),
            TokenPurpose::TwoFactor,
            Duration::minutes(PENDING_2FA_MINUTES),
        );
        claims.remember = remember;
        let token = create_token(&claims, &state.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("failed to sign 2FA token: {e}")))?;
        cookies.add(session_cookie(
            PENDING_2FA_COOKIE,
            token,
            Duration::minutes(PENDING_2FA_MINUTES).num_seconds(),
            state.config.cookie_secure,
        ));

        audit::record(&state.db, &meta.actor(Some(user.id)), "login_2fa_required", Some("user"), Some(user.id), None)
            .await;
        let location = match next {
            Some(next) => format!("/auth/verify-2fa?next={}", urlencoding::encode(&next)),
            None => "/auth/verify-2fa".to_string(),
        };
        return Ok(Redirect::to(&location));
    }

    start_session(&state, &cookies, &user, remember).await?;
    audit::record(&state.db, &meta.actor(Some(user.id)), "login_success", Some("user"), Some(user.id), None).await;
    log::info!("user {} logged in", user.username);

    Ok(Redirect::to(next.as_deref().unwrap_or("/dashboard")))
}

/// Claims from a valid pending-2FA cookie.
fn pending_claims(cookies: &Cookies, secret: &str) -> Option<Claims> {
    let token = cookies.get(PENDING_2FA_COOKIE)?.value().to_string();
    verify_token(&token, secret, TokenPurpose::TwoFactor).ok()
}

pub async fn verify_2fa_page(
    cookies: Cookies,
    State(state): State<AppState>,
    Lang(lang): Lang,
    Query(query): Query<NextQuery>,
) -> Result<Response, AppError> {
    if pending_claims(&cookies, &state.config.jwt_secret).is_none() {
        return Ok(redirect_with(&cookies, "/auth/login", Flash::warning(lang.t("Please log in again"))).into_response());
    }

    let template = Verify2faTemplate {
        page: PageContext::anonymous(lang, &cookies),
        next: forms::safe_next(query.next.as_deref()).unwrap_or_default(),
    };
    Ok(render(&template)?.into_response())
}

pub async fn verify_2fa(
    cookies: Cookies,
    State(state): State<AppState>,
    Lang(lang): Lang,
    meta: RequestMeta,
    Form(form): Form<CodeForm>,
) -> Result<Redirect, AppError> {
    if !state.limiter.check("verify_2fa", meta.client_key(), TWO_FACTOR) {
        log::warn!("2FA rate limit hit for {}", meta.client_key());
        return Err(AppError::RateLimited);
    }

    let Some(claims) = pending_claims(&cookies, &state.config.jwt_secret) else {
        return Ok(redirect_with(&cookies, "/auth/login", Flash::warning(lang.t("Please log in again"))));
    };
    let user = match claims.user_id() {
        Some(id) => users::find_by_id(&state.db, id).await?,
        None => None,
    };
    let Some(user) = user.filter(|u| u.is_active) else {
        remove_cookie(&cookies, PENDING_2FA_COOKIE);
        return Ok(redirect_with(&cookies, "/auth/login", Flash::warning(lang.t("Please log in again"))));
    };

    let code = form.code.as_deref().unwrap_or("");
    let valid = user
        .totp_secret
        .as_deref()
        .is_some_and(|secret| totp::verify_now(secret, code));

    if !valid {
        audit::record(&state.db, &meta.actor(Some(user.id)), "login_2fa_failed", Some("user"), Some(user.id), None)
            .await;
        let back = match forms::safe_next(form.next.as_deref()) {
            Some(next) => format!("/auth/verify-2fa?next={}", urlencoding::encode(&next)),
            None => "/auth/verify-2fa".to_string(),
        };
        return Ok(redirect_with(&cookies, &back, Flash::danger(lang.t("Invalid verification code"))));
    }

    remove_cookie(&cookies, PENDING_2FA_COOKIE);
    start_session(&state, &cookies, &user, claims.remember).await?;
    audit::record(&state.db, &meta.actor(Some(user.id)), "login_2fa_success", Some("user"), Some(user.id), None).await;
    log::info!("user {} logged in with 2FA", user.username);

    let next = forms::safe_next(form.next.as_deref());
    Ok(Redirect::to(next.as_deref().unwrap_or("/dashboard")))
}

pub async fn logout(
    cookies: Cookies,
    State(state): State<AppState>,
    Lang(lang): Lang,
    meta: RequestMeta,
) -> Redirect {
    if let Some(user) = get_current_user(&cookies, &state.db, &state.config.jwt_secret).await {
        audit::record(&state.db, &meta.actor(Some(user.id)), "logout", Some("user"), Some(user.id), None).await;
        log::info!("user {} logged out", user.username);
    }
    remove_cookie(&cookies, SESSION_COOKIE);
    remove_cookie(&cookies, PENDING_2FA_COOKIE);
    redirect_with(&cookies, "/auth/login", Flash::info(lang.t("You have been logged out")))
}

/// Self-service sign-up is closed; accounts come from `ims-admin create-user`.
pub async fn register(cookies: Cookies, Lang(lang): Lang) -> Redirect {
    redirect_with(
        &cookies,
        "/auth/login",
        Flash::info(lang.t("Registration is disabled. Ask an administrator for an account.")),
    )
}

pub async fn profile(
    user: CurrentUser,
    cookies: Cookies,
    State(state): State<AppState>,
) -> Result<Html<String>, AppError> {
    let account = users::find_by_id(&state.db, user.id).await?.ok_or(AppError::NotFound)?;
    let activity = audit::recent_for_user(&state.db, user.id, 10).await?;

    let template = ProfileTemplate {
        page: PageContext::for_user(&user, &cookies),
        roles: user.roles.join(", "),
        user: account,
        activity,
    };
    render(&template)
}

/// Where an account stands in 2FA enrolment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Enrollment {
    Enabled,
    /// Generated but not yet confirmed with a code; shown again until it is.
    Pending(String),
    NotStarted,
}

impl Enrollment {
    fn of(account: &User) -> Self {
        match (&account.totp_secret, &account.pending_totp_secret) {
            (Some(_), _) => Enrollment::Enabled,
            (None, Some(secret)) => Enrollment::Pending(secret.clone()),
            (None, None) => Enrollment::NotStarted,
        }
    }
}

pub async fn setup_2fa_page(
    user: CurrentUser,
    cookies: Cookies,
    State(state): State<AppState>,
) -> Result<Html<String>, AppError> {
    let account = users::find_by_id(&state.db, user.id).await?.ok_or(AppError::NotFound)?;

    let secret = match Enrollment::of(&account) {
        Enrollment::Enabled => None,
        Enrollment::Pending(secret) => Some(secret),
        Enrollment::NotStarted => {
            let secret = totp::generate_secret();
            users::set_pending_totp(&state.db, user.id, &secret).await?;
            Some(secret)
        }
    };

    let qr_svg = match &secret {
        Some(secret) => {
            let uri = totp::provisioning_uri(secret, &account.email, &state.config.totp_issuer);
            totp::qr_code_svg(&uri).map_err(|e| AppError::Internal(e.to_string()))?
        }
        None => String::new(),
    };

    let template = Setup2faTemplate {
        page: PageContext::for_user(&user, &cookies),
        enabled: account.has_two_factor(),
        secret: secret.unwrap_or_default(),
        qr_svg,
    };
    render(&template)
}

pub async fn setup_2fa(
    user: CurrentUser,
    cookies: Cookies,
    State(state): State<AppState>,
    meta: RequestMeta,
    Form(form): Form<CodeForm>,
) -> Result<Redirect, AppError> {
    let lang = user.lang;
    let account = users::find_by_id(&state.db, user.id).await?.ok_or(AppError::NotFound)?;
    let actor = meta.actor(Some(user.id));

    if account.has_two_factor() {
        users::disable_totp(&state.db, user.id).await?;
        audit::record(&state.db, &actor, "2fa_disabled", Some("user"), Some(user.id), None).await;
        log::info!("user {} disabled 2FA", user.username);
        return Ok(redirect_with(&cookies, "/auth/profile", Flash::success(lang.t("Two-factor authentication disabled"))));
    }

    let Some(secret) = account.pending_totp_secret else {
        return Ok(Redirect::to("/auth/setup-2fa"));
    };
    let code = form.code.as_deref().unwrap_or("");
    if !totp::verify_now(&secret, code) {
        return Ok(redirect_with(&cookies, "/auth/setup-2fa", Flash::danger(lang.t("Invalid verification code"))));
    }

    users::enable_totp(&state.db, user.id, &secret).await?;
    audit::record(&state.db, &actor, "2fa_enabled", Some("user"), Some(user.id), None).await;
    log::info!("user {} enabled 2FA", user.username);
    Ok(redirect_with(&cookies, "/auth/profile", Flash::success(lang.t("Two-factor authentication enabled"))))
}

pub async fn users_list(
    AdminUser(user): AdminUser,
    cookies: Cookies,
    State(state): State<AppState>,
) -> Result<Html<String>, AppError> {
    let template = UsersTemplate {
        page: PageContext::for_user(&user, &cookies),
        users: users::list_users(&state.db).await?,
    };
    render(&template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn account(totp_secret: Option<&str>, pending: Option<&str>) -> User {
        User {
            id: Uuid::new_v4(),
            email: "clerk@example.com".into(),
            username: "clerk".into(),
            password_hash: String::new(),
            is_active: true,
            totp_secret: totp_secret.map(str::to_string),
            pending_totp_secret: pending.map(str::to_string),
            language: "en".into(),
            created_at: Utc::now(),
            last_login: None,
        }
    }

    #[test]
    fn enrollment_reads_without_consuming_the_account() {
        let pending = account(None, Some("JBSWY3DPEHPK3PXP"));
        assert_eq!(Enrollment::of(&pending), Enrollment::Pending("JBSWY3DPEHPK3PXP".into()));
        assert!(!pending.has_two_factor());
        assert_eq!(pending.pending_totp_secret.as_deref(), Some("JBSWY3DPEHPK3PXP"));
    }

    #[test]
    fn enabled_account_ignores_leftover_pending_secret() {
        assert_eq!(Enrollment::of(&account(Some("A"), Some("B"))), Enrollment::Enabled);
        assert_eq!(Enrollment::of(&account(None, None)), Enrollment::NotStarted);
    }

    #[test]
    fn login_location_keeps_only_local_next() {
        assert_eq!(login_location(Some("/inventory/products")), "/auth/login?next=%2Finventory%2Fproducts");
        assert_eq!(login_location(Some("https://evil.example")), "/auth/login");
        assert_eq!(login_location(None), "/auth/login");
    }
}
