//! Accounts, roles and seeding.

use thiserror::Error;
use uuid::Uuid;

use crate::{
    database::{unique_violation, Database},
    i18n::Language,
    models::{CreateUser, RoleName, User, UserListing, DEFAULT_CATEGORIES},
    utils::hash_password,
};

#[derive(Debug, Error)]
pub enum UserError {
    #[error("password must be at least {0} characters")]
    PasswordTooShort(usize),
    #[error("a user with this email already exists")]
    EmailTaken,
    #[error("a user with this username already exists")]
    UsernameTaken,
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub roles: usize,
    pub categories: usize,
}

fn check_password(password: &str, min_length: usize) -> Result<(), UserError> {
    if password.chars().count() < min_length {
        return Err(UserError::PasswordTooShort(min_length));
    }
    Ok(())
}

pub async fn create_user(db: &Database, input: CreateUser, min_password_length: usize) -> Result<User, UserError> {
    check_password(&input.password, min_password_length)?;

    let email = input.email.trim().to_lowercase();
    let username = input.username.trim().to_string();

    let taken = sqlx::query_as::<_, (bool, bool)>(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1), EXISTS(SELECT 1 FROM users WHERE username = $2)",
    )
    .bind(&email)
    .bind(&username)
    .fetch_one(db)
    .await?;
    match taken {
        (true, _) => return Err(UserError::EmailTaken),
        (_, true) => return Err(UserError::UsernameTaken),
        _ => {}
    }

    let password_hash = hash_password(&input.password)?;

    let mut tx = db.begin().await?;
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, email, username, password_hash, language)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&email)
    .bind(&username)
    .bind(&password_hash)
    .bind(input.language.code())
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| match unique_violation(&e).as_deref() {
        Some("users_email_key") => UserError::EmailTaken,
        Some("users_username_key") => UserError::UsernameTaken,
        _ => UserError::Database(e),
    })?;

    let role_id = ensure_role(&mut tx, input.role).await?;
    sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
        .bind(user.id)
        .bind(role_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    log::info!("created user {} with role {}", user.username, input.role);
    Ok(user)
}

async fn ensure_role(conn: &mut sqlx::PgConnection, role: RoleName) -> Result<Uuid, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        INSERT INTO roles (id, name, description) VALUES ($1, $2, $3)
        ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(role.as_str())
    .bind(role.description())
    .fetch_one(conn)
    .await
}

/// Creates the three roles and, on an empty table, the default categories.
pub async fn seed_defaults(db: &Database) -> Result<SeedReport, sqlx::Error> {
    let mut report = SeedReport::default();
    let mut tx = db.begin().await?;

    for role in RoleName::ALL {
        let inserted = sqlx::query(
            "INSERT INTO roles (id, name, description) VALUES ($1, $2, $3) ON CONFLICT (name) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(role.as_str())
        .bind(role.description())
        .execute(&mut *tx)
        .await?;
        report.roles += inserted.rows_affected() as usize;
    }

    let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM categories")
        .fetch_one(&mut *tx)
        .await?;
    if existing == 0 {
        for (name_en, name_bg, description) in DEFAULT_CATEGORIES {
            sqlx::query("INSERT INTO categories (id, name_en, name_bg, description) VALUES ($1, $2, $3, $4)")
                .bind(Uuid::new_v4())
                .bind(name_en)
                .bind(name_bg)
                .bind(description)
                .execute(&mut *tx)
                .await?;
            report.categories += 1;
        }
    }

    tx.commit().await?;
    Ok(report)
}

pub async fn list_users(db: &Database) -> Result<Vec<UserListing>, sqlx::Error> {
    sqlx::query_as::<_, UserListing>(
        r#"
        SELECT u.*, COALESCE(string_agg(r.name, ', ' ORDER BY r.name), '') AS role_names
        FROM users u
        LEFT JOIN user_roles ur ON ur.user_id = u.id
        LEFT JOIN roles r ON r.id = ur.role_id
        GROUP BY u.id
        ORDER BY u.username
        "#,
    )
    .fetch_all(db)
    .await
}

pub async fn find_by_email(db: &Database, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(email.trim().to_lowercase())
        .fetch_optional(db)
        .await
}

/// Login accepts either the username or the email address.
pub async fn find_for_login(db: &Database, login: &str) -> Result<Option<User>, sqlx::Error> {
    let login = login.trim();
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1 OR email = LOWER($1) LIMIT 1")
        .bind(login)
        .fetch_optional(db)
        .await
}

pub async fn find_by_id(db: &Database, id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn role_names(db: &Database, user_id: Uuid) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT r.name FROM roles r JOIN user_roles ur ON ur.role_id = r.id WHERE ur.user_id = $1 ORDER BY r.name",
    )
    .bind(user_id)
    .fetch_all(db)
    .await
}

pub async fn delete_user(db: &Database, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1").bind(id).execute(db).await?;
    Ok(result.rows_affected() > 0)
}

pub async fn record_login(db: &Database, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1").bind(id).execute(db).await?;
    Ok(())
}

pub async fn set_language(db: &Database, id: Uuid, language: Language) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET language = $2 WHERE id = $1")
        .bind(id)
        .bind(language.code())
        .execute(db)
        .await?;
    Ok(())
}

/// Stores a generated secret that becomes active only once confirmed.
pub async fn set_pending_totp(db: &Database, id: Uuid, secret: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET pending_totp_secret = $2 WHERE id = $1")
        .bind(id)
        .bind(secret)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn enable_totp(db: &Database, id: Uuid, secret: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET totp_secret = $2, pending_totp_secret = NULL WHERE id = $1")
        .bind(id)
        .bind(secret)
        .execute(db)
        .await?;
    Ok(())
}

pub async fn disable_totp(db: &Database, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET totp_secret = NULL, pending_totp_secret = NULL WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_length_counts_characters() {
        assert!(matches!(check_password("short", 12), Err(UserError::PasswordTooShort(12))));
        assert!(check_password("дванадесетзн", 12).is_ok());
        assert!(check_password("exactly-12ch", 12).is_ok());
    }
}
