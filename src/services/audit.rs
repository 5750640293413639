//! Audit trail writer. Entries are best effort: a failed insert is logged and
//! never fails the request that triggered it.

use serde_json::Value;
use uuid::Uuid;

use crate::{database::Database, models::AuditLog};

const USER_AGENT_MAX: usize = 255;

/// Who performed an action, passed explicitly into every write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl Actor {
    /// Command-line and other non-request callers.
    pub fn system() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

pub async fn record(
    db: &Database,
    actor: &Actor,
    action: &str,
    resource_type: Option<&str>,
    resource_id: Option<Uuid>,
    details: Option<Value>,
) {
    let result = sqlx::query(
        r#"
        INSERT INTO audit_logs (id, user_id, action, resource_type, resource_id, details, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(Uuid::now_v7())
    .bind(actor.user_id)
    .bind(action)
    .bind(resource_type)
    .bind(resource_id)
    .bind(details.map(sqlx::types::Json))
    .bind(actor.ip_address.as_deref())
    .bind(actor.user_agent.as_deref().map(|ua| truncate(ua, USER_AGENT_MAX)))
    .execute(db)
    .await;

    if let Err(e) = result {
        log::warn!("failed to write audit entry {}: {}", action, e);
    }
}

pub async fn recent_for_user(db: &Database, user_id: Uuid, limit: i64) -> Result<Vec<AuditLog>, sqlx::Error> {
    sqlx::query_as::<_, AuditLog>(
        "SELECT * FROM audit_logs WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(db)
    .await
}
