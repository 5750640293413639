use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::i18n::Language;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: Uuid,
    pub name_en: String,
    pub name_bg: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn name(&self, language: &Language) -> &str {
        match language {
            Language::Bg => &self.name_bg,
            Language::En => &self.name_en,
        }
    }

    pub fn description_text(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }
}

/// Categories seeded by `ims-admin init`.
pub const DEFAULT_CATEGORIES: [(&str, &str, &str); 5] = [
    ("Electronics", "Електроника", "Electronic devices and components"),
    ("Tools", "Инструменти", "Tools and equipment"),
    ("Office Supplies", "Офис материали", "Office and stationery supplies"),
    ("Hardware", "Хардуер", "Hardware and construction materials"),
    ("Other", "Друго", "Miscellaneous items"),
];
