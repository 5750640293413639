use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleName {
    Admin,
    Manager,
    Staff,
}

impl RoleName {
    pub const ALL: [RoleName; 3] = [RoleName::Admin, RoleName::Manager, RoleName::Staff];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleName::Admin => "Admin",
            RoleName::Manager => "Manager",
            RoleName::Staff => "Staff",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RoleName::Admin => "Administrator with full access",
            RoleName::Manager => "Manager with inventory management access",
            RoleName::Staff => "Staff with basic access",
        }
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(RoleName::Admin),
            "manager" => Ok(RoleName::Manager),
            "staff" => Ok(RoleName::Staff),
            other => Err(format!("unknown role {other:?}, expected admin, manager or staff")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("ADMIN".parse::<RoleName>(), Ok(RoleName::Admin));
        assert_eq!("staff".parse::<RoleName>(), Ok(RoleName::Staff));
        assert!("owner".parse::<RoleName>().is_err());
    }
}
