//! Parsing helpers for HTML form fields, which arrive as optional strings.

use std::str::FromStr;

use rust_decimal::Decimal;
use uuid::Uuid;

/// Trimmed value, `None` when missing or blank.
pub fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Blank means "use the default"; anything else must parse.
pub fn parse_or<T: FromStr>(value: Option<&str>, default: T) -> Result<T, ()> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => v.parse().map_err(|_| ()),
        None => Ok(default),
    }
}

pub fn parse_decimal(value: Option<&str>) -> Result<Decimal, ()> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => Decimal::from_str(&v.replace(',', ".")).map_err(|_| ()),
        None => Ok(Decimal::ZERO),
    }
}

/// Select boxes post an empty string for "no selection".
pub fn parse_uuid(value: Option<&str>) -> Option<Uuid> {
    value.and_then(|v| Uuid::parse_str(v.trim()).ok())
}

/// HTML checkboxes send "on" (or nothing).
pub fn is_checked(value: Option<&str>) -> bool {
    matches!(value.map(str::trim), Some("on" | "true" | "1" | "yes"))
}

/// Only same-site absolute paths are accepted as post-login targets.
pub fn safe_next(next: Option<&str>) -> Option<String> {
    next.map(str::trim)
        .filter(|n| n.starts_with('/') && !n.starts_with("//") && !n.contains('\\'))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_fields_become_none() {
        assert_eq!(non_empty(Some("  ")), None);
        assert_eq!(non_empty(Some(" A-1 ")), Some("A-1".to_string()));
        assert_eq!(non_empty(None), None);
    }

    #[test]
    fn numbers_default_only_when_blank() {
        assert_eq!(parse_or(Some(""), 10), Ok(10));
        assert_eq!(parse_or(Some(" 7 "), 10), Ok(7));
        assert_eq!(parse_or::<i32>(Some("seven"), 10), Err(()));
    }

    #[test]
    fn decimals_accept_comma_separator() {
        assert_eq!(parse_decimal(Some("12,50")), Ok(Decimal::from_str("12.50").unwrap()));
        assert_eq!(parse_decimal(None), Ok(Decimal::ZERO));
        assert!(parse_decimal(Some("abc")).is_err());
    }

    #[test]
    fn checkboxes_and_selects() {
        assert!(is_checked(Some("on")));
        assert!(!is_checked(None));
        assert_eq!(parse_uuid(Some("")), None);
        assert!(parse_uuid(Some("67e55044-10b1-426f-9247-bb680e5fe0c8")).is_some());
    }

    #[test]
    fn next_must_be_local() {
        assert_eq!(safe_next(Some("/inventory/products?page=2")).as_deref(), Some("/inventory/products?page=2"));
        assert_eq!(safe_next(Some("//evil.example")), None);
        assert_eq!(safe_next(Some("https://evil.example")), None);
        assert_eq!(safe_next(Some("/\\evil.example")), None);
    }
}
