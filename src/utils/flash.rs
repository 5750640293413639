//! One-shot messages carried across a redirect in a cookie.

use serde::{Deserialize, Serialize};
use tower_cookies::{Cookie, Cookies};

const FLASH_COOKIE: &str = "flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashKind {
    Success,
    Info,
    Warning,
    Danger,
}

impl FlashKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashKind::Success => "success",
            FlashKind::Info => "info",
            FlashKind::Warning => "warning",
            FlashKind::Danger => "danger",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub kind: FlashKind,
    pub message: String,
}

impl Flash {
    pub fn new(kind: FlashKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(FlashKind::Success, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(FlashKind::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(FlashKind::Warning, message)
    }

    pub fn danger(message: impl Into<String>) -> Self {
        Self::new(FlashKind::Danger, message)
    }

    pub fn css_class(&self) -> &'static str {
        self.kind.as_str()
    }
}

fn encode(flashes: &[Flash]) -> String {
    let json = serde_json::to_string(flashes).unwrap_or_else(|_| "[]".to_string());
    urlencoding::encode(&json).into_owned()
}

fn decode(raw: &str) -> Vec<Flash> {
    urlencoding::decode(raw)
        .ok()
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default()
}

/// Queues a message for the next rendered page.
pub fn push(cookies: &Cookies, flash: Flash) {
    let mut pending = cookies
        .get(FLASH_COOKIE)
        .map(|c| decode(c.value()))
        .unwrap_or_default();
    pending.push(flash);

    let cookie = Cookie::build((FLASH_COOKIE, encode(&pending)))
        .path("/")
        .http_only(true)
        .build();
    cookies.add(cookie);
}

/// Removes and returns every queued message.
pub fn take(cookies: &Cookies) -> Vec<Flash> {
    let Some(cookie) = cookies.get(FLASH_COOKIE) else {
        return Vec::new();
    };
    let flashes = decode(cookie.value());
    cookies.remove(Cookie::build(FLASH_COOKIE).path("/").build());
    flashes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_survives_cookie_unsafe_characters() {
        let flashes = vec![
            Flash::success("Added 3 units to Cable; New stock: 8"),
            Flash::warning("Внимание: \"Cable\" is now low on stock!"),
        ];
        let raw = encode(&flashes);
        assert!(!raw.contains(';'));
        assert!(!raw.contains('"'));
        assert_eq!(decode(&raw), flashes);
    }

    #[test]
    fn garbage_decodes_to_nothing() {
        assert!(decode("%%%not-json").is_empty());
        assert!(decode("").is_empty());
    }

    #[test]
    fn css_class_matches_kind() {
        assert_eq!(Flash::danger("x").css_class(), "danger");
        assert_eq!(Flash::info("x").css_class(), "info");
    }
}
