//! RFC 6238 time-based one-time passwords (SHA-1, 6 digits, 30 second step).

use data_encoding::BASE32_NOPAD;
use hmac::{Hmac, Mac};
use qrcode::{render::svg, QrCode};
use sha1::Sha1;
use thiserror::Error;

const DIGITS: u32 = 6;
const PERIOD: u64 = 30;
const WINDOW: i64 = 1;

#[derive(Debug, Error)]
pub enum TotpError {
    #[error("secret is not valid base32")]
    InvalidSecret,
    #[error("failed to render QR code: {0}")]
    QrCode(#[from] qrcode::types::QrError),
}

/// 160 random bits, base32 encoded for authenticator apps.
pub fn generate_secret() -> String {
    let bytes: [u8; 20] = rand::random();
    BASE32_NOPAD.encode(&bytes)
}

fn decode_secret(secret: &str) -> Result<Vec<u8>, TotpError> {
    let normalized: String = secret
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    BASE32_NOPAD
        .decode(normalized.as_bytes())
        .map_err(|_| TotpError::InvalidSecret)
}

fn hotp(key: &[u8], counter: u64) -> Result<u32, TotpError> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key).map_err(|_| TotpError::InvalidSecret)?;
    mac.update(&counter.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let offset = (digest[digest.len() - 1] & 0x0f) as usize;
    let binary = ((digest[offset] & 0x7f) as u32) << 24
        | (digest[offset + 1] as u32) << 16
        | (digest[offset + 2] as u32) << 8
        | digest[offset + 3] as u32;
    Ok(binary % 10u32.pow(DIGITS))
}

/// The code valid at `unix_time`, zero-padded.
pub fn code_at(secret: &str, unix_time: u64) -> Result<String, TotpError> {
    let key = decode_secret(secret)?;
    let code = hotp(&key, unix_time / PERIOD)?;
    Ok(format!("{:0width$}", code, width = DIGITS as usize))
}

/// Accepts the current step and one step either side to absorb clock drift.
pub fn verify(secret: &str, code: &str, unix_time: u64) -> bool {
    let code = code.trim();
    if code.len() != DIGITS as usize || !code.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let Ok(key) = decode_secret(secret) else {
        return false;
    };
    let step = (unix_time / PERIOD) as i64;
    (-WINDOW..=WINDOW).any(|offset| {
        let counter = step + offset;
        counter >= 0
            && hotp(&key, counter as u64)
                .map(|expected| format!("{:0width$}", expected, width = DIGITS as usize) == code)
                .unwrap_or(false)
    })
}

pub fn verify_now(secret: &str, code: &str) -> bool {
    verify(secret, code, chrono::Utc::now().timestamp().max(0) as u64)
}

pub fn provisioning_uri(secret: &str, account: &str, issuer: &str) -> String {
    format!(
        "otpauth://totp/{issuer}:{account}?secret={secret}&issuer={issuer}&algorithm=SHA1&digits={DIGITS}&period={PERIOD}",
        issuer = urlencoding::encode(issuer),
        account = urlencoding::encode(account),
    )
}

/// Inline SVG for the setup page.
pub fn qr_code_svg(uri: &str) -> Result<String, TotpError> {
    let code = QrCode::new(uri.as_bytes())?;
    Ok(code
        .render::<svg::Color>()
        .min_dimensions(200, 200)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build())
}
