use barcoders::generators::svg::SVG;
use barcoders::sym::code128::Code128;
use thiserror::Error;

const HEIGHT: u32 = 80;
// Prefix selecting Code128 character set B (printable ASCII).
const CHARSET_B: char = 'Ɓ';

#[derive(Debug, Error)]
pub enum BarcodeError {
    #[error("barcode value is empty")]
    Empty,
    #[error("barcode value {0:?} cannot be encoded as Code128")]
    Unencodable(String),
}

/// Renders `value` as a Code128 barcode in SVG.
pub fn code128_svg(value: &str) -> Result<String, BarcodeError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(BarcodeError::Empty);
    }
    if !value.chars().all(|c| c.is_ascii_graphic() || c == ' ') {
        return Err(BarcodeError::Unencodable(value.to_string()));
    }

    let barcode = Code128::new(format!("{CHARSET_B}{value}"))
        .map_err(|_| BarcodeError::Unencodable(value.to_string()))?;
    let encoded = barcode.encode();
    SVG::new(HEIGHT)
        .generate(&encoded[..])
        .map_err(|_| BarcodeError::Unencodable(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_svg() {
        let svg = code128_svg("3800123456789").unwrap();
        assert!(svg.contains("<svg"));
    }

    #[test]
    fn rejects_empty_and_non_ascii() {
        assert!(matches!(code128_svg("   "), Err(BarcodeError::Empty)));
        assert!(matches!(code128_svg("кабел"), Err(BarcodeError::Unencodable(_))));
    }
}
