//! Lightweight input validation helpers. Keep logic minimal and deterministic.

use crate::CoreError;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_CHAT_TEXT_LEN: usize = 2000;

/// Trim a required display name and bound its length.
pub fn validate_name(field: &str, s: &str) -> Result<String, CoreError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidInput(format!("{} must not be empty", field)));
    }
    if trimmed.chars().count() > 200 {
        return Err(CoreError::InvalidInput(format!("{} is too long", field)));
    }
    Ok(trimmed.to_string())
}

pub fn validate_password(s: &str) -> Result<(), CoreError> {
    if s.chars().count() < MIN_PASSWORD_LEN {
        return Err(CoreError::InvalidInput(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// A sale price, when present, must not exceed the list price.
pub fn validate_pricing(price: u64, sale_price: Option<u64>) -> Result<(), CoreError> {
    if price == 0 {
        return Err(CoreError::InvalidInput("price must be positive".into()));
    }
    if sale_price.is_some_and(|s| s > price) {
        return Err(CoreError::InvalidInput(
            "sale price must not exceed price".into(),
        ));
    }
    Ok(())
}

/// Accept http(s) URLs only; used for image and logo links.
pub fn validate_media_url(s: &str) -> Result<(), CoreError> {
    let trimmed = s.trim();
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(CoreError::InvalidInput(format!(
            "'{}' must start with http:// or https://",
            trimmed
        )));
    }
    if trimmed.len() > 2048 {
        return Err(CoreError::InvalidInput("url too long".into()));
    }
    Ok(())
}

/// Phone numbers: digits with an optional leading '+', spaces and dashes ignored.
pub fn validate_phone(s: &str) -> Result<String, CoreError> {
    let compact: String = s.chars().filter(|c| !matches!(c, ' ' | '-' | '.')).collect();
    let digits = compact.strip_prefix('+').unwrap_or(&compact);
    if digits.len() < 8 || digits.len() > 15 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(CoreError::InvalidInput("invalid phone number".into()));
    }
    Ok(compact)
}

pub fn validate_chat_text(s: &str) -> Result<String, CoreError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidInput("message must not be empty".into()));
    }
    if trimmed.chars().count() > MAX_CHAT_TEXT_LEN {
        return Err(CoreError::InvalidInput("message is too long".into()));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed_and_required() {
        assert_eq!(validate_name("name", "  Lan ").unwrap(), "Lan");
        assert!(validate_name("name", "   ").is_err());
    }

    #[test]
    fn pricing_rules() {
        assert!(validate_pricing(100, None).is_ok());
        assert!(validate_pricing(100, Some(100)).is_ok());
        assert!(validate_pricing(100, Some(101)).is_err());
        assert!(validate_pricing(0, None).is_err());
    }

    #[test]
    fn phone_normalization() {
        assert_eq!(validate_phone("090 123-4567").unwrap(), "0901234567");
        assert_eq!(validate_phone("+84 90 123 4567").unwrap(), "+84901234567");
        assert!(validate_phone("12ab").is_err());
    }

    #[test]
    fn media_urls_need_http_scheme() {
        assert!(validate_media_url("https://cdn.example.com/a.png").is_ok());
        assert!(validate_media_url("ftp://example.com/a.png").is_err());
    }

    #[test]
    fn chat_text_bounds() {
        assert_eq!(validate_chat_text("  hi ").unwrap(), "hi");
        assert!(validate_chat_text("  ").is_err());
        assert!(validate_chat_text(&"x".repeat(MAX_CHAT_TEXT_LEN + 1)).is_err());
    }
}
