//! Phone number normalization for M-Pesa
//!
//! The provider only accepts the international form `2547XXXXXXXX` / `2541XXXXXXXX`.
//! Normalization never rejects input; callers check the result with
//! [`is_valid_mobile_number`] before using it.

use regex::Regex;
use std::sync::LazyLock;

pub const COUNTRY_CODE: &str = "254";

static MOBILE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^254[17]\d{8}$").expect("valid phone pattern"));

/// Convert `0712 345 678`, `712345678`, `+254-712-345678` etc. into `254712345678`
pub fn normalize_phone_number(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '+')
        .collect();

    if let Some(rest) = cleaned.strip_prefix('0') {
        format!("{}{}", COUNTRY_CODE, rest)
    } else if cleaned.starts_with(COUNTRY_CODE) {
        cleaned
    } else {
        format!("{}{}", COUNTRY_CODE, cleaned)
    }
}

/// True when `phone` is a normalized Kenyan mobile number
pub fn is_valid_mobile_number(phone: &str) -> bool {
    MOBILE_NUMBER.is_match(phone)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_format() {
        assert_eq!(normalize_phone_number("0712345678"), "254712345678");
        assert_eq!(normalize_phone_number("0112345678"), "254112345678");
    }

    #[test]
    fn test_bare_subscriber_number() {
        assert_eq!(normalize_phone_number("712345678"), "254712345678");
        assert_eq!(normalize_phone_number("112345678"), "254112345678");
    }

    #[test]
    fn test_international_format() {
        assert_eq!(normalize_phone_number("254712345678"), "254712345678");
        assert_eq!(normalize_phone_number("+254712345678"), "254712345678");
        assert_eq!(normalize_phone_number("+254 712-345 678"), "254712345678");
    }

    #[test]
    fn test_separators_are_stripped() {
        assert_eq!(normalize_phone_number(" 0712 345 678 "), "254712345678");
        assert_eq!(normalize_phone_number("0712-345-678"), "254712345678");
    }

    #[test]
    fn test_normalization_is_idempotent() {
        for input in [
            "0712345678",
            "712345678",
            "+254712345678",
            "254112345678",
            "0712 345 678",
        ] {
            let once = normalize_phone_number(input);
            assert_eq!(normalize_phone_number(&once), once, "input {}", input);
            assert!(is_valid_mobile_number(&once), "input {}", input);
        }
    }

    #[test]
    fn test_invalid_numbers_fail_validation() {
        for input in ["0812345678", "07123456", "071234567890", "2547123456", "abc", ""] {
            let normalized = normalize_phone_number(input);
            assert!(
                !is_valid_mobile_number(&normalized),
                "{} normalized to {} should be invalid",
                input,
                normalized
            );
        }
    }
}
