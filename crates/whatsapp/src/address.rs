use thiserror::Error;

const MIN_DIGITS: usize = 10;
const MAX_DIGITS: usize = 15;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address is blank")]
    Blank,
    #[error("address `{0}` contains characters other than digits")]
    NotNumeric(String),
    #[error("address `{0}` is not a valid international number")]
    BadLength(String),
}

/// Normalises a phone number to international digits without `+`.
///
/// Separators (spaces, dashes, dots, parentheses) are dropped. A `+` or `00` prefix marks an
/// international number; a single leading `0` is a national trunk prefix and is replaced by
/// `country_code`. `01712-345678` and `+880 1712 345678` both become `8801712345678`.
pub fn normalize_address(raw: &str, country_code: &str) -> Result<String, AddressError> {
    let compact: String = raw
        .trim()
        .chars()
        .filter(|ch| !matches!(ch, ' ' | '-' | '.' | '(' | ')'))
        .collect();
    if compact.is_empty() {
        return Err(AddressError::Blank);
    }

    let (international, digits) = if let Some(rest) = compact.strip_prefix('+') {
        (true, rest)
    } else if let Some(rest) = compact.strip_prefix("00") {
        (true, rest)
    } else {
        (false, compact.as_str())
    };
    if digits.is_empty() || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(AddressError::NotNumeric(raw.trim().to_owned()));
    }

    let normalized = if international || digits.starts_with(country_code) {
        digits.to_owned()
    } else if let Some(national) = digits.strip_prefix('0') {
        format!("{country_code}{national}")
    } else {
        format!("{country_code}{digits}")
    };

    if !(MIN_DIGITS..=MAX_DIGITS).contains(&normalized.len()) {
        return Err(AddressError::BadLength(raw.trim().to_owned()));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::{normalize_address, AddressError};

    #[test]
    fn local_and_international_forms_converge() {
        for raw in ["01712345678", "+880 1712-345678", "8801712345678", "00880 1712 345678", "1712345678"] {
            assert_eq!(normalize_address(raw, "880").as_deref(), Ok("8801712345678"), "{raw}");
        }
    }

    #[test]
    fn foreign_numbers_keep_their_country_code() {
        assert_eq!(normalize_address("+91 98765 43210", "880").as_deref(), Ok("919876543210"));
    }

    #[test]
    fn unusable_numbers_are_rejected() {
        assert_eq!(normalize_address("  ", "880"), Err(AddressError::Blank));
        assert_eq!(
            normalize_address("call me", "880"),
            Err(AddressError::NotNumeric("call me".to_owned()))
        );
        assert_eq!(normalize_address("0171", "880"), Err(AddressError::BadLength("0171".to_owned())));
    }
}
