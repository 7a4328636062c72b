//! Input validation for phone numbers and submitted codes.

use crate::errors::AuthError;

const MIN_DIGITS: usize = 8;
const MAX_DIGITS: usize = 15;

/// Cleans a phone number and checks its shape.
///
/// Spaces, dashes, dots and parentheses are removed. A single leading `+` is
/// kept. What remains must be 8 to 15 ASCII digits.
pub fn normalize(raw: &str) -> Result<String, AuthError> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    let (plus, digits) = match cleaned.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AuthError::Validation(
            "Invalid phone number format".to_string(),
        ));
    }
    if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits.len()) {
        return Err(AuthError::Validation(format!(
            "Phone number must have between {} and {} digits",
            MIN_DIGITS, MAX_DIGITS
        )));
    }

    Ok(if plus {
        format!("+{}", digits)
    } else {
        digits.to_string()
    })
}

/// The digits of a normalized number, without the leading `+`.
pub fn digits(normalized: &str) -> &str {
    normalized.strip_prefix('+').unwrap_or(normalized)
}

pub fn validate_otp_format(otp: &str, length: usize) -> Result<(), AuthError> {
    if otp.len() == length && otp.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(AuthError::Validation(format!(
            "OTP must be exactly {} digits",
            length
        )))
    }
}
