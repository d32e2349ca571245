//! Input validation utilities.
//!
//! Request payloads arrive with optional fields; these helpers turn them into validated
//! values, reporting absent required fields as [`ClinicError::MissingFields`] and
//! malformed values as [`ClinicError::InvalidInput`].

use crate::constants::{MAX_NAME_CHARS, MAX_TEXT_CHARS};
use crate::{ClinicError, ClinicResult, EmailAddress, NonEmptyText, TextError, ToothNumber};

/// A required, bounded text field. Missing or blank values are `missing_fields`.
pub fn required_text(
    value: Option<&str>,
    field: &'static str,
    max_chars: usize,
) -> ClinicResult<NonEmptyText> {
    match value.map(|v| NonEmptyText::bounded(v, max_chars)) {
        None | Some(Err(TextError::Empty)) => Err(ClinicError::MissingFields),
        Some(Err(e)) => Err(ClinicError::invalid(field, e)),
        Some(Ok(text)) => Ok(text),
    }
}

/// An optional, bounded text field. Blank values count as absent.
pub fn optional_text(
    value: Option<&str>,
    field: &'static str,
    max_chars: usize,
) -> ClinicResult<Option<NonEmptyText>> {
    match value.map(|v| NonEmptyText::bounded(v, max_chars)) {
        None | Some(Err(TextError::Empty)) => Ok(None),
        Some(Err(e)) => Err(ClinicError::invalid(field, e)),
        Some(Ok(text)) => Ok(Some(text)),
    }
}

pub fn required_name(value: Option<&str>, field: &'static str) -> ClinicResult<NonEmptyText> {
    required_text(value, field, MAX_NAME_CHARS)
}

pub fn optional_body(value: Option<&str>, field: &'static str) -> ClinicResult<Option<NonEmptyText>> {
    optional_text(value, field, MAX_TEXT_CHARS)
}

pub fn required_email(value: Option<&str>) -> ClinicResult<EmailAddress> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Err(ClinicError::MissingFields),
        Some(v) => EmailAddress::parse(v).map_err(|e| ClinicError::invalid("email", e)),
    }
}

pub fn optional_email(value: Option<&str>) -> ClinicResult<Option<EmailAddress>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => EmailAddress::parse(v)
            .map(Some)
            .map_err(|e| ClinicError::invalid("email", e)),
    }
}

/// Phone numbers: digits with optional `+`, spaces, dashes, dots and parentheses;
/// between 3 and 20 digits.
pub fn optional_phone(value: Option<&str>) -> ClinicResult<Option<String>> {
    let Some(phone) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '.' | '(' | ')'));
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    if !allowed || !(3..=20).contains(&digits) || phone.rfind('+').is_some_and(|i| i > 0) {
        return Err(ClinicError::invalid("phone", "not a phone number"));
    }
    Ok(Some(phone.to_string()))
}

pub fn tooth(value: Option<i64>) -> ClinicResult<ToothNumber> {
    let value = value.ok_or(ClinicError::MissingFields)?;
    ToothNumber::new(value).map_err(|e| ClinicError::invalid("tooth", e))
}

pub fn optional_tooth(value: Option<i64>) -> ClinicResult<Option<ToothNumber>> {
    value
        .map(|v| ToothNumber::new(v).map_err(|e| ClinicError::invalid("tooth", e)))
        .transpose()
}

/// Clamps a requested page size into `1..=max`, using `default` when absent.
pub fn page_limit(requested: Option<i64>, default: i64, max: i64) -> i64 {
    requested.unwrap_or(default).clamp(1, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_text_reports_missing_fields() {
        assert!(matches!(required_text(None, "name", 10), Err(ClinicError::MissingFields)));
        assert!(matches!(
            required_text(Some("   "), "name", 10),
            Err(ClinicError::MissingFields)
        ));
        assert!(matches!(
            required_text(Some("far too long for this"), "name", 10),
            Err(ClinicError::InvalidInput { field: "name", .. })
        ));
        assert_eq!(required_text(Some("  Ann "), "name", 10).unwrap().as_str(), "Ann");
    }

    #[test]
    fn test_optional_text_treats_blank_as_absent() {
        assert!(optional_text(Some(" "), "notes", 10).unwrap().is_none());
        assert!(optional_text(None, "notes", 10).unwrap().is_none());
        assert!(optional_text(Some("x".repeat(11).as_str()), "notes", 10).is_err());
    }

    #[test]
    fn test_email_helpers() {
        assert!(matches!(required_email(Some("")), Err(ClinicError::MissingFields)));
        assert!(required_email(Some("not-an-email")).is_err());
        assert_eq!(
            required_email(Some("Ann@Clinic.Example")).unwrap().as_str(),
            "ann@clinic.example"
        );
        assert!(optional_email(Some("  ")).unwrap().is_none());
    }

    #[test]
    fn test_phone_validation() {
        assert_eq!(
            optional_phone(Some(" +44 (0)20 7946-0018 ")).unwrap().as_deref(),
            Some("+44 (0)20 7946-0018")
        );
        assert!(optional_phone(Some("call me")).is_err());
        assert!(optional_phone(Some("12")).is_err());
        assert!(optional_phone(Some("12+34")).is_err());
        assert!(optional_phone(None).unwrap().is_none());
    }

    #[test]
    fn test_tooth_validation() {
        assert_eq!(tooth(Some(36)).unwrap().value(), 36);
        assert!(matches!(tooth(None), Err(ClinicError::MissingFields)));
        assert!(matches!(
            tooth(Some(19)),
            Err(ClinicError::InvalidInput { field: "tooth", .. })
        ));
        assert!(optional_tooth(None).unwrap().is_none());
    }

    #[test]
    fn test_page_limit_clamps() {
        assert_eq!(page_limit(None, 50, 100), 50);
        assert_eq!(page_limit(Some(0), 50, 100), 1);
        assert_eq!(page_limit(Some(-5), 50, 100), 1);
        assert_eq!(page_limit(Some(500), 50, 100), 100);
        assert_eq!(page_limit(Some(20), 50, 100), 20);
    }
}
