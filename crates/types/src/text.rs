use crate::TextError;

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the trimmed
    /// result is empty, an error is returned.
    ///
    /// # Errors
    ///
    /// Returns `Err(TextError::Empty)` if the input is empty or contains only whitespace.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Like [`NonEmptyText::new`], but also rejects input longer than `max_chars`.
    pub fn bounded(input: impl AsRef<str>, max_chars: usize) -> Result<Self, TextError> {
        let text = Self::new(input)?;
        if text.0.chars().count() > max_chars {
            return Err(TextError::TooLong(max_chars));
        }
        Ok(text)
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Tenant login code, e.g. `smile-dental`.
///
/// Input is trimmed and lower-cased before validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClinicCode(String);

impl ClinicCode {
    const MIN_LEN: usize = 2;
    const MAX_LEN: usize = 32;

    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        let code = input.as_ref().trim().to_ascii_lowercase();
        if code.is_empty() {
            return Err(TextError::Empty);
        }
        if code.len() > Self::MAX_LEN {
            return Err(TextError::TooLong(Self::MAX_LEN));
        }
        let ok = code.len() >= Self::MIN_LEN
            && code
                .bytes()
                .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'-'))
            && !code.starts_with('-')
            && !code.ends_with('-');
        if !ok {
            return Err(TextError::InvalidClinicCode);
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClinicCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lower-cased email address.
///
/// Validation is deliberately shallow: one `@`, a non-empty local part, and a
/// domain containing a dot that neither starts nor ends the domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmailAddress(String);

impl EmailAddress {
    const MAX_LEN: usize = 254;

    pub fn parse(input: impl AsRef<str>) -> Result<Self, TextError> {
        let email = input.as_ref().trim().to_lowercase();
        if email.is_empty() {
            return Err(TextError::Empty);
        }
        if email.len() > Self::MAX_LEN {
            return Err(TextError::TooLong(Self::MAX_LEN));
        }
        let (local, domain) = email.split_once('@').ok_or(TextError::InvalidEmail)?;
        let valid = !local.is_empty()
            && !domain.contains('@')
            && domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
            && !email.chars().any(char::is_whitespace);
        if !valid {
            return Err(TextError::InvalidEmail);
        }
        Ok(Self(email))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_text_trims_input() {
        let text = NonEmptyText::new("  Root canal  ").unwrap();
        assert_eq!(text.as_str(), "Root canal");
    }

    #[test]
    fn test_non_empty_text_rejects_whitespace() {
        assert_eq!(NonEmptyText::new("   \t"), Err(TextError::Empty));
    }

    #[test]
    fn test_bounded_text_rejects_long_input() {
        assert_eq!(
            NonEmptyText::bounded("abcdef", 5),
            Err(TextError::TooLong(5))
        );
        assert!(NonEmptyText::bounded("abcde", 5).is_ok());
    }

    #[test]
    fn test_non_empty_text_deserialize_rejects_empty() {
        let result: Result<NonEmptyText, _> = serde_json::from_str("\"  \"");
        assert!(result.is_err());
    }

    #[test]
    fn test_clinic_code_is_lowercased() {
        let code = ClinicCode::parse(" Smile-Dental ").unwrap();
        assert_eq!(code.as_str(), "smile-dental");
    }

    #[test]
    fn test_clinic_code_rejects_bad_characters() {
        assert_eq!(
            ClinicCode::parse("smile dental"),
            Err(TextError::InvalidClinicCode)
        );
        assert_eq!(ClinicCode::parse("-abc"), Err(TextError::InvalidClinicCode));
        assert_eq!(ClinicCode::parse("a"), Err(TextError::InvalidClinicCode));
    }

    #[test]
    fn test_email_is_normalised() {
        let email = EmailAddress::parse(" Dr.Who@Clinic.Example ").unwrap();
        assert_eq!(email.as_str(), "dr.who@clinic.example");
    }

    #[test]
    fn test_email_rejects_malformed() {
        for bad in ["no-at-sign", "@clinic.example", "a@b", "a@.example", "a b@c.d", "a@b@c.d"] {
            assert!(EmailAddress::parse(bad).is_err(), "accepted {bad}");
        }
    }
}
