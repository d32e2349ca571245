//! # Clinic Types
//!
//! Validated value types shared by every clinic crate.
//!
//! Each type guarantees its invariant once constructed, so code further in can
//! accept the type instead of re-checking strings:
//! - [`NonEmptyText`]: trimmed, non-empty text
//! - [`ClinicCode`]: tenant login code (`[a-z0-9-]`, 2..=32)
//! - [`EmailAddress`]: lower-cased address with a plausible `local@domain` shape
//! - [`ToothNumber`]: FDI two-digit tooth notation
//! - [`Icd10Code`]: normalised ICD-10 diagnosis code

mod icd10;
mod text;
mod tooth;

pub use icd10::Icd10Code;
pub use text::{ClinicCode, EmailAddress, NonEmptyText};
pub use tooth::{Dentition, ToothNumber};

/// Errors that can occur when creating validated value types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
    /// The input exceeded the maximum accepted length
    #[error("Text exceeds maximum length of {0} characters")]
    TooLong(usize),
    /// The clinic code contained characters outside `[a-z0-9-]`
    #[error("Clinic code may only contain lowercase letters, digits and '-'")]
    InvalidClinicCode,
    /// The email address did not have a `local@domain.tld` shape
    #[error("Invalid email address")]
    InvalidEmail,
    /// The tooth number is not a valid FDI position
    #[error("Invalid FDI tooth number: {0}")]
    InvalidTooth(String),
    /// The diagnosis code is not a well-formed ICD-10 code
    #[error("Invalid ICD-10 code: {0}")]
    InvalidIcd10(String),
}
