//! Password hashing for admins, doctors and patients.
//!
//! Stored form: `pbkdf2-sha256$<iterations>$<salt b64>$<hash b64>`.

use crate::{ClinicError, ClinicResult};
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

pub const PBKDF2_ITERATIONS: u32 = 600_000;
pub const SALT_LENGTH: usize = 16;
pub const HASH_LENGTH: usize = 32;
pub const MIN_PASSWORD_CHARS: usize = 8;

const SCHEME: &str = "pbkdf2-sha256";

/// Rejects passwords shorter than [`MIN_PASSWORD_CHARS`].
pub fn check_policy(password: &str) -> ClinicResult<()> {
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ClinicError::invalid(
            "password",
            format!("must be at least {MIN_PASSWORD_CHARS} characters"),
        ));
    }
    Ok(())
}

/// Hashes `password` with a fresh random salt.
pub fn hash_password(password: &str) -> ClinicResult<String> {
    check_policy(password)?;
    Ok(hash_with_iterations(password, PBKDF2_ITERATIONS))
}

pub(crate) fn hash_with_iterations(password: &str, iterations: u32) -> String {
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);

    let mut hash = [0u8; HASH_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut hash);

    format!(
        "{SCHEME}${iterations}${}${}",
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(hash)
    )
}

/// Checks `password` against a stored hash.
///
/// Returns `Ok(false)` on mismatch and [`ClinicError::MalformedPasswordHash`] when the
/// stored value cannot be parsed.
pub fn verify_password(password: &str, stored: &str) -> ClinicResult<bool> {
    let mut parts = stored.split('$');
    let (Some(SCHEME), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(ClinicError::MalformedPasswordHash);
    };

    let iterations: u32 = iterations
        .parse()
        .ok()
        .filter(|n| *n > 0)
        .ok_or(ClinicError::MalformedPasswordHash)?;
    let salt = STANDARD_NO_PAD
        .decode(salt)
        .map_err(|_| ClinicError::MalformedPasswordHash)?;
    let expected = STANDARD_NO_PAD
        .decode(expected)
        .map_err(|_| ClinicError::MalformedPasswordHash)?;
    if expected.is_empty() {
        return Err(ClinicError::MalformedPasswordHash);
    }

    let mut actual = vec![0u8; expected.len()];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut actual);

    Ok(actual.ct_eq(&expected).into())
}
