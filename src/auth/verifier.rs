//! Password hashing and verification (Argon2id, PHC string format).

use anyhow::{anyhow, Result};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier};

use crate::identity::UserAccount;

/// Hash a password with the current parameter set.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("failed to hash password: {e}"))
}

/// Verify a supplied password against the account's stored hash.
///
/// On success the unsuccessful-attempt counter is reset and, when the
/// stored hash uses an outdated parameter set, the password is transparently
/// re-hashed in place (the caller persists the account). A missing stored
/// hash verifies as false without error: the account has never had a
/// password set.
pub fn verify(account: &mut UserAccount, supplied_password: &str) -> Result<bool> {
    // Owned copy so no borrow of the account outlives the mutations below.
    let Some(stored) = account.password_hash.clone() else {
        return Ok(false);
    };

    let parsed = PasswordHash::new(&stored)
        .map_err(|e| anyhow!("stored password hash is malformed: {e}"))?;

    let matches = match Argon2::default().verify_password(supplied_password.as_bytes(), &parsed) {
        Ok(()) => true,
        Err(argon2::password_hash::Error::Password) => false,
        Err(e) => return Err(anyhow!("password verification error: {e}")),
    };

    if matches {
        account.reset_unsuccessful_login_attempts();
        if needs_rehash(&parsed) {
            account.password_hash = Some(hash_password(supplied_password)?);
        }
    }

    Ok(matches)
}

/// A hash needs upgrading when its algorithm or cost parameters differ from
/// the current defaults.
fn needs_rehash(parsed: &PasswordHash<'_>) -> bool {
    if parsed.algorithm.as_str() != Algorithm::Argon2id.as_str() {
        return true;
    }

    Params::try_from(parsed).map_or(true, |params| {
        params.m_cost() != Params::DEFAULT_M_COST
            || params.t_cost() != Params::DEFAULT_T_COST
            || params.p_cost() != Params::DEFAULT_P_COST
    })
}
