use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::errors::BootstrapError;

/// Argon2id cost: m=19 MiB, t=2, p=1.
///
/// This is the OWASP password storage minimum for Argon2id, published next to
/// bcrypt work factor 10 as the minimum for bcrypt. It meets the "slow hash,
/// work factor >= 10" floor for the admin password. Each guess costs roughly
/// what bcrypt(10) does in time, and it also needs 19 MiB of memory, which
/// bcrypt never asks for. Raising these only affects new hashes because
/// verification reads the parameters stored in each PHC string.
const MEMORY_COST_KIB: u32 = 19 * 1024;
const TIME_COST: u32 = 2;
const PARALLELISM: u32 = 1;

fn hasher() -> Result<Argon2<'static>, BootstrapError> {
    let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, None)
        .map_err(|e| BootstrapError::PasswordHash(format!("Invalid argon2 parameters: {e}")))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hashes `password` with a fresh random salt into a PHC string.
pub fn hash_password(password: &str) -> Result<String, BootstrapError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| BootstrapError::PasswordHash(format!("Failed to hash password: {e}")))?;
    Ok(hash.to_string())
}

/// Checks `password` against a stored PHC string. The parameters embedded in
/// the hash are used, so hashes written with other settings still verify.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, BootstrapError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| BootstrapError::PasswordHash(format!("Invalid password hash: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
