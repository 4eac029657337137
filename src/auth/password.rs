use anyhow::{anyhow, Context};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;

use crate::error::AppError;

// Argon2id, 19 MiB, 2 passes, 1 lane.
const MEMORY_KIB: u32 = 19 * 1024;
const PASSES: u32 = 2;
const LANES: u32 = 1;

/// Longer inputs are refused before hashing.
pub const MAX_PASSWORD_BYTES: usize = 128;

fn argon2() -> anyhow::Result<Argon2<'static>> {
    let params = Params::new(MEMORY_KIB, PASSES, LANES, None)
        .map_err(|e| anyhow!("argon2 params: {e}"))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

fn check_length(plain: &str) -> Result<(), AppError> {
    if plain.len() > MAX_PASSWORD_BYTES {
        return Err(AppError::validation(format!(
            "Password must be at most {MAX_PASSWORD_BYTES} bytes"
        )));
    }
    Ok(())
}

/// Salted Argon2id PHC string. Runs on the blocking pool.
pub async fn hash_password(plain: &str) -> Result<String, AppError> {
    check_length(plain)?;
    let plain = plain.to_owned();
    let hash = tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = argon2()?
            .hash_password(plain.as_bytes(), &salt)
            .map_err(|e| anyhow!("argon2 hash: {e}"))?;
        Ok(hash.to_string())
    })
    .await
    .context("password hashing task")??;
    Ok(hash)
}

/// `Ok(false)` on mismatch or over-long input; `Err` only when the stored
/// hash cannot be parsed.
pub async fn verify_password(plain: &str, stored: &str) -> Result<bool, AppError> {
    if plain.len() > MAX_PASSWORD_BYTES {
        return Ok(false);
    }
    let plain = plain.to_owned();
    let stored = stored.to_owned();
    let matched = tokio::task::spawn_blocking(move || -> anyhow::Result<bool> {
        let parsed = PasswordHash::new(&stored).map_err(|e| anyhow!("stored hash: {e}"))?;
        Ok(argon2()?.verify_password(plain.as_bytes(), &parsed).is_ok())
    })
    .await
    .context("password verify task")??;
    Ok(matched)
}
