//! Password-reset secrets.
//!
//! The raw token only ever leaves the process inside the reset email. The
//! store keeps its SHA-256 digest, so reading the `users` table is not enough
//! to complete a reset.

use anyhow::Context;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use time::{Duration, OffsetDateTime};

/// A freshly issued reset secret and the values to persist for it.
pub struct IssuedResetToken {
    pub token: String,
    pub token_hash: String,
    pub expires_at: OffsetDateTime,
}

/// 256 random bits, hex encoded.
pub fn generate_reset_token() -> anyhow::Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate reset token")?;
    Ok(hex::encode(bytes))
}

pub fn hash_reset_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn issue_reset_token(now: OffsetDateTime, ttl_minutes: i64) -> anyhow::Result<IssuedResetToken> {
    let token = generate_reset_token()?;
    Ok(IssuedResetToken {
        token_hash: hash_reset_token(&token),
        expires_at: now + Duration::minutes(ttl_minutes),
        token,
    })
}

pub fn build_reset_url(base: &str, token: &str) -> String {
    let base = base.trim_end_matches('/');
    format!("{base}/{token}")
}
