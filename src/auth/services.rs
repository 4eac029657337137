use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::RegisterForm,
    jwt::JwtKeys,
    password::{hash_password, verify_password},
    reset::{build_reset_url, hash_reset_token, issue_reset_token},
};
use crate::{
    error::AppError,
    mail::password_reset_email,
    state::AppState,
    users::{
        photos::{upload_profile_photo, PhotoUpload},
        repo::RepoError,
        repo_types::{NewUser, Role, User},
    },
};

pub const MIN_PASSWORD_LEN: usize = 8;

const NO_ACCOUNT: &str = "User doesn't exist, please register";
const BAD_PASSWORD: &str = "Password is not correct";
const INVALID_CREDENTIALS: &str = "Invalid credentials";

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn validate_new_password(password: &str, confirm: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if password != confirm {
        return Err(AppError::validation("Passwords do not match"));
    }
    Ok(())
}

fn sign_token(state: &AppState, user_id: Uuid) -> Result<String, AppError> {
    let keys = JwtKeys::from(&state.config.jwt);
    Ok(keys.sign(user_id)?)
}

/// Creates an account and returns it with a fresh session token.
pub async fn register(
    state: &AppState,
    form: RegisterForm,
    photo: Option<PhotoUpload>,
) -> Result<(User, String), AppError> {
    let username = form.username.trim().to_string();
    if username.is_empty() {
        return Err(AppError::validation("Username is required"));
    }
    let email = normalize_email(&form.email);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::validation("Invalid email"));
    }
    validate_new_password(&form.password, &form.confirm_password)?;
    let role = match form.role.as_deref().map(str::trim) {
        None | Some("") => Role::User,
        Some(r) => r.parse::<Role>().map_err(AppError::Validation)?,
    };

    if state.users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let password_hash = hash_password(&form.password).await?;

    let id = Uuid::new_v4();
    let photo_key = match photo {
        Some(p) => Some(upload_profile_photo(state.storage.as_ref(), id, p).await?),
        None => None,
    };

    let created = state
        .users
        .create(NewUser {
            id,
            username,
            email,
            password_hash,
            role,
            photo: photo_key.clone(),
        })
        .await;

    let user = match created {
        Ok(u) => u,
        Err(e) => {
            if let Some(key) = &photo_key {
                if let Err(del) = state.storage.delete(key).await {
                    warn!(error = %del, key = %key, "orphaned profile photo");
                }
            }
            return Err(match e {
                RepoError::DuplicateEmail => AppError::Conflict("Email already registered".into()),
                RepoError::Other(e) => AppError::Internal(e),
            });
        }
    };

    let token = sign_token(state, user.id)?;
    info!(user_id = %user.id, email = %user.email, role = ?user.role, "user registered");
    Ok((user, token))
}

/// Stores a new profile photo for the user and drops the one it replaces.
pub async fn update_photo(
    state: &AppState,
    user_id: Uuid,
    photo: PhotoUpload,
) -> Result<User, AppError> {
    let previous = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::unauthorized("User not found"))?
        .photo;

    let key = upload_profile_photo(state.storage.as_ref(), user_id, photo).await?;
    let Some(user) = state.users.set_photo(user_id, &key).await? else {
        if let Err(e) = state.storage.delete(&key).await {
            warn!(error = %e, key = %key, "orphaned profile photo");
        }
        return Err(AppError::unauthorized("User not found"));
    };

    if let Some(old) = previous.filter(|old| *old != key) {
        if let Err(e) = state.storage.delete(&old).await {
            warn!(error = %e, key = %old, "failed to remove replaced profile photo");
        }
    }
    info!(user_id = %user.id, key = %key, "profile photo updated");
    Ok(user)
}

/// Checks credentials and issues a session token.
pub async fn login(state: &AppState, email: &str, password: &str) -> Result<(User, String), AppError> {
    let uniform = state.config.auth.uniform_errors;
    let email = normalize_email(email);
    let no_account = || AppError::unauthorized(if uniform { INVALID_CREDENTIALS } else { NO_ACCOUNT });

    // a malformed address cannot belong to any account
    if !is_valid_email(&email) {
        warn!(email = %email, "login with malformed email");
        return Err(no_account());
    }

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(no_account());
    };

    if !verify_password(password, &user.password_hash).await? {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(AppError::unauthorized(if uniform { INVALID_CREDENTIALS } else { BAD_PASSWORD }));
    }

    let token = sign_token(state, user.id)?;
    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok((user, token))
}

/// Issues a new reset token for the account (superseding any earlier one)
/// and mails the link.
pub async fn forgot_password(state: &AppState, email: &str, now: OffsetDateTime) -> Result<(), AppError> {
    let uniform = state.config.auth.uniform_errors;
    let unknown = || {
        if uniform {
            Ok(())
        } else {
            Err(AppError::NotFound("User doesn't exist".into()))
        }
    };

    let email = normalize_email(email);
    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(email = %email, "password reset for unknown email");
        return unknown();
    };

    let ttl = state.config.auth.reset_token_ttl_minutes;
    let issued = issue_reset_token(now, ttl)?;
    let stored = state
        .users
        .set_reset_token(user.id, &issued.token_hash, issued.expires_at)
        .await?;
    if !stored {
        warn!(user_id = %user.id, "account removed before reset token was stored");
        return unknown();
    }

    let link = build_reset_url(&state.config.auth.reset_url_base, &issued.token);
    state
        .mailer
        .send(password_reset_email(&user.email, &link, ttl))
        .await?;

    info!(user_id = %user.id, expires_at = %issued.expires_at, "password reset issued");
    Ok(())
}

/// Exchanges a live reset token for a password change. The token is
/// cleared in the same store operation, so it works once.
pub async fn reset_password(
    state: &AppState,
    token: &str,
    password: &str,
    confirm_password: &str,
    now: OffsetDateTime,
) -> Result<User, AppError> {
    validate_new_password(password, confirm_password)?;
    let password_hash = hash_password(password).await?;

    let Some(user) = state
        .users
        .consume_reset_token(&hash_reset_token(token), now, &password_hash)
        .await?
    else {
        warn!("reset with unknown or expired token");
        return Err(AppError::TokenInvalid);
    };

    info!(user_id = %user.id, "password reset completed");
    Ok(user)
}
