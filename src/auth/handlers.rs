use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument};

use crate::{
    auth::{
        dto::{
            ForgotPasswordRequest, LoginRequest, LoginResponse, RegisterForm, RegisterResponse,
            ResetPasswordRequest,
        },
        extractors::AuthUser,
        services,
    },
    error::AppError,
    state::AppState,
    users::{
        photos::{presign_photo, PhotoUpload, MAX_PHOTO_BYTES},
        repo_types::{PublicUser, User},
    },
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/register",
            post(register).layer(DefaultBodyLimit::max(MAX_PHOTO_BYTES + 64 * 1024)),
        )
        .route("/login", post(login))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password/:token", post(reset_password))
        .route("/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me)).route(
        "/me/photo",
        patch(update_photo).layer(DefaultBodyLimit::max(MAX_PHOTO_BYTES + 64 * 1024)),
    )
}

fn bad_form<E: std::fmt::Display>(e: E) -> AppError {
    AppError::validation(format!("Invalid form data: {e}"))
}

async fn read_photo(field: axum::extract::multipart::Field<'_>) -> Result<Option<PhotoUpload>, AppError> {
    let content_type = field
        .content_type()
        .map(|s| s.to_string())
        .unwrap_or_else(|| "application/octet-stream".into());
    let body = field.bytes().await.map_err(bad_form)?;
    Ok((!body.is_empty()).then_some(PhotoUpload { body, content_type }))
}

/// Public view with the photo key swapped for a presigned url.
async fn public_view(state: &AppState, user: &User) -> Result<PublicUser, AppError> {
    let mut public = PublicUser::from(user);
    if let Some(key) = &user.photo {
        public.photo = Some(presign_photo(state.storage.as_ref(), key).await?);
    }
    Ok(public)
}

/// POST /register (multipart: username, email, password, confirmPassword, role?, photo?)
#[instrument(skip(state, mp))]
pub async fn register(
    State(state): State<AppState>,
    mut mp: Multipart,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let mut form = RegisterForm::default();
    let mut photo = None;

    while let Some(field) = mp.next_field().await.map_err(bad_form)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "photo" => photo = read_photo(field).await?,
            "username" => form.username = field.text().await.map_err(bad_form)?,
            "email" => form.email = field.text().await.map_err(bad_form)?,
            "password" => form.password = field.text().await.map_err(bad_form)?,
            "confirmPassword" => form.confirm_password = field.text().await.map_err(bad_form)?,
            "role" => form.role = Some(field.text().await.map_err(bad_form)?),
            _ => {}
        }
    }

    let (user, token) = services::register(&state, form, photo).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: PublicUser::from(&user),
            token,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let (user, token) = services::login(&state, &payload.email, &payload.password).await?;
    Ok(Json(LoginResponse {
        username: user.username,
        photo: user.photo,
        email: user.email,
        role: user.role,
        token,
    }))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<&'static str>, AppError> {
    services::forgot_password(&state, &payload.email, OffsetDateTime::now_utc()).await?;
    Ok(Json("Reset password link sent"))
}

#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<&'static str>, AppError> {
    services::reset_password(
        &state,
        &token,
        &payload.password,
        &payload.confirm_password,
        OffsetDateTime::now_utc(),
    )
    .await?;
    Ok(Json("Password reset successfully"))
}

/// Tokens are stateless; the client discards its copy.
#[instrument(skip_all)]
pub async fn logout(AuthUser(user_id): AuthUser) -> StatusCode {
    info!(user_id = %user_id, "user logged out");
    StatusCode::OK
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, AppError> {
    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::unauthorized("User not found"))?;
    Ok(Json(public_view(&state, &user).await?))
}

/// PATCH /me/photo (multipart: photo)
#[instrument(skip(state, mp))]
pub async fn update_photo(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mut mp: Multipart,
) -> Result<Json<PublicUser>, AppError> {
    let mut photo = None;
    while let Some(field) = mp.next_field().await.map_err(bad_form)? {
        if field.name() == Some("photo") {
            photo = read_photo(field).await?;
        }
    }
    let photo = photo.ok_or_else(|| AppError::validation("Photo is required"))?;

    let user = services::update_photo(&state, user_id, photo).await?;
    Ok(Json(public_view(&state, &user).await?))
}
