use axum::{
    extract::{Path, State},
    routing::{delete, get},
    Json, Router,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{dto::MessageResponse, extractors::AdminUser},
    error::AppError,
    state::AppState,
    users::repo_types::PublicUser,
};

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/:id", delete(delete_user))
}

#[instrument(skip_all, fields(admin_id = %admin.id))]
pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> Result<Json<Vec<PublicUser>>, AppError> {
    let users = state.users.list().await?;
    Ok(Json(users.iter().map(PublicUser::from).collect()))
}

#[instrument(skip_all, fields(admin_id = %admin.id, %id))]
pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    let user = state
        .users
        .delete(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    if let Some(key) = &user.photo {
        if let Err(e) = state.storage.delete(key).await {
            warn!(error = %e, key = %key, "failed to remove profile photo");
        }
    }

    info!(user_id = %user.id, "user deleted");
    Ok(Json(MessageResponse {
        message: "User deleted successfully".into(),
    }))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request},
    };
    use tower::ServiceExt;

    use crate::{
        app::build_app,
        auth::{jwt::JwtKeys, password::hash_password},
        state::AppState,
        storage::{MemoryObjectStore, ObjectStore},
        users::repo_types::{NewUser, Role},
    };
    use std::sync::Arc;
    use uuid::Uuid;

    async fn seed(state: &AppState, email: &str, role: Role) -> (Uuid, String) {
        let user = state
            .users
            .create(NewUser {
                id: Uuid::new_v4(),
                username: email.split('@').next().unwrap().into(),
                email: email.into(),
                password_hash: hash_password("secret123").await.unwrap(),
                role,
                photo: None,
            })
            .await
            .unwrap();
        let token = JwtKeys::from(&state.config.jwt).sign(user.id).unwrap();
        (user.id, token)
    }

    fn authed(method: &str, uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn only_admins_list_users() {
        let state = AppState::fake();
        let (_, admin_token) = seed(&state, "root@example.com", Role::Admin).await;
        let (_, user_token) = seed(&state, "alice@example.com", Role::User).await;
        let app = build_app(state);

        let res = app
            .clone()
            .oneshot(authed("GET", "/api/users", &user_token))
            .await
            .unwrap();
        assert_eq!(res.status(), 403);

        let res = app
            .oneshot(authed("GET", "/api/users", &admin_token))
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(body.contains("alice@example.com"));
        assert!(!body.contains("argon2"));
    }

    #[tokio::test]
    async fn admin_deletes_user_once() {
        let state = AppState::fake();
        let (_, admin_token) = seed(&state, "root@example.com", Role::Admin).await;
        let (victim, _) = seed(&state, "alice@example.com", Role::User).await;
        let app = build_app(state.clone());

        let uri = format!("/api/users/{victim}");
        let res = app
            .clone()
            .oneshot(authed("DELETE", &uri, &admin_token))
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        assert!(state.users.find_by_id(victim).await.unwrap().is_none());

        let res = app
            .oneshot(authed("DELETE", &uri, &admin_token))
            .await
            .unwrap();
        assert_eq!(res.status(), 404);
    }

    #[tokio::test]
    async fn deleting_a_user_removes_their_photo() {
        let storage = Arc::new(MemoryObjectStore::default());
        let state = AppState::fake().with_storage(storage.clone());
        let (_, admin_token) = seed(&state, "root@example.com", Role::Admin).await;
        let (victim, _) = seed(&state, "alice@example.com", Role::User).await;

        let key = format!("users/{victim}/avatar-1.png");
        storage
            .put(&key, bytes::Bytes::from_static(b"\x89PNG"), "image/png")
            .await
            .unwrap();
        state.users.set_photo(victim, &key).await.unwrap().unwrap();

        let res = build_app(state)
            .oneshot(authed("DELETE", &format!("/api/users/{victim}"), &admin_token))
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        assert!(!storage.contains(&key));
    }
}
