use std::{collections::HashMap, sync::Mutex};

use axum::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::{RepoError, UserStore};
use super::repo_types::{NewUser, User};

/// Process-local store used by tests and `AppState::fake()`.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, HashMap<Uuid, User>>> {
        self.users
            .lock()
            .map_err(|_| anyhow::anyhow!("user store mutex poisoned"))
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self.lock()?.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.lock()?.get(&id).cloned())
    }

    async fn create(&self, new: NewUser) -> Result<User, RepoError> {
        let mut users = self.lock()?;
        if users.values().any(|u| u.email == new.email) {
            return Err(RepoError::DuplicateEmail);
        }
        let user = User {
            id: new.id,
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
            photo: new.photo,
            reset_token_hash: None,
            reset_token_expires_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn set_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<bool> {
        let mut users = self.lock()?;
        let Some(u) = users.get_mut(&user_id) else {
            return Ok(false);
        };
        u.reset_token_hash = Some(token_hash.to_string());
        u.reset_token_expires_at = Some(expires_at);
        Ok(true)
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> anyhow::Result<Option<User>> {
        let mut users = self.lock()?;
        let found = users.values_mut().find(|u| {
            u.reset_token_hash.as_deref() == Some(token_hash)
                && u.reset_token_expires_at.is_some_and(|exp| exp > now)
        });
        Ok(found.map(|u| {
            u.password_hash = password_hash.to_string();
            u.reset_token_hash = None;
            u.reset_token_expires_at = None;
            u.clone()
        }))
    }

    async fn set_photo(&self, id: Uuid, key: &str) -> anyhow::Result<Option<User>> {
        Ok(self.lock()?.get_mut(&id).map(|u| {
            u.photo = Some(key.to_string());
            u.clone()
        }))
    }

    async fn list(&self) -> anyhow::Result<Vec<User>> {
        let mut users: Vec<User> = self.lock()?.values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.lock()?.remove(&id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo_types::Role;
    use time::Duration;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            id: Uuid::new_v4(),
            username: "alice".into(),
            email: email.into(),
            password_hash: "hash".into(),
            role: Role::User,
            photo: None,
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_email() {
        let store = MemoryUserStore::default();
        store.create(new_user("a@example.com")).await.unwrap();
        let err = store.create(new_user("a@example.com")).await.unwrap_err();
        assert!(matches!(err, RepoError::DuplicateEmail));
    }

    #[tokio::test]
    async fn consume_requires_unexpired_matching_token() {
        let store = MemoryUserStore::default();
        let user = store.create(new_user("a@example.com")).await.unwrap();
        let now = OffsetDateTime::now_utc();
        assert!(store
            .set_reset_token(user.id, "digest", now + Duration::minutes(15))
            .await
            .unwrap());

        assert!(store
            .consume_reset_token("other", now, "new")
            .await
            .unwrap()
            .is_none());
        assert!(store
            .consume_reset_token("digest", now + Duration::minutes(15), "new")
            .await
            .unwrap()
            .is_none());

        let updated = store
            .consume_reset_token("digest", now, "new")
            .await
            .unwrap()
            .expect("token should match");
        assert_eq!(updated.password_hash, "new");
        assert!(updated.reset_token_hash.is_none());
        assert!(updated.reset_token_expires_at.is_none());
    }

    #[tokio::test]
    async fn writes_to_missing_users_report_nothing_changed() {
        let store = MemoryUserStore::default();
        let ghost = Uuid::new_v4();
        let later = OffsetDateTime::now_utc() + Duration::minutes(15);
        assert!(!store.set_reset_token(ghost, "digest", later).await.unwrap());
        assert!(store.set_photo(ghost, "users/x/a.png").await.unwrap().is_none());
    }
}
