use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use uuid::Uuid;

use crate::{error::AppError, storage::ObjectStore};

pub const MAX_PHOTO_BYTES: usize = 1024 * 1024;
const PHOTO_URL_TTL: Duration = Duration::from_secs(30 * 60);

pub struct PhotoUpload {
    pub body: Bytes,
    pub content_type: String,
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

fn avatar_key(user_id: Uuid, ext: &str) -> String {
    format!("users/{}/avatar-{}.{}", user_id, Uuid::new_v4(), ext)
}

/// Checks size and type, then stores the photo under `users/<id>/`.
/// Returns the object key to keep on the user record.
pub async fn upload_profile_photo(
    storage: &dyn ObjectStore,
    user_id: Uuid,
    photo: PhotoUpload,
) -> Result<String, AppError> {
    if photo.body.is_empty() {
        return Err(AppError::validation("Photo is empty"));
    }
    if photo.body.len() > MAX_PHOTO_BYTES {
        return Err(AppError::validation("Photo must be at most 1MB"));
    }
    let ext = ext_from_mime(&photo.content_type)
        .ok_or_else(|| AppError::validation("Photo must be a jpeg, png, webp or heic image"))?;

    let key = avatar_key(user_id, ext);
    storage
        .put(&key, photo.body, &photo.content_type)
        .await
        .with_context(|| format!("store profile photo for {}", user_id))?;
    Ok(key)
}

pub async fn presign_photo(storage: &dyn ObjectStore, key: &str) -> anyhow::Result<String> {
    storage
        .presigned_url(key, PHOTO_URL_TTL)
        .await
        .with_context(|| format!("presign url for {}", key))
}
