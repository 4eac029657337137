use crate::state::AppState;
use axum::Router;

pub mod handlers;
#[cfg(test)]
pub mod memory;
pub mod photos;
pub mod repo;
pub mod repo_types;

pub fn router() -> Router<AppState> {
    handlers::admin_routes()
}
