pub mod auth;
pub mod health;
pub mod pages;
pub mod root;

use axum::response::IntoResponse;

use super::error::ApiError;

pub async fn not_found() -> impl IntoResponse {
    ApiError::not_found("Not found")
}
