//! JSON error responses for the API routes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::error;
use utoipa::ToSchema;

use crate::auth::policy::FieldErrors;

pub const MSG_INTERNAL: &str = "Something went wrong";

#[derive(Serialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    field_errors: Option<FieldErrors>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            field_errors: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// 422 carrying per-field messages.
    #[must_use]
    pub fn validation(errors: FieldErrors) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: "Validation failed".to_string(),
            field_errors: Some(errors),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    /// Log `err` and answer with a generic 500.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        error!("Internal error: {err}");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, MSG_INTERNAL)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            field_errors: self.field_errors.map(|errors| errors.to_map()),
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::policy::Field;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn validation_errors_carry_field_map() -> anyhow::Result<()> {
        let response =
            ApiError::validation(FieldErrors::single(Field::Email, "Email is required"))
                .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let json: serde_json::Value = serde_json::from_slice(&body)?;
        assert_eq!(json["fieldErrors"]["email"][0], "Email is required");
        Ok(())
    }

    #[tokio::test]
    async fn internal_errors_hide_details() -> anyhow::Result<()> {
        let response = ApiError::internal("connection reset").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), usize::MAX).await?;
        let json: serde_json::Value = serde_json::from_slice(&body)?;
        assert_eq!(json["error"], MSG_INTERNAL);
        assert!(json.get("fieldErrors").is_none());
        Ok(())
    }
}
