//! Change password endpoint.

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use secrecy::SecretString;
use std::sync::Arc;

use super::{
    state::AuthState,
    types::{ChangePasswordRequest, ChangePasswordResponse},
};
use crate::{
    api::error::{ApiError, ErrorBody},
    auth::{
        password_change::{ChangePasswordInput, PasswordChangeOutcome, MSG_CHANGED},
        session::RequestSession,
        signin::safe_local_path,
    },
};

#[must_use]
pub fn outcome_status(outcome: &PasswordChangeOutcome) -> StatusCode {
    match outcome {
        PasswordChangeOutcome::Completed { .. } => StatusCode::OK,
        PasswordChangeOutcome::Unauthenticated => StatusCode::UNAUTHORIZED,
        PasswordChangeOutcome::ValidationFailed(_)
        | PasswordChangeOutcome::CurrentPasswordIncorrect => StatusCode::UNPROCESSABLE_ENTITY,
        PasswordChangeOutcome::AccountMisconfigured => StatusCode::INTERNAL_SERVER_ERROR,
        PasswordChangeOutcome::HashingUnavailable | PasswordChangeOutcome::PersistenceFailed => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

fn outcome_body(outcome: PasswordChangeOutcome) -> ChangePasswordResponse {
    if let PasswordChangeOutcome::Completed { redirect_to } = outcome {
        return ChangePasswordResponse {
            success: true,
            errors: None,
            message: Some(MSG_CHANGED.to_string()),
            redirect_to,
        };
    }
    ChangePasswordResponse {
        success: false,
        errors: Some(outcome.field_errors().to_map()),
        message: None,
        redirect_to: None,
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = ChangePasswordResponse),
        (status = 401, description = "No active session", body = ChangePasswordResponse),
        (status = 422, description = "Policy violation or wrong current password", body = ChangePasswordResponse),
        (status = 500, description = "Account has no credential password", body = ChangePasswordResponse),
        (status = 503, description = "Hashing or persistence unavailable", body = ChangePasswordResponse),
        (status = 400, description = "Malformed request body", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn change_password(
    auth_state: Extension<Arc<AuthState>>,
    session: Extension<RequestSession>,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return ApiError::bad_request(rejection.body_text()).into_response(),
    };

    let input = ChangePasswordInput {
        current_password: SecretString::from(request.current_password),
        new_password: SecretString::from(request.new_password),
        confirm_password: SecretString::from(request.confirm_password),
    };
    let workflow = auth_state.password_change();
    let outcome = match request.redirect_to.as_deref().and_then(safe_local_path) {
        Some(target) => workflow.execute_and_redirect(&session, input, target).await,
        None => workflow.execute(&session, input).await,
    };

    (outcome_status(&outcome), Json(outcome_body(outcome))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password_change::{MSG_ACCOUNT_MISCONFIGURED, MSG_TRY_LATER};

    #[test]
    fn failure_statuses() {
        assert_eq!(
            outcome_status(&PasswordChangeOutcome::Unauthenticated),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            outcome_status(&PasswordChangeOutcome::CurrentPasswordIncorrect),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            outcome_status(&PasswordChangeOutcome::AccountMisconfigured),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            outcome_status(&PasswordChangeOutcome::HashingUnavailable),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn bodies_carry_form_messages() {
        let body = outcome_body(PasswordChangeOutcome::AccountMisconfigured);
        assert!(!body.success);
        assert_eq!(
            body.errors.and_then(|errors| errors.get("_form").cloned()),
            Some(vec![MSG_ACCOUNT_MISCONFIGURED.to_string()])
        );

        let body = outcome_body(PasswordChangeOutcome::PersistenceFailed);
        assert_eq!(
            body.errors.and_then(|errors| errors.get("_form").cloned()),
            Some(vec![MSG_TRY_LATER.to_string()])
        );

        let body = outcome_body(PasswordChangeOutcome::Completed {
            redirect_to: Some("/admin".to_string()),
        });
        assert!(body.success);
        assert_eq!(body.message.as_deref(), Some(MSG_CHANGED));
        assert_eq!(body.redirect_to.as_deref(), Some("/admin"));
    }
}
