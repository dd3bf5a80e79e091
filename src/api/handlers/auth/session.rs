//! Sign-in, sign-out and session read endpoints.

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::{
        header::{InvalidHeaderValue, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Json, Response},
};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::error;

use super::{
    state::AuthState,
    types::{SessionResponse, SignInRequest, SignInResponse},
};
use crate::{
    api::error::{ApiError, ErrorBody},
    auth::{
        config::AuthConfig,
        session::RequestSession,
        signin::{SignInInput, SignInOutcome, MSG_INVALID_CREDENTIALS},
    },
};

pub const MSG_SIGNIN_UNAVAILABLE: &str = "Unable to sign in. Please try again later.";

#[utoipa::path(
    post,
    path = "/api/auth/signin",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Signed in, session cookie set", body = SignInResponse),
        (status = 401, description = "Invalid email or password", body = ErrorBody),
        (status = 422, description = "Missing or malformed fields", body = ErrorBody),
        (status = 503, description = "Credential or session store unavailable", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn signin(
    auth_state: Extension<Arc<AuthState>>,
    payload: Result<Json<SignInRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return ApiError::bad_request(rejection.body_text()).into_response(),
    };

    let outcome = auth_state
        .signin()
        .execute(SignInInput {
            email: request.email,
            password: SecretString::from(request.password),
            callback_url: request.callback_url,
        })
        .await;

    match outcome {
        SignInOutcome::SignedIn {
            cookie_value,
            redirect_to,
        } => match session_cookie(auth_state.config(), &cookie_value) {
            Ok(cookie) => {
                let mut headers = HeaderMap::new();
                headers.insert(SET_COOKIE, cookie);
                (StatusCode::OK, headers, Json(SignInResponse { redirect_to })).into_response()
            }
            Err(err) => ApiError::internal(err).into_response(),
        },
        SignInOutcome::ValidationFailed(errors) => ApiError::validation(errors).into_response(),
        SignInOutcome::InvalidCredentials => {
            ApiError::unauthorized(MSG_INVALID_CREDENTIALS).into_response()
        }
        SignInOutcome::HashingUnavailable | SignInOutcome::StoreUnavailable => {
            ApiError::unavailable(MSG_SIGNIN_UNAVAILABLE).into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/signout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn signout(
    auth_state: Extension<Arc<AuthState>>,
    request: Extension<RequestSession>,
) -> impl IntoResponse {
    if let Some(token_hash) = request
        .evidence()
        .and_then(|evidence| request.resolver().token_hash(evidence))
    {
        if let Err(err) = auth_state.sessions().delete_session(&token_hash).await {
            error!("Failed to delete session: {err}");
        }
    }

    // Always clear the cookie, even if the session record was missing.
    let mut headers = HeaderMap::new();
    match clear_session_cookie(auth_state.config()) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build clearing cookie: {err}"),
    }
    (StatusCode::NO_CONTENT, headers)
}

#[utoipa::path(
    get,
    path = "/api/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 204, description = "No active session"),
        (status = 503, description = "Session store unavailable", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn session(request: Extension<RequestSession>) -> Response {
    match request.resolve().await {
        Ok(Some(session)) => {
            let response = SessionResponse {
                user_id: session.user_id.to_string(),
                email: session.email.clone(),
                name: session.display_name.clone(),
                role: session.role,
                must_change_password: session.must_change_password,
                image: session.avatar_ref.clone(),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(None) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("Failed to lookup session: {err}");
            ApiError::unavailable("Session lookup failed").into_response()
        }
    }
}

/// `HttpOnly` cookie carrying the signed session token.
pub(crate) fn session_cookie(
    config: &AuthConfig,
    value: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let name = config.cookie_name();
    let ttl_seconds = config.session_ttl_seconds();
    let mut cookie =
        format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let name = config.cookie_name();
    let mut cookie = format!("{name}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}
