//! Page gates for the sign-in form, the forced password change and the
//! role dashboards.
//!
//! Pages answer either with a temporary redirect or a small JSON view model;
//! rendering lives in the frontend.

use axum::{
    extract::Extension,
    http::{HeaderMap, Uri},
    response::{IntoResponse, Json, Redirect, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use crate::{
    api::error::ApiError,
    auth::{
        edge::PATHNAME_HEADER,
        gate::{self, Access},
        role::{home_for, Role, CHANGE_PASSWORD_PATH, OPERATOR_HOME, SIGNIN_PATH},
        session::{RequestSession, Session},
    },
};

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PageView {
    pub page: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<&'static str>,
}

#[derive(Serialize, Debug)]
pub struct DashboardUser {
    pub name: String,
    pub role: Role,
    pub image: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct DashboardView {
    pub user: DashboardUser,
    pub pathname: String,
}

pub fn router() -> Router {
    Router::new()
        .route("/signin", get(signin_page))
        .route("/change-password", get(change_password_page))
        .route("/admin", get(admin_layout))
        .route("/admin/*rest", get(admin_layout))
        .route("/operator", get(operator_layout))
        .route("/operator/*rest", get(operator_layout))
}

async fn current(request: &RequestSession) -> Result<Option<Arc<Session>>, Response> {
    request.resolve().await.map_err(|err| {
        error!("Failed to resolve session for page: {err}");
        ApiError::unavailable("Session lookup failed").into_response()
    })
}

fn after_login(session: &Session) -> &'static str {
    if session.must_change_password {
        CHANGE_PASSWORD_PATH
    } else {
        session.role.home_path()
    }
}

pub async fn signin_page(request: Extension<RequestSession>) -> Response {
    match current(&request).await {
        Ok(Some(session)) => Redirect::temporary(after_login(&session)).into_response(),
        Ok(None) => Json(PageView {
            page: "signin",
            redirect_to: None,
        })
        .into_response(),
        Err(response) => response,
    }
}

pub async fn change_password_page(request: Extension<RequestSession>) -> Response {
    match current(&request).await {
        Ok(None) => Redirect::temporary(SIGNIN_PATH).into_response(),
        Ok(Some(session)) if !session.must_change_password => {
            Redirect::temporary(session.role.home_path()).into_response()
        }
        Ok(Some(session)) => Json(PageView {
            page: "change-password",
            redirect_to: Some(session.role.home_path()),
        })
        .into_response(),
        Err(response) => response,
    }
}

fn dashboard(session: &Session, headers: &HeaderMap, uri: &Uri) -> Response {
    if session.must_change_password {
        return Redirect::temporary(CHANGE_PASSWORD_PATH).into_response();
    }
    let pathname = headers
        .get(PATHNAME_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_else(|| uri.path())
        .to_string();
    Json(DashboardView {
        user: DashboardUser {
            name: session.display_name.clone(),
            role: session.role,
            image: session.avatar_ref.clone(),
        },
        pathname,
    })
    .into_response()
}

pub async fn admin_layout(
    request: Extension<RequestSession>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let session = match current(&request).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    match gate::require_admin(session) {
        Access::Allowed(session) => dashboard(&session, &headers, &uri),
        Access::Unauthenticated => Redirect::temporary(SIGNIN_PATH).into_response(),
        Access::Forbidden(_) => Redirect::temporary(OPERATOR_HOME).into_response(),
    }
}

pub async fn operator_layout(
    request: Extension<RequestSession>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let session = match current(&request).await {
        Ok(session) => session,
        Err(response) => return response,
    };
    let home = home_for(session.as_ref().map(|session| session.role));
    match gate::require_operator(session) {
        Access::Allowed(session) => dashboard(&session, &headers, &uri),
        Access::Unauthenticated => Redirect::temporary(SIGNIN_PATH).into_response(),
        Access::Forbidden(_) => Redirect::temporary(home).into_response(),
    }
}
