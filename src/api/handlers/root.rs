use axum::{
    extract::Extension,
    response::{IntoResponse, Json, Redirect, Response},
};
use serde::Serialize;
use tracing::error;

use crate::{
    api::error::ApiError,
    auth::{role::CHANGE_PASSWORD_PATH, session::RequestSession},
};

#[derive(Serialize, Debug)]
pub struct Root {
    name: &'static str,
    version: &'static str,
}

/// `/` doubles as the client home, so a pending forced change wins here too.
pub async fn root(request: Extension<RequestSession>) -> Response {
    match request.resolve().await {
        Ok(Some(session)) if session.must_change_password => {
            Redirect::temporary(CHANGE_PASSWORD_PATH).into_response()
        }
        Ok(_) => Json(Root {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        })
        .into_response(),
        Err(err) => {
            error!("Failed to resolve session for root: {err}");
            ApiError::unavailable("Session lookup failed").into_response()
        }
    }
}
