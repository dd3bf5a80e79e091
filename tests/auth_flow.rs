//! End-to-end flows through the full router against the in-memory backend.

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{
        header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
        Request, StatusCode,
    },
    response::Response,
    Router,
};
use homex::{
    api::{self, handlers::auth::AuthState},
    auth::{
        config::AuthConfig,
        credentials::{Argon2Hasher, PasswordHasher},
        role::Role,
        session::TokenSigner,
    },
    storage::memory::{MemoryStore, NewUser},
};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "integration-secret-with-enough-characters";
const COOKIE_NAME: &str = "homex.session_token";

struct TestApp {
    store: Arc<MemoryStore>,
    router: Router,
}

fn hasher() -> Result<Argon2Hasher> {
    Argon2Hasher::with_params(1024, 1, 1)
}

impl TestApp {
    fn new() -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        let state = AuthState::new(
            AuthConfig::default().with_session_ttl_seconds(600),
            TokenSigner::new(SecretString::from(SECRET.to_string()))?,
            Arc::new(hasher()?),
            store.clone(),
            store.clone(),
        );
        Ok(Self {
            router: api::app(Arc::new(state)),
            store,
        })
    }

    fn seed(&self, email: &str, role: Role, must_change_password: bool) -> Result<Uuid> {
        Ok(self.store.add_user(NewUser {
            email: email.to_string(),
            name: "Dana Agent".to_string(),
            role,
            must_change_password,
            password_hash: Some(hasher()?.hash("Passw0rd!")?),
            image: None,
        }))
    }

    async fn send(&self, request: Request<Body>) -> Result<Response> {
        Ok(self.router.clone().oneshot(request).await?)
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> Result<Response> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, format!("{COOKIE_NAME}={cookie}"));
        }
        self.send(builder.body(Body::empty())?).await
    }

    async fn post(&self, uri: &str, cookie: Option<&str>, body: &Value) -> Result<Response> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, format!("{COOKIE_NAME}={cookie}"));
        }
        self.send(builder.body(Body::from(serde_json::to_vec(body)?))?)
            .await
    }

    /// Sign in and return the cookie value plus the response body.
    async fn sign_in(&self, email: &str, password: &str) -> Result<(String, Value)> {
        let response = self
            .post(
                "/api/auth/signin",
                None,
                &json!({ "email": email, "password": password }),
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let set_cookie = response
            .headers()
            .get(SET_COOKIE)
            .context("missing set-cookie")?
            .to_str()?
            .to_string();
        let value = set_cookie
            .split(';')
            .next()
            .and_then(|pair| pair.strip_prefix(&format!("{COOKIE_NAME}=")))
            .context("malformed set-cookie")?
            .to_string();
        Ok((value, json_body(response).await?))
    }
}

async fn json_body(response: Response) -> Result<Value> {
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&body)?)
}

fn location(response: &Response) -> Option<&str> {
    response
        .headers()
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
}

#[tokio::test]
async fn forced_change_on_first_login_then_dashboard() -> Result<()> {
    let app = TestApp::new()?;
    let user = app.seed("dana@homex.dev", Role::Operator, true)?;

    let (cookie, body) = app.sign_in(" Dana@HomeX.dev ", "Passw0rd!").await?;
    assert_eq!(body["redirectTo"], "/change-password");

    // The dashboard bounces to the forced change while the flag is set.
    let response = app.get("/operator", Some(&cookie)).await?;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), Some("/change-password"));

    let response = app.get("/change-password", Some(&cookie)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await?["redirectTo"], "/operator");

    let response = app
        .post(
            "/api/auth/change-password",
            Some(&cookie),
            &json!({
                "currentPassword": "Passw0rd!",
                "newPassword": "NewPass1",
                "confirmPassword": "NewPass1",
                "redirectTo": "/operator",
            }),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Password changed successfully");
    assert_eq!(body["redirectTo"], "/operator");

    let response = app.get("/api/auth/session", Some(&cookie)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await?["mustChangePassword"], false);

    let stored = app.store.user(user).context("user")?;
    let account = app.store.credential_for(user).context("account")?;
    assert_eq!(stored.password_hash, account.password_hash);
    assert!(hasher()?.verify(&account.password_hash.unwrap_or_default(), "NewPass1")?);

    let response = app.get("/operator/leads", Some(&cookie)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await?;
    assert_eq!(body["pathname"], "/operator/leads");
    assert_eq!(body["user"]["role"], "OPERATOR");

    // The forced-change page now sends the user home.
    let response = app.get("/change-password", Some(&cookie)).await?;
    assert_eq!(location(&response), Some("/operator"));
    Ok(())
}

#[tokio::test]
async fn wrong_current_password_is_field_scoped() -> Result<()> {
    let app = TestApp::new()?;
    app.seed("dana@homex.dev", Role::Operator, true)?;
    let (cookie, _) = app.sign_in("dana@homex.dev", "Passw0rd!").await?;
    let before = app.store.snapshot();

    let response = app
        .post(
            "/api/auth/change-password",
            Some(&cookie),
            &json!({
                "currentPassword": "WrongPass1",
                "newPassword": "NewPass1",
                "confirmPassword": "NewPass1",
            }),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await?;
    assert_eq!(body["success"], false);
    assert_eq!(
        body["errors"]["currentPassword"][0],
        "Current password is incorrect"
    );
    assert_eq!(app.store.snapshot(), before);
    Ok(())
}

#[tokio::test]
async fn short_password_reports_length_rule() -> Result<()> {
    let app = TestApp::new()?;
    app.seed("dana@homex.dev", Role::Admin, true)?;
    let (cookie, _) = app.sign_in("dana@homex.dev", "Passw0rd!").await?;

    let response = app
        .post(
            "/api/auth/change-password",
            Some(&cookie),
            &json!({
                "currentPassword": "Passw0rd!",
                "newPassword": "short1A",
                "confirmPassword": "short1A",
            }),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await?;
    assert_eq!(
        body["errors"]["newPassword"][0],
        "Password must be at least 8 characters"
    );
    assert_eq!(app.store.credential_lookups(), 0);
    Ok(())
}

#[tokio::test]
async fn protected_path_without_cookie_redirects_to_signin() -> Result<()> {
    let app = TestApp::new()?;
    let response = app.get("/admin/team", None).await?;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        location(&response),
        Some("/signin?callbackUrl=%2Fadmin%2Fteam")
    );
    assert_eq!(app.store.session_lookups(), 0);
    Ok(())
}

#[tokio::test]
async fn operator_on_admin_page_goes_to_operator_home() -> Result<()> {
    let app = TestApp::new()?;
    app.seed("dana@homex.dev", Role::Operator, false)?;
    let (cookie, body) = app.sign_in("dana@homex.dev", "Passw0rd!").await?;
    assert_eq!(body["redirectTo"], "/operator");

    let response = app.get("/admin/team", Some(&cookie)).await?;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), Some("/operator"));
    Ok(())
}

#[tokio::test]
async fn admin_on_operator_page_goes_to_admin_home() -> Result<()> {
    let app = TestApp::new()?;
    app.seed("root@homex.dev", Role::Admin, false)?;
    let (cookie, _) = app.sign_in("root@homex.dev", "Passw0rd!").await?;

    let response = app.get("/operator", Some(&cookie)).await?;
    assert_eq!(location(&response), Some("/admin"));

    let response = app.get("/admin", Some(&cookie)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await?["user"]["name"], "Dana Agent");
    Ok(())
}

#[tokio::test]
async fn forged_cookie_passes_edge_but_not_the_gate() -> Result<()> {
    let app = TestApp::new()?;
    let response = app.get("/admin", Some("forged.c2lnbmF0dXJl")).await?;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), Some("/signin"));
    assert_eq!(app.store.session_lookups(), 0);
    Ok(())
}

#[tokio::test]
async fn sign_in_failures_are_generic() -> Result<()> {
    let app = TestApp::new()?;
    app.seed("dana@homex.dev", Role::Operator, false)?;

    for body in [
        json!({ "email": "dana@homex.dev", "password": "WrongPass1" }),
        json!({ "email": "ghost@homex.dev", "password": "Passw0rd!" }),
    ] {
        let response = app.post("/api/auth/signin", None, &body).await?;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(SET_COOKIE).is_none());
        assert_eq!(
            json_body(response).await?["error"],
            "Invalid email or password"
        );
    }

    let response = app
        .post("/api/auth/signin", None, &json!({ "email": "", "password": "" }))
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await?;
    assert_eq!(body["fieldErrors"]["email"][0], "Email is required");
    assert_eq!(body["fieldErrors"]["password"][0], "Password is required");
    Ok(())
}

#[tokio::test]
async fn signin_page_redirects_live_sessions() -> Result<()> {
    let app = TestApp::new()?;
    app.seed("dana@homex.dev", Role::Client, false)?;

    let response = app.get("/signin", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await?["page"], "signin");

    let (cookie, body) = app.sign_in("dana@homex.dev", "Passw0rd!").await?;
    assert_eq!(body["redirectTo"], "/");
    let response = app.get("/signin", Some(&cookie)).await?;
    assert_eq!(location(&response), Some("/"));
    Ok(())
}

#[tokio::test]
async fn sign_out_revokes_session_and_clears_cookie() -> Result<()> {
    let app = TestApp::new()?;
    app.seed("dana@homex.dev", Role::Operator, false)?;
    let (cookie, _) = app.sign_in("dana@homex.dev", "Passw0rd!").await?;

    let response = app
        .post("/api/auth/signout", Some(&cookie), &json!({}))
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cleared = response
        .headers()
        .get(SET_COOKIE)
        .context("missing set-cookie")?
        .to_str()?;
    assert!(cleared.contains("Max-Age=0"));

    let response = app.get("/api/auth/session", Some(&cookie)).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    Ok(())
}

#[tokio::test]
async fn unauthenticated_change_password_is_rejected() -> Result<()> {
    let app = TestApp::new()?;
    let response = app
        .post(
            "/api/auth/change-password",
            None,
            &json!({
                "currentPassword": "Passw0rd!",
                "newPassword": "NewPass1",
                "confirmPassword": "NewPass1",
            }),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        json_body(response).await?["errors"]["_form"][0],
        "Please sign in to continue"
    );
    Ok(())
}

#[tokio::test]
async fn session_store_outage_on_pages_is_503() -> Result<()> {
    let app = TestApp::new()?;
    app.seed("dana@homex.dev", Role::Operator, false)?;
    let (cookie, _) = app.sign_in("dana@homex.dev", "Passw0rd!").await?;

    app.store.fail_session_store(true);
    let response = app.get("/operator", Some(&cookie)).await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}

#[tokio::test]
async fn flagged_client_cannot_reach_root_home() -> Result<()> {
    let app = TestApp::new()?;
    app.seed("casey@homex.dev", Role::Client, true)?;
    let (cookie, body) = app.sign_in("casey@homex.dev", "Passw0rd!").await?;
    assert_eq!(body["redirectTo"], "/change-password");

    let response = app.get("/", Some(&cookie)).await?;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&response), Some("/change-password"));

    let response = app
        .post(
            "/api/auth/change-password",
            Some(&cookie),
            &json!({
                "currentPassword": "Passw0rd!",
                "newPassword": "Fresh1Pass",
                "confirmPassword": "Fresh1Pass",
            }),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get("/", Some(&cookie)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await?["name"], "homex");
    Ok(())
}

#[tokio::test]
async fn edge_overwrites_client_supplied_pathname() -> Result<()> {
    let app = TestApp::new()?;
    app.seed("root@homex.dev", Role::Admin, false)?;
    let (cookie, _) = app.sign_in("root@homex.dev", "Passw0rd!").await?;

    let request = Request::builder()
        .method("GET")
        .uri("/admin/leads")
        .header(COOKIE, format!("{COOKIE_NAME}={cookie}"))
        .header("x-pathname", "/somewhere-else")
        .body(Body::empty())?;
    let response = app.send(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await?["pathname"], "/admin/leads");
    Ok(())
}

#[tokio::test]
async fn health_and_root() -> Result<()> {
    let app = TestApp::new()?;
    let response = app.get("/health", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("X-App").is_some());
    assert_eq!(json_body(response).await?["database"], "ok");

    let response = app.get("/", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await?["name"], "homex");

    let response = app.get("/api/unknown", None).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}
