use std::sync::Arc;

use async_trait::async_trait;
use authgate::{
    app::build_app,
    auth::{
        jwt::JwtKeys,
        memory::MemoryUserStore,
        repo::{StoreError, UserStore},
        repo_types::{NewUser, User},
    },
    config::{AppConfig, CookieConfig, Environment, HashConfig, JwtConfig},
    state::AppState,
};
use axum::{
    body::Body,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE},
        HeaderMap, Request, StatusCode,
    },
    Router,
};
use serde_json::{json, Value};
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};
use tower::ServiceExt;
use uuid::Uuid;

fn config(environment: Environment) -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".into(),
        environment,
        host: "127.0.0.1".into(),
        port: 0,
        client_url: "http://localhost:3000".into(),
        jwt: JwtConfig {
            secret: "integration-secret".into(),
            issuer: "authgate-test".into(),
            audience: "authgate-test-users".into(),
            ttl_seconds: 3600,
        },
        cookie: CookieConfig { expire_days: 7 },
        hash: HashConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        },
    }
}

fn app_with(environment: Environment) -> (Router, Arc<MemoryUserStore>) {
    let store = Arc::new(MemoryUserStore::new());
    let state = AppState::new(config(environment), store.clone()).expect("state");
    (build_app(state), store)
}

fn app() -> (Router, Arc<MemoryUserStore>) {
    app_with(Environment::Development)
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

impl Reply {
    fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with("token="))
            .map(str::to_owned)
    }

    fn message(&self) -> &str {
        self.body["message"].as_str().unwrap_or_default()
    }
}

async fn send(app: &Router, req: Request<Body>) -> Reply {
    let res = app.clone().oneshot(req).await.expect("infallible");
    let status = res.status();
    let headers = res.headers().clone();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .expect("body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    Reply {
        status,
        headers,
        body,
    }
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn get_with_bearer(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn get_with_cookie(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(COOKIE, format!("token={token}"))
        .body(Body::empty())
        .unwrap()
}

fn alice() -> Value {
    json!({
        "name": "Alice Smith",
        "email": "Alice@Example.com",
        "password": "secret1",
        "confirmPassword": "secret1"
    })
}

async fn register_alice(app: &Router) -> Reply {
    let reply = send(app, post_json("/api/auth/register", alice())).await;
    assert_eq!(reply.status, StatusCode::CREATED, "{:?}", reply.body);
    reply
}

fn timestamp(v: &Value) -> OffsetDateTime {
    OffsetDateTime::parse(v.as_str().expect("timestamp string"), &Rfc3339).expect("rfc3339")
}

#[tokio::test]
async fn register_and_login_scenario() {
    let (app, store) = app();

    let reg = register_alice(&app).await;
    assert_eq!(reg.body["success"], true);
    assert!(reg.body["token"].as_str().is_some_and(|t| !t.is_empty()));
    let user = reg.body["user"].as_object().unwrap();
    assert_eq!(user["email"], "alice@example.com");
    assert_eq!(user["name"], "Alice Smith");
    assert!(!user.contains_key("password"));
    assert!(!user.contains_key("passwordHash"));
    assert!(!user.contains_key("password_hash"));

    let stored = store.find_by_email("alice@example.com").await.unwrap().unwrap();
    assert_eq!(stored.email, "alice@example.com");

    let cookie = reg.session_cookie().expect("session cookie set");
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Strict"));
    assert!(cookie.contains("Max-Age=604800"));
    assert!(!cookie.contains("Secure"));

    let login = send(
        &app,
        post_json(
            "/api/auth/login",
            json!({ "email": "ALICE@example.com", "password": "secret1" }),
        ),
    )
    .await;
    assert_eq!(login.status, StatusCode::OK);
    assert_eq!(login.body["success"], true);
    assert_eq!(login.body["user"]["id"], reg.body["user"]["id"]);
    assert!(login.session_cookie().is_some());
    let registered_at = timestamp(&login.body["user"]["registeredAt"]);
    let last_login = timestamp(&login.body["user"]["lastLogin"]);
    assert!(last_login >= registered_at);
}

#[tokio::test]
async fn password_mismatch_persists_nothing() {
    let (app, store) = app();
    let mut body = alice();
    body["confirmPassword"] = json!("secret2");
    let reply = send(&app, post_json("/api/auth/register", body)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["success"], false);
    assert_eq!(reply.message(), "Passwords do not match");
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn duplicate_email_in_any_case_is_rejected() {
    let (app, store) = app();
    register_alice(&app).await;

    let mut body = alice();
    body["email"] = json!("  ALICE@EXAMPLE.COM ");
    let reply = send(&app, post_json("/api/auth/register", body)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.message(), "Email already registered");
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn validation_errors_list_each_field() {
    let (app, store) = app();
    let reply = send(
        &app,
        post_json("/api/auth/register", json!({ "name": "A", "email": "nope" })),
    )
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.message(), "Validation failed");
    let fields: Vec<&str> = reply.body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["name", "email", "password"]);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let (app, _) = app();
    let req = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let reply = send(&app, req).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["success"], false);
}

#[tokio::test]
async fn login_failures_share_one_message() {
    let (app, _) = app();
    register_alice(&app).await;

    let wrong_password = send(
        &app,
        post_json(
            "/api/auth/login",
            json!({ "email": "alice@example.com", "password": "wrong-one" }),
        ),
    )
    .await;
    let unknown_email = send(
        &app,
        post_json(
            "/api/auth/login",
            json!({ "email": "ghost@example.com", "password": "secret1" }),
        ),
    )
    .await;

    for reply in [&wrong_password, &unknown_email] {
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert_eq!(reply.message(), "Invalid email or password");
        assert!(reply.session_cookie().is_none());
    }
    assert_eq!(wrong_password.body, unknown_email.body);
}

#[tokio::test]
async fn cookie_and_bearer_resolve_the_same_identity() {
    let (app, _) = app();
    let reg = register_alice(&app).await;
    let id = reg.body["user"]["id"].clone();

    let login = send(
        &app,
        post_json(
            "/api/auth/login",
            json!({ "email": "ALICE@example.com", "password": "secret1" }),
        ),
    )
    .await;
    assert_eq!(login.status, StatusCode::OK);
    assert_eq!(login.body["user"]["id"], id);
    let login_token = login.body["token"].as_str().unwrap().to_owned();
    assert!(login
        .session_cookie()
        .unwrap()
        .starts_with(&format!("token={login_token};")));

    let register_token = reg.body["token"].as_str().unwrap().to_owned();
    for token in [register_token, login_token] {
        for req in [
            get_with_bearer("/api/auth/profile", &token),
            get_with_cookie("/api/auth/profile", &token),
        ] {
            let reply = send(&app, req).await;
            assert_eq!(reply.status, StatusCode::OK);
            assert_eq!(reply.body["user"]["id"], id);
            assert_eq!(reply.body["user"]["email"], "alice@example.com");
            assert!(reply.body["user"].get("passwordHash").is_none());
        }

        for req in [
            get_with_bearer("/api/auth/verify", &token),
            get_with_cookie("/api/auth/verify", &token),
        ] {
            let reply = send(&app, req).await;
            assert_eq!(reply.status, StatusCode::OK);
            assert_eq!(reply.body["authenticated"], true);
            assert_eq!(reply.body["user"]["id"], id);
            assert_eq!(reply.body["user"]["name"], "Alice Smith");
        }
    }
}

#[tokio::test]
async fn cookie_wins_over_header() {
    let (app, _) = app();
    let reg = register_alice(&app).await;
    let token = reg.body["token"].as_str().unwrap();

    let req = Request::builder()
        .uri("/api/auth/verify")
        .header(COOKIE, "token=garbage")
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let reply = send(&app, req).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.message(), "Invalid token");
}

#[tokio::test]
async fn session_middleware_rejections() {
    let (app, store) = app();

    let missing = send(&app, get("/api/auth/profile")).await;
    assert_eq!(missing.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        missing.message(),
        "Not authorized to access this route, please login"
    );

    let garbage = send(&app, get_with_bearer("/api/auth/profile", "a.b.c")).await;
    assert_eq!(garbage.status, StatusCode::UNAUTHORIZED);
    assert_eq!(garbage.message(), "Invalid token");

    let reg = register_alice(&app).await;
    let user_id: Uuid = reg.body["user"]["id"].as_str().unwrap().parse().unwrap();

    let keys = JwtKeys::new(&config(Environment::Development).jwt);
    let stale = keys
        .issue_at(
            user_id,
            "alice@example.com",
            OffsetDateTime::now_utc() - Duration::days(2),
        )
        .unwrap();
    let expired = send(&app, get_with_bearer("/api/auth/verify", &stale)).await;
    assert_eq!(expired.status, StatusCode::UNAUTHORIZED);
    assert_eq!(expired.message(), "Token expired");

    let foreign = JwtKeys::new(&JwtConfig {
        secret: "someone-else".into(),
        ..config(Environment::Development).jwt
    })
    .issue(user_id, "alice@example.com")
    .unwrap();
    let forged = send(&app, get_with_bearer("/api/auth/verify", &foreign)).await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);
    assert_eq!(forged.message(), "Invalid token");

    let token = reg.body["token"].as_str().unwrap();
    store.remove(user_id).await;
    let vanished = send(&app, get_with_bearer("/api/auth/profile", token)).await;
    assert_eq!(vanished.status, StatusCode::UNAUTHORIZED);
    assert_eq!(vanished.message(), "User not found");
}

#[tokio::test]
async fn logout_clears_cookie_but_bearer_stays_valid() {
    let (app, _) = app();
    let reg = register_alice(&app).await;
    let token = reg.body["token"].as_str().unwrap().to_owned();

    let unauthenticated = send(&app, post_json("/api/auth/logout", json!({}))).await;
    assert_eq!(unauthenticated.status, StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .method("POST")
        .uri("/api/auth/logout")
        .header(COOKIE, format!("token={token}"))
        .body(Body::empty())
        .unwrap();
    let reply = send(&app, req).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["success"], true);
    let cleared = reply.session_cookie().expect("cookie overwritten");
    assert!(cleared.starts_with("token=;"));
    assert!(cleared.contains("Max-Age=0"));

    // No revocation list: the same token still works as a bearer credential.
    let still_valid = send(&app, get_with_bearer("/api/auth/verify", &token)).await;
    assert_eq!(still_valid.status, StatusCode::OK);
}

#[tokio::test]
async fn optional_session_never_rejects() {
    let (app, _) = app();

    let anonymous = send(&app, get("/api/auth/session")).await;
    assert_eq!(anonymous.status, StatusCode::OK);
    assert_eq!(anonymous.body["authenticated"], false);
    assert!(anonymous.body.get("user").is_none());

    let junk = send(&app, get_with_bearer("/api/auth/session", "junk")).await;
    assert_eq!(junk.status, StatusCode::OK);
    assert_eq!(junk.body["authenticated"], false);

    let reg = register_alice(&app).await;
    let token = reg.body["token"].as_str().unwrap();
    let known = send(&app, get_with_cookie("/api/auth/session", token)).await;
    assert_eq!(known.status, StatusCode::OK);
    assert_eq!(known.body["authenticated"], true);
    assert_eq!(known.body["user"]["email"], "alice@example.com");
}

#[tokio::test]
async fn production_cookie_is_secure() {
    let (app, _) = app_with(Environment::Production);
    let reg = register_alice(&app).await;
    let cookie = reg.session_cookie().unwrap();
    assert!(cookie.contains("Secure"));
}

#[tokio::test]
async fn health_and_unknown_routes() {
    let (app, _) = app();
    let health = send(&app, get("/api/health")).await;
    assert_eq!(health.status, StatusCode::OK);
    assert_eq!(health.body["success"], true);
    assert_eq!(health.body["environment"], "development");
    timestamp(&health.body["timestamp"]);

    let missing = send(&app, get("/api/nope")).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.message(), "Route not found");
}

/// Store whose every call fails, to exercise the 500 path.
struct BrokenStore;

#[async_trait]
impl UserStore for BrokenStore {
    async fn insert(&self, _user: NewUser) -> Result<User, StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }
    async fn find_by_email(&self, _email: &str) -> Result<Option<User>, StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }
    async fn find_by_id(&self, _id: Uuid) -> Result<Option<User>, StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }
    async fn record_login(
        &self,
        _id: Uuid,
        _at: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }
}

#[tokio::test]
async fn internal_errors_show_detail_only_in_development() {
    for (environment, expect_detail) in [
        (Environment::Development, true),
        (Environment::Production, false),
    ] {
        let state = AppState::new(config(environment), Arc::new(BrokenStore)).unwrap();
        let app = build_app(state);
        let reply = send(&app, post_json("/api/auth/register", alice())).await;
        assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(reply.message(), "Server error");
        assert_eq!(reply.body.get("error").is_some(), expect_detail);
    }
}

#[tokio::test]
async fn concurrent_registrations_create_one_user() {
    let (app, store) = app();
    let mut handles = Vec::new();
    for _ in 0..6 {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            send(&app, post_json("/api/auth/register", alice())).await.status
        }));
    }
    let mut created = 0;
    for h in handles {
        match h.await.unwrap() {
            StatusCode::CREATED => created += 1,
            StatusCode::BAD_REQUEST => {}
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(store.len().await, 1);
}
