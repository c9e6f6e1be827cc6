use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use cms_auth::auth::{PasswordHasher, TokenIdentity, TokenIssuer};
use cms_auth::configuration::JwtSettings;
use cms_auth::session::SessionService;
use cms_auth::startup::run;
use cms_auth::store::{InMemoryUserStore, Role};
use serde_json::{json, Value};

const SECRET: &str = "integration-test-secret";

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
}

fn jwt_settings(secret: &str) -> JwtSettings {
    JwtSettings {
        secret: secret.to_string(),
        access_token_expiry: 3600,
        refresh_token_expiry: 7200,
        issuer: "cms_auth".to_string(),
    }
}

fn spawn_app() -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let sessions = SessionService::new(
        Arc::new(InMemoryUserStore::new()),
        TokenIssuer::new(&jwt_settings(SECRET)).expect("Failed to build token issuer"),
        // Lowest cost keeps the suite fast
        PasswordHasher::new(4),
        Duration::from_secs(5),
    );
    let server = run(listener, sessions).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        client: reqwest::Client::new(),
    }
}

fn account(email: &str, phone: &str, user_type: &str) -> Value {
    json!({
        "first_name": "Ada",
        "last_name": "Lovelace",
        "email": email,
        "phone": phone,
        "password": "SecurePass123",
        "user_type": user_type
    })
}

impl TestApp {
    async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(&format!("{}{}", &self.address, path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    async fn get_with_token(&self, path: &str, token: &str) -> reqwest::Response {
        self.client
            .get(&format!("{}{}", &self.address, path))
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    async fn register(&self, email: &str, phone: &str, user_type: &str) -> String {
        let response = self
            .post_json("/users/register", &account(email, phone, user_type))
            .await;
        assert_eq!(200, response.status().as_u16());
        let body: Value = response.json().await.expect("Failed to parse response");
        body["inserted_id"]
            .as_str()
            .expect("inserted_id missing")
            .to_string()
    }

    async fn login(&self, email: &str) -> Value {
        let response = self
            .post_json(
                "/users/login",
                &json!({ "email": email, "password": "SecurePass123" }),
            )
            .await;
        assert_eq!(200, response.status().as_u16());
        response.json().await.expect("Failed to parse response")
    }
}

// --- Registration Tests ---

#[tokio::test]
async fn register_returns_200_and_inserted_id() {
    let app = spawn_app();

    let response = app
        .post_json("/users/register", &account("ada@example.com", "+441234567", "USER"))
        .await;

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.expect("Failed to parse response");
    let inserted_id = body["inserted_id"].as_str().expect("inserted_id missing");
    assert!(uuid::Uuid::parse_str(inserted_id).is_ok());
}

#[tokio::test]
async fn register_returns_400_for_invalid_payloads() {
    let app = spawn_app();

    let mut missing_email = account("ada@example.com", "+441234567", "USER");
    missing_email.as_object_mut().unwrap().remove("email");
    let mut short_password = account("ada@example.com", "+441234567", "USER");
    short_password["password"] = json!("short");

    let test_cases = vec![
        (missing_email, "missing email"),
        (short_password, "password too short"),
        (account("not-an-email", "+441234567", "USER"), "malformed email"),
        (account("ada@example.com", "+441234567", "ROOT"), "unknown role"),
        (account("ada@example.com", "+441234567", ""), "empty role"),
        (json!({}), "empty body"),
    ];

    for (body, description) in test_cases {
        let response = app.post_json("/users/register", &body).await;
        assert_eq!(
            400,
            response.status().as_u16(),
            "The API did not fail with 400 Bad Request when the payload had {}.",
            description
        );
    }
}

#[tokio::test]
async fn register_returns_400_for_malformed_json() {
    let app = spawn_app();

    let response = app
        .client
        .post(&format!("{}/users/register", &app.address))
        .header("Content-Type", "application/json")
        .body("{ not json")
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(400, response.status().as_u16());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn register_rejects_duplicate_email_or_phone() {
    let app = spawn_app();
    app.register("ada@example.com", "+441234567", "USER").await;

    for body in [
        account("ada@example.com", "+449999999", "USER"),
        account("other@example.com", "+441234567", "USER"),
    ] {
        let response = app.post_json("/users/register", &body).await;
        assert_eq!(400, response.status().as_u16());
        let error: Value = response.json().await.expect("Failed to parse response");
        assert_eq!(error["code"], "ALREADY_EXISTS");
        assert_eq!(error["message"], "This email or phone number already exists");
    }
}

// --- Login Tests ---

#[tokio::test]
async fn login_returns_user_with_fresh_token_pair() {
    let app = spawn_app();
    let user_id = app.register("ada@example.com", "+441234567", "USER").await;

    let first = app.login("ada@example.com").await;
    let second = app.login("ada@example.com").await;

    assert_eq!(first["user_id"], user_id.as_str());
    assert_eq!(first["email"], "ada@example.com");
    assert_eq!(first["user_type"], "USER");
    assert!(first.get("password").is_none());
    assert!(first["token"].is_string());
    assert!(first["refresh_token"].is_string());
    assert_ne!(first["token"], second["token"]);
    assert_ne!(first["refresh_token"], second["refresh_token"]);
}

#[tokio::test]
async fn login_gives_same_error_for_wrong_password_and_unknown_email() {
    let app = spawn_app();
    app.register("ada@example.com", "+441234567", "USER").await;

    let wrong_password = app
        .post_json(
            "/users/login",
            &json!({ "email": "ada@example.com", "password": "WrongPass123" }),
        )
        .await;
    let unknown_email = app
        .post_json(
            "/users/login",
            &json!({ "email": "nobody@example.com", "password": "SecurePass123" }),
        )
        .await;

    assert_eq!(400, wrong_password.status().as_u16());
    assert_eq!(400, unknown_email.status().as_u16());

    let wrong_password: Value = wrong_password.json().await.unwrap();
    let unknown_email: Value = unknown_email.json().await.unwrap();
    assert_eq!(wrong_password["message"], "Incorrect email or password");
    assert_eq!(wrong_password["message"], unknown_email["message"]);
    assert_eq!(wrong_password["code"], unknown_email["code"]);
}

// --- Refresh Tests ---

#[tokio::test]
async fn refresh_exchanges_current_refresh_token() {
    let app = spawn_app();
    app.register("ada@example.com", "+441234567", "USER").await;
    let session = app.login("ada@example.com").await;

    let response = app
        .post_json(
            "/users/refresh",
            &json!({ "refresh_token": session["refresh_token"] }),
        )
        .await;

    assert_eq!(200, response.status().as_u16());
    let refreshed: Value = response.json().await.unwrap();
    assert_ne!(refreshed["token"], session["token"]);
    assert_ne!(refreshed["refresh_token"], session["refresh_token"]);
}

#[tokio::test]
async fn refresh_rejects_superseded_and_access_tokens() {
    let app = spawn_app();
    app.register("ada@example.com", "+441234567", "USER").await;
    let old = app.login("ada@example.com").await;
    let _new = app.login("ada@example.com").await;

    for token in [&old["refresh_token"], &old["token"]] {
        let response = app
            .post_json("/users/refresh", &json!({ "refresh_token": token }))
            .await;
        assert_eq!(401, response.status().as_u16());
    }
}

// --- Protected Route Tests ---

#[tokio::test]
async fn protected_routes_require_bearer_token() {
    let app = spawn_app();
    let user_id = app.register("ada@example.com", "+441234567", "USER").await;

    let response = app
        .client
        .get(&format!("{}/users/{}", &app.address, user_id))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(401, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "MISSING_TOKEN");
}

#[tokio::test]
async fn user_can_read_self_but_not_others() {
    let app = spawn_app();
    let ada = app.register("ada@example.com", "+441234567", "USER").await;
    let grace = app.register("grace@example.com", "+449876543", "USER").await;
    let session = app.login("ada@example.com").await;
    let token = session["token"].as_str().unwrap();

    let own = app.get_with_token(&format!("/users/{}", ada), token).await;
    assert_eq!(200, own.status().as_u16());
    let own: Value = own.json().await.unwrap();
    assert_eq!(own["email"], "ada@example.com");

    let other = app.get_with_token(&format!("/users/{}", grace), token).await;
    assert_eq!(403, other.status().as_u16());

    let list = app.get_with_token("/users", token).await;
    assert_eq!(403, list.status().as_u16());
}

#[tokio::test]
async fn admin_can_list_and_read_users() {
    let app = spawn_app();
    app.register("admin@example.com", "+441111111", "ADMIN").await;
    let ada = app.register("ada@example.com", "+441234567", "USER").await;
    app.register("grace@example.com", "+449876543", "USER").await;
    let session = app.login("admin@example.com").await;
    let token = session["token"].as_str().unwrap();

    let page = app.get_with_token("/users?recordPerPage=2&page=1", token).await;
    assert_eq!(200, page.status().as_u16());
    let page: Value = page.json().await.unwrap();
    assert_eq!(page["total_count"], 3);
    assert_eq!(page["user_items"].as_array().unwrap().len(), 2);

    let second: Value = app
        .get_with_token("/users?recordPerPage=2&page=2", token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(second["user_items"].as_array().unwrap().len(), 1);

    let user = app.get_with_token(&format!("/users/{}", ada), token).await;
    assert_eq!(200, user.status().as_u16());

    let missing = app.get_with_token("/users/does-not-exist", token).await;
    assert_eq!(404, missing.status().as_u16());
}

#[tokio::test]
async fn token_signed_with_other_secret_is_rejected() {
    let app = spawn_app();
    let user_id = app.register("ada@example.com", "+441234567", "ADMIN").await;

    let forger = TokenIssuer::new(&jwt_settings("some-other-secret")).unwrap();
    let forged = forger
        .issue_token_pair(&TokenIdentity {
            user_id: user_id.clone(),
            email: "ada@example.com".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            role: Role::Admin,
        })
        .unwrap();

    let response = app
        .get_with_token(&format!("/users/{}", user_id), &forged.access_token)
        .await;
    assert_eq!(401, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "TOKEN_INVALID");
}

#[tokio::test]
async fn refresh_token_is_not_accepted_as_bearer() {
    let app = spawn_app();
    let user_id = app.register("ada@example.com", "+441234567", "USER").await;
    let session = app.login("ada@example.com").await;

    let response = app
        .get_with_token(
            &format!("/users/{}", user_id),
            session["refresh_token"].as_str().unwrap(),
        )
        .await;
    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn register_rejects_password_over_72_bytes() {
    let app = spawn_app();

    let mut body = account("ada@example.com", "+441234567", "USER");
    body["password"] = json!(format!("{}REALSECRET", "a".repeat(72)));
    let response = app.post_json("/users/register", &body).await;

    assert_eq!(400, response.status().as_u16());
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["code"], "VALIDATION_ERROR");
}

// --- Email Lookup and Profile Update Tests ---

#[tokio::test]
async fn user_lookup_by_email_is_limited_to_self() {
    let app = spawn_app();
    let ada = app.register("ada@example.com", "+441234567", "USER").await;
    app.register("grace@example.com", "+449876543", "USER").await;
    let session = app.login("ada@example.com").await;
    let token = session["token"].as_str().unwrap();

    let own = app.get_with_token("/user/ada@example.com", token).await;
    assert_eq!(200, own.status().as_u16());
    let own: Value = own.json().await.unwrap();
    assert_eq!(own["user_id"], ada.as_str());

    let other = app.get_with_token("/user/grace@example.com", token).await;
    assert_eq!(403, other.status().as_u16());

    let anonymous = app
        .client
        .get(&format!("{}/user/ada@example.com", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, anonymous.status().as_u16());
}

#[tokio::test]
async fn profile_update_changes_login_credentials() {
    let app = spawn_app();
    let ada = app.register("ada@example.com", "+441234567", "USER").await;
    let session = app.login("ada@example.com").await;
    let token = session["token"].as_str().unwrap();

    let response = app
        .client
        .put(&format!("{}/user/{}", &app.address, ada))
        .header("Authorization", format!("Bearer {}", token))
        .json(&json!({ "first_name": "Augusta", "password": "AnotherPass456" }))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(200, response.status().as_u16());
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["first_name"], "Augusta");
    assert_eq!(updated["email"], "ada@example.com");
    assert_eq!(updated["user_type"], "USER");
    assert!(updated.get("password").is_none());

    let old_password = app
        .post_json(
            "/users/login",
            &json!({ "email": "ada@example.com", "password": "SecurePass123" }),
        )
        .await;
    assert_eq!(400, old_password.status().as_u16());

    let new_password = app
        .post_json(
            "/users/login",
            &json!({ "email": "ada@example.com", "password": "AnotherPass456" }),
        )
        .await;
    assert_eq!(200, new_password.status().as_u16());
}

#[tokio::test]
async fn profile_update_rejects_taken_email_and_other_users() {
    let app = spawn_app();
    let ada = app.register("ada@example.com", "+441234567", "USER").await;
    let grace = app.register("grace@example.com", "+449876543", "USER").await;
    let session = app.login("ada@example.com").await;
    let token = session["token"].as_str().unwrap();

    let taken = app
        .client
        .put(&format!("{}/user/{}", &app.address, ada))
        .header("Authorization", format!("Bearer {}", token))
        .json(&json!({ "email": "grace@example.com" }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(400, taken.status().as_u16());
    let error: Value = taken.json().await.unwrap();
    assert_eq!(error["code"], "ALREADY_EXISTS");

    let foreign = app
        .client
        .put(&format!("{}/user/{}", &app.address, grace))
        .header("Authorization", format!("Bearer {}", token))
        .json(&json!({ "first_name": "Mallory" }))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(403, foreign.status().as_u16());
}
