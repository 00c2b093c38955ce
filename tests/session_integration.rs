use serde_json::{json, Value};
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use sessiond::auth::hash_password;
use sessiond::configuration::{
    ApplicationSettings, DatabaseSettings, HousekeepingSettings, JwtSettings, PasswordSettings, Settings,
    TimeoutSettings,
};
use sessiond::startup::run;
use sessiond::state::AppState;
use sessiond::store::{InMemoryCredentialStore, InMemoryRefreshTokenStore, UserCredential};

const BCRYPT_COST: u32 = 4;

pub struct TestApp {
    pub address: String,
    pub alice_id: Uuid,
    pub client: reqwest::Client,
}

fn test_settings(access_token_expiry: i64, refresh_token_expiry: i64) -> Settings {
    Settings {
        database: DatabaseSettings {
            username: "unused".to_string(),
            password: "unused".to_string(),
            port: 5432,
            host: "localhost".to_string(),
            database_name: "unused".to_string(),
            max_connections: 1,
        },
        application: ApplicationSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        jwt: JwtSettings {
            secret: "integration-secret-key-at-least-32-characters".to_string(),
            issuer: "sessiond-test".to_string(),
            access_token_expiry,
            refresh_token_expiry,
            clock_skew_seconds: 0,
        },
        password: PasswordSettings {
            bcrypt_cost: BCRYPT_COST,
        },
        timeouts: TimeoutSettings {
            store_millis: 2_000,
            hashing_millis: 5_000,
        },
        housekeeping: HousekeepingSettings {
            purge_interval_seconds: 60,
        },
    }
}

async fn spawn_app_with_ttls(access_token_expiry: i64, refresh_token_expiry: i64) -> TestApp {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let credentials = Arc::new(InMemoryCredentialStore::new());
    let alice_id = Uuid::new_v4();
    credentials.insert(UserCredential {
        user_id: alice_id,
        username: "alice".to_string(),
        password_hash: hash_password("correct", BCRYPT_COST).expect("Failed to hash password"),
    });
    credentials.insert(UserCredential {
        user_id: Uuid::new_v4(),
        username: "mallory".to_string(),
        password_hash: "corrupted-hash".to_string(),
    });

    let state = AppState::build(
        &test_settings(access_token_expiry, refresh_token_expiry),
        credentials,
        Arc::new(InMemoryRefreshTokenStore::new()),
    )
    .expect("Failed to build application state");

    let server = run(listener, state).expect("Failed to bind address");
    let _ = tokio::spawn(server);

    TestApp {
        address,
        alice_id,
        client: reqwest::Client::new(),
    }
}

async fn spawn_app() -> TestApp {
    spawn_app_with_ttls(900, 3600).await
}

impl TestApp {
    async fn post_login(&self, body: &Value) -> reqwest::Response {
        self.client
            .post(&format!("{}/login", &self.address))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    async fn login_alice(&self) -> (String, String) {
        let response = self
            .post_login(&json!({"username": "alice", "password": "correct"}))
            .await;
        assert_eq!(200, response.status().as_u16());
        let body: Value = response.json().await.expect("Failed to parse response");
        (
            body["data"]["accessToken"].as_str().unwrap().to_string(),
            body["data"]["refreshToken"].as_str().unwrap().to_string(),
        )
    }

    async fn with_bearer(&self, method: reqwest::Method, path: &str, token: &str) -> reqwest::Response {
        self.client
            .request(method, &format!("{}{}", &self.address, path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    async fn check(&self, token: &str) -> reqwest::Response {
        self.with_bearer(reqwest::Method::GET, "/check", token).await
    }

    async fn refresh(&self, token: &str) -> reqwest::Response {
        self.with_bearer(reqwest::Method::POST, "/refresh", token).await
    }
}

async fn error_reason(response: reqwest::Response) -> String {
    let body: Value = response.json().await.expect("Failed to parse response");
    body["error"]["reason"].as_str().unwrap_or_default().to_string()
}

// --- Login Tests ---

#[tokio::test]
async fn login_returns_200_and_token_pair_for_valid_credentials() {
    let app = spawn_app().await;

    let response = app
        .post_login(&json!({"username": "alice", "password": "correct"}))
        .await;

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["data"]["accessToken"].is_string());
    assert!(body["data"]["refreshToken"].is_string());
    assert_eq!(body["data"]["tokenType"], "Bearer");
    assert_eq!(body["data"]["expiresIn"], 900);
}

#[tokio::test]
async fn login_trims_username() {
    let app = spawn_app().await;

    let response = app
        .post_login(&json!({"username": "  alice ", "password": "correct"}))
        .await;

    assert_eq!(200, response.status().as_u16());
}

#[tokio::test]
async fn login_responses_for_unknown_user_and_wrong_password_are_identical() {
    let app = spawn_app().await;

    let unknown = app
        .post_login(&json!({"username": "nobody", "password": "correct"}))
        .await;
    let wrong = app
        .post_login(&json!({"username": "alice", "password": "incorrect"}))
        .await;
    let wrong_case = app
        .post_login(&json!({"username": "Alice", "password": "correct"}))
        .await;

    let mut bodies = Vec::new();
    for response in [unknown, wrong, wrong_case] {
        assert_eq!(401, response.status().as_u16());
        bodies.push(response.bytes().await.expect("Failed to read body"));
    }
    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(bodies[1], bodies[2]);

    let body: Value = serde_json::from_slice(&bodies[0]).unwrap();
    assert_eq!(body["error"]["code"], 401);
    assert_eq!(body["error"]["reason"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn login_with_unreadable_stored_hash_is_401_not_500() {
    let app = spawn_app().await;

    let response = app
        .post_login(&json!({"username": "mallory", "password": "anything"}))
        .await;

    assert_eq!(401, response.status().as_u16());
}

#[tokio::test]
async fn login_returns_405_for_wrong_method() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(&format!("{}/login", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(405, response.status().as_u16());
    assert_eq!(response.headers().get("allow").unwrap(), "POST");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], 405);
}

#[tokio::test]
async fn login_returns_415_for_wrong_content_type() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(&format!("{}/login", &app.address))
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body("username=alice&password=correct")
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(415, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["errors"][0]["message"], "invalid content type");
}

#[tokio::test]
async fn login_returns_400_for_invalid_json() {
    let app = spawn_app().await;
    let test_cases = vec![
        ("{", "truncated object"),
        ("not json", "plain text"),
        (r#"{"username": 5, "password": "correct"}"#, "wrong field type"),
    ];

    for (body, description) in test_cases {
        let response = app
            .client
            .post(&format!("{}/login", &app.address))
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .expect("Failed to execute request.");

        assert_eq!(400, response.status().as_u16(), "Should reject {}", description);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"]["errors"][0]["message"], "invalid json");
    }
}

#[tokio::test]
async fn login_returns_400_when_fields_are_missing() {
    let app = spawn_app().await;
    let test_cases = vec![
        (json!({"password": "correct"}), "username is required"),
        (json!({"username": "   ", "password": "correct"}), "username is required"),
        (json!({"username": "alice"}), "password is required"),
        (json!({"username": "alice", "password": ""}), "password is required"),
        (json!({}), "username is required"),
    ];

    for (body, expected) in test_cases {
        let response = app.post_login(&body).await;

        assert_eq!(400, response.status().as_u16(), "Should reject {}", body);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"]["errors"][0]["message"], expected);
    }
}

#[tokio::test]
async fn login_error_does_not_echo_password() {
    let app = spawn_app().await;

    let response = app
        .post_login(&json!({"username": "alice", "password": "hunter2-secret"}))
        .await;

    let text = response.text().await.unwrap();
    assert!(!text.contains("hunter2-secret"));
}

// --- Check Tests ---

#[tokio::test]
async fn check_returns_subject_for_valid_access_token() {
    let app = spawn_app().await;
    let (access_token, _) = app.login_alice().await;

    let response = app.check(&access_token).await;

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["subject"], app.alice_id.to_string());
    assert!(body["data"]["expiresAt"].is_i64());
}

#[tokio::test]
async fn check_accepts_post() {
    let app = spawn_app().await;
    let (access_token, _) = app.login_alice().await;

    let response = app
        .with_bearer(reqwest::Method::POST, "/check", &access_token)
        .await;

    assert_eq!(200, response.status().as_u16());
}

#[tokio::test]
async fn check_rejects_missing_and_garbage_tokens() {
    let app = spawn_app().await;

    let missing = app
        .client
        .get(&format!("{}/check", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(401, missing.status().as_u16());
    assert_eq!(error_reason(missing).await, "TOKEN_INVALID");

    let garbage = app.check("invalid.token.here").await;
    assert_eq!(401, garbage.status().as_u16());
    assert_eq!(error_reason(garbage).await, "TOKEN_INVALID");
}

#[tokio::test]
async fn check_rejects_tampered_token() {
    let app = spawn_app().await;
    let (access_token, _) = app.login_alice().await;

    let tampered = format!("{}X", access_token);
    let response = app.check(&tampered).await;

    assert_eq!(401, response.status().as_u16());
    assert_eq!(error_reason(response).await, "TOKEN_INVALID");
}

#[tokio::test]
async fn check_rejects_refresh_token() {
    let app = spawn_app().await;
    let (_, refresh_token) = app.login_alice().await;

    let response = app.check(&refresh_token).await;

    assert_eq!(401, response.status().as_u16());
    assert_eq!(error_reason(response).await, "TOKEN_INVALID");
}

// --- Refresh Tests ---

#[tokio::test]
async fn refresh_rotates_the_token_pair() {
    let app = spawn_app().await;
    let (_, refresh_token) = app.login_alice().await;

    let response = app.refresh(&refresh_token).await;

    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    let new_access = body["data"]["accessToken"].as_str().unwrap();
    let new_refresh = body["data"]["refreshToken"].as_str().unwrap();
    assert_ne!(new_refresh, refresh_token);

    assert_eq!(200, app.check(new_access).await.status().as_u16());
    assert_eq!(200, app.refresh(new_refresh).await.status().as_u16());
}

#[tokio::test]
async fn refresh_rejects_access_token() {
    let app = spawn_app().await;
    let (access_token, _) = app.login_alice().await;

    let response = app.refresh(&access_token).await;

    assert_eq!(401, response.status().as_u16());
    assert_eq!(error_reason(response).await, "TOKEN_INVALID");
}

#[tokio::test]
async fn refresh_returns_405_for_wrong_method() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(&format!("{}/refresh", &app.address))
        .send()
        .await
        .expect("Failed to execute request.");

    assert_eq!(405, response.status().as_u16());
}

#[tokio::test]
async fn reused_refresh_token_is_rejected_and_revokes_the_session() {
    let app = spawn_app().await;
    let (_, original) = app.login_alice().await;

    let response = app.refresh(&original).await;
    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    let successor = body["data"]["refreshToken"].as_str().unwrap().to_string();

    let replay = app.refresh(&original).await;
    assert_eq!(401, replay.status().as_u16());
    assert_eq!(error_reason(replay).await, "TOKEN_REUSED");

    // The legitimate successor was revoked as a precaution.
    let after = app.refresh(&successor).await;
    assert_eq!(401, after.status().as_u16());
    assert_eq!(error_reason(after).await, "TOKEN_REUSED");
}

#[tokio::test]
async fn concurrent_refreshes_with_one_token_have_exactly_one_winner() {
    let app = spawn_app().await;
    let (_, refresh_token) = app.login_alice().await;

    let attempts = (0..10).map(|_| app.refresh(&refresh_token));
    let responses = futures::future::join_all(attempts).await;

    let mut successes = 0;
    let mut reused = 0;
    for response in responses {
        match response.status().as_u16() {
            200 => successes += 1,
            401 => {
                assert_eq!(error_reason(response).await, "TOKEN_REUSED");
                reused += 1;
            }
            other => panic!("Unexpected status {}", other),
        }
    }
    assert_eq!(successes, 1);
    assert_eq!(reused, 9);
}

#[tokio::test]
async fn expired_refresh_token_is_rejected_as_expired() {
    let app = spawn_app_with_ttls(1, 1).await;
    let (_, refresh_token) = app.login_alice().await;

    tokio::time::sleep(Duration::from_millis(2_100)).await;

    let response = app.refresh(&refresh_token).await;
    assert_eq!(401, response.status().as_u16());
    assert_eq!(error_reason(response).await, "TOKEN_EXPIRED");
}

// --- Logout Tests ---

#[tokio::test]
async fn logout_revokes_refresh_token() {
    let app = spawn_app().await;
    let (_, refresh_token) = app.login_alice().await;

    let response = app
        .with_bearer(reqwest::Method::POST, "/logout", &refresh_token)
        .await;
    assert_eq!(204, response.status().as_u16());

    let again = app
        .with_bearer(reqwest::Method::POST, "/logout", &refresh_token)
        .await;
    assert_eq!(204, again.status().as_u16());

    let refresh = app.refresh(&refresh_token).await;
    assert_eq!(401, refresh.status().as_u16());
    assert_eq!(error_reason(refresh).await, "TOKEN_REUSED");
}

// --- End-to-end Scenario ---

#[tokio::test]
async fn alice_session_lifecycle() {
    let app = spawn_app_with_ttls(1, 3600).await;

    let (access_token, refresh_token) = app.login_alice().await;

    let response = app.check(&access_token).await;
    assert_eq!(200, response.status().as_u16());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["subject"], app.alice_id.to_string());

    tokio::time::sleep(Duration::from_millis(2_100)).await;

    let expired = app.check(&access_token).await;
    assert_eq!(401, expired.status().as_u16());
    assert_eq!(error_reason(expired).await, "TOKEN_EXPIRED");

    let refreshed = app.refresh(&refresh_token).await;
    assert_eq!(200, refreshed.status().as_u16());
    let body: Value = refreshed.json().await.unwrap();
    let new_access = body["data"]["accessToken"].as_str().unwrap();
    assert_eq!(200, app.check(new_access).await.status().as_u16());

    let replay = app.refresh(&refresh_token).await;
    assert_eq!(401, replay.status().as_u16());
    assert_eq!(error_reason(replay).await, "TOKEN_REUSED");
}
