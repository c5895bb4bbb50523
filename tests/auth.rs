//! Contract tests for the auth client against a mocked auth service.

use agenda::auth::client::AuthClient;
use agenda::auth::data::{AuthError, Credentials, Session, SignUpOutcome};
use agenda::config::BackendConfig;
use agenda::internal_error::InternalError;
use agenda::local_storage::{LocalStorage, SESSION_KEY};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer, storage: &LocalStorage) -> AuthClient {
    AuthClient::new(
        reqwest::Client::new(),
        BackendConfig {
            url: server.uri(),
            anon_key: "anon-key".into(),
        },
        storage.clone(),
    )
}

fn credentials() -> Credentials {
    Credentials {
        email: " maria@example.com ".into(),
        password: "secret123".into(),
    }
}

fn session_body() -> serde_json::Value {
    json!({
        "access_token": "token-1",
        "token_type": "bearer",
        "expires_in": 3600,
        "refresh_token": "refresh-1",
        "user": { "id": "user-1", "email": "maria@example.com" }
    })
}

#[tokio::test]
async fn sign_in_publishes_and_persists_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .and(header("apikey", "anon-key"))
        .and(body_partial_json(json!({ "email": "maria@example.com" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body()))
        .expect(1)
        .mount(&server)
        .await;

    let storage = LocalStorage::in_memory().unwrap();
    let client = client(&server, &storage);
    let mut sessions = client.subscribe();

    let session = client.sign_in(&credentials()).await.unwrap();
    assert_eq!(session.user.id, "user-1");

    assert!(sessions.has_changed().unwrap());
    assert_eq!(
        sessions.borrow_and_update().as_ref().map(|s| s.access_token.as_str()),
        Some("token-1")
    );

    let stored: Option<Session> = storage.read_json(SESSION_KEY).unwrap();
    assert_eq!(stored, Some(session));
}

#[tokio::test]
async fn rejected_sign_in_maps_to_user_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials"
        })))
        .mount(&server)
        .await;

    let storage = LocalStorage::in_memory().unwrap();
    let client = client(&server, &storage);

    let error = client.sign_in(&credentials()).await.unwrap_err();
    assert!(matches!(
        error,
        InternalError::Auth(AuthError::InvalidCredentials)
    ));
    assert_eq!(error.user_message(), "Email ou senha incorretos");
    assert!(client.current_session().is_none());
}

#[tokio::test]
async fn rate_limit_is_recognized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
        .mount(&server)
        .await;

    let storage = LocalStorage::in_memory().unwrap();
    let client = client(&server, &storage);

    let error = client.sign_up(&credentials()).await.unwrap_err();
    assert!(matches!(error, InternalError::Auth(AuthError::RateLimited)));
}

#[tokio::test]
async fn sign_up_outcomes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .and(body_partial_json(json!({ "email": "new@example.com" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "user-2",
            "email": "new@example.com",
            "identities": [{ "provider": "email" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .and(body_partial_json(json!({ "email": "old@example.com" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "user-3",
            "email": "old@example.com",
            "identities": []
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/signup"))
        .and(body_partial_json(json!({ "email": "maria@example.com" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body()))
        .mount(&server)
        .await;

    let storage = LocalStorage::in_memory().unwrap();
    let client = client(&server, &storage);
    let sign_up = |email: &str| Credentials {
        email: email.into(),
        password: "secret123".into(),
    };

    assert_eq!(
        client.sign_up(&sign_up("new@example.com")).await.unwrap(),
        SignUpOutcome::ConfirmationRequired
    );
    assert_eq!(
        client.sign_up(&sign_up("old@example.com")).await.unwrap(),
        SignUpOutcome::AlreadyRegistered
    );
    assert!(client.current_session().is_none());

    let outcome = client.sign_up(&sign_up("maria@example.com")).await.unwrap();
    assert!(matches!(outcome, SignUpOutcome::SignedIn { .. }));
    assert!(client.current_session().is_some());
}

#[tokio::test]
async fn stored_session_is_validated_on_restore() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "user-1",
            "email": "maria@example.com"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let storage = LocalStorage::in_memory().unwrap();
    let stored: Session = serde_json::from_value(session_body()).unwrap();
    storage.write_json(SESSION_KEY, &stored).unwrap();

    let client = client(&server, &storage);
    let restored = client.restore_session().await.unwrap();

    assert_eq!(restored.user.id, "user-1");
    assert_eq!(client.current_session(), Some(restored));
}

#[tokio::test]
async fn rejected_session_without_refresh_is_dropped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "msg": "invalid JWT"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error_description": "Invalid Refresh Token"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let storage = LocalStorage::in_memory().unwrap();
    let stored: Session = serde_json::from_value(session_body()).unwrap();
    storage.write_json(SESSION_KEY, &stored).unwrap();

    let client = client(&server, &storage);
    assert!(client.restore_session().await.is_none());
    assert!(client.current_session().is_none());
    assert_eq!(storage.get_item(SESSION_KEY).unwrap(), None);
}

#[tokio::test]
async fn unreachable_service_drops_stored_session() {
    let storage = LocalStorage::in_memory().unwrap();
    let stored: Session = serde_json::from_value(session_body()).unwrap();
    storage.write_json(SESSION_KEY, &stored).unwrap();

    let client = AuthClient::new(
        reqwest::Client::new(),
        BackendConfig {
            url: "http://127.0.0.1:9".into(),
            anon_key: "anon-key".into(),
        },
        storage.clone(),
    );

    assert!(client.restore_session().await.is_none());
    assert!(client.current_session().is_none());
    assert_eq!(storage.get_item(SESSION_KEY).unwrap(), None);
}

#[tokio::test]
async fn sign_out_forgets_session_even_on_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(session_body()))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let storage = LocalStorage::in_memory().unwrap();
    let client = client(&server, &storage);
    client.sign_in(&credentials()).await.unwrap();

    assert!(client.sign_out().await.is_err());
    assert!(client.current_session().is_none());
    assert_eq!(storage.get_item(SESSION_KEY).unwrap(), None);
}

#[tokio::test]
async fn password_reset_needs_an_email() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/recover"))
        .and(query_param("redirect_to", "https://agenda.example.com"))
        .and(body_partial_json(json!({ "email": "maria@example.com" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let storage = LocalStorage::in_memory().unwrap();
    let client = client(&server, &storage);

    let error = client.reset_password("  ", None).await.unwrap_err();
    assert_eq!(error.user_message(), "Digite seu email primeiro");

    client
        .reset_password("maria@example.com", Some("https://agenda.example.com"))
        .await
        .unwrap();
}
