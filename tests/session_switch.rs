//! Signing in and out against a mocked backend moves the planner between
//! the hosted store and local storage.

use std::time::Duration;

use agenda::config::AppConfig;
use agenda::local_storage::LocalStorage;
use rocket::http::{ContentType, Status};
use rocket::local::asynchronous::Client;
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_backend(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/auth/v1/token"))
        .and(query_param("grant_type", "password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "token-1",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "refresh-1",
            "user": { "id": "user-1", "email": "maria@example.com" }
        })))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/v1/logout"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/workspaces"))
        .and(query_param("owner_id", "eq.user-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "ws-1" }])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/workspace_members"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": "member-1" }])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/tasks"))
        .and(query_param("workspace_id", "eq.ws-1"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "t1",
                "text": "Entregar relatório",
                "is_permanent": false,
                "completed_dates": [],
                "date": "2024-06-01",
                "completed": false,
                "category": null,
                "is_delivery": false,
                "delivery_date": null,
                "assigned_to_id": "member-1",
                "created_by_id": "member-1",
                "workspace_id": "ws-1"
            }
        ])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/categories"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "c1", "name": "Trabalho", "color": "bg-blue-500 text-white" }
        ])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "key": "darkMode", "value": true }
        ])))
        .mount(server)
        .await;
}

async fn client(server: &MockServer) -> Client {
    let config = AppConfig {
        backend_url: Some(server.uri()),
        backend_key: Some("anon-key".into()),
        ..AppConfig::default()
    };
    let state = agenda::bootstrap_with_storage(&config, LocalStorage::in_memory().unwrap())
        .await
        .expect("bootstrap");

    Client::tracked(agenda::build_rocket(state, &config))
        .await
        .expect("valid rocket instance")
}

async fn get_json(client: &Client, uri: &str) -> Value {
    let response = client.get(uri.to_string()).dispatch().await;
    assert_eq!(response.status(), Status::Ok, "GET {}", uri);
    response.into_json::<Value>().await.unwrap()
}

/// The reload runs on a background task, so poll until it lands.
async fn wait_for_mode(client: &Client, mode: &str) -> Value {
    for _ in 0..100 {
        let status = get_json(client, "/api/status").await;
        if status["mode"] == mode && status["phase"] == "ready" {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    panic!("planner never reached {} mode", mode);
}

#[rocket::async_test]
async fn sign_in_switches_to_backend_and_sign_out_back() {
    let server = MockServer::start().await;
    mount_backend(&server).await;
    let client = client(&server).await;

    let status = get_json(&client, "/api/status").await;
    assert_eq!(status["backendConfigured"], true);
    assert_eq!(status["signedIn"], false);
    assert_eq!(status["mode"], "local");

    let response = client
        .post("/api/sign_in")
        .header(ContentType::JSON)
        .body(json!({ "email": "maria@example.com", "password": "secret123" }).to_string())
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);

    let status = wait_for_mode(&client, "remote").await;
    assert_eq!(status["isLocalMode"], false);
    assert_eq!(status["signedIn"], true);
    assert_eq!(status["user"]["id"], "user-1");
    assert_eq!(status["user"]["name"], "maria");

    let tasks = get_json(&client, "/api/tasks").await;
    assert_eq!(tasks[0]["text"], "Entregar relatório");
    assert_eq!(get_json(&client, "/api/settings").await["darkMode"], true);

    let response = client.post("/api/sign_out").dispatch().await;
    assert_eq!(response.status(), Status::Ok);

    let status = wait_for_mode(&client, "local").await;
    assert_eq!(status["signedIn"], false);
    assert_eq!(status["user"]["id"], "local-user");
    assert!(get_json(&client, "/api/tasks").await.as_array().unwrap().is_empty());
}
