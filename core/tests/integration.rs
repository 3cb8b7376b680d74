//! End-to-end tests against the live mock server.
//!
//! # Design
//! Each test starts the mock server on a random port with its own state,
//! then drives `OptimizelyClient` over real HTTP through `UreqTransport`.
//! This covers pagination over real `Link` headers, 429 recovery, and the
//! envelope shapes callers see.

use std::sync::Arc;
use std::time::{Duration, Instant};

use mock_server::MockState;
use optimizely_core::{
    ApiError, ApiResponse, ClientConfig, OptimizelyClient, Payload, StaticToken, Status,
};
use serde_json::json;

const TOKEN: &str = "test-token";

/// Start the mock server in a background thread and return its `/v2` base URL.
fn start(state: Arc<MockState>) -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener, state).await
        })
        .unwrap();
    });

    format!("http://{addr}/v2")
}

fn client(base_url: &str, token: &str) -> OptimizelyClient<optimizely_core::UreqTransport, StaticToken> {
    let config = ClientConfig::default()
        .with_base_url(base_url)
        .with_timeout(Duration::from_secs(10));
    OptimizelyClient::new(config, StaticToken::new(token))
}

fn payload(value: serde_json::Value) -> Payload {
    value.as_object().cloned().unwrap()
}

#[test]
fn get_walks_every_page() {
    let state = Arc::new(MockState::new(TOKEN).with_experiments(123, 140));
    let base = start(state.clone());

    let params = payload(json!({"project_id": 123}));
    let response = client(&base, TOKEN)
        .get("/experiments", Some(&params))
        .unwrap();

    assert_eq!(response.status, Status::Success);
    assert_eq!(response.code, 200);
    assert_eq!(response.item_count(), 140);
    assert!(response.body.is_none());
    let ids: Vec<u64> = response.json.as_ref().unwrap().as_array().unwrap()
        .iter()
        .map(|e| e["id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, (1..=140).collect::<Vec<u64>>());
    // Last page's headers win: page 2 links back but not forward.
    let link = response.header("link").unwrap();
    assert!(link.contains("rel=prev"));
    assert!(!link.contains("rel=next"));
    assert_eq!(state.hits(), 2);
}

#[test]
fn small_page_size_means_more_round_trips() {
    let state = Arc::new(MockState::new(TOKEN).with_experiments(7, 10));
    let base = start(state.clone());

    let params = payload(json!({"per_page": 3}));
    let response = client(&base, TOKEN)
        .get("/experiments", Some(&params))
        .unwrap();

    assert_eq!(response.item_count(), 10);
    assert_eq!(state.hits(), 4);
}

#[test]
fn rate_limited_request_is_retried() {
    let state = Arc::new(
        MockState::new(TOKEN)
            .with_experiments(1, 2)
            .with_throttle(2, "0.2"),
    );
    let base = start(state.clone());

    let started = Instant::now();
    let response = client(&base, TOKEN).get("/experiments", None).unwrap();

    assert!(response.is_success());
    assert_eq!(response.item_count(), 2);
    assert_eq!(state.hits(), 3);
    assert!(started.elapsed() >= Duration::from_millis(400));
}

#[test]
fn retry_ceiling_gives_up() {
    let state = Arc::new(MockState::new(TOKEN).with_throttle(5, "0"));
    let base = start(state.clone());

    let config = ClientConfig::default()
        .with_base_url(&base)
        .with_max_rate_limit_retries(1);
    let err = OptimizelyClient::new(config, StaticToken::new(TOKEN))
        .delete("/experiments/1", None)
        .unwrap_err();

    assert!(matches!(err, ApiError::RateLimitExhausted { attempts: 2 }));
    assert_eq!(state.hits(), 2);
}

#[test]
fn write_verbs_round_trip() {
    let state = Arc::new(MockState::new(TOKEN));
    let base = start(state);
    let c = client(&base, TOKEN);

    let created = c
        .post(
            "/experiments",
            Some(&payload(json!({"project_id": 123, "name": "Headline"}))),
        )
        .unwrap();
    assert_eq!(created.code, 201);
    assert!(created.is_success());
    let id = created.json.as_ref().unwrap()["id"].as_u64().unwrap();

    let patched = c
        .patch(
            &format!("/experiments/{id}"),
            Some(&payload(json!({"status": "paused"}))),
        )
        .unwrap();
    assert_eq!(patched.json.as_ref().unwrap()["status"], "paused");

    let fetched = c.get(&format!("/experiments/{id}"), None).unwrap();
    assert_eq!(fetched.json.as_ref().unwrap()["name"], "Headline");

    let deleted = c.delete(&format!("/experiments/{id}"), None).unwrap();
    assert_eq!(deleted.code, 204);
    assert!(deleted.is_success());
    assert_eq!(deleted.json, None);

    let missing = c.delete(&format!("/experiments/{id}"), None).unwrap();
    assert_eq!(missing.code, 404);
    assert_eq!(missing.status, Status::Error);
    assert_eq!(missing.error, vec!["Experiment not found".to_string()]);
}

#[test]
fn put_to_unknown_route_is_an_error_envelope() {
    let base = start(Arc::new(MockState::new(TOKEN)));
    let response = client(&base, TOKEN).put("/projects/1", None).unwrap();
    assert_eq!(response.status, Status::Error);
    assert_eq!(response.error_message().as_deref(), Some("HTTP 404"));
}

#[test]
fn wrong_token_surfaces_server_message() {
    let base = start(Arc::new(MockState::new(TOKEN)));
    let response = client(&base, "stale-token").get("/experiments", None).unwrap();
    assert_eq!(response.code, 401);
    assert_eq!(response.status, Status::Error);
    assert_eq!(response.error_message().as_deref(), Some("Authentication failed"));
}

#[test]
fn blank_token_never_reaches_server() {
    let state = Arc::new(MockState::new(TOKEN));
    let base = start(state.clone());

    let envelope = ApiResponse::from(client(&base, "").get("/experiments", None).unwrap_err());
    assert_eq!(envelope.code, 401);
    assert_eq!(envelope.status, Status::NoToken);
    assert_eq!(state.hits(), 0);
}

#[test]
fn connection_refused_is_a_transport_error() {
    let port = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let err = client(&format!("http://127.0.0.1:{port}/v2"), TOKEN)
        .post("/experiments", None)
        .unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)));
}
