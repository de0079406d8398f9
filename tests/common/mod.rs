#![allow(dead_code)]

use fleet_bridge::{Config, RobotClient};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const PREFIX: &str = "/api/v2.0.0";
pub const MISSION_GUID: &str = "mission-guid-1";
pub const ACTION_GUID: &str = "action-guid-1";
pub const POSITION_GUID: &str = "P1";

pub fn api(p: &str) -> String {
    format!("{PREFIX}{p}")
}

/// Nothing listens on port 1, so connecting fails fast.
pub fn unreachable_url() -> String {
    "http://127.0.0.1:1".to_string()
}

pub fn test_config(robot_url: impl Into<String>) -> Config {
    let mut config = Config::for_robot(robot_url);
    config.request_timeout_secs = 2;
    config.poll_interval_ms = 10;
    config.connect_retry_secs = 0;
    config
}

/// Direct-mode client against `server`, already discovered.
pub async fn direct_client(server: &MockServer) -> RobotClient {
    let client = RobotClient::new(&test_config(server.uri())).expect("client");
    client.discover_fleet().await.expect("direct discovery");
    client
}

pub fn status_body(x: f64, y: f64, orientation: f64) -> Value {
    json!({
        "position": {"x": x, "y": y, "orientation": orientation},
        "battery_percentage": 87.5,
        "state_id": 3,
        "state_text": "Ready",
        "mission_text": "Waiting for new missions..."
    })
}

pub async fn mount_status(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path(api("/status")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Every endpoint the relocation protocol touches, answering successfully.
pub async fn mount_relocation(server: &MockServer, mission_name: &str) {
    mount_state_and_queue(server).await;

    Mock::given(method("GET"))
        .and(path(api("/missions")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"guid": "other-guid", "name": "dock", "url": "/v2.0.0/missions/other-guid"},
            {"guid": MISSION_GUID, "name": mission_name, "url": "/v2.0.0/missions/mission-guid-1"}
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(api(&format!("/missions/{MISSION_GUID}/actions"))))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "guid": "action-guid-0",
                "action_type": "wait",
                "parameters": [{"id": "time", "value": "00:00:05"}]
            },
            {
                "guid": ACTION_GUID,
                "action_type": "move",
                "parameters": [
                    {"id": "position", "value": POSITION_GUID},
                    {"id": "retries", "value": 10}
                ]
            }
        ])))
        .mount(server)
        .await;

    Mock::given(method("PUT"))
        .and(path(api(&format!("/positions/{POSITION_GUID}"))))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"guid": POSITION_GUID})))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(api("/mission_queue")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 1})))
        .mount(server)
        .await;
}

pub async fn mount_state_and_queue(server: &MockServer) {
    Mock::given(method("PUT"))
        .and(path(api("/status")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"state_id": 4})))
        .mount(server)
        .await;

    Mock::given(method("DELETE"))
        .and(path(api("/mission_queue")))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
}

/// `(METHOD, path, json body)` of every request the server saw, in order.
pub async fn recorded(server: &MockServer) -> Vec<(String, String, Value)> {
    server
        .received_requests()
        .await
        .expect("request recording enabled")
        .into_iter()
        .map(|r| {
            let body = serde_json::from_slice(&r.body).unwrap_or(Value::Null);
            (r.method.to_string(), r.url.path().to_string(), body)
        })
        .collect()
}

/// Recorded requests excluding telemetry polls.
pub async fn mutations(server: &MockServer) -> Vec<(String, String, Value)> {
    recorded(server)
        .await
        .into_iter()
        .filter(|(m, _, _)| m != "GET")
        .collect()
}

pub const TEST_API_KEY: &str = "test-adapter-key";

pub struct TestApp {
    pub router: axum::Router,
    pub state: std::sync::Arc<fleet_bridge::AppState>,
    /// Not started; tests drive it with `step()` or drop it.
    pub dispatcher: fleet_bridge::CommandDispatcher,
}

/// Router over a direct-mode client against `robot_url`.
pub async fn setup_test_app(robot_url: impl Into<String>) -> TestApp {
    use fleet_bridge::{create_router, AppState, CommandDispatcher, DispatcherSettings, TelemetryCache};
    use std::sync::Arc;

    let mut config = test_config(robot_url);
    config.adapter_api_key = TEST_API_KEY.to_string();

    let client = Arc::new(RobotClient::new(&config).expect("client"));
    let members = client.discover_fleet().await.expect("direct discovery");
    let cache = TelemetryCache::new(&members);
    let (dispatcher, commands) = CommandDispatcher::new(
        client.clone(),
        cache.clone(),
        DispatcherSettings::from_config(&config),
    );

    let state = Arc::new(AppState {
        config,
        client,
        cache,
        commands,
    });

    TestApp {
        router: create_router(state.clone()),
        state,
        dispatcher,
    }
}
