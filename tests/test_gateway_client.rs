//! Client tests against a mock gateway, plus one run against the real routes
//!
//! Auto-registration reads the process environment, so every test that runs
//! it or touches the gateway variables holds `ENV_LOCK`.


use serde_json::json;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use team_gateway::api;
use team_gateway::client::{
    AutoRegistration, ClientError, GatewayClient, DEFAULT_GATEWAY_URL, DISABLE_REGISTRATION_ENV,
    GATEWAY_URL_ENV,
};
use team_gateway::directory::TeamRegistration;
use team_gateway::routing::RouteRequest;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn lock_env() -> MutexGuard<'static, ()> {
    let guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    std::env::remove_var(DISABLE_REGISTRATION_ENV);
    std::env::remove_var(GATEWAY_URL_ENV);
    guard
}

fn registration() -> TeamRegistration {
    TeamRegistration::new("sales-1", "Sales", "http://localhost:9001", "sales")
        .with_capabilities(["sales"])
}

#[tokio::test]
async fn test_register_posts_registration() {
    let gateway = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/register"))
        .and(body_partial_json(json!({"team_id": "sales-1", "capabilities": ["sales"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "registered",
            "team_id": "sales-1",
            "gateway_endpoint": "http://gateway:8080"
        })))
        .expect(1)
        .mount(&gateway)
        .await;

    let client = GatewayClient::new(&gateway.uri()).unwrap();
    let ack = client.register_team(&registration()).await.unwrap();
    assert_eq!(ack.team_id, "sales-1");
    assert_eq!(ack.gateway_endpoint, "http://gateway:8080");
}

#[tokio::test]
async fn test_error_body_is_decoded() {
    let gateway = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/route"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": "no_available_team",
            "detail": "No available team: none",
            "timestamp": "2026-01-01T00:00:00Z"
        })))
        .mount(&gateway)
        .await;

    let client = GatewayClient::new(&gateway.uri()).unwrap();
    let err = client
        .route_task(&RouteRequest::new("ops", "x"))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(503));
    match err {
        ClientError::Api { kind, detail, .. } => {
            assert_eq!(kind.as_deref(), Some("no_available_team"));
            assert!(detail.contains("No available team"));
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_non_json_error_keeps_raw_text() {
    let gateway = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/stats"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&gateway)
        .await;

    let client = GatewayClient::new(&gateway.uri()).unwrap();
    match client.statistics().await.unwrap_err() {
        ClientError::Api { status, kind, detail } => {
            assert_eq!(status, 500);
            assert!(kind.is_none());
            assert_eq!(detail, "upstream exploded");
        }
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_discover_passes_capability_filter() {
    let gateway = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/teams"))
        .and(query_param("capability", "sales"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&gateway)
        .await;

    let client = GatewayClient::new(&gateway.uri()).unwrap();
    assert!(client.discover_teams(Some("sales")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_auto_registration_waits_for_gateway() {
    let _guard = lock_env();
    let gateway = MockServer::start().await;
    // Not ready for the first two polls
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&gateway)
        .await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&gateway)
        .await;
    Mock::given(method("POST"))
        .and(path("/register"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "registered",
            "team_id": "sales-1",
            "gateway_endpoint": "http://gateway:8080"
        })))
        .expect(1)
        .mount(&gateway)
        .await;

    let client = GatewayClient::new(&gateway.uri()).unwrap();
    let registered = AutoRegistration::new(client, registration())
        .with_polling(5, Duration::from_millis(10))
        .run()
        .await;
    assert!(registered);
}

#[tokio::test]
async fn test_auto_registration_reports_rejection() {
    let _guard = lock_env();
    let gateway = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&gateway)
        .await;
    Mock::given(method("POST"))
        .and(path("/register"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_input",
            "detail": "bad",
            "timestamp": "2026-01-01T00:00:00Z"
        })))
        .mount(&gateway)
        .await;

    let client = GatewayClient::new(&gateway.uri()).unwrap();
    let registered = AutoRegistration::new(client, registration())
        .with_polling(1, Duration::from_millis(10))
        .run()
        .await;
    assert!(!registered);
}

#[tokio::test]
async fn test_registration_disabled_by_environment() {
    let _guard = lock_env();
    let gateway = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&gateway)
        .await;
    Mock::given(method("POST"))
        .and(path("/register"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&gateway)
        .await;

    std::env::set_var(DISABLE_REGISTRATION_ENV, "TRUE");
    let client = GatewayClient::new(&gateway.uri()).unwrap();
    let registered = AutoRegistration::new(client, registration())
        .with_polling(1, Duration::from_millis(10))
        .run()
        .await;
    std::env::remove_var(DISABLE_REGISTRATION_ENV);

    assert!(!registered);
}

#[tokio::test]
async fn test_unregister_on_shutdown() {
    let gateway = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/teams/sales-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "unregistered",
            "team_id": "sales-1"
        })))
        .expect(1)
        .mount(&gateway)
        .await;

    let client = GatewayClient::new(&gateway.uri()).unwrap();
    assert!(AutoRegistration::new(client, registration()).unregister().await);
}

#[tokio::test]
async fn test_unregister_failure_is_reported() {
    let gateway = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/teams/sales-1"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": "not_found",
            "detail": "Team not found: sales-1",
            "timestamp": "2026-01-01T00:00:00Z"
        })))
        .mount(&gateway)
        .await;

    let client = GatewayClient::new(&gateway.uri()).unwrap();
    assert!(!AutoRegistration::new(client, registration()).unregister().await);
}

#[test]
fn test_gateway_url_from_environment() {
    let _guard = lock_env();

    let client = GatewayClient::from_env().unwrap();
    assert_eq!(client.base_url().as_str(), format!("{DEFAULT_GATEWAY_URL}/"));

    std::env::set_var(GATEWAY_URL_ENV, "http://gateway.internal:9000");
    let client = GatewayClient::from_env().unwrap();
    std::env::remove_var(GATEWAY_URL_ENV);

    assert_eq!(client.base_url().as_str(), "http://gateway.internal:9000/");
}

#[tokio::test]
async fn test_client_against_running_gateway() {
    let (gateway, _store, _probe) = test_helpers::test_gateway();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let (addr, server) = warp::serve(api::routes(gateway)).bind_with_graceful_shutdown(
        SocketAddr::from(([127, 0, 0, 1], 0)),
        async move {
            let _ = stop_rx.await;
        },
    );
    let server = tokio::spawn(server);

    let client = GatewayClient::new(&format!("http://{addr}")).unwrap();
    assert!(client.health_check().await);

    client.register_team(&registration()).await.unwrap();
    let teams = client.discover_teams(None).await.unwrap();
    assert_eq!(teams.len(), 1);
    assert_eq!(client.team_status("sales-1").await.unwrap().team_id, "sales-1");
    assert_eq!(client.capabilities().await.unwrap().capability_count, 1);
    assert_eq!(client.liveness().await.unwrap().registered_teams, 1);

    let missing = client.team_status("ghost").await.unwrap_err();
    assert_eq!(missing.status(), Some(404));

    client.unregister_team("sales-1").await.unwrap();
    assert_eq!(
        client.statistics().await.unwrap().gateway_stats.registered_teams,
        0
    );

    let _ = stop_tx.send(());
    server.await.unwrap();
}
