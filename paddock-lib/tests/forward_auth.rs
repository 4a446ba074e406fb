mod common;

use common::{quota, uniform_table};
use paddock_lib::admission::{EmergencyOverride, EndpointCategory, RoleTag};
use paddock_lib::config::RouteRule;
use paddock_lib::gate::{AdmissionGate, RouteClassifier};
use paddock_lib::server::serve;
use paddock_lib::telemetry::serve_observability;
use prometheus::Registry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

fn test_gate() -> Arc<AdmissionGate> {
    let mut table = uniform_table(100, 100);
    table.set(EndpointCategory::Reports, RoleTag::Worker, quota(60, 2));
    let classifier = RouteClassifier::new(
        &[RouteRule::new("/api/reports", EndpointCategory::Reports)],
        EndpointCategory::ResourceRead,
    );
    Arc::new(
        AdmissionGate::builder(table)
            .classifier(classifier)
            .emergency(EmergencyOverride::new(Some("open-sesame".to_string())))
            .build(),
    )
}

async fn start_gate(
    gate: Arc<AdmissionGate>,
) -> Result<(SocketAddr, CancellationToken, JoinHandle<paddock_lib::Result<()>>), std::io::Error> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(serve(listener, gate, None, shutdown.clone(), Duration::from_secs(1)));
    Ok((addr, shutdown, handle))
}

#[tokio::test]
async fn test_forward_auth_allows_then_rejects() -> TestResult {
    let (addr, shutdown, handle) = start_gate(test_gate()).await?;
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/auth");

    for remaining in ["1", "0"] {
        let resp = client
            .get(&url)
            .header("x-forwarded-method", "GET")
            .header("x-forwarded-uri", "/api/reports/weekly?farm=3")
            .header("x-user-id", "77")
            .header("x-user-role", "worker")
            .send()
            .await?;
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["x-ratelimit-limit"], "2");
        assert_eq!(resp.headers()["x-ratelimit-remaining"], remaining);
        assert!(resp.headers().contains_key("x-ratelimit-reset"));
        assert_eq!(resp.headers()["x-ratelimit-window"], "60000");
    }

    let resp = client
        .get(&url)
        .header("x-forwarded-method", "GET")
        .header("x-forwarded-uri", "/api/reports/weekly?farm=3")
        .header("x-user-id", "77")
        .header("x-user-role", "worker")
        .send()
        .await?;
    assert_eq!(resp.status(), 429);
    assert!(resp.headers().contains_key("retry-after"));
    assert_eq!(resp.headers()["x-ratelimit-hit"], "3");
    assert_eq!(resp.headers()["content-type"], "application/json");

    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");
    assert_eq!(body["path"], "/api/reports/weekly");
    assert_eq!(body["method"], "GET");

    shutdown.cancel();
    handle.await??;
    Ok(())
}

#[tokio::test]
async fn test_forward_auth_bypass_and_fail_open() -> TestResult {
    let (addr, shutdown, handle) = start_gate(test_gate()).await?;
    let client = reqwest::Client::new();
    let url = format!("http://{addr}/auth");

    let bypass = client
        .post(&url)
        .header("x-forwarded-uri", "/api/reports")
        .header("x-user-id", "1")
        .header("x-emergency-token", "open-sesame")
        .send()
        .await?;
    assert_eq!(bypass.status(), 200);
    assert_eq!(bypass.headers()["x-rate-limit-bypassed"], "emergency");
    assert!(!bypass.headers().contains_key("x-ratelimit-limit"));

    let failed_open = client
        .get(&url)
        .header("x-user-id", "1")
        .header("x-user-role", "emperor")
        .send()
        .await?;
    assert_eq!(failed_open.status(), 200);
    assert!(!failed_open.headers().contains_key("x-ratelimit-limit"));

    shutdown.cancel();
    handle.await??;
    Ok(())
}

#[tokio::test]
async fn test_observability_stats_and_load_factor() -> TestResult {
    let gate = test_gate();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(serve_observability(
        listener,
        Registry::default(),
        Arc::clone(&gate),
        shutdown.clone(),
    ));
    let client = reqwest::Client::new();

    let health = client.get(format!("http://{addr}/health")).send().await?;
    assert_eq!(health.status(), 200);

    let (gate_addr, gate_shutdown, gate_handle) = start_gate(Arc::clone(&gate)).await?;
    client
        .get(format!("http://{gate_addr}/"))
        .header("x-user-id", "9")
        .header("x-user-role", "manager")
        .send()
        .await?;

    let stats: serde_json::Value =
        client.get(format!("http://{addr}/stats")).send().await?.json().await?;
    assert_eq!(stats["totalKeys"], 1);
    assert_eq!(stats["activeWindows"], 1);
    assert_eq!(stats["topConsumers"][0]["key"], "user:9:resource_read");

    let forbidden = client
        .post(format!("http://{addr}/load-factor"))
        .body(r#"{"factor":0.5}"#)
        .send()
        .await?;
    assert_eq!(forbidden.status(), 403);

    let updated: serde_json::Value = client
        .post(format!("http://{addr}/load-factor"))
        .header("x-emergency-token", "open-sesame")
        .body(r#"{"factor":0.5}"#)
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(updated["factor"], 0.5);
    assert_eq!(gate.load_factor(), 0.5);

    gate_shutdown.cancel();
    gate_handle.await??;
    shutdown.cancel();
    handle.await??;
    Ok(())
}
