mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use common::{spawn_upstream, UpstreamBehavior};
use futures::{SinkExt, StreamExt};
use scribe_gateway::config::TokenEntry;
use scribe_gateway::{
    create_router, AppState, BridgeConfig, MemoryLedger, SessionRegistry, SharedKeyAdmission,
    UpstreamConfig,
};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tower::ServiceExt;

fn test_state(upstream_url: &str, ledger: MemoryLedger) -> AppState {
    let admission = SharedKeyAdmission::new(vec![
        TokenEntry {
            token: "valid-token".into(),
            principal_id: "alice".into(),
            remaining_secs: 600.0,
        },
        TokenEntry {
            token: "broke-token".into(),
            principal_id: "bob".into(),
            remaining_secs: 0.0,
        },
    ]);
    AppState::new(
        SessionRegistry::new(),
        Arc::new(ledger),
        Arc::new(admission),
        BridgeConfig {
            upstream: UpstreamConfig {
                url: upstream_url.to_string(),
                credential: "sk-test-credential".to_string(),
                recognition: serde_json::json!({ "language": "en" }),
                connect_timeout: Duration::from_secs(2),
            },
            keepalive_period: Duration::from_secs(30),
            terminate_on_early_upstream_error: true,
        },
    )
}

async fn serve(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn health_endpoint_responds() {
    let app = create_router(test_state("ws://127.0.0.1:9/unused", MemoryLedger::spawn()));
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .uri("/health")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);
}

#[tokio::test]
async fn sessions_endpoint_reports_empty_registry() {
    let app = create_router(test_state("ws://127.0.0.1:9/unused", MemoryLedger::spawn()));
    let response = app
        .oneshot(
            axum::http::Request::builder()
                .uri("/sessions")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(parsed["count"], 0);
}

#[tokio::test]
async fn missing_token_is_rejected_before_upgrade() {
    let addr = serve(test_state("ws://127.0.0.1:9/unused", MemoryLedger::spawn())).await;

    let result = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await;
    match result {
        Err(WsError::Http(response)) => {
            assert_eq!(response.status().as_u16(), 401);
        }
        other => panic!("expected HTTP rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn exhausted_balance_is_rejected_before_upgrade() {
    let addr = serve(test_state("ws://127.0.0.1:9/unused", MemoryLedger::spawn())).await;

    let result =
        tokio_tungstenite::connect_async(format!("ws://{addr}/ws?token=broke-token")).await;
    match result {
        Err(WsError::Http(response)) => {
            assert_eq!(response.status().as_u16(), 402);
        }
        other => panic!("expected HTTP rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn end_to_end_session_bills_exactly_one_final_increment() {
    let upstream = spawn_upstream(UpstreamBehavior::Echo { preamble: vec![] }).await;
    let ledger = MemoryLedger::spawn();
    let state = test_state(&upstream.url, ledger.clone());
    let registry = state.registry.clone();
    let addr = serve(state).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws?token=valid-token"))
        .await
        .unwrap();

    // Ready acknowledgment
    let ready = loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => break text,
            _ => continue,
        }
    };
    assert!(ready.contains(r#""type":"ready""#));
    assert_eq!(registry.len().await, 1);

    // Audio in, transcript out
    ws.send(Message::Binary(vec![0u8; 640])).await.unwrap();
    let transcript = loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => break text,
            _ => continue,
        }
    };
    assert!(transcript.contains(r#""type":"Results""#));

    ws.close(None).await.unwrap();
    drop(ws);

    // Teardown runs asynchronously; wait for deregistration
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !registry.is_empty().await {
        assert!(tokio::time::Instant::now() < deadline, "session never deregistered");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let snapshot = ledger.snapshot().await;
    let finals: Vec<_> = snapshot
        .increments
        .iter()
        .filter(|i| i.is_final && i.principal_id == "alice")
        .collect();
    assert_eq!(finals.len(), 1);
    assert_eq!(snapshot.principals["alice"].final_count, 1);
}
