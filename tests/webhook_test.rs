//! Webhook delivery against a local receiver

mod common;

use chrono::Utc;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;
use warp::Filter;

use common::{state_with, test_config, FakeProvider};
use gym_tracker::handlers;
use gym_tracker::storage::MemoryDataStore;
use gym_tracker::services::{PlanEventData, UserEventData, WebhookDispatcher, WebhookEvent, WebhookOutcome};

type Received = Arc<Mutex<Vec<Value>>>;

async fn start_receiver() -> (SocketAddr, Received) {
    let received: Received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();

    let hook = warp::post()
        .and(warp::path!("hook"))
        .and(warp::body::json())
        .map(move |payload: Value| {
            sink.lock().unwrap().push(payload);
            warp::http::StatusCode::OK
        });
    let failing = warp::post()
        .and(warp::path!("broken"))
        .map(|| warp::http::StatusCode::INTERNAL_SERVER_ERROR);
    let slow = warp::post().and(warp::path!("slow")).then(|| async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        warp::http::StatusCode::OK
    });

    let (addr, server) = warp::serve(hook.or(failing).unify().or(slow).unify())
        .bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    (addr, received)
}

fn dispatcher(addr: SocketAddr, path: &str) -> WebhookDispatcher {
    let url = Url::parse(&format!("http://{}/{}", addr, path)).unwrap();
    WebhookDispatcher::new(Some(url), Duration::from_millis(300)).unwrap()
}

#[tokio::test]
async fn test_envelope_delivered() {
    let (addr, received) = start_receiver().await;
    let webhooks = dispatcher(addr, "hook");

    let outcome = webhooks
        .send(
            WebhookEvent::UserRegistered,
            &UserEventData {
                user_id: "u1".to_string(),
                email: Some("u1@example.com".to_string()),
                full_name: Some("Ada".to_string()),
                active: None,
                occurred_at: Utc::now(),
            },
        )
        .await;
    assert_eq!(outcome, WebhookOutcome::Delivered);

    let payloads = received.lock().unwrap().clone();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0]["event"], "user.registered");
    assert!(payloads[0]["timestamp"].is_string());
    assert_eq!(payloads[0]["data"]["user_id"], "u1");
    assert_eq!(payloads[0]["data"]["email"], "u1@example.com");
}

#[tokio::test]
async fn test_dispatch_runs_in_background() {
    let (addr, received) = start_receiver().await;
    let webhooks = dispatcher(addr, "hook");

    let handle = webhooks
        .dispatch(
            WebhookEvent::PlanCreated,
            PlanEventData {
                plan_id: "p1".to_string(),
                user_id: "u1".to_string(),
                title: "Strength".to_string(),
                description: None,
                duration_weeks: Some(6),
                sessions_per_week: Some(3),
                created_at: None,
            },
        )
        .unwrap();
    assert_eq!(handle.await.unwrap(), WebhookOutcome::Delivered);

    let payloads = received.lock().unwrap().clone();
    assert_eq!(payloads[0]["event"], "plan.created");
    assert_eq!(payloads[0]["data"]["duration_weeks"], 6);
}

#[tokio::test]
async fn test_failures_are_reported_not_raised() {
    let (addr, _received) = start_receiver().await;

    let outcome = dispatcher(addr, "broken")
        .send(WebhookEvent::UserDeactivated, &serde_json::json!({"user_id": "u1"}))
        .await;
    assert!(matches!(outcome, WebhookOutcome::Failed(ref e) if e.contains("500")));

    let started = std::time::Instant::now();
    let outcome = dispatcher(addr, "slow")
        .send(WebhookEvent::UserActivated, &serde_json::json!({"user_id": "u1"}))
        .await;
    assert!(matches!(outcome, WebhookOutcome::Failed(_)));
    assert!(started.elapsed() < Duration::from_secs(2));
}

async fn wait_for_event(received: &Received) -> Option<Value> {
    for _ in 0..50 {
        if let Some(payload) = received.lock().unwrap().first().cloned() {
            return Some(payload);
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    None
}

#[tokio::test]
async fn test_registration_event_follows_confirmation_state() {
    for (confirm, expected) in [(false, "user.registered"), (true, "user.preregistered")] {
        let (addr, received) = start_receiver().await;
        let mut config = test_config();
        config.webhook_url = Some(Url::parse(&format!("http://{}/hook", addr)).unwrap());
        let provider = Arc::new(FakeProvider::new());
        if confirm {
            provider.require_email_confirmation();
        }
        let state = state_with(config, provider, Arc::new(MemoryDataStore::new()));

        let response = warp::test::request()
            .method("POST")
            .path("/api/auth/register")
            .json(&serde_json::json!({
                "email": "new@example.com",
                "password": "password1",
                "full_name": "New Member"
            }))
            .reply(&handlers::routes(state))
            .await;
        assert_eq!(response.status(), 201);

        let payload = wait_for_event(&received).await.unwrap();
        assert_eq!(payload["event"], expected);
        assert_eq!(payload["data"]["email"], "new@example.com");
    }
}
