//! Outbound automation webhooks
//!
//! Events are posted as `{event, timestamp, data}` to one configured endpoint.
//! Delivery is fire-and-forget: failures are logged and never reach the
//! request that triggered them.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;

use crate::error::{GymTrackerError, Result};

/// Events published to the automation endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEvent {
    UserRegistered,
    /// Account created, email confirmation still pending
    UserPreregistered,
    UserActivated,
    UserDeactivated,
    PlanCreated,
}

impl WebhookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEvent::UserRegistered => "user.registered",
            WebhookEvent::UserPreregistered => "user.preregistered",
            WebhookEvent::UserActivated => "user.activated",
            WebhookEvent::UserDeactivated => "user.deactivated",
            WebhookEvent::PlanCreated => "plan.created",
        }
    }
}

/// Payload for user lifecycle events
#[derive(Debug, Clone, Serialize)]
pub struct UserEventData {
    pub user_id: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub active: Option<bool>,
    pub occurred_at: DateTime<Utc>,
}

/// Payload for `plan.created`
#[derive(Debug, Clone, Serialize)]
pub struct PlanEventData {
    pub plan_id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub duration_weeks: Option<u32>,
    pub sessions_per_week: Option<u32>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    event: &'static str,
    timestamp: DateTime<Utc>,
    data: &'a Value,
}

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Delivered,
    /// No endpoint configured
    Skipped,
    Failed(String),
}

/// Posts events to the configured endpoint
#[derive(Clone)]
pub struct WebhookDispatcher {
    endpoint: Option<Url>,
    http: Client,
}

impl WebhookDispatcher {
    pub fn new(endpoint: Option<Url>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GymTrackerError::ConfigError(format!("Webhook HTTP client: {}", e)))?;
        Ok(Self { endpoint, http })
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Deliver one event and report what happened
    pub async fn send<T: Serialize>(&self, event: WebhookEvent, data: &T) -> WebhookOutcome {
        let endpoint = match self.endpoint {
            Some(ref endpoint) => endpoint.clone(),
            None => return WebhookOutcome::Skipped,
        };
        let data = match serde_json::to_value(data) {
            Ok(data) => data,
            Err(e) => return WebhookOutcome::Failed(format!("unserialisable payload: {}", e)),
        };
        let envelope = Envelope {
            event: event.as_str(),
            timestamp: Utc::now(),
            data: &data,
        };

        match self.http.post(endpoint).json(&envelope).send().await {
            Ok(response) if response.status().is_success() => {
                log::debug!("Webhook {} delivered", event.as_str());
                WebhookOutcome::Delivered
            }
            Ok(response) => {
                let error = format!("endpoint returned {}", response.status());
                log::warn!("Webhook {} failed: {}", event.as_str(), error);
                WebhookOutcome::Failed(error)
            }
            Err(e) => {
                log::warn!("Webhook {} failed: {}", event.as_str(), e);
                WebhookOutcome::Failed(e.to_string())
            }
        }
    }

    /// Deliver in the background; the caller never waits for the endpoint.
    ///
    /// The payload is serialised up front so the spawned task owns plain JSON.
    pub fn dispatch<T: Serialize>(&self, event: WebhookEvent, data: T) -> Option<JoinHandle<WebhookOutcome>> {
        if !self.is_enabled() {
            return None;
        }
        let data = match serde_json::to_value(&data) {
            Ok(data) => data,
            Err(e) => {
                log::warn!("Webhook {} dropped, unserialisable payload: {}", event.as_str(), e);
                return None;
            }
        };
        let dispatcher = self.clone();
        Some(tokio::spawn(async move { dispatcher.send(event, &data).await }))
    }
}
