//! Services used by the resource handlers

pub mod stats;
pub mod webhook;

pub use stats::DashboardStats;
pub use webhook::{PlanEventData, UserEventData, WebhookDispatcher, WebhookEvent, WebhookOutcome};
