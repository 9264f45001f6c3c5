//! Typed views over the gym tables

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Training plan assigned to a user by a trainer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub duration_weeks: Option<u32>,
    #[serde(default)]
    pub sessions_per_week: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// One training day of a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSession {
    pub id: String,
    pub plan_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_position")]
    pub position: u32,
    #[serde(default)]
    pub weekday: Option<u8>,
    #[serde(default)]
    pub estimated_minutes: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_position() -> u32 {
    1
}

/// Exercise prescribed within a plan session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: String,
    pub plan_session_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sets_count: Option<u32>,
    #[serde(default)]
    pub reps_min: Option<u32>,
    #[serde(default)]
    pub reps_max: Option<u32>,
    #[serde(default)]
    pub weight_suggested: Option<f64>,
    #[serde(default)]
    pub rest_seconds: Option<u32>,
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub trainer_notes: Option<String>,
}

/// State of a scheduled workout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Scheduled,
    Completed,
    Missed,
    Cancelled,
}

/// A plan session booked on a calendar date for a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledSession {
    pub id: String,
    pub user_id: String,
    pub plan_session_id: String,
    pub scheduled_date: NaiveDate,
    pub status: SessionStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Row shown in trainer client listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSummary {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub role: Option<String>,
}
