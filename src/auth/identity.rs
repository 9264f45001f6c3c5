//! Identity types shared by the authentication pipeline

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Authorization level of a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Standard,
    Admin,
}

impl Role {
    /// Interpret the value stored in the canonical role column.
    /// Only the exact string `admin` elevates; anything else is `Standard`.
    pub fn from_stored(value: Option<&str>) -> Self {
        match value {
            Some("admin") => Role::Admin,
            _ => Role::Standard,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Standard => "standard",
            Role::Admin => "admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// The authenticated caller attached to a single request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallerIdentity {
    /// Provider-issued identity id
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    /// Provider session id, for logging only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_ref: Option<String>,
}

impl CallerIdentity {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// User attributes returned by the provider's "who am I" endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Provider-editable metadata. Display hints only, never authorization.
    #[serde(default)]
    pub user_metadata: HashMap<String, Value>,
}

impl ProviderUser {
    /// Display name from metadata (`full_name`, then `name`)
    pub fn metadata_name(&self) -> Option<String> {
        ["full_name", "name"]
            .iter()
            .filter_map(|key| self.user_metadata.get(*key))
            .filter_map(Value::as_str)
            .map(str::trim)
            .find(|name| !name.is_empty())
            .map(str::to_string)
    }
}

/// One row of the `user_profiles` table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    /// Canonical role column. Read through [`ProfileRecord::role`].
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub height_cm: Option<i32>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub fitness_goal: Option<String>,
    #[serde(default)]
    pub experience_level: Option<String>,
    #[serde(default)]
    pub medical_notes: Option<String>,
    #[serde(default)]
    pub emergency_contact: Option<String>,
    #[serde(default)]
    pub profile_picture_url: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProfileRecord {
    pub fn role(&self) -> Role {
        Role::from_stored(self.role.as_deref())
    }
}

/// Access/refresh token pair issued by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds from issue
    pub expires_in: u64,
}

impl TokenPair {
    pub fn expires_at(&self, issued_at: DateTime<Utc>) -> DateTime<Utc> {
        issued_at + Duration::seconds(self.expires_in.min(i64::MAX as u64) as i64)
    }

    pub fn is_expired(&self, issued_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now >= self.expires_at(issued_at)
    }
}

/// Result of a self-service sign up
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    /// Present once the provider created the account
    pub user: Option<ProviderUser>,
    /// Present only when the provider issues a session immediately
    pub session: Option<TokenPair>,
}

/// Scope of a provider sign-out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutScope {
    /// Only the session the token belongs to
    Local,
    /// Every session of the identity
    Global,
    /// Every session except the one the token belongs to
    Others,
}

impl SignOutScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignOutScope::Local => "local",
            SignOutScope::Global => "global",
            SignOutScope::Others => "others",
        }
    }
}
