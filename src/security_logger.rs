//! Security-focused logging module to track security events
//!
//! One logger is created per application state and handed to the components
//! that need it. Tokens never reach this log; use
//! [`crate::auth::token::fingerprint`] instead.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// Types of security events to track
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityEvent {
    // Authentication events
    AuthenticationFailed {
        reason: String,
        token_fingerprint: Option<String>,
        ip: Option<IpAddr>,
    },
    AuthenticationSuccess { user_id: String, ip: Option<IpAddr> },
    LoginFailed { email_fingerprint: String, ip: Option<IpAddr> },
    SessionsRevoked { user_id: String, scope: String },
    PasswordChanged { user_id: String },

    // Authorization events
    PermissionDenied { user_id: String, action: String, resource: Option<String> },
    RoleChanged { user_id: String, changed_by: String, new_role: String },

    // Profile lifecycle
    ProfileCreated { user_id: String },
    ProfileLookupFailed { user_id: String, error: String },

    // Upstream dependencies
    UpstreamUnavailable { operation: String, error: String },

    // Rate limiting and abuse
    RateLimitExceeded { ip: Option<IpAddr>, limit_type: String },

    // System security
    ConfigurationError { component: String, error: String },
}

impl SecurityEvent {
    /// Counter key used for alert thresholds
    pub fn key(&self) -> &'static str {
        match self {
            SecurityEvent::AuthenticationFailed { .. } => "auth_failed",
            SecurityEvent::AuthenticationSuccess { .. } => "auth_success",
            SecurityEvent::LoginFailed { .. } => "login_failed",
            SecurityEvent::SessionsRevoked { .. } => "sessions_revoked",
            SecurityEvent::PasswordChanged { .. } => "password_changed",
            SecurityEvent::PermissionDenied { .. } => "permission_denied",
            SecurityEvent::RoleChanged { .. } => "role_changed",
            SecurityEvent::ProfileCreated { .. } => "profile_created",
            SecurityEvent::ProfileLookupFailed { .. } => "profile_lookup_failed",
            SecurityEvent::UpstreamUnavailable { .. } => "upstream_unavailable",
            SecurityEvent::RateLimitExceeded { .. } => "rate_limit",
            SecurityEvent::ConfigurationError { .. } => "config_error",
        }
    }
}

/// Security event with timestamp
#[derive(Debug, Clone)]
struct TimestampedEvent {
    event: SecurityEvent,
    timestamp: Instant,
}

/// Security logger for tracking and alerting on security events
pub struct SecurityLogger {
    events: Arc<RwLock<Vec<TimestampedEvent>>>,
    event_counts: Arc<RwLock<HashMap<&'static str, usize>>>,
    max_events: usize,
    alert_thresholds: HashMap<&'static str, usize>,
}

impl SecurityLogger {
    /// Create a new security logger
    pub fn new() -> Self {
        let mut alert_thresholds = HashMap::new();
        // Authentication
        alert_thresholds.insert("auth_failed", 5);
        alert_thresholds.insert("login_failed", 5);

        // Authorization
        alert_thresholds.insert("permission_denied", 20);

        // Profiles and upstream
        alert_thresholds.insert("profile_lookup_failed", 5);
        alert_thresholds.insert("upstream_unavailable", 5);

        // Abuse
        alert_thresholds.insert("rate_limit", 10);

        // System security
        alert_thresholds.insert("config_error", 1);

        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            event_counts: Arc::new(RwLock::new(HashMap::new())),
            max_events: 10000,
            alert_thresholds,
        }
    }

    /// Log a security event
    pub async fn log_event(&self, event: SecurityEvent) {
        let event_key = event.key();

        {
            let mut events = self.events.write().await;
            events.push(TimestampedEvent {
                event: event.clone(),
                timestamp: Instant::now(),
            });

            // Limit memory usage
            if events.len() > self.max_events {
                let events_to_remove = events.len() - self.max_events;
                events.drain(0..events_to_remove);
            }
        }

        // Update counters and check for alerts
        {
            let mut counts = self.event_counts.write().await;
            let count = counts.entry(event_key).or_insert(0);
            *count += 1;

            if let Some(&threshold) = self.alert_thresholds.get(event_key) {
                if *count >= threshold {
                    self.trigger_alert(event_key, *count, &event);
                    *count = 0;
                }
            }
        }

        match event {
            SecurityEvent::AuthenticationFailed { reason, token_fingerprint, ip } => {
                log::warn!(
                    "SECURITY: Authentication failed - Reason: {}, Token: {:?}, IP: {:?}",
                    reason, token_fingerprint, ip
                );
            }
            SecurityEvent::AuthenticationSuccess { user_id, ip } => {
                log::debug!("SECURITY: Authentication success - User: {}, IP: {:?}", user_id, ip);
            }
            SecurityEvent::LoginFailed { email_fingerprint, ip } => {
                log::warn!("SECURITY: Login failed - Email: {}, IP: {:?}", email_fingerprint, ip);
            }
            SecurityEvent::SessionsRevoked { user_id, scope } => {
                log::info!("SECURITY: Sessions revoked - User: {}, Scope: {}", user_id, scope);
            }
            SecurityEvent::PasswordChanged { user_id } => {
                log::info!("SECURITY: Password changed - User: {}", user_id);
            }
            SecurityEvent::PermissionDenied { user_id, action, resource } => {
                log::warn!(
                    "SECURITY: Permission denied - User: {}, Action: {}, Resource: {:?}",
                    user_id, action, resource
                );
            }
            SecurityEvent::RoleChanged { user_id, changed_by, new_role } => {
                log::warn!(
                    "SECURITY: Role changed - User: {}, By: {}, New role: {}",
                    user_id, changed_by, new_role
                );
            }
            SecurityEvent::ProfileCreated { user_id } => {
                log::info!("SECURITY: Profile created with standard role - User: {}", user_id);
            }
            SecurityEvent::ProfileLookupFailed { user_id, error } => {
                log::error!("SECURITY: Profile lookup failed - User: {}, Error: {}", user_id, error);
            }
            SecurityEvent::UpstreamUnavailable { operation, error } => {
                log::error!("SECURITY: Identity provider unavailable - Operation: {}, Error: {}", operation, error);
            }
            SecurityEvent::RateLimitExceeded { ip, limit_type } => {
                log::warn!("SECURITY: Rate limit exceeded - IP: {:?}, Type: {}", ip, limit_type);
            }
            SecurityEvent::ConfigurationError { component, error } => {
                log::error!("SECURITY: Configuration error - Component: {}, Error: {}", component, error);
            }
        }
    }

    fn trigger_alert(&self, event_type: &str, count: usize, sample_event: &SecurityEvent) {
        log::error!("SECURITY ALERT: {} events of type '{}' detected", count, event_type);
        log::error!("Sample event: {:?}", sample_event);
    }

    /// Get recent security events
    pub async fn get_recent_events(&self, duration: Duration) -> Vec<SecurityEvent> {
        let events = self.events.read().await;
        let now = Instant::now();

        events
            .iter()
            .filter(|event| now.duration_since(event.timestamp) <= duration)
            .map(|event| event.event.clone())
            .collect()
    }

    /// Number of events logged under `key` since its last alert
    pub async fn count(&self, key: &str) -> usize {
        self.event_counts.read().await.get(key).copied().unwrap_or(0)
    }

    /// Clean up old events
    pub async fn cleanup_old_events(&self, max_age: Duration) {
        let mut events = self.events.write().await;
        let now = Instant::now();
        events.retain(|event| now.duration_since(event.timestamp) <= max_age);
    }

    /// Start periodic cleanup task
    pub fn start_cleanup_task(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300));
            loop {
                interval.tick().await;
                self.cleanup_old_events(Duration::from_secs(3600 * 24)).await;
            }
        })
    }
}

impl Default for SecurityLogger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_are_recorded() {
        let logger = SecurityLogger::new();
        logger
            .log_event(SecurityEvent::ProfileCreated { user_id: "u1".to_string() })
            .await;

        let events = logger.get_recent_events(Duration::from_secs(60)).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key(), "profile_created");
        assert_eq!(logger.count("profile_created").await, 1);
    }

    #[tokio::test]
    async fn test_counter_resets_after_alert() {
        let logger = SecurityLogger::new();
        for _ in 0..5 {
            logger
                .log_event(SecurityEvent::AuthenticationFailed {
                    reason: "invalid_or_expired".to_string(),
                    token_fingerprint: None,
                    ip: None,
                })
                .await;
        }
        assert_eq!(logger.count("auth_failed").await, 0);
    }
}
