//! Role resolution from the canonical profile record
//!
//! The stored `role` column is the only source of authorization. Provider
//! metadata and token claims are caller-influenced and never consulted.
//! Roles are read on every request, so a change takes effect on the next
//! request without re-login.

use std::sync::Arc;

use crate::auth::client::IdentityClient;
use crate::auth::identity::{ProfileRecord, ProviderUser, Role};
use crate::security_logger::{SecurityEvent, SecurityLogger};

/// Resolved role plus the profile it came from
#[derive(Debug, Clone)]
pub struct Resolution {
    pub role: Role,
    pub profile: Option<ProfileRecord>,
}

impl Resolution {
    fn standard(profile: Option<ProfileRecord>) -> Self {
        Self {
            role: Role::Standard,
            profile,
        }
    }
}

/// Maps a verified identity to its role
#[derive(Clone)]
pub struct RoleResolver {
    client: IdentityClient,
    security_logger: Arc<SecurityLogger>,
}

impl RoleResolver {
    pub fn new(client: IdentityClient, security_logger: Arc<SecurityLogger>) -> Self {
        Self {
            client,
            security_logger,
        }
    }

    /// Resolve the role for `user`. Never fails: any lookup problem yields
    /// `Standard`, never `Admin`.
    pub async fn resolve(&self, user: &ProviderUser, credential: &str) -> Resolution {
        match self.client.fetch_profile(&user.id, credential).await {
            Ok(Some(profile)) => Resolution {
                role: profile.role(),
                profile: Some(profile),
            },
            Ok(None) => {
                let full_name = user.metadata_name();
                match self
                    .client
                    .ensure_profile(&user.id, user.email.as_deref(), full_name.as_deref(), credential)
                    .await
                {
                    // A concurrent creator may have won; trust whatever row is stored
                    Ok(profile) => Resolution {
                        role: profile.role(),
                        profile: Some(profile),
                    },
                    Err(e) => {
                        self.lookup_failed(&user.id, &e.to_string()).await;
                        Resolution::standard(None)
                    }
                }
            }
            Err(e) => {
                self.lookup_failed(&user.id, &e.to_string()).await;
                Resolution::standard(None)
            }
        }
    }

    async fn lookup_failed(&self, user_id: &str, error: &str) {
        self.security_logger
            .log_event(SecurityEvent::ProfileLookupFailed {
                user_id: user_id.to_string(),
                error: error.to_string(),
            })
            .await;
    }
}
