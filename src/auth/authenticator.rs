//! Request-level authentication gate
//!
//! Per request: `NoCredential -> CredentialPresent -> Verified -> Authenticated`,
//! where any step may end in `Rejected` (required mode) or `Anonymous`
//! (optional mode). There is exactly one path to `Authenticated`; no legacy or
//! secondary mechanism is tried when the provider refuses.

use chrono::Utc;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::client::IdentityClient;
use crate::auth::identity::CallerIdentity;
use crate::auth::role::RoleResolver;
use crate::auth::token::{extract_bearer_token, fingerprint, is_plausible_token, peek_claims};
use crate::error::{GymTrackerError, Result};
use crate::security::AuthTimer;
use crate::security_logger::{SecurityEvent, SecurityLogger};

/// An authenticated request: the caller plus the credential it presented.
/// The credential is kept so data-store calls run under the caller's own
/// row-level permissions.
#[derive(Debug, Clone)]
pub struct AuthenticatedCaller {
    pub identity: CallerIdentity,
    pub credential: String,
}

/// Builds a [`CallerIdentity`] from a bearer credential
#[derive(Clone)]
pub struct SessionAuthenticator {
    client: IdentityClient,
    resolver: RoleResolver,
    security_logger: Arc<SecurityLogger>,
    min_rejection_time: Duration,
}

impl SessionAuthenticator {
    pub fn new(
        client: IdentityClient,
        resolver: RoleResolver,
        security_logger: Arc<SecurityLogger>,
        min_rejection_time: Duration,
    ) -> Self {
        Self {
            client,
            resolver,
            security_logger,
            min_rejection_time,
        }
    }

    /// Required mode: an identity or a 401-class error
    pub async fn authenticate(
        &self,
        authorization: Option<&str>,
        ip: Option<IpAddr>,
    ) -> Result<AuthenticatedCaller> {
        let timer = AuthTimer::new(self.min_rejection_time);
        match self.establish(authorization).await {
            Ok(caller) => {
                self.security_logger
                    .log_event(SecurityEvent::AuthenticationSuccess {
                        user_id: caller.identity.id.clone(),
                        ip,
                    })
                    .await;
                Ok(caller)
            }
            Err(rejection) => {
                let token_fingerprint = authorization
                    .and_then(extract_bearer_token)
                    .map(fingerprint);
                self.security_logger
                    .log_event(SecurityEvent::AuthenticationFailed {
                        reason: rejection.reason().unwrap_or("unknown").to_string(),
                        token_fingerprint,
                        ip,
                    })
                    .await;
                timer.wait().await;
                Err(rejection)
            }
        }
    }

    /// Optional mode: never rejects, only varies whether an identity is present
    pub async fn authenticate_optional(&self, authorization: Option<&str>) -> Option<AuthenticatedCaller> {
        match self.establish(authorization).await {
            Ok(caller) => Some(caller),
            Err(e) => {
                if authorization.is_some() {
                    log::debug!("Optional authentication fell back to anonymous: {}", e);
                }
                None
            }
        }
    }

    async fn establish(&self, authorization: Option<&str>) -> Result<AuthenticatedCaller> {
        let token = authorization
            .and_then(extract_bearer_token)
            .ok_or(GymTrackerError::MissingCredential)?;
        self.identify(token).await
    }

    /// Run the verification and role resolution steps on a bare token, as
    /// for a freshly issued session
    pub async fn identify(&self, token: &str) -> Result<AuthenticatedCaller> {
        if !is_plausible_token(token) {
            return Err(GymTrackerError::InvalidOrExpiredCredential);
        }

        // Unverified read: may only deny, never grant
        let claims = peek_claims(token).unwrap_or_default();
        if claims.is_expired_at(Utc::now().timestamp()) {
            return Err(GymTrackerError::InvalidOrExpiredCredential);
        }

        let user = self
            .client
            .verify_token(token)
            .await
            .ok_or(GymTrackerError::InvalidOrExpiredCredential)?;

        let resolution = self.resolver.resolve(&user, token).await;
        let profile_name = resolution
            .profile
            .as_ref()
            .and_then(|p| p.full_name.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string);
        let profile_email = resolution.profile.as_ref().and_then(|p| p.email.clone());

        let email = user.email.clone().or(profile_email).unwrap_or_default();
        let full_name = user
            .metadata_name()
            .or(profile_name)
            .or_else(|| Some(email.clone()).filter(|e| !e.is_empty()))
            .unwrap_or_else(|| "User".to_string());

        Ok(AuthenticatedCaller {
            identity: CallerIdentity {
                id: user.id,
                email,
                full_name,
                role: resolution.role,
                session_ref: claims.session_id,
            },
            credential: token.to_string(),
        })
    }
}
