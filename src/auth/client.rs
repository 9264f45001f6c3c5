//! Bounded-time access to the identity provider and the profile table
//!
//! Every provider call is capped at the configured timeout. A provider that
//! does not answer in time is treated like one that refused: callers see no
//! identity, and the incident is written to the security log.

use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::identity::{ProfileRecord, ProviderUser, SignOutScope, SignUpOutcome, TokenPair};
use crate::auth::provider::{IdentityProvider, VerifyOutcome};
use crate::constants::PROFILES_TABLE;
use crate::error::{GymTrackerError, Result};
use crate::security_logger::{SecurityEvent, SecurityLogger};
use crate::storage::{decode_first, DataStore, Filter, OnConflict, Query, StoreAuth};

/// Client for the identity provider and the user profile store
#[derive(Clone)]
pub struct IdentityClient {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn DataStore>,
    request_timeout: Duration,
    security_logger: Arc<SecurityLogger>,
}

impl IdentityClient {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn DataStore>,
        request_timeout: Duration,
        security_logger: Arc<SecurityLogger>,
    ) -> Self {
        Self {
            provider,
            store,
            request_timeout,
            security_logger,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    async fn bounded<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(Err(GymTrackerError::UpstreamUnavailable(error))) => {
                self.report_unavailable(operation, &error).await;
                Err(GymTrackerError::UpstreamUnavailable(error))
            }
            Ok(result) => result,
            Err(_) => {
                let error = format!("no answer within {:?}", self.request_timeout);
                self.report_unavailable(operation, &error).await;
                Err(GymTrackerError::UpstreamUnavailable(error))
            }
        }
    }

    async fn report_unavailable(&self, operation: &str, error: &str) {
        self.security_logger
            .log_event(SecurityEvent::UpstreamUnavailable {
                operation: operation.to_string(),
                error: error.to_string(),
            })
            .await;
    }

    /// The provider's view of the token's owner, or `None` when the token is
    /// rejected or the provider cannot be reached in time
    pub async fn verify_token(&self, token: &str) -> Option<ProviderUser> {
        match tokio::time::timeout(self.request_timeout, self.provider.verify_token(token)).await {
            Ok(VerifyOutcome::Verified(user)) => Some(user),
            Ok(VerifyOutcome::Rejected) => None,
            Ok(VerifyOutcome::Unavailable(error)) => {
                self.report_unavailable("verify_token", &error).await;
                None
            }
            Err(_) => {
                let error = format!("no answer within {:?}", self.request_timeout);
                self.report_unavailable("verify_token", &error).await;
                None
            }
        }
    }

    pub async fn password_grant(&self, email: &str, password: &str) -> Result<TokenPair> {
        self.bounded("password_grant", self.provider.password_grant(email, password))
            .await
    }

    pub async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenPair> {
        self.bounded("refresh_grant", self.provider.refresh_grant(refresh_token))
            .await
    }

    pub async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<SignUpOutcome> {
        self.bounded("sign_up", self.provider.sign_up(email, password, full_name))
            .await
    }

    pub async fn sign_out(&self, token: &str, scope: SignOutScope) -> Result<()> {
        self.bounded("sign_out", self.provider.sign_out(token, scope))
            .await
    }

    pub async fn update_password(&self, token: &str, new_password: &str) -> Result<()> {
        self.bounded("update_password", self.provider.update_password(token, new_password))
            .await
    }

    /// Read the caller's profile row, if it exists
    pub async fn fetch_profile(&self, user_id: &str, credential: &str) -> Result<Option<ProfileRecord>> {
        let query = Query::new().filter(Filter::eq("id", user_id)).limit(1);
        let rows = self
            .store
            .select(PROFILES_TABLE, &query, StoreAuth::Caller(credential.to_string()))
            .await?;
        decode_first(rows)
    }

    /// Create the standard-role profile for `user_id` unless one exists.
    ///
    /// Safe to race: the insert ignores an existing row, so concurrent first
    /// requests end with exactly one profile and an existing role is never
    /// overwritten.
    pub async fn ensure_profile(
        &self,
        user_id: &str,
        email: Option<&str>,
        full_name: Option<&str>,
        credential: &str,
    ) -> Result<ProfileRecord> {
        let row = json!({
            "id": user_id,
            "email": email,
            "full_name": full_name,
            "role": "standard",
        });
        let inserted = self
            .store
            .insert(
                PROFILES_TABLE,
                row,
                OnConflict::Ignore,
                StoreAuth::Caller(credential.to_string()),
            )
            .await?;

        if let Some(profile) = decode_first::<ProfileRecord>(inserted)? {
            self.security_logger
                .log_event(SecurityEvent::ProfileCreated {
                    user_id: user_id.to_string(),
                })
                .await;
            return Ok(profile);
        }

        // Another request created it first
        self.fetch_profile(user_id, credential).await?.ok_or_else(|| {
            GymTrackerError::ProfileLookup(format!("profile for {} missing after insert", user_id))
        })
    }
}
