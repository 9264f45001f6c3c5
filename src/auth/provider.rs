//! Identity provider backends
//!
//! The provider owns every credential: it verifies access tokens, runs the
//! password and refresh grants, creates accounts and ends sessions. This
//! service never verifies a token signature itself.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use url::Url;

use crate::auth::identity::{ProviderUser, SignOutScope, SignUpOutcome, TokenPair};
use crate::config::ServerConfig;
use crate::error::{GymTrackerError, Result};

/// Outcome of asking the provider who a token belongs to
#[derive(Debug)]
pub enum VerifyOutcome {
    /// Token is valid; the provider's view of the user
    Verified(ProviderUser),
    /// Token is unknown, expired or revoked
    Rejected,
    /// Provider could not answer (network error, timeout, 5xx)
    Unavailable(String),
}

/// Trait for identity provider backends
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve an access token to the user it was issued to
    async fn verify_token(&self, token: &str) -> VerifyOutcome;

    /// Exchange email and password for a session
    async fn password_grant(&self, email: &str, password: &str) -> Result<TokenPair>;

    /// Exchange a refresh token for a new session
    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenPair>;

    /// Create an account
    async fn sign_up(&self, email: &str, password: &str, full_name: &str)
        -> Result<SignUpOutcome>;

    /// End the session a token belongs to, or every session of its user
    async fn sign_out(&self, token: &str, scope: SignOutScope) -> Result<()>;

    /// Replace the password of the token's owner
    async fn update_password(&self, token: &str, new_password: &str) -> Result<()>;

    /// Provider name for logging/debugging
    fn provider_name(&self) -> &'static str;
}

/// Grant response body: `{access_token, refresh_token, expires_in, user}`
#[derive(Debug, Deserialize)]
struct GrantResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
    #[serde(default)]
    user: Option<ProviderUser>,
}

fn default_expires_in() -> u64 {
    3600
}

impl From<GrantResponse> for TokenPair {
    fn from(grant: GrantResponse) -> Self {
        TokenPair {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_in: grant.expires_in,
        }
    }
}

/// Sign-up answers with either a full session or just the created user
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(GrantResponse),
    User(ProviderUser),
}

/// GoTrue-compatible provider (`<provider>/auth/v1/...`)
pub struct SupabaseProvider {
    auth_url: Url,
    public_key: String,
    http: Client,
}

impl SupabaseProvider {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let auth_url = config.provider_url.join("auth/v1/").map_err(|e| {
            GymTrackerError::ConfigError(format!("Cannot derive auth URL: {}", e))
        })?;
        let http = Client::builder()
            .timeout(config.provider_timeout)
            .connect_timeout(config.provider_timeout.min(Duration::from_secs(5)))
            .build()
            .map_err(|e| GymTrackerError::ConfigError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            auth_url,
            public_key: config.provider_public_key.clone(),
            http,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.auth_url.join(path).map_err(|e| {
            GymTrackerError::ConfigError(format!("Invalid auth endpoint '{}': {}", path, e))
        })
    }

    fn with_key(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("apikey", &self.public_key)
    }

    async fn grant(&self, grant_type: &str, body: serde_json::Value) -> Result<Option<TokenPair>> {
        let response = self
            .with_key(self.http.post(self.endpoint("token")?))
            .query(&[("grant_type", grant_type)])
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(GymTrackerError::UpstreamUnavailable(format!(
                "token grant returned {}",
                status
            )));
        }
        if !status.is_success() {
            log::debug!("Provider refused {} grant with {}", grant_type, status);
            return Ok(None);
        }
        let grant: GrantResponse = response.json().await?;
        Ok(Some(grant.into()))
    }
}

#[async_trait]
impl IdentityProvider for SupabaseProvider {
    async fn verify_token(&self, token: &str) -> VerifyOutcome {
        let url = match self.endpoint("user") {
            Ok(url) => url,
            Err(e) => return VerifyOutcome::Unavailable(e.to_string()),
        };
        let response = match self.with_key(self.http.get(url)).bearer_auth(token).send().await {
            Ok(response) => response,
            Err(e) => return VerifyOutcome::Unavailable(GymTrackerError::from(e).to_string()),
        };

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return VerifyOutcome::Unavailable(format!("user endpoint returned {}", status));
        }
        if !status.is_success() {
            return VerifyOutcome::Rejected;
        }
        match response.json::<ProviderUser>().await {
            Ok(user) if !user.id.is_empty() => VerifyOutcome::Verified(user),
            Ok(_) => VerifyOutcome::Rejected,
            Err(e) => VerifyOutcome::Unavailable(format!("malformed user response: {}", e)),
        }
    }

    async fn password_grant(&self, email: &str, password: &str) -> Result<TokenPair> {
        self.grant("password", json!({ "email": email, "password": password }))
            .await?
            .ok_or(GymTrackerError::InvalidCredentials)
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenPair> {
        self.grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await?
            .ok_or(GymTrackerError::InvalidRefreshToken)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<SignUpOutcome> {
        let body = json!({
            "email": email,
            "password": password,
            "data": { "full_name": full_name },
        });
        let response = self
            .with_key(self.http.post(self.endpoint("signup")?))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(GymTrackerError::UpstreamUnavailable(format!(
                "signup returned {}",
                status
            )));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            log::info!("Provider rejected sign up ({}): {}", status, detail);
            return Err(GymTrackerError::RegistrationRejected);
        }

        Ok(match response.json::<SignUpResponse>().await? {
            SignUpResponse::Session(grant) => {
                let user = grant.user.clone();
                SignUpOutcome {
                    user,
                    session: Some(grant.into()),
                }
            }
            SignUpResponse::User(user) => SignUpOutcome {
                user: Some(user),
                session: None,
            },
        })
    }

    async fn sign_out(&self, token: &str, scope: SignOutScope) -> Result<()> {
        let response = self
            .with_key(self.http.post(self.endpoint("logout")?))
            .query(&[("scope", scope.as_str())])
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        // 401/404 mean the session is already gone
        if status.is_success() || status == StatusCode::UNAUTHORIZED || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(GymTrackerError::UpstreamUnavailable(format!(
                "logout returned {}",
                status
            )))
        }
    }

    async fn update_password(&self, token: &str, new_password: &str) -> Result<()> {
        let response = self
            .with_key(self.http.put(self.endpoint("user")?))
            .bearer_auth(token)
            .json(&json!({ "password": new_password }))
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            return Err(GymTrackerError::UpstreamUnavailable(format!(
                "password update returned {}",
                status
            )));
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(GymTrackerError::InvalidOrExpiredCredential);
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            log::info!("Provider rejected password update ({}): {}", status, detail);
            return Err(GymTrackerError::Validation(
                "New password was rejected".to_string(),
            ));
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "SUPABASE"
    }
}
