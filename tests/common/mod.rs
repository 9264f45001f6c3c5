//! Shared fixtures: a scriptable identity provider, a broken data store and
//! state builders

#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gym_tracker::auth::{IdentityProvider, ProviderUser, SignOutScope, TokenPair, VerifyOutcome};
use gym_tracker::auth::identity::SignUpOutcome;
use gym_tracker::storage::{DataStore, Filter, OnConflict, Query, StoreAuth};
use gym_tracker::{AppState, GymTrackerError, Result, ServerConfig};

/// JWT-shaped token with the given payload. The signature is never checked
/// locally, so any bytes will do.
pub fn jwt_with(payload: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.c2lnbmF0dXJl", header, body)
}

pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

struct Account {
    password: String,
    user: ProviderUser,
}

/// In-process identity provider. Every user it hands out carries
/// `"role": "admin"` in its metadata so tests can prove that field is ignored.
pub struct FakeProvider {
    accounts: Mutex<HashMap<String, Account>>,
    tokens: Mutex<HashMap<String, ProviderUser>>,
    refresh_tokens: Mutex<HashMap<String, String>>,
    sign_outs: Mutex<Vec<(String, SignOutScope)>>,
    verify_calls: AtomicUsize,
    unavailable: AtomicBool,
    confirm_email: AtomicBool,
    delay: Option<Duration>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            tokens: Mutex::new(HashMap::new()),
            refresh_tokens: Mutex::new(HashMap::new()),
            sign_outs: Mutex::new(Vec::new()),
            verify_calls: AtomicUsize::new(0),
            unavailable: AtomicBool::new(false),
            confirm_email: AtomicBool::new(false),
            delay: None,
        }
    }

    /// A provider that takes `delay` to answer every call
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    fn user(id: &str, email: &str, full_name: &str) -> ProviderUser {
        serde_json::from_value(json!({
            "id": id,
            "email": email,
            "user_metadata": {"full_name": full_name, "role": "admin"}
        }))
        .unwrap()
    }

    pub fn add_account(&self, id: &str, email: &str, password: &str) -> ProviderUser {
        let user = Self::user(id, email, &format!("Member {}", id));
        self.accounts.lock().unwrap().insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                user: user.clone(),
            },
        );
        user
    }

    /// Issue a valid access token for an existing account
    pub fn issue_token(&self, user_id: &str) -> String {
        self.issue_token_expiring(user_id, now_unix() + 3600)
    }

    pub fn issue_token_expiring(&self, user_id: &str, exp: i64) -> String {
        let user = self
            .accounts
            .lock()
            .unwrap()
            .values()
            .find(|a| a.user.id == user_id)
            .map(|a| a.user.clone())
            .unwrap_or_else(|| Self::user(user_id, &format!("{}@example.com", user_id), user_id));
        let token = jwt_with(json!({
            "sub": user_id,
            "exp": exp,
            "session_id": uuid::Uuid::new_v4().to_string(),
            "role": "admin",
        }));
        self.tokens.lock().unwrap().insert(token.clone(), user);
        token
    }

    fn session_for(&self, user: &ProviderUser) -> TokenPair {
        let access_token = self.issue_token(&user.id);
        let refresh_token = uuid::Uuid::new_v4().to_string();
        self.refresh_tokens
            .lock()
            .unwrap()
            .insert(refresh_token.clone(), user.id.clone());
        TokenPair {
            access_token,
            refresh_token: Some(refresh_token),
            expires_in: 3600,
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Sign up answers without a session, as when email confirmation is on
    pub fn require_email_confirmation(&self) {
        self.confirm_email.store(true, Ordering::SeqCst);
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn sign_outs(&self) -> Vec<(String, SignOutScope)> {
        self.sign_outs.lock().unwrap().clone()
    }

    pub fn is_token_live(&self, token: &str) -> bool {
        self.tokens.lock().unwrap().contains_key(token)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn down(&self) -> bool {
        self.unavailable.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn verify_token(&self, token: &str) -> VerifyOutcome {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.down() {
            return VerifyOutcome::Unavailable("provider down".to_string());
        }
        match self.tokens.lock().unwrap().get(token) {
            Some(user) => VerifyOutcome::Verified(user.clone()),
            None => VerifyOutcome::Rejected,
        }
    }

    async fn password_grant(&self, email: &str, password: &str) -> Result<TokenPair> {
        self.pause().await;
        if self.down() {
            return Err(GymTrackerError::UpstreamUnavailable("provider down".to_string()));
        }
        let user = {
            let accounts = self.accounts.lock().unwrap();
            match accounts.get(email) {
                Some(account) if account.password == password => account.user.clone(),
                _ => return Err(GymTrackerError::InvalidCredentials),
            }
        };
        Ok(self.session_for(&user))
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenPair> {
        self.pause().await;
        let user_id = self
            .refresh_tokens
            .lock()
            .unwrap()
            .remove(refresh_token)
            .ok_or(GymTrackerError::InvalidRefreshToken)?;
        let user = {
            let accounts = self.accounts.lock().unwrap();
            accounts
                .values()
                .find(|a| a.user.id == user_id)
                .map(|a| a.user.clone())
                .ok_or(GymTrackerError::InvalidRefreshToken)?
        };
        Ok(self.session_for(&user))
    }

    async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<SignUpOutcome> {
        self.pause().await;
        let user = {
            let mut accounts = self.accounts.lock().unwrap();
            if accounts.contains_key(email) {
                return Err(GymTrackerError::RegistrationRejected);
            }
            let user = Self::user(&uuid::Uuid::new_v4().to_string(), email, full_name);
            accounts.insert(
                email.to_string(),
                Account {
                    password: password.to_string(),
                    user: user.clone(),
                },
            );
            user
        };
        let session = if self.confirm_email.load(Ordering::SeqCst) {
            None
        } else {
            Some(self.session_for(&user))
        };
        Ok(SignUpOutcome {
            user: Some(user),
            session,
        })
    }

    async fn sign_out(&self, token: &str, scope: SignOutScope) -> Result<()> {
        self.pause().await;
        if self.down() {
            return Err(GymTrackerError::UpstreamUnavailable("provider down".to_string()));
        }
        self.sign_outs
            .lock()
            .unwrap()
            .push((token.to_string(), scope));
        let mut tokens = self.tokens.lock().unwrap();
        match scope {
            SignOutScope::Local => {
                tokens.remove(token);
            }
            SignOutScope::Global => {
                if let Some(owner) = tokens.get(token).map(|u| u.id.clone()) {
                    tokens.retain(|_, user| user.id != owner);
                    self.refresh_tokens
                        .lock()
                        .unwrap()
                        .retain(|_, user_id| *user_id != owner);
                }
            }
            SignOutScope::Others => {
                if let Some(owner) = tokens.get(token).map(|u| u.id.clone()) {
                    tokens.retain(|issued, user| user.id != owner || issued == token);
                }
            }
        }
        Ok(())
    }

    async fn update_password(&self, token: &str, new_password: &str) -> Result<()> {
        self.pause().await;
        if self.down() {
            return Err(GymTrackerError::UpstreamUnavailable("provider down".to_string()));
        }
        let owner = self
            .tokens
            .lock()
            .unwrap()
            .get(token)
            .map(|u| u.id.clone())
            .ok_or(GymTrackerError::InvalidOrExpiredCredential)?;
        let mut accounts = self.accounts.lock().unwrap();
        for account in accounts.values_mut().filter(|a| a.user.id == owner) {
            account.password = new_password.to_string();
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "FAKE"
    }
}

/// A data store that fails every call
pub struct FailingStore;

#[async_trait]
impl DataStore for FailingStore {
    async fn select(&self, _table: &str, _query: &Query, _auth: StoreAuth) -> Result<Vec<Value>> {
        Err(GymTrackerError::Storage("connection refused".to_string()))
    }

    async fn insert(
        &self,
        _table: &str,
        _row: Value,
        _on_conflict: OnConflict,
        _auth: StoreAuth,
    ) -> Result<Vec<Value>> {
        Err(GymTrackerError::Storage("connection refused".to_string()))
    }

    async fn update(
        &self,
        _table: &str,
        _filters: &[Filter],
        _patch: Value,
        _auth: StoreAuth,
    ) -> Result<Vec<Value>> {
        Err(GymTrackerError::Storage("connection refused".to_string()))
    }

    async fn delete(&self, _table: &str, _filters: &[Filter], _auth: StoreAuth) -> Result<usize> {
        Err(GymTrackerError::Storage("connection refused".to_string()))
    }

    async fn count(&self, _table: &str, _filters: &[Filter], _auth: StoreAuth) -> Result<usize> {
        Err(GymTrackerError::Storage("connection refused".to_string()))
    }

    fn store_name(&self) -> &'static str {
        "FAILING"
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig::for_testing("http://127.0.0.1:9").unwrap()
}

pub fn state_with(config: ServerConfig, provider: Arc<FakeProvider>, store: Arc<dyn DataStore>) -> AppState {
    AppState::with_backends(config, provider, store).unwrap()
}
