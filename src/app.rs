//! Application state shared by every route
//!
//! All collaborators are built here from the configuration and handed to the
//! handlers explicitly. `init()` builds the production backends and starts the
//! background tasks; `close()` stops them.

use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

use crate::auth::{IdentityClient, IdentityProvider, RoleResolver, SessionAuthenticator, SupabaseProvider};
use crate::config::ServerConfig;
use crate::core::ip_extractor::IpExtractionConfig;
use crate::core::rate_limiter::IpRateLimiter;
use crate::error::Result;
use crate::security_logger::{SecurityEvent, SecurityLogger};
use crate::services::WebhookDispatcher;
use crate::storage::{DataStore, PostgrestStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub identity: IdentityClient,
    pub authenticator: SessionAuthenticator,
    pub store: Arc<dyn DataStore>,
    pub webhooks: WebhookDispatcher,
    pub security_logger: Arc<SecurityLogger>,
    pub rate_limiter: Arc<IpRateLimiter>,
    pub ip_config: Arc<IpExtractionConfig>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl AppState {
    /// Build the production state and start background maintenance
    pub async fn init(config: ServerConfig) -> Result<Self> {
        let provider: Arc<dyn IdentityProvider> = Arc::new(SupabaseProvider::new(&config)?);
        let store: Arc<dyn DataStore> = Arc::new(PostgrestStore::new(&config)?);

        let state = Self::with_backends(config, provider, store)?;
        if state.config.provider_service_key.is_none() {
            state
                .security_logger
                .log_event(SecurityEvent::ConfigurationError {
                    component: "storage".to_string(),
                    error: "no service key configured; admin data routes will fail".to_string(),
                })
                .await;
        }
        state.start_background_tasks();

        log::info!(
            "Application state ready (provider: {}, store: {}, webhooks: {})",
            state.identity.provider_name(),
            state.store.store_name(),
            if state.webhooks.is_enabled() { "enabled" } else { "disabled" }
        );
        Ok(state)
    }

    /// Assemble the state around the given backends without starting tasks
    pub fn with_backends(
        config: ServerConfig,
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn DataStore>,
    ) -> Result<Self> {
        let security_logger = Arc::new(SecurityLogger::new());
        let identity = IdentityClient::new(
            provider,
            store.clone(),
            config.provider_timeout,
            security_logger.clone(),
        );
        let resolver = RoleResolver::new(identity.clone(), security_logger.clone());
        let authenticator = SessionAuthenticator::new(
            identity.clone(),
            resolver,
            security_logger.clone(),
            config.auth_min_duration,
        );
        let webhooks = WebhookDispatcher::new(config.webhook_url.clone(), config.webhook_timeout)?;
        let rate_limiter = Arc::new(IpRateLimiter::new(
            config.rate_limit_max_requests,
            config.rate_limit_window,
        ));
        let ip_config = Arc::new(IpExtractionConfig::from_server_config(&config));

        Ok(Self {
            config: Arc::new(config),
            identity,
            authenticator,
            store,
            webhooks,
            security_logger,
            rate_limiter,
            ip_config,
            tasks: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Start the periodic cleanup tasks
    pub fn start_background_tasks(&self) {
        let handles = vec![
            self.security_logger.clone().start_cleanup_task(),
            self.rate_limiter.clone().start_cleanup_task(),
        ];
        match self.tasks.lock() {
            Ok(mut tasks) => tasks.extend(handles),
            Err(poisoned) => poisoned.into_inner().extend(handles),
        }
    }

    /// Stop background tasks. Safe to call more than once.
    pub fn close(&self) {
        let handles = match self.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in &handles {
            handle.abort();
        }
        if !handles.is_empty() {
            log::info!("Stopped {} background task(s)", handles.len());
        }
    }
}
