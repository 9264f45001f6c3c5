//! Session authentication and role resolution against an in-process provider

mod common;

use common::{bearer, jwt_with, now_unix, state_with, test_config, FailingStore, FakeProvider};
use futures_util::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use gym_tracker::auth::Role;
use gym_tracker::constants::PROFILES_TABLE;
use gym_tracker::storage::{DataStore, Filter, MemoryDataStore, OnConflict, StoreAuth};
use gym_tracker::GymTrackerError;

fn setup() -> (Arc<FakeProvider>, Arc<MemoryDataStore>, gym_tracker::AppState) {
    let provider = Arc::new(FakeProvider::new());
    let store = Arc::new(MemoryDataStore::new());
    let state = state_with(test_config(), provider.clone(), store.clone());
    (provider, store, state)
}

#[tokio::test]
async fn test_missing_credential_rejected() {
    let (provider, _store, state) = setup();

    let err = state.authenticator.authenticate(None, None).await.unwrap_err();
    assert!(matches!(err, GymTrackerError::MissingCredential));
    assert_eq!(err.reason(), Some("missing_token"));

    let err = state
        .authenticator
        .authenticate(Some("Basic dXNlcjpwYXNz"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, GymTrackerError::MissingCredential));

    let err = state
        .authenticator
        .authenticate(Some("Bearer "), None)
        .await
        .unwrap_err();
    assert!(matches!(err, GymTrackerError::MissingCredential));

    assert_eq!(provider.verify_calls(), 0);
}

#[tokio::test]
async fn test_unknown_and_expired_tokens_share_one_rejection() {
    let (provider, _store, state) = setup();
    provider.add_account("u1", "u1@example.com", "secret1");

    let unknown = jwt_with(json!({"sub": "u1", "exp": now_unix() + 600}));
    let unknown_err = state
        .authenticator
        .authenticate(Some(&bearer(&unknown)), None)
        .await
        .unwrap_err();

    let expired = provider.issue_token_expiring("u1", now_unix() - 10);
    let expired_err = state
        .authenticator
        .authenticate(Some(&bearer(&expired)), None)
        .await
        .unwrap_err();

    assert!(matches!(unknown_err, GymTrackerError::InvalidOrExpiredCredential));
    assert!(matches!(expired_err, GymTrackerError::InvalidOrExpiredCredential));
    assert_eq!(unknown_err.status_code(), expired_err.status_code());
    assert_eq!(unknown_err.public_message(), expired_err.public_message());
    assert_eq!(unknown_err.reason(), Some("invalid_or_expired"));
}

#[tokio::test]
async fn test_expired_claim_skips_provider() {
    let (provider, _store, state) = setup();
    provider.add_account("u1", "u1@example.com", "secret1");

    let expired = provider.issue_token_expiring("u1", now_unix() - 1);
    assert!(state
        .authenticator
        .authenticate(Some(&bearer(&expired)), None)
        .await
        .is_err());
    assert_eq!(provider.verify_calls(), 0);
}

#[tokio::test]
async fn test_future_exp_is_not_trusted_without_provider() {
    let (provider, _store, state) = setup();

    // Looks fresh, but the provider never issued it
    let forged = jwt_with(json!({"sub": "u1", "exp": now_unix() + 86_400, "role": "admin"}));
    assert!(state
        .authenticator
        .authenticate(Some(&bearer(&forged)), None)
        .await
        .is_err());
    assert_eq!(provider.verify_calls(), 1);
}

#[tokio::test]
async fn test_oversized_or_malformed_token_rejected_locally() {
    let (provider, _store, state) = setup();

    let huge = "a".repeat(gym_tracker::constants::MAX_TOKEN_LENGTH + 1);
    let err = state
        .authenticator
        .authenticate(Some(&bearer(&huge)), None)
        .await
        .unwrap_err();
    assert!(matches!(err, GymTrackerError::InvalidOrExpiredCredential));

    let err = state
        .authenticator
        .authenticate(Some("Bearer abc\u{7}def"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, GymTrackerError::InvalidOrExpiredCredential));

    assert_eq!(provider.verify_calls(), 0);
}

#[tokio::test]
async fn test_valid_token_builds_identity() {
    let (provider, store, state) = setup();
    provider.add_account("u1", "u1@example.com", "secret1");
    let token = provider.issue_token("u1");

    let caller = state
        .authenticator
        .authenticate(Some(&bearer(&token)), None)
        .await
        .unwrap();
    assert_eq!(caller.identity.id, "u1");
    assert_eq!(caller.identity.email, "u1@example.com");
    assert_eq!(caller.identity.full_name, "Member u1");
    assert!(caller.identity.session_ref.is_some());
    assert_eq!(caller.credential, token);

    // Metadata and token claims both say admin; the stored profile says otherwise
    assert_eq!(caller.identity.role, Role::Standard);
    assert_eq!(store.row_count(PROFILES_TABLE).await, 1);
}

#[tokio::test]
async fn test_stored_admin_role_elevates() {
    let (provider, store, state) = setup();
    provider.add_account("boss", "boss@example.com", "secret1");
    store
        .insert(
            PROFILES_TABLE,
            json!({"id": "boss", "email": "boss@example.com", "role": "admin"}),
            OnConflict::Fail,
            StoreAuth::Service,
        )
        .await
        .unwrap();

    let token = provider.issue_token("boss");
    let caller = state
        .authenticator
        .authenticate(Some(&bearer(&token)), None)
        .await
        .unwrap();
    assert_eq!(caller.identity.role, Role::Admin);
}

#[tokio::test]
async fn test_unrecognized_stored_role_reads_standard() {
    let (provider, store, state) = setup();
    provider.add_account("u1", "u1@example.com", "secret1");
    store
        .insert(
            PROFILES_TABLE,
            json!({"id": "u1", "role": "Admin"}),
            OnConflict::Fail,
            StoreAuth::Service,
        )
        .await
        .unwrap();

    let token = provider.issue_token("u1");
    let caller = state
        .authenticator
        .authenticate(Some(&bearer(&token)), None)
        .await
        .unwrap();
    assert_eq!(caller.identity.role, Role::Standard);
}

#[tokio::test]
async fn test_role_change_applies_on_next_request() {
    let (provider, store, state) = setup();
    provider.add_account("u1", "u1@example.com", "secret1");
    let token = provider.issue_token("u1");

    let before = state
        .authenticator
        .authenticate(Some(&bearer(&token)), None)
        .await
        .unwrap();
    assert_eq!(before.identity.role, Role::Standard);

    store
        .update(
            PROFILES_TABLE,
            &[Filter::eq("id", "u1")],
            json!({"role": "admin"}),
            StoreAuth::Service,
        )
        .await
        .unwrap();
    let promoted = state
        .authenticator
        .authenticate(Some(&bearer(&token)), None)
        .await
        .unwrap();
    assert_eq!(promoted.identity.role, Role::Admin);

    store
        .update(
            PROFILES_TABLE,
            &[Filter::eq("id", "u1")],
            json!({"role": "standard"}),
            StoreAuth::Service,
        )
        .await
        .unwrap();
    let demoted = state
        .authenticator
        .authenticate(Some(&bearer(&token)), None)
        .await
        .unwrap();
    assert_eq!(demoted.identity.role, Role::Standard);
}

#[tokio::test]
async fn test_store_failure_fails_closed_to_standard() {
    let provider = Arc::new(FakeProvider::new());
    let state = state_with(test_config(), provider.clone(), Arc::new(FailingStore));
    provider.add_account("u1", "u1@example.com", "secret1");
    let token = provider.issue_token("u1");

    let caller = state
        .authenticator
        .authenticate(Some(&bearer(&token)), None)
        .await
        .unwrap();
    assert_eq!(caller.identity.role, Role::Standard);
    assert_eq!(caller.identity.email, "u1@example.com");
    assert_eq!(state.security_logger.count("profile_lookup_failed").await, 1);
}

#[tokio::test]
async fn test_provider_timeout_is_a_rejection() {
    let provider = Arc::new(FakeProvider::slow(Duration::from_millis(1_500)));
    let state = state_with(test_config(), provider.clone(), Arc::new(MemoryDataStore::new()));
    provider.add_account("u1", "u1@example.com", "secret1");
    let token = provider.issue_token("u1");

    let started = std::time::Instant::now();
    let err = state
        .authenticator
        .authenticate(Some(&bearer(&token)), None)
        .await
        .unwrap_err();
    assert!(matches!(err, GymTrackerError::InvalidOrExpiredCredential));
    assert!(started.elapsed() < Duration::from_millis(1_400));
    assert_eq!(state.security_logger.count("upstream_unavailable").await, 1);
}

#[tokio::test]
async fn test_provider_outage_is_a_rejection() {
    let (provider, _store, state) = setup();
    provider.add_account("u1", "u1@example.com", "secret1");
    let token = provider.issue_token("u1");
    provider.set_unavailable(true);

    let err = state
        .authenticator
        .authenticate(Some(&bearer(&token)), None)
        .await
        .unwrap_err();
    assert!(matches!(err, GymTrackerError::InvalidOrExpiredCredential));
}

#[tokio::test]
async fn test_optional_mode_never_rejects() {
    let (provider, _store, state) = setup();
    provider.add_account("u1", "u1@example.com", "secret1");

    assert!(state.authenticator.authenticate_optional(None).await.is_none());
    assert!(state
        .authenticator
        .authenticate_optional(Some("Bearer not-a-real-token"))
        .await
        .is_none());

    let token = provider.issue_token("u1");
    let caller = state
        .authenticator
        .authenticate_optional(Some(&bearer(&token)))
        .await
        .unwrap();
    assert_eq!(caller.identity.id, "u1");
}

#[tokio::test]
async fn test_concurrent_first_requests_create_one_profile() {
    let (provider, store, state) = setup();
    provider.add_account("fresh", "fresh@example.com", "secret1");
    let token = provider.issue_token("fresh");
    let header = bearer(&token);

    let attempts = (0..16).map(|_| state.authenticator.authenticate(Some(&header), None));
    let results = join_all(attempts).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert!(results
        .iter()
        .all(|r| r.as_ref().unwrap().identity.role == Role::Standard));
    assert_eq!(store.row_count(PROFILES_TABLE).await, 1);
    assert_eq!(state.security_logger.count("profile_created").await, 1);
}

#[tokio::test]
async fn test_ensure_profile_keeps_existing_role() {
    let (_provider, store, state) = setup();
    store
        .insert(
            PROFILES_TABLE,
            json!({"id": "boss", "full_name": "The Boss", "role": "admin"}),
            OnConflict::Fail,
            StoreAuth::Service,
        )
        .await
        .unwrap();

    let profile = state
        .identity
        .ensure_profile("boss", Some("boss@example.com"), Some("Someone Else"), "token")
        .await
        .unwrap();
    assert_eq!(profile.role(), Role::Admin);
    assert_eq!(profile.full_name.as_deref(), Some("The Boss"));
    assert_eq!(store.row_count(PROFILES_TABLE).await, 1);
}

#[tokio::test]
async fn test_failed_authentication_is_logged_with_fingerprint() {
    let (_provider, _store, state) = setup();
    let bogus = jwt_with(json!({"sub": "nobody"}));

    let _ = state
        .authenticator
        .authenticate(Some(&bearer(&bogus)), Some("203.0.113.7".parse().unwrap()))
        .await;

    let events = state
        .security_logger
        .get_recent_events(Duration::from_secs(60))
        .await;
    let logged = format!("{:?}", events);
    assert!(logged.contains("AuthenticationFailed"));
    assert!(!logged.contains(&bogus));
}
