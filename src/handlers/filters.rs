//! Reusable warp filters: state injection, client IP, rate limiting,
//! authentication and JSON bodies

use serde::de::DeserializeOwned;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use warp::http::header::AUTHORIZATION;
use warp::http::HeaderMap;
use warp::{Filter, Rejection};

use crate::app::AppState;
use crate::auth::{require_admin, AuthenticatedCaller};
use crate::constants::MAX_JSON_BODY_BYTES;
use crate::core::ip_extractor::extract_client_ip;
use crate::error::GymTrackerError;
use crate::security_logger::SecurityEvent;

/// Include the application state in the request
pub fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// Resolve the client IP, honouring forwarded headers only from trusted proxies
pub fn client_ip(state: AppState) -> impl Filter<Extract = (IpAddr,), Error = Infallible> + Clone {
    warp::header::headers_cloned()
        .and(warp::addr::remote())
        .map(move |headers: HeaderMap, remote: Option<SocketAddr>| {
            extract_client_ip(&headers, remote, &state.ip_config)
        })
}

/// Reject with 429 once the client exceeds its request window
pub fn rate_limited(state: AppState) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    client_ip(state.clone())
        .and(with_state(state))
        .and_then(|ip: IpAddr, state: AppState| async move {
            if state.rate_limiter.allow_request(ip).await {
                Ok(())
            } else {
                state
                    .security_logger
                    .log_event(SecurityEvent::RateLimitExceeded {
                        ip: Some(ip),
                        limit_type: "api".to_string(),
                    })
                    .await;
                Err(warp::reject::custom(GymTrackerError::RateLimited))
            }
        })
        .untuple_one()
}

/// Raw `Authorization` value. Bytes that are not valid UTF-8 come through as
/// replacement characters, which the token screen refuses, so a garbled
/// header ends in the same 401 as any other bad credential.
fn authorization_header() -> impl Filter<Extract = (Option<String>,), Error = Infallible> + Clone {
    warp::header::headers_cloned().map(|headers: HeaderMap| {
        headers
            .get(AUTHORIZATION)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
    })
}

/// Required authentication: yields the caller or rejects with 401
pub fn with_auth(state: AppState) -> impl Filter<Extract = (AuthenticatedCaller,), Error = Rejection> + Clone {
    authorization_header()
        .and(client_ip(state.clone()))
        .and(with_state(state))
        .and_then(|authorization: Option<String>, ip: IpAddr, state: AppState| async move {
            state
                .authenticator
                .authenticate(authorization.as_deref(), Some(ip))
                .await
                .map_err(warp::reject::custom)
        })
}

/// Optional authentication: never rejects
pub fn with_optional_auth(
    state: AppState,
) -> impl Filter<Extract = (Option<AuthenticatedCaller>,), Error = Infallible> + Clone {
    authorization_header()
        .and(with_state(state))
        .then(|authorization: Option<String>, state: AppState| async move {
            state
                .authenticator
                .authenticate_optional(authorization.as_deref())
                .await
        })
}

/// Required authentication plus the admin role
pub fn admin_only(state: AppState) -> impl Filter<Extract = (AuthenticatedCaller,), Error = Rejection> + Clone {
    with_auth(state.clone())
        .and(warp::path::full())
        .and(with_state(state))
        .and_then(
            |caller: AuthenticatedCaller, path: warp::path::FullPath, state: AppState| async move {
                match require_admin(&caller.identity) {
                    Ok(()) => Ok(caller),
                    Err(e) => {
                        state
                            .security_logger
                            .log_event(SecurityEvent::PermissionDenied {
                                user_id: caller.identity.id.clone(),
                                action: "admin_route".to_string(),
                                resource: Some(path.as_str().to_string()),
                            })
                            .await;
                        Err(warp::reject::custom(e))
                    }
                }
            },
        )
}

/// JSON request body limited to the configured size
pub fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_JSON_BODY_BYTES).and(warp::body::json())
}
