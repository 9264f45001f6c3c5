//! Authentication endpoints: register, login, logout, refresh, sessions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection};

use super::filters::{client_ip, json_body, with_auth, with_optional_auth, with_state};
use super::{json_reply, reject};
use crate::app::AppState;
use crate::auth::token::fingerprint;
use crate::auth::{AuthenticatedCaller, CallerIdentity, Role, SignOutScope, TokenPair};
use crate::constants::MIN_PASSWORD_LENGTH;
use crate::error::GymTrackerError;
use crate::security_logger::SecurityEvent;
use crate::services::{UserEventData, WebhookEvent};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Public view of the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBody {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
}

impl From<&CallerIdentity> for UserBody {
    fn from(identity: &CallerIdentity) -> Self {
        Self {
            id: identity.id.clone(),
            email: identity.email.clone(),
            full_name: identity.full_name.clone(),
            role: identity.role,
        }
    }
}

/// Session handed to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionBody {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    pub expires_at: DateTime<Utc>,
}

impl SessionBody {
    pub fn issued_now(pair: TokenPair) -> Self {
        let expires_at = pair.expires_at(Utc::now());
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            expires_in: pair.expires_in,
            expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionBody>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    pub user: UserBody,
    pub session: SessionBody,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub message: &'static str,
    pub session: SessionBody,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub session_ref: Option<String>,
    pub current: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionInfo>,
}

#[derive(Debug, Serialize)]
pub struct AuthStatusResponse {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserBody>,
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

pub async fn register(body: RegisterRequest, state: AppState) -> Result<Response, Rejection> {
    let email = body.email.trim().to_lowercase();
    let full_name = body.full_name.trim().to_string();
    if email.is_empty() || body.password.is_empty() || full_name.is_empty() {
        return Err(reject(GymTrackerError::Validation(
            "Email, password, and full name are required".to_string(),
        )));
    }
    if !looks_like_email(&email) {
        return Err(reject(GymTrackerError::Validation("Invalid email address".to_string())));
    }
    if body.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(reject(GymTrackerError::Validation(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LENGTH
        ))));
    }

    let outcome = state
        .identity
        .sign_up(&email, &body.password, &full_name)
        .await
        .map_err(reject)?;

    let user = match outcome.user {
        Some(user) => user,
        None => {
            return Ok(json_reply(
                StatusCode::CREATED,
                &RegisterResponse {
                    message: "Registration initiated. Check your email to confirm.",
                    user: None,
                    session: None,
                },
            ))
        }
    };

    // With an immediate session the profile can be created now; otherwise on first login
    if let Some(ref session) = outcome.session {
        if let Err(e) = state
            .identity
            .ensure_profile(&user.id, Some(&email), Some(&full_name), &session.access_token)
            .await
        {
            log::warn!("Profile creation after sign up deferred for {}: {}", user.id, e);
        }
    }

    // Without a session the account still awaits email confirmation
    let event = if outcome.session.is_some() {
        WebhookEvent::UserRegistered
    } else {
        WebhookEvent::UserPreregistered
    };
    state.webhooks.dispatch(
        event,
        UserEventData {
            user_id: user.id.clone(),
            email: Some(email.clone()),
            full_name: Some(full_name.clone()),
            active: None,
            occurred_at: Utc::now(),
        },
    );

    let response = RegisterResponse {
        message: "User registered successfully",
        user: Some(UserBody {
            id: user.id,
            email: user.email.unwrap_or(email),
            full_name,
            role: Role::Standard,
        }),
        session: outcome.session.map(SessionBody::issued_now),
    };
    Ok(json_reply(StatusCode::CREATED, &response))
}

pub async fn login(body: LoginRequest, ip: IpAddr, state: AppState) -> Result<Response, Rejection> {
    let email = body.email.trim().to_lowercase();
    if email.is_empty() || body.password.is_empty() {
        return Err(reject(GymTrackerError::Validation(
            "Email and password are required".to_string(),
        )));
    }

    let pair = match state.identity.password_grant(&email, &body.password).await {
        Ok(pair) => pair,
        Err(e) => {
            if matches!(e, GymTrackerError::InvalidCredentials) {
                state
                    .security_logger
                    .log_event(SecurityEvent::LoginFailed {
                        email_fingerprint: fingerprint(&email),
                        ip: Some(ip),
                    })
                    .await;
            }
            return Err(reject(e));
        }
    };

    // Same verification and role path as every later request
    let caller = state
        .authenticator
        .identify(&pair.access_token)
        .await
        .map_err(|e| {
            reject(GymTrackerError::UpstreamUnavailable(format!(
                "freshly issued token could not be verified: {}",
                e
            )))
        })?;

    let response = LoginResponse {
        message: "Login successful",
        user: UserBody::from(&caller.identity),
        session: SessionBody::issued_now(pair),
    };
    Ok(json_reply(StatusCode::OK, &response))
}

pub async fn logout(caller: AuthenticatedCaller, state: AppState) -> Result<Response, Rejection> {
    // Best effort: the client drops the token either way
    if let Err(e) = state.identity.sign_out(&caller.credential, SignOutScope::Local).await {
        log::warn!("Provider sign-out failed for {}: {}", caller.identity.id, e);
    }
    Ok(json_reply(
        StatusCode::OK,
        &MessageResponse {
            message: "Logged out successfully",
        },
    ))
}

pub async fn logout_all(caller: AuthenticatedCaller, state: AppState) -> Result<Response, Rejection> {
    state
        .identity
        .sign_out(&caller.credential, SignOutScope::Global)
        .await
        .map_err(reject)?;
    state
        .security_logger
        .log_event(SecurityEvent::SessionsRevoked {
            user_id: caller.identity.id.clone(),
            scope: SignOutScope::Global.as_str().to_string(),
        })
        .await;
    Ok(json_reply(
        StatusCode::OK,
        &MessageResponse {
            message: "Logged out from all devices successfully",
        },
    ))
}

pub async fn refresh(body: RefreshRequest, state: AppState) -> Result<Response, Rejection> {
    let refresh_token = body
        .refresh_token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| reject(GymTrackerError::Validation("refresh_token required".to_string())))?;

    let pair = state
        .identity
        .refresh_grant(&refresh_token)
        .await
        .map_err(reject)?;
    Ok(json_reply(
        StatusCode::OK,
        &RefreshResponse {
            message: "Token refreshed successfully",
            session: SessionBody::issued_now(pair),
        },
    ))
}

pub async fn sessions(caller: AuthenticatedCaller) -> Result<Response, Rejection> {
    Ok(json_reply(
        StatusCode::OK,
        &SessionsResponse {
            sessions: vec![SessionInfo {
                session_ref: caller.identity.session_ref,
                current: true,
            }],
        },
    ))
}

pub async fn status(caller: Option<AuthenticatedCaller>) -> Result<Response, Rejection> {
    Ok(json_reply(
        StatusCode::OK,
        &AuthStatusResponse {
            authenticated: caller.is_some(),
            user: caller.as_ref().map(|c| UserBody::from(&c.identity)),
        },
    ))
}

/// `/auth/...` routes (mounted under `/api`)
pub fn routes(state: AppState) -> BoxedFilter<(Response,)> {
    let register = warp::path!("auth" / "register")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(register);

    let login = warp::path!("auth" / "login")
        .and(warp::post())
        .and(json_body())
        .and(client_ip(state.clone()))
        .and(with_state(state.clone()))
        .and_then(login);

    let logout = warp::path!("auth" / "logout")
        .and(warp::post())
        .and(with_auth(state.clone()))
        .and(with_state(state.clone()))
        .and_then(logout);

    let logout_all = warp::path!("auth" / "logout-all")
        .and(warp::post())
        .and(with_auth(state.clone()))
        .and(with_state(state.clone()))
        .and_then(logout_all);

    let refresh = warp::path!("auth" / "refresh")
        .and(warp::post())
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(refresh);

    let sessions = warp::path!("auth" / "sessions")
        .and(warp::get())
        .and(with_auth(state.clone()))
        .and_then(sessions);

    let status = warp::path!("auth" / "status")
        .and(warp::get())
        .and(with_optional_auth(state))
        .and_then(status);

    register
        .or(login)
        .unify()
        .or(logout)
        .unify()
        .or(logout_all)
        .unify()
        .or(refresh)
        .unify()
        .or(sessions)
        .unify()
        .or(status)
        .unify()
        .boxed()
}
