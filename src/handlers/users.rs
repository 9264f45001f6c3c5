//! Profile, dashboard and schedule endpoints for end users

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection};

use super::filters::{admin_only, json_body, with_auth, with_state};
use super::{json_reply, reject};
use crate::app::AppState;
use crate::auth::{
    require_owner_or_admin, AuthenticatedCaller, OwnerField, ProfileRecord, Role, SignOutScope,
};
use crate::constants::{
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MIN_PASSWORD_LENGTH, PLANS_TABLE, PROFILES_TABLE,
    SCHEDULED_SESSIONS_TABLE,
};
use crate::error::GymTrackerError;
use crate::security_logger::SecurityEvent;
use crate::services::{DashboardStats, UserEventData, WebhookEvent};
use crate::storage::models::{Plan, ScheduledSession, SessionStatus};
use crate::storage::{decode_first, decode_rows, Filter as RowFilter, OnConflict, Query, StoreAuth};

const OWNER: OwnerField = OwnerField::new("user_id");

/// Id of the user an admin route acts on. `me` is reserved for the caller's
/// own routes and never parses, so those paths cannot fall through to here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUserId(pub String);

impl FromStr for TargetUserId {
    type Err = GymTrackerError;

    fn from_str(segment: &str) -> Result<Self, Self::Err> {
        if segment.is_empty() || segment == "me" {
            Err(GymTrackerError::NotFound("User".to_string()))
        } else {
            Ok(Self(segment.to_string()))
        }
    }
}

/// Fields a user may change on their own profile. `role` is deliberately absent.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_cm: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fitness_goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub user_id: String,
    pub plan_session_id: String,
    pub scheduled_date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PasswordChangeRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

/// Admin listing parameters: `?page=&limit=&search=&role=`
#[derive(Debug, Deserialize)]
pub struct UserListParams {
    #[serde(default = "first_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub limit: usize,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

fn first_page() -> usize {
    1
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub profile: ProfileRecord,
}

#[derive(Debug, Serialize)]
pub struct ProfileUpdateResponse {
    pub message: &'static str,
    pub profile: ProfileRecord,
}

#[derive(Debug, Serialize)]
pub struct PasswordChangeResponse {
    pub message: &'static str,
    pub info: &'static str,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub pages: usize,
}

impl Pagination {
    pub fn new(page: usize, limit: usize, total: usize) -> Self {
        Self {
            page,
            limit,
            total,
            pages: total.div_ceil(limit.max(1)),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1)).saturating_mul(self.limit)
    }
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<ProfileRecord>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct UserDetailResponse {
    pub role: Role,
    pub user: ProfileRecord,
}

#[derive(Debug, Serialize)]
pub struct UserUpdateResponse {
    pub message: &'static str,
    pub user: ProfileRecord,
}

#[derive(Debug, Serialize)]
pub struct PlansResponse {
    pub plans: Vec<Plan>,
}

#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub sessions: Vec<ScheduledSession>,
}

#[derive(Debug, Serialize)]
pub struct ScheduledSessionResponse {
    pub session: ScheduledSession,
}

/// Owner reads run with the caller's credential; an admin reading someone
/// else's rows needs the elevated one
fn auth_for(caller: &AuthenticatedCaller, owner_id: &str) -> StoreAuth {
    if caller.identity.id == owner_id {
        StoreAuth::Caller(caller.credential.clone())
    } else {
        StoreAuth::Service
    }
}

fn owner_from_path(user_id: String) -> HashMap<String, String> {
    HashMap::from([(OWNER.name().to_string(), user_id)])
}

async fn current_profile(caller: &AuthenticatedCaller, state: &AppState) -> Result<ProfileRecord, GymTrackerError> {
    match state
        .identity
        .fetch_profile(&caller.identity.id, &caller.credential)
        .await?
    {
        Some(profile) => Ok(profile),
        None => {
            let email = Some(caller.identity.email.as_str()).filter(|e| !e.is_empty());
            state
                .identity
                .ensure_profile(
                    &caller.identity.id,
                    email,
                    Some(&caller.identity.full_name),
                    &caller.credential,
                )
                .await
        }
    }
}

pub async fn get_me(caller: AuthenticatedCaller, state: AppState) -> Result<Response, Rejection> {
    let profile = current_profile(&caller, &state).await.map_err(reject)?;
    let identity = caller.identity;
    Ok(json_reply(
        StatusCode::OK,
        &MeResponse {
            id: identity.id,
            email: identity.email,
            full_name: identity.full_name,
            role: identity.role,
            profile,
        },
    ))
}

pub async fn update_me(
    caller: AuthenticatedCaller,
    update: ProfileUpdate,
    state: AppState,
) -> Result<Response, Rejection> {
    let patch = serde_json::to_value(&update)
        .map_err(|e| reject(GymTrackerError::Validation(format!("Invalid profile: {}", e))))?;
    if patch.as_object().map(|o| o.is_empty()).unwrap_or(true) {
        return Err(reject(GymTrackerError::Validation("No fields to update".to_string())));
    }

    current_profile(&caller, &state).await.map_err(reject)?;
    let rows = state
        .store
        .update(
            PROFILES_TABLE,
            &[RowFilter::eq("id", caller.identity.id.as_str())],
            patch,
            StoreAuth::Caller(caller.credential.clone()),
        )
        .await
        .map_err(reject)?;
    let profile = decode_first::<ProfileRecord>(rows)
        .map_err(reject)?
        .ok_or_else(|| reject(GymTrackerError::NotFound("Profile".to_string())))?;

    Ok(json_reply(
        StatusCode::OK,
        &ProfileUpdateResponse {
            message: "Profile updated successfully",
            profile,
        },
    ))
}

pub async fn my_stats(caller: AuthenticatedCaller, state: AppState) -> Result<Response, Rejection> {
    let query = Query::new().filter(RowFilter::eq("user_id", caller.identity.id.as_str()));
    let rows = state
        .store
        .select(
            SCHEDULED_SESSIONS_TABLE,
            &query,
            StoreAuth::Caller(caller.credential.clone()),
        )
        .await
        .map_err(reject)?;
    let sessions: Vec<ScheduledSession> = decode_rows(rows).map_err(reject)?;
    let stats = DashboardStats::compute(&sessions, Utc::now().date_naive());
    Ok(json_reply(StatusCode::OK, &stats))
}

pub async fn user_plans(
    user_id: String,
    caller: AuthenticatedCaller,
    state: AppState,
) -> Result<Response, Rejection> {
    let owner = OWNER.extract(&owner_from_path(user_id), None);
    require_owner_or_admin(&caller.identity, owner.as_deref()).map_err(reject)?;
    let owner = owner.unwrap_or_default();

    let query = Query::new()
        .filter(RowFilter::eq("user_id", owner.as_str()))
        .order_by("created_at", false);
    let rows = state
        .store
        .select(PLANS_TABLE, &query, auth_for(&caller, &owner))
        .await
        .map_err(reject)?;
    let plans = decode_rows(rows).map_err(reject)?;
    Ok(json_reply(StatusCode::OK, &PlansResponse { plans }))
}

pub async fn user_schedule(
    user_id: String,
    caller: AuthenticatedCaller,
    state: AppState,
) -> Result<Response, Rejection> {
    let owner = OWNER.extract(&owner_from_path(user_id), None);
    require_owner_or_admin(&caller.identity, owner.as_deref()).map_err(reject)?;
    let owner = owner.unwrap_or_default();

    let query = Query::new()
        .filter(RowFilter::eq("user_id", owner.as_str()))
        .order_by("scheduled_date", true);
    let rows = state
        .store
        .select(SCHEDULED_SESSIONS_TABLE, &query, auth_for(&caller, &owner))
        .await
        .map_err(reject)?;
    let sessions = decode_rows(rows).map_err(reject)?;
    Ok(json_reply(StatusCode::OK, &ScheduleResponse { sessions }))
}

pub async fn schedule_session(
    caller: AuthenticatedCaller,
    body: Value,
    state: AppState,
) -> Result<Response, Rejection> {
    let owner = OWNER.extract(&HashMap::new(), Some(&body));
    require_owner_or_admin(&caller.identity, owner.as_deref()).map_err(reject)?;

    let request: ScheduleRequest = serde_json::from_value(body).map_err(|e| {
        reject(GymTrackerError::Validation(format!("Invalid schedule request: {}", e)))
    })?;
    if request.plan_session_id.trim().is_empty() {
        return Err(reject(GymTrackerError::Validation(
            "plan_session_id is required".to_string(),
        )));
    }

    let row = json!({
        "user_id": request.user_id,
        "plan_session_id": request.plan_session_id,
        "scheduled_date": request.scheduled_date,
        "status": SessionStatus::Scheduled,
        "notes": request.notes,
    });
    let rows = state
        .store
        .insert(
            SCHEDULED_SESSIONS_TABLE,
            row,
            OnConflict::Fail,
            auth_for(&caller, &request.user_id),
        )
        .await
        .map_err(reject)?;
    let session = decode_first(rows)
        .map_err(reject)?
        .ok_or_else(|| reject(GymTrackerError::Storage("insert returned no row".to_string())))?;
    Ok(json_reply(StatusCode::CREATED, &ScheduledSessionResponse { session }))
}

pub async fn change_password(
    caller: AuthenticatedCaller,
    body: PasswordChangeRequest,
    state: AppState,
) -> Result<Response, Rejection> {
    if body.current_password.is_empty() || body.new_password.is_empty() {
        return Err(reject(GymTrackerError::Validation(
            "Current password and new password are required".to_string(),
        )));
    }
    if body.new_password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(reject(GymTrackerError::Validation(format!(
            "New password must be at least {} characters long",
            MIN_PASSWORD_LENGTH
        ))));
    }

    // Prove knowledge of the current password with a fresh grant
    match state
        .identity
        .password_grant(&caller.identity.email, &body.current_password)
        .await
    {
        Ok(_) => {}
        Err(GymTrackerError::InvalidCredentials) => {
            return Err(reject(GymTrackerError::IncorrectPassword));
        }
        Err(e) => return Err(reject(e)),
    }

    state
        .identity
        .update_password(&caller.credential, &body.new_password)
        .await
        .map_err(reject)?;
    state
        .security_logger
        .log_event(SecurityEvent::PasswordChanged {
            user_id: caller.identity.id.clone(),
        })
        .await;

    match state
        .identity
        .sign_out(&caller.credential, SignOutScope::Others)
        .await
    {
        Ok(()) => {
            state
                .security_logger
                .log_event(SecurityEvent::SessionsRevoked {
                    user_id: caller.identity.id.clone(),
                    scope: SignOutScope::Others.as_str().to_string(),
                })
                .await;
        }
        Err(e) => log::warn!(
            "Password changed but other sessions of {} stay open: {}",
            caller.identity.id,
            e
        ),
    }

    Ok(json_reply(
        StatusCode::OK,
        &PasswordChangeResponse {
            message: "Password updated successfully",
            info: "All other sessions have been logged out for security",
        },
    ))
}

pub async fn list_users(
    _caller: AuthenticatedCaller,
    params: UserListParams,
    state: AppState,
) -> Result<Response, Rejection> {
    if params.page == 0 || params.limit == 0 || params.limit > MAX_PAGE_SIZE {
        return Err(reject(GymTrackerError::Validation(format!(
            "page must be at least 1 and limit between 1 and {}",
            MAX_PAGE_SIZE
        ))));
    }

    let mut filters = Vec::new();
    match params.role.as_deref() {
        None | Some("") => {}
        Some(role @ ("standard" | "admin")) => filters.push(RowFilter::eq("role", role)),
        Some(_) => {
            return Err(reject(GymTrackerError::Validation(
                "role must be standard or admin".to_string(),
            )))
        }
    }
    if let Some(search) = params
        .search
        .as_deref()
        .and_then(|term| RowFilter::search(&["email", "full_name"], term))
    {
        filters.push(search);
    }

    let total = state
        .store
        .count(PROFILES_TABLE, &filters, StoreAuth::Service)
        .await
        .map_err(reject)?;
    let pagination = Pagination::new(params.page, params.limit, total);

    let query = Query {
        filters,
        ..Query::default()
    }
    .order_by("created_at", false)
    .offset(pagination.offset())
    .limit(pagination.limit);
    let rows = state
        .store
        .select(PROFILES_TABLE, &query, StoreAuth::Service)
        .await
        .map_err(reject)?;
    let users = decode_rows(rows).map_err(reject)?;
    Ok(json_reply(StatusCode::OK, &UserListResponse { users, pagination }))
}

async fn profile_by_id(state: &AppState, user_id: &str) -> Result<ProfileRecord, GymTrackerError> {
    let query = Query::new().filter(RowFilter::eq("id", user_id)).limit(1);
    let rows = state
        .store
        .select(PROFILES_TABLE, &query, StoreAuth::Service)
        .await?;
    decode_first(rows)?.ok_or_else(|| GymTrackerError::NotFound("User".to_string()))
}

pub async fn get_user(
    user_id: TargetUserId,
    _caller: AuthenticatedCaller,
    state: AppState,
) -> Result<Response, Rejection> {
    let user = profile_by_id(&state, &user_id.0).await.map_err(reject)?;
    Ok(json_reply(
        StatusCode::OK,
        &UserDetailResponse {
            role: user.role(),
            user,
        },
    ))
}

/// Split an admin edit into the profile patch and the optional `active` flag.
/// The role is not editable here; it has its own route.
fn admin_patch(mut body: Value) -> Result<(Value, Option<bool>), GymTrackerError> {
    let active = match body.as_object_mut().and_then(|fields| fields.remove("active")) {
        None | Some(Value::Null) => None,
        Some(Value::Bool(active)) => Some(active),
        Some(_) => {
            return Err(GymTrackerError::Validation(
                "active must be a boolean".to_string(),
            ))
        }
    };
    let update: ProfileUpdate = serde_json::from_value(body)
        .map_err(|e| GymTrackerError::Validation(format!("Invalid profile: {}", e)))?;
    let mut patch = serde_json::to_value(&update)
        .map_err(|e| GymTrackerError::Validation(format!("Invalid profile: {}", e)))?;
    if let (Some(active), Some(fields)) = (active, patch.as_object_mut()) {
        fields.insert("active".to_string(), Value::Bool(active));
    }
    if patch.as_object().map(|o| o.is_empty()).unwrap_or(true) {
        return Err(GymTrackerError::Validation("No fields to update".to_string()));
    }
    Ok((patch, active))
}

pub async fn update_user(
    user_id: TargetUserId,
    _caller: AuthenticatedCaller,
    body: Value,
    state: AppState,
) -> Result<Response, Rejection> {
    let (patch, active) = admin_patch(body).map_err(reject)?;
    let rows = state
        .store
        .update(
            PROFILES_TABLE,
            &[RowFilter::eq("id", user_id.0.as_str())],
            patch,
            StoreAuth::Service,
        )
        .await
        .map_err(reject)?;
    let user: ProfileRecord = decode_first(rows)
        .map_err(reject)?
        .ok_or_else(|| reject(GymTrackerError::NotFound("User".to_string())))?;

    if let Some(active) = active {
        let event = if active {
            WebhookEvent::UserActivated
        } else {
            WebhookEvent::UserDeactivated
        };
        state.webhooks.dispatch(
            event,
            UserEventData {
                user_id: user.id.clone(),
                email: user.email.clone(),
                full_name: user.full_name.clone(),
                active: Some(active),
                occurred_at: Utc::now(),
            },
        );
    }

    Ok(json_reply(
        StatusCode::OK,
        &UserUpdateResponse {
            message: "User updated successfully",
            user,
        },
    ))
}

/// `/users/...` routes (mounted under `/api`)
pub fn routes(state: AppState) -> BoxedFilter<(Response,)> {
    let get_me = warp::path!("users" / "me")
        .and(warp::get())
        .and(with_auth(state.clone()))
        .and(with_state(state.clone()))
        .and_then(get_me);

    let update_me = warp::path!("users" / "me")
        .and(warp::put())
        .and(with_auth(state.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(update_me);

    let my_stats = warp::path!("users" / "me" / "stats")
        .and(warp::get())
        .and(with_auth(state.clone()))
        .and(with_state(state.clone()))
        .and_then(my_stats);

    let schedule_session = warp::path!("users" / "schedule")
        .and(warp::post())
        .and(with_auth(state.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(schedule_session);

    let user_plans = warp::path!("users" / String / "plans")
        .and(warp::get())
        .and(with_auth(state.clone()))
        .and(with_state(state.clone()))
        .and_then(user_plans);

    let user_schedule = warp::path!("users" / String / "schedule")
        .and(warp::get())
        .and(with_auth(state.clone()))
        .and(with_state(state.clone()))
        .and_then(user_schedule);

    let change_password = warp::path!("users" / "me" / "password")
        .and(warp::put())
        .and(with_auth(state.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(change_password);

    let list_users = warp::path!("users")
        .and(warp::get())
        .and(admin_only(state.clone()))
        .and(warp::query::<UserListParams>())
        .and(with_state(state.clone()))
        .and_then(list_users);

    let get_user = warp::path!("users" / TargetUserId)
        .and(warp::get())
        .and(admin_only(state.clone()))
        .and(with_state(state.clone()))
        .and_then(get_user);

    let update_user = warp::path!("users" / TargetUserId)
        .and(warp::put())
        .and(admin_only(state.clone()))
        .and(json_body())
        .and(with_state(state))
        .and_then(update_user);

    get_me
        .or(update_me)
        .unify()
        .or(my_stats)
        .unify()
        .or(schedule_session)
        .unify()
        .or(user_plans)
        .unify()
        .or(user_schedule)
        .unify()
        .or(change_password)
        .unify()
        .or(list_users)
        .unify()
        .or(get_user)
        .unify()
        .or(update_user)
        .unify()
        .boxed()
}
