//! Role administration: list admins, read and change a user's role

use serde::{Deserialize, Serialize};
use serde_json::json;
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection};

use super::filters::{admin_only, json_body, with_state};
use super::{json_reply, reject};
use crate::app::AppState;
use crate::auth::{AuthenticatedCaller, ProfileRecord, Role};
use crate::constants::PROFILES_TABLE;
use crate::error::GymTrackerError;
use crate::security_logger::SecurityEvent;
use crate::storage::models::ClientSummary;
use crate::storage::{decode_first, decode_rows, Filter as RowFilter, Query, StoreAuth};

#[derive(Debug, Deserialize)]
pub struct RoleChangeRequest {
    pub admin: bool,
}

#[derive(Debug, Serialize)]
pub struct AdminsResponse {
    pub admins: Vec<ClientSummary>,
}

#[derive(Debug, Serialize)]
pub struct RoleResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    pub user_id: String,
    pub role: Role,
    pub admin: bool,
}

pub async fn list_admins(_caller: AuthenticatedCaller, state: AppState) -> Result<Response, Rejection> {
    let query = Query::new()
        .filter(RowFilter::eq("role", Role::Admin.as_str()))
        .order_by("full_name", true);
    let rows = state
        .store
        .select(PROFILES_TABLE, &query, StoreAuth::Service)
        .await
        .map_err(reject)?;
    let admins = decode_rows(rows).map_err(reject)?;
    Ok(json_reply(StatusCode::OK, &AdminsResponse { admins }))
}

pub async fn get_role(
    user_id: String,
    _caller: AuthenticatedCaller,
    state: AppState,
) -> Result<Response, Rejection> {
    let query = Query::new()
        .filter(RowFilter::eq("id", user_id.as_str()))
        .limit(1);
    let rows = state
        .store
        .select(PROFILES_TABLE, &query, StoreAuth::Service)
        .await
        .map_err(reject)?;
    let profile: ProfileRecord = decode_first(rows)
        .map_err(reject)?
        .ok_or_else(|| reject(GymTrackerError::NotFound("User".to_string())))?;

    let role = profile.role();
    Ok(json_reply(
        StatusCode::OK,
        &RoleResponse {
            message: None,
            user_id: profile.id,
            role,
            admin: role.is_admin(),
        },
    ))
}

pub async fn set_role(
    user_id: String,
    caller: AuthenticatedCaller,
    body: RoleChangeRequest,
    state: AppState,
) -> Result<Response, Rejection> {
    if user_id == caller.identity.id && !body.admin {
        return Err(reject(GymTrackerError::Validation(
            "Cannot remove your own admin privileges".to_string(),
        )));
    }

    let role = if body.admin { Role::Admin } else { Role::Standard };
    let rows = state
        .store
        .update(
            PROFILES_TABLE,
            &[RowFilter::eq("id", user_id.as_str())],
            json!({ "role": role.as_str() }),
            StoreAuth::Service,
        )
        .await
        .map_err(reject)?;
    if rows.is_empty() {
        return Err(reject(GymTrackerError::NotFound("User".to_string())));
    }

    state
        .security_logger
        .log_event(SecurityEvent::RoleChanged {
            user_id: user_id.clone(),
            changed_by: caller.identity.id.clone(),
            new_role: role.as_str().to_string(),
        })
        .await;

    Ok(json_reply(
        StatusCode::OK,
        &RoleResponse {
            message: Some(if body.admin {
                "Admin privileges granted"
            } else {
                "Admin privileges revoked"
            }),
            user_id,
            role,
            admin: role.is_admin(),
        },
    ))
}

/// `/admin/...` routes (mounted under `/api`)
pub fn routes(state: AppState) -> BoxedFilter<(Response,)> {
    let list_admins = warp::path!("admin" / "admins")
        .and(warp::get())
        .and(admin_only(state.clone()))
        .and(with_state(state.clone()))
        .and_then(list_admins);

    let get_role = warp::path!("admin" / "users" / String / "role")
        .and(warp::get())
        .and(admin_only(state.clone()))
        .and(with_state(state.clone()))
        .and_then(get_role);

    let set_role = warp::path!("admin" / "users" / String / "role")
        .and(warp::put())
        .and(admin_only(state.clone()))
        .and(json_body())
        .and(with_state(state))
        .and_then(set_role);

    list_admins.or(get_role).unify().or(set_role).unify().boxed()
}
