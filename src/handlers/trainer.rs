//! Trainer back office: clients, plans, plan sessions and exercises.
//! Every route is admin-only and runs with the elevated store credential.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection};

use super::filters::{admin_only, json_body, with_state};
use super::{json_reply, reject};
use crate::app::AppState;
use crate::auth::AuthenticatedCaller;
use crate::constants::{EXERCISES_TABLE, PLANS_TABLE, PLAN_SESSIONS_TABLE, PROFILES_TABLE};
use crate::error::{GymTrackerError, Result};
use crate::services::{PlanEventData, UserEventData, WebhookEvent};
use crate::storage::models::{ClientSummary, Exercise, Plan, PlanSession};
use crate::storage::{decode_first, decode_rows, Filter as RowFilter, OnConflict, Query, StoreAuth};

#[derive(Debug, Deserialize)]
pub struct ClientStatusRequest {
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct NewPlan {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub duration_weeks: Option<u32>,
    #[serde(default)]
    pub sessions_per_week: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_weeks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions_per_week: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewPlanSession {
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_position")]
    pub position: u32,
    #[serde(default)]
    pub weekday: Option<u8>,
    #[serde(default)]
    pub estimated_minutes: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_position() -> u32 {
    1
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanSessionUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekday: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewExercise {
    #[serde(default)]
    pub plan_session_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_sets")]
    pub sets_count: u32,
    #[serde(default = "default_reps_min")]
    pub reps_min: u32,
    #[serde(default = "default_reps_max")]
    pub reps_max: u32,
    #[serde(default)]
    pub weight_suggested: f64,
    #[serde(default = "default_rest")]
    pub rest_seconds: u32,
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub trainer_notes: Option<String>,
}

fn default_sets() -> u32 {
    3
}

fn default_reps_min() -> u32 {
    8
}

fn default_reps_max() -> u32 {
    12
}

fn default_rest() -> u32 {
    90
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExerciseUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sets_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reps_min: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reps_max: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_suggested: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trainer_notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ClientsResponse {
    pub clients: Vec<ClientSummary>,
}

#[derive(Debug, Serialize)]
pub struct ClientResponse {
    pub message: &'static str,
    pub client: ClientSummary,
}

#[derive(Debug, Serialize)]
pub struct PlansResponse {
    pub plans: Vec<Plan>,
}

#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub plan: Plan,
}

#[derive(Debug, Serialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: PlanSession,
    pub exercises: Vec<Exercise>,
}

#[derive(Debug, Serialize)]
pub struct PlanDetailResponse {
    pub plan: Plan,
    pub sessions: Vec<SessionDetail>,
}

#[derive(Debug, Serialize)]
pub struct PlanSessionResponse {
    pub session: PlanSession,
}

#[derive(Debug, Serialize)]
pub struct ExerciseResponse {
    pub exercise: Exercise,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub ok: bool,
}

fn required(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(GymTrackerError::Validation(format!("{} required", field)));
    }
    Ok(())
}

/// Serialize an update DTO into a patch, refusing an empty one
fn to_patch<T: Serialize>(update: &T) -> Result<Value> {
    let patch = serde_json::to_value(update)?;
    match patch.as_object() {
        Some(fields) if !fields.is_empty() => Ok(patch),
        _ => Err(GymTrackerError::Validation("No fields to update".to_string())),
    }
}

fn check_reps(reps_min: Option<u32>, reps_max: Option<u32>) -> Result<()> {
    match (reps_min, reps_max) {
        (Some(min), Some(max)) if min > max => Err(GymTrackerError::Validation(
            "reps_min must not exceed reps_max".to_string(),
        )),
        _ => Ok(()),
    }
}

async fn insert_one<T: serde::de::DeserializeOwned>(state: &AppState, table: &str, row: Value) -> Result<T> {
    let rows = state
        .store
        .insert(table, row, OnConflict::Fail, StoreAuth::Service)
        .await?;
    decode_first(rows)?.ok_or_else(|| GymTrackerError::Storage(format!("insert into {} returned no row", table)))
}

async fn update_one<T: serde::de::DeserializeOwned>(
    state: &AppState,
    table: &str,
    id: &str,
    patch: Value,
    what: &str,
) -> Result<T> {
    let rows = state
        .store
        .update(table, &[RowFilter::eq("id", id)], patch, StoreAuth::Service)
        .await?;
    decode_first(rows)?.ok_or_else(|| GymTrackerError::NotFound(what.to_string()))
}

async fn delete_one(state: &AppState, table: &str, id: &str, what: &str) -> Result<()> {
    let removed = state
        .store
        .delete(table, &[RowFilter::eq("id", id)], StoreAuth::Service)
        .await?;
    if removed == 0 {
        return Err(GymTrackerError::NotFound(what.to_string()));
    }
    Ok(())
}

fn deleted() -> Response {
    json_reply(StatusCode::OK, &DeletedResponse { ok: true })
}

pub async fn list_clients(
    _caller: AuthenticatedCaller,
    params: HashMap<String, String>,
    state: AppState,
) -> std::result::Result<Response, Rejection> {
    let mut query = Query::new().order_by("full_name", true);
    match params.get("active").map(String::as_str) {
        None | Some("all") => {}
        Some(flag @ ("true" | "false")) => query = query.filter(RowFilter::eq("active", flag)),
        Some(_) => {
            return Err(reject(GymTrackerError::Validation(
                "active must be true, false or all".to_string(),
            )))
        }
    }

    let rows = state
        .store
        .select(PROFILES_TABLE, &query, StoreAuth::Service)
        .await
        .map_err(reject)?;
    let clients = decode_rows(rows).map_err(reject)?;
    Ok(json_reply(StatusCode::OK, &ClientsResponse { clients }))
}

pub async fn set_client_status(
    client_id: String,
    _caller: AuthenticatedCaller,
    body: ClientStatusRequest,
    state: AppState,
) -> std::result::Result<Response, Rejection> {
    let client: ClientSummary = update_one(
        &state,
        PROFILES_TABLE,
        &client_id,
        json!({ "active": body.active }),
        "Client",
    )
    .await
    .map_err(reject)?;

    let event = if body.active {
        WebhookEvent::UserActivated
    } else {
        WebhookEvent::UserDeactivated
    };
    state.webhooks.dispatch(
        event,
        UserEventData {
            user_id: client.id.clone(),
            email: client.email.clone(),
            full_name: client.full_name.clone(),
            active: Some(body.active),
            occurred_at: Utc::now(),
        },
    );

    Ok(json_reply(
        StatusCode::OK,
        &ClientResponse {
            message: if body.active {
                "Client activated"
            } else {
                "Client deactivated"
            },
            client,
        },
    ))
}

pub async fn list_plans(
    _caller: AuthenticatedCaller,
    params: HashMap<String, String>,
    state: AppState,
) -> std::result::Result<Response, Rejection> {
    let user_id = params
        .get("user_id")
        .map(|u| u.trim())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| reject(GymTrackerError::Validation("user_id required".to_string())))?;

    let query = Query::new()
        .filter(RowFilter::eq("user_id", user_id))
        .order_by("created_at", false);
    let rows = state
        .store
        .select(PLANS_TABLE, &query, StoreAuth::Service)
        .await
        .map_err(reject)?;
    let plans = decode_rows(rows).map_err(reject)?;
    Ok(json_reply(StatusCode::OK, &PlansResponse { plans }))
}

pub async fn create_plan(
    caller: AuthenticatedCaller,
    body: NewPlan,
    state: AppState,
) -> std::result::Result<Response, Rejection> {
    required(&body.user_id, "user_id").map_err(reject)?;
    required(&body.title, "title").map_err(reject)?;

    let row = json!({
        "user_id": body.user_id.trim(),
        "title": body.title.trim(),
        "description": body.description,
        "active": true,
        "author": caller.identity.full_name,
        "duration_weeks": body.duration_weeks,
        "sessions_per_week": body.sessions_per_week,
        "notes": body.notes,
    });
    let plan: Plan = insert_one(&state, PLANS_TABLE, row).await.map_err(reject)?;

    state.webhooks.dispatch(
        WebhookEvent::PlanCreated,
        PlanEventData {
            plan_id: plan.id.clone(),
            user_id: plan.user_id.clone(),
            title: plan.title.clone(),
            description: plan.description.clone(),
            duration_weeks: plan.duration_weeks,
            sessions_per_week: plan.sessions_per_week,
            created_at: plan.created_at,
        },
    );

    Ok(json_reply(StatusCode::CREATED, &PlanResponse { plan }))
}

pub async fn plan_detail(
    plan_id: String,
    _caller: AuthenticatedCaller,
    state: AppState,
) -> std::result::Result<Response, Rejection> {
    let rows = state
        .store
        .select(
            PLANS_TABLE,
            &Query::new().filter(RowFilter::eq("id", plan_id.as_str())).limit(1),
            StoreAuth::Service,
        )
        .await
        .map_err(reject)?;
    let plan: Plan = decode_first(rows)
        .map_err(reject)?
        .ok_or_else(|| reject(GymTrackerError::NotFound("Plan".to_string())))?;

    let rows = state
        .store
        .select(
            PLAN_SESSIONS_TABLE,
            &Query::new()
                .filter(RowFilter::eq("plan_id", plan.id.as_str()))
                .order_by("position", true),
            StoreAuth::Service,
        )
        .await
        .map_err(reject)?;
    let plan_sessions: Vec<PlanSession> = decode_rows(rows).map_err(reject)?;

    let exercises: Vec<Exercise> = if plan_sessions.is_empty() {
        Vec::new()
    } else {
        let ids = plan_sessions.iter().map(|s| s.id.clone()).collect();
        let rows = state
            .store
            .select(
                EXERCISES_TABLE,
                &Query::new()
                    .filter(RowFilter::is_in("plan_session_id", ids))
                    .order_by("position", true),
                StoreAuth::Service,
            )
            .await
            .map_err(reject)?;
        decode_rows(rows).map_err(reject)?
    };

    let mut by_session: HashMap<String, Vec<Exercise>> = HashMap::new();
    for exercise in exercises {
        by_session
            .entry(exercise.plan_session_id.clone())
            .or_default()
            .push(exercise);
    }
    let sessions = plan_sessions
        .into_iter()
        .map(|session| SessionDetail {
            exercises: by_session.remove(&session.id).unwrap_or_default(),
            session,
        })
        .collect();

    Ok(json_reply(StatusCode::OK, &PlanDetailResponse { plan, sessions }))
}

pub async fn update_plan(
    plan_id: String,
    _caller: AuthenticatedCaller,
    body: PlanUpdate,
    state: AppState,
) -> std::result::Result<Response, Rejection> {
    if let Some(ref title) = body.title {
        required(title, "title").map_err(reject)?;
    }
    let patch = to_patch(&body).map_err(reject)?;
    let plan: Plan = update_one(&state, PLANS_TABLE, &plan_id, patch, "Plan")
        .await
        .map_err(reject)?;
    Ok(json_reply(StatusCode::OK, &PlanResponse { plan }))
}

pub async fn delete_plan(
    plan_id: String,
    _caller: AuthenticatedCaller,
    state: AppState,
) -> std::result::Result<Response, Rejection> {
    delete_one(&state, PLANS_TABLE, &plan_id, "Plan")
        .await
        .map_err(reject)?;
    Ok(deleted())
}

pub async fn create_session(
    _caller: AuthenticatedCaller,
    body: NewPlanSession,
    state: AppState,
) -> std::result::Result<Response, Rejection> {
    required(&body.plan_id, "plan_id").map_err(reject)?;
    required(&body.name, "name").map_err(reject)?;

    let row = json!({
        "plan_id": body.plan_id.trim(),
        "name": body.name.trim(),
        "description": body.description,
        "position": body.position,
        "weekday": body.weekday,
        "estimated_minutes": body.estimated_minutes,
        "notes": body.notes,
    });
    let session: PlanSession = insert_one(&state, PLAN_SESSIONS_TABLE, row)
        .await
        .map_err(reject)?;
    Ok(json_reply(StatusCode::CREATED, &PlanSessionResponse { session }))
}

pub async fn update_session(
    session_id: String,
    _caller: AuthenticatedCaller,
    body: PlanSessionUpdate,
    state: AppState,
) -> std::result::Result<Response, Rejection> {
    let patch = to_patch(&body).map_err(reject)?;
    let session: PlanSession = update_one(&state, PLAN_SESSIONS_TABLE, &session_id, patch, "Session")
        .await
        .map_err(reject)?;
    Ok(json_reply(StatusCode::OK, &PlanSessionResponse { session }))
}

pub async fn delete_session(
    session_id: String,
    _caller: AuthenticatedCaller,
    state: AppState,
) -> std::result::Result<Response, Rejection> {
    delete_one(&state, PLAN_SESSIONS_TABLE, &session_id, "Session")
        .await
        .map_err(reject)?;
    Ok(deleted())
}

pub async fn create_exercise(
    _caller: AuthenticatedCaller,
    body: NewExercise,
    state: AppState,
) -> std::result::Result<Response, Rejection> {
    required(&body.plan_session_id, "plan_session_id").map_err(reject)?;
    required(&body.name, "name").map_err(reject)?;
    check_reps(Some(body.reps_min), Some(body.reps_max)).map_err(reject)?;

    let row = json!({
        "plan_session_id": body.plan_session_id.trim(),
        "name": body.name.trim(),
        "description": body.description,
        "sets_count": body.sets_count,
        "reps_min": body.reps_min,
        "reps_max": body.reps_max,
        "weight_suggested": body.weight_suggested,
        "rest_seconds": body.rest_seconds,
        "position": body.position,
        "trainer_notes": body.trainer_notes,
    });
    let exercise: Exercise = insert_one(&state, EXERCISES_TABLE, row)
        .await
        .map_err(reject)?;
    Ok(json_reply(StatusCode::CREATED, &ExerciseResponse { exercise }))
}

pub async fn update_exercise(
    exercise_id: String,
    _caller: AuthenticatedCaller,
    body: ExerciseUpdate,
    state: AppState,
) -> std::result::Result<Response, Rejection> {
    // A one-sided change is checked against the stored bound
    check_reps(body.reps_min, body.reps_max).map_err(reject)?;
    if body.reps_min.is_some() != body.reps_max.is_some() {
        let rows = state
            .store
            .select(
                EXERCISES_TABLE,
                &Query::new().filter(RowFilter::eq("id", exercise_id.as_str())).limit(1),
                StoreAuth::Service,
            )
            .await
            .map_err(reject)?;
        let current: Exercise = decode_first(rows)
            .map_err(reject)?
            .ok_or_else(|| reject(GymTrackerError::NotFound("Exercise".to_string())))?;
        check_reps(
            body.reps_min.or(current.reps_min),
            body.reps_max.or(current.reps_max),
        )
        .map_err(reject)?;
    }

    let patch = to_patch(&body).map_err(reject)?;
    let exercise: Exercise = update_one(&state, EXERCISES_TABLE, &exercise_id, patch, "Exercise")
        .await
        .map_err(reject)?;
    Ok(json_reply(StatusCode::OK, &ExerciseResponse { exercise }))
}

pub async fn delete_exercise(
    exercise_id: String,
    _caller: AuthenticatedCaller,
    state: AppState,
) -> std::result::Result<Response, Rejection> {
    delete_one(&state, EXERCISES_TABLE, &exercise_id, "Exercise")
        .await
        .map_err(reject)?;
    Ok(deleted())
}

/// `/trainer/...` routes (mounted under `/api`)
pub fn routes(state: AppState) -> BoxedFilter<(Response,)> {
    let clients = warp::path!("trainer" / "clients")
        .and(warp::get())
        .and(admin_only(state.clone()))
        .and(warp::query::<HashMap<String, String>>())
        .and(with_state(state.clone()))
        .and_then(list_clients)
        .boxed();

    let client_status = warp::path!("trainer" / "clients" / String)
        .and(warp::put())
        .and(admin_only(state.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(set_client_status)
        .boxed();

    let plans = warp::path!("trainer" / "plans")
        .and(warp::get())
        .and(admin_only(state.clone()))
        .and(warp::query::<HashMap<String, String>>())
        .and(with_state(state.clone()))
        .and_then(list_plans)
        .boxed();

    let new_plan = warp::path!("trainer" / "plans")
        .and(warp::post())
        .and(admin_only(state.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(create_plan)
        .boxed();

    let plan_detail = warp::path!("trainer" / "plans" / String)
        .and(warp::get())
        .and(admin_only(state.clone()))
        .and(with_state(state.clone()))
        .and_then(plan_detail)
        .boxed();

    let update_plan = warp::path!("trainer" / "plans" / String)
        .and(warp::put())
        .and(admin_only(state.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(update_plan)
        .boxed();

    let delete_plan = warp::path!("trainer" / "plans" / String)
        .and(warp::delete())
        .and(admin_only(state.clone()))
        .and(with_state(state.clone()))
        .and_then(delete_plan)
        .boxed();

    let new_session = warp::path!("trainer" / "sessions")
        .and(warp::post())
        .and(admin_only(state.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(create_session)
        .boxed();

    let update_session = warp::path!("trainer" / "sessions" / String)
        .and(warp::put())
        .and(admin_only(state.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(update_session)
        .boxed();

    let delete_session = warp::path!("trainer" / "sessions" / String)
        .and(warp::delete())
        .and(admin_only(state.clone()))
        .and(with_state(state.clone()))
        .and_then(delete_session)
        .boxed();

    let new_exercise = warp::path!("trainer" / "exercises")
        .and(warp::post())
        .and(admin_only(state.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(create_exercise)
        .boxed();

    let update_exercise = warp::path!("trainer" / "exercises" / String)
        .and(warp::put())
        .and(admin_only(state.clone()))
        .and(json_body())
        .and(with_state(state.clone()))
        .and_then(update_exercise)
        .boxed();

    let delete_exercise = warp::path!("trainer" / "exercises" / String)
        .and(warp::delete())
        .and(admin_only(state.clone()))
        .and(with_state(state))
        .and_then(delete_exercise)
        .boxed();

    clients
        .or(client_status)
        .unify()
        .or(plans)
        .unify()
        .or(new_plan)
        .unify()
        .or(plan_detail)
        .unify()
        .or(update_plan)
        .unify()
        .or(delete_plan)
        .unify()
        .or(new_session)
        .unify()
        .or(update_session)
        .unify()
        .or(delete_session)
        .unify()
        .or(new_exercise)
        .unify()
        .or(update_exercise)
        .unify()
        .or(delete_exercise)
        .unify()
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_patch_rejected() {
        assert!(to_patch(&PlanUpdate::default()).is_err());
        let patch = to_patch(&PlanUpdate {
            title: Some("Hypertrophy".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(patch, json!({"title": "Hypertrophy"}));
    }

    #[test]
    fn test_reps_bounds() {
        assert!(check_reps(Some(8), Some(12)).is_ok());
        assert!(check_reps(Some(12), Some(12)).is_ok());
        assert!(check_reps(Some(13), Some(12)).is_err());
        assert!(check_reps(Some(13), None).is_ok());
    }

    #[test]
    fn test_new_exercise_defaults() {
        let exercise: NewExercise = serde_json::from_value(json!({
            "plan_session_id": "ps1",
            "name": "Squat"
        }))
        .unwrap();
        assert_eq!(exercise.sets_count, 3);
        assert_eq!((exercise.reps_min, exercise.reps_max), (8, 12));
        assert_eq!(exercise.rest_seconds, 90);
        assert_eq!(exercise.weight_suggested, 0.0);
    }

    #[test]
    fn test_plan_update_rejects_unknown_fields() {
        let result: std::result::Result<PlanUpdate, _> =
            serde_json::from_value(json!({"user_id": "someone-else"}));
        assert!(result.is_err());
    }
}
