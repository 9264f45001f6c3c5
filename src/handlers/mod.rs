//! HTTP surface of the API, mounted under `/api`

pub mod admin;
pub mod auth;
pub mod filters;
pub mod rejection;
pub mod trainer;
pub mod users;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::convert::Infallible;
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::app::AppState;
use crate::constants::API_VERSION;
use crate::error::GymTrackerError;
use crate::security::api_security_headers;

pub use rejection::handle_rejection;

/// JSON body with an explicit status
pub(crate) fn json_reply<T: Serialize>(status: StatusCode, body: &T) -> Response {
    warp::reply::with_status(warp::reply::json(body), status).into_response()
}

pub(crate) fn reject(error: GymTrackerError) -> Rejection {
    warp::reject::custom(error)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    pub environment: String,
}

fn health(state: AppState) -> BoxedFilter<(Response,)> {
    warp::path!("health")
        .and(warp::get())
        .map(move || {
            json_reply(
                StatusCode::OK,
                &HealthResponse {
                    status: "OK",
                    timestamp: Utc::now(),
                    version: API_VERSION,
                    environment: state.config.environment.clone(),
                },
            )
        })
        .boxed()
}

/// The complete API: rate limiting, every route group, CORS, error rendering,
/// security headers and access logging
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let api = warp::path("api")
        .and(filters::rate_limited(state.clone()))
        .and(
            health(state.clone())
                .or(auth::routes(state.clone()))
                .unify()
                .or(users::routes(state.clone()))
                .unify()
                .or(admin::routes(state.clone()))
                .unify()
                .or(trainer::routes(state.clone()))
                .unify(),
        );

    let cors = warp::cors()
        .allow_origins(state.config.allowed_origins.iter().map(String::as_str))
        .allow_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allow_headers(vec!["authorization", "content-type"])
        .allow_credentials(true);

    api.with(cors)
        .recover(handle_rejection)
        .with(warp::reply::with::headers(api_security_headers()))
        .with(warp::log("gym_tracker::http"))
}
