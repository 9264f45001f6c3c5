//! Rendering of every failure as `{"error": ..., "reason"?: ...}`

use serde::Serialize;
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::{Rejection, Reply};

use crate::error::GymTrackerError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

/// Convert a rejection into a JSON error response
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, message, reason) = if let Some(e) = err.find::<GymTrackerError>() {
        if e.status_code().is_server_error() {
            log::error!("Request failed: {}", e);
        } else {
            log::debug!("Request rejected: {}", e);
        }
        (e.status_code(), e.public_message(), e.reason())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "API endpoint not found".to_string(), None)
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        log::debug!("Invalid request body: {}", e);
        (StatusCode::BAD_REQUEST, "Invalid request body".to_string(), None)
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid query string".to_string(), None)
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large".to_string(), None)
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "Content-Length required".to_string(), None)
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Content-Type must be application/json".to_string(),
            None,
        )
    } else if err.find::<warp::filters::cors::CorsForbidden>().is_some() {
        (StatusCode::FORBIDDEN, "Origin not allowed".to_string(), None)
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string(), None)
    } else {
        log::error!("Unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string(), None)
    };

    let body = ErrorBody {
        error: message,
        reason,
    };
    Ok(warp::reply::with_status(warp::reply::json(&body), status))
}
