use std::error::Error;
use std::fmt;

use warp::http::StatusCode;

#[derive(Debug)]
pub enum GymTrackerError {
    // Authentication errors
    MissingCredential,
    InvalidOrExpiredCredential,
    InvalidCredentials,
    IncorrectPassword,
    InvalidRefreshToken,
    RegistrationRejected,

    // Authorization errors
    Forbidden(String),

    // Upstream errors
    UpstreamUnavailable(String),
    ProfileLookup(String),

    // Storage errors
    Storage(String),
    NotFound(String),

    // Validation errors
    Validation(String),

    // Abuse protection
    RateLimited,

    // Configuration errors
    ConfigError(String),
}

impl GymTrackerError {
    /// HTTP status returned to the caller for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingCredential
            | Self::InvalidOrExpiredCredential
            | Self::InvalidCredentials
            | Self::IncorrectPassword
            | Self::InvalidRefreshToken => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Validation(_) | Self::RegistrationRejected => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::UpstreamUnavailable(_)
            | Self::ProfileLookup(_)
            | Self::Storage(_)
            | Self::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short message safe to show to end users. Never carries provider detail.
    pub fn public_message(&self) -> String {
        match self {
            Self::MissingCredential | Self::InvalidOrExpiredCredential => {
                "Authentication required".to_string()
            }
            Self::InvalidCredentials => "Invalid email or password".to_string(),
            Self::IncorrectPassword => "Current password is incorrect".to_string(),
            Self::InvalidRefreshToken => "Invalid or expired refresh token".to_string(),
            Self::RegistrationRejected => "Registration failed".to_string(),
            Self::Forbidden(msg) => msg.clone(),
            Self::Validation(msg) => msg.clone(),
            Self::NotFound(what) => format!("{} not found", what),
            Self::RateLimited => "Too many requests, please try again later".to_string(),
            Self::UpstreamUnavailable(_)
            | Self::ProfileLookup(_)
            | Self::Storage(_)
            | Self::ConfigError(_) => "Internal server error".to_string(),
        }
    }

    /// Machine readable rejection reason for authentication failures
    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Self::MissingCredential => Some("missing_token"),
            Self::InvalidOrExpiredCredential => Some("invalid_or_expired"),
            Self::Forbidden(_) => Some("forbidden"),
            Self::RateLimited => Some("rate_limited"),
            _ => None,
        }
    }
}

impl fmt::Display for GymTrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCredential => write!(f, "Missing bearer credential"),
            Self::InvalidOrExpiredCredential => write!(f, "Invalid or expired credential"),
            Self::InvalidCredentials => write!(f, "Invalid login credentials"),
            Self::IncorrectPassword => write!(f, "Current password did not match"),
            Self::InvalidRefreshToken => write!(f, "Invalid refresh token"),
            Self::RegistrationRejected => write!(f, "Registration rejected by identity provider"),
            Self::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            Self::UpstreamUnavailable(msg) => write!(f, "Upstream unavailable: {}", msg),
            Self::ProfileLookup(msg) => write!(f, "Profile lookup failed: {}", msg),
            Self::Storage(msg) => write!(f, "Storage error: {}", msg),
            Self::NotFound(what) => write!(f, "Not found: {}", what),
            Self::Validation(msg) => write!(f, "Validation error: {}", msg),
            Self::RateLimited => write!(f, "Rate limit exceeded"),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for GymTrackerError {}

impl warp::reject::Reject for GymTrackerError {}

impl From<reqwest::Error> for GymTrackerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GymTrackerError::UpstreamUnavailable(format!("request timed out: {}", err))
        } else {
            GymTrackerError::UpstreamUnavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GymTrackerError {
    fn from(err: serde_json::Error) -> Self {
        GymTrackerError::Storage(format!("Malformed row: {}", err))
    }
}

// Generic result type for the gym tracker
pub type Result<T> = std::result::Result<T, GymTrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_and_invalid_share_public_shape() {
        let missing = GymTrackerError::MissingCredential;
        let invalid = GymTrackerError::InvalidOrExpiredCredential;
        assert_eq!(missing.status_code(), invalid.status_code());
        assert_eq!(missing.public_message(), invalid.public_message());
        assert_ne!(missing.reason(), invalid.reason());
    }

    #[test]
    fn test_internal_detail_not_public() {
        let err = GymTrackerError::UpstreamUnavailable("connect error to 10.0.0.3".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.public_message().contains("10.0.0.3"));
        assert!(err.to_string().contains("10.0.0.3"));
    }
}
