//! Request plumbing shared by every route

pub mod ip_extractor;
pub mod rate_limiter;

pub use ip_extractor::{extract_client_ip, IpExtractionConfig};
pub use rate_limiter::IpRateLimiter;
