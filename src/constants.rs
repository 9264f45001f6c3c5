// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3010;
pub const API_VERSION: &str = "1.0.0";

// Identity provider calls
pub const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 5_000;
pub const MAX_PROVIDER_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_WEBHOOK_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_AUTH_MIN_MS: u64 = 100;

// Bearer tokens above this size are rejected without a provider round trip
pub const MAX_TOKEN_LENGTH: usize = 4096;

// API rate limiting (per client IP)
pub const DEFAULT_RATE_LIMIT_WINDOW_MS: u64 = 15 * 60 * 1000;
pub const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u32 = 100;
pub const MAX_TRACKED_CLIENTS: usize = 10_000;

// Request bodies
pub const MAX_JSON_BODY_BYTES: u64 = 1024 * 1024;

pub const MIN_PASSWORD_LENGTH: usize = 6;

// Admin user listing
pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:3010";

// Data store tables
pub const PROFILES_TABLE: &str = "user_profiles";
pub const PLANS_TABLE: &str = "plans";
pub const PLAN_SESSIONS_TABLE: &str = "plan_sessions";
pub const EXERCISES_TABLE: &str = "exercises";
pub const SCHEDULED_SESSIONS_TABLE: &str = "scheduled_sessions";
