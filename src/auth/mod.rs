//! Authentication and authorization module
//!
//! Credentials are verified by the identity provider; roles come from the
//! `user_profiles.role` column, read fresh on every request.

pub mod authenticator;
pub mod client;
pub mod guards;
pub mod identity;
pub mod provider;
pub mod role;
pub mod token;

// Re-export main components
pub use authenticator::{AuthenticatedCaller, SessionAuthenticator};
pub use client::IdentityClient;
pub use guards::{require_admin, require_owner_or_admin, OwnerField};
pub use identity::{CallerIdentity, ProfileRecord, ProviderUser, Role, SignOutScope, TokenPair};
pub use provider::{IdentityProvider, SupabaseProvider, VerifyOutcome};
pub use role::{Resolution, RoleResolver};
