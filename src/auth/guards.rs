//! Authorization guards layered on an authenticated request
//!
//! Guards only look at the [`CallerIdentity`] already attached to the request;
//! they never perform their own role lookup.

use serde_json::Value;
use std::collections::HashMap;

use crate::auth::identity::CallerIdentity;
use crate::error::{GymTrackerError, Result};
use crate::security::constant_time_eq;

/// Permit admins only
pub fn require_admin(caller: &CallerIdentity) -> Result<()> {
    if caller.is_admin() {
        Ok(())
    } else {
        Err(GymTrackerError::Forbidden("Admin privileges required".to_string()))
    }
}

/// Permit admins, or the caller whose id equals `owner_id` exactly.
/// A missing owner id only lets admins through.
pub fn require_owner_or_admin(caller: &CallerIdentity, owner_id: Option<&str>) -> Result<()> {
    if caller.is_admin() {
        return Ok(());
    }
    match owner_id {
        Some(owner) if constant_time_eq(owner, &caller.id) => Ok(()),
        _ => Err(GymTrackerError::Forbidden(
            "Access denied: insufficient permissions".to_string(),
        )),
    }
}

/// Locates the owner id of a resource by field name
#[derive(Debug, Clone, Copy)]
pub struct OwnerField {
    name: &'static str,
}

impl OwnerField {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Owner id from the path parameters, then from the JSON body.
    /// Only string values count; a numeric id is not coerced.
    pub fn extract(&self, path: &HashMap<String, String>, body: Option<&Value>) -> Option<String> {
        if let Some(owner) = path.get(self.name) {
            return Some(owner.clone());
        }
        body?.get(self.name)?.as_str().map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::identity::Role;
    use serde_json::json;

    fn caller(id: &str, role: Role) -> CallerIdentity {
        CallerIdentity {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            full_name: id.to_string(),
            role,
            session_ref: None,
        }
    }

    #[test]
    fn test_require_admin() {
        assert!(require_admin(&caller("a", Role::Admin)).is_ok());
        let err = require_admin(&caller("s", Role::Standard)).unwrap_err();
        assert_eq!(err.status_code(), warp::http::StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_ownership_matrix() {
        let owner = caller("user-x", Role::Standard);
        let other = caller("user-y", Role::Standard);
        let admin = caller("user-z", Role::Admin);

        assert!(require_owner_or_admin(&owner, Some("user-x")).is_ok());
        assert!(require_owner_or_admin(&other, Some("user-x")).is_err());
        assert!(require_owner_or_admin(&admin, Some("user-x")).is_ok());
        assert!(require_owner_or_admin(&admin, None).is_ok());
        assert!(require_owner_or_admin(&owner, None).is_err());
    }

    #[test]
    fn test_ownership_is_exact() {
        let owner = caller("User-X", Role::Standard);
        assert!(require_owner_or_admin(&owner, Some("user-x")).is_err());
        assert!(require_owner_or_admin(&owner, Some("User-X ")).is_err());
    }

    #[test]
    fn test_owner_field_extraction() {
        let field = OwnerField::new("user_id");
        let mut path = HashMap::new();
        assert_eq!(
            field.extract(&path, Some(&json!({"user_id": "u1"}))),
            Some("u1".to_string())
        );
        assert_eq!(field.extract(&path, Some(&json!({"user_id": 42}))), None);
        assert_eq!(field.extract(&path, None), None);

        path.insert("user_id".to_string(), "u2".to_string());
        assert_eq!(
            field.extract(&path, Some(&json!({"user_id": "u1"}))),
            Some("u2".to_string())
        );
    }
}
