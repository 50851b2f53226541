use axum::http::Method;

use crate::{auth::AuthUser, error::ApiError};

/// A per-request and per-object access predicate.
pub trait Permission {
    fn has_permission(&self, method: &Method, user: Option<&AuthUser>) -> bool;

    fn has_object_permission(&self, method: &Method, user: Option<&AuthUser>, owner_id: i64)
        -> bool;
}

fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Reads are open to everyone; writes need a caller, and writes to an
/// existing object need its author.
pub struct IsOwnerOrReadOnly;

impl Permission for IsOwnerOrReadOnly {
    fn has_permission(&self, method: &Method, user: Option<&AuthUser>) -> bool {
        is_safe(method) || user.is_some()
    }

    fn has_object_permission(
        &self,
        method: &Method,
        user: Option<&AuthUser>,
        owner_id: i64,
    ) -> bool {
        is_safe(method) || user.is_some_and(|u| u.id == owner_id)
    }
}

/// Any authenticated caller, owner or not.
pub struct IsOwnerOrIsAuthenticated;

impl Permission for IsOwnerOrIsAuthenticated {
    fn has_permission(&self, _method: &Method, user: Option<&AuthUser>) -> bool {
        user.is_some()
    }

    fn has_object_permission(
        &self,
        _method: &Method,
        user: Option<&AuthUser>,
        _owner_id: i64,
    ) -> bool {
        // Owners are authenticated by definition.
        user.is_some()
    }
}

fn denied(user: Option<&AuthUser>) -> ApiError {
    if user.is_some() {
        ApiError::Forbidden
    } else {
        ApiError::NotAuthenticated
    }
}

pub fn check_permission(
    policy: &impl Permission,
    method: &Method,
    user: Option<&AuthUser>,
) -> Result<(), ApiError> {
    if policy.has_permission(method, user) {
        Ok(())
    } else {
        Err(denied(user))
    }
}

pub fn check_object_permission(
    policy: &impl Permission,
    method: &Method,
    user: Option<&AuthUser>,
    owner_id: i64,
) -> Result<(), ApiError> {
    if policy.has_object_permission(method, user, owner_id) {
        Ok(())
    } else {
        Err(denied(user))
    }
}
