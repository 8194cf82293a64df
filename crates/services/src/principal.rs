use lms_core::model::{Principal, Role, UserId};

use crate::error::{AuthError, EnrollmentServiceError};

/// Resolves the authenticated caller at the boundary.
pub trait PrincipalSource: Send + Sync {
    /// # Errors
    ///
    /// Returns `AuthError` when no caller can be resolved.
    fn current_principal(&self) -> Result<Principal, AuthError>;
}

/// Principal fixed at construction time, e.g. from CLI flags or env vars.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticPrincipalSource {
    principal: Option<Principal>,
}

impl StaticPrincipalSource {
    #[must_use]
    pub fn new(principal: Option<Principal>) -> Self {
        Self { principal }
    }
}

impl PrincipalSource for StaticPrincipalSource {
    fn current_principal(&self) -> Result<Principal, AuthError> {
        self.principal.ok_or(AuthError::Unauthenticated)
    }
}

/// Student id of the caller, or `Forbidden` for any other role.
pub(crate) fn require_student(principal: &Principal) -> Result<UserId, EnrollmentServiceError> {
    principal
        .as_student()
        .ok_or(EnrollmentServiceError::Forbidden(principal.role()))
}

pub(crate) fn require_admin(principal: &Principal) -> Result<UserId, EnrollmentServiceError> {
    match principal.role() {
        Role::Admin => Ok(principal.user_id()),
        other => Err(EnrollmentServiceError::Forbidden(other)),
    }
}
