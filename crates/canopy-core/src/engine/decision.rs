use std::fmt;

/// Why an access check failed, when callers need to react differently
/// from a plain denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenialReason {
    UserNotCertified,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::UserNotCertified => f.write_str("USER_NOT_CERTIFIED"),
        }
    }
}

/// Immutable outcome of an access check. An authorized status never
/// carries a denial reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationStatus {
    authorized: bool,
    message: String,
    reason: Option<DenialReason>,
}

impl AuthorizationStatus {
    pub fn authorized() -> Self {
        Self {
            authorized: true,
            message: String::new(),
            reason: None,
        }
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        Self {
            authorized: false,
            message: message.into(),
            reason: None,
        }
    }

    pub fn access_denied_with_reason(message: impl Into<String>, reason: DenialReason) -> Self {
        Self {
            authorized: false,
            message: message.into(),
            reason: Some(reason),
        }
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn denial_reason(&self) -> Option<DenialReason> {
        self.reason
    }

    /// Both must be authorized; the first denial is kept.
    pub fn and(self, other: AuthorizationStatus) -> AuthorizationStatus {
        if self.authorized { other } else { self }
    }

    /// Falls back to `f` only when this status is a denial.
    pub fn or_else(self, f: impl FnOnce() -> AuthorizationStatus) -> AuthorizationStatus {
        if self.authorized { self } else { f() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorizationError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("user certification required: {0}")]
    UserCertificationRequired(String),
}

/// Turns a denial into the error callers surface to the user.
pub fn check_authorization_or_else_throw(
    status: &AuthorizationStatus,
) -> Result<(), AuthorizationError> {
    if status.authorized {
        return Ok(());
    }
    match status.reason {
        Some(DenialReason::UserNotCertified) => Err(AuthorizationError::UserCertificationRequired(
            status.message.clone(),
        )),
        None => Err(AuthorizationError::Unauthorized(status.message.clone())),
    }
}
