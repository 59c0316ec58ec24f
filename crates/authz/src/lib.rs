//! Admin authorization.
//!
//! A single shared secret, presented in the `X-Admin-Password` header and
//! compared by exact string equality. No sessions, no hashing.

use std::fmt;
use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap},
};

use bookwish_http::error::AppError;
use bookwish_kernel::settings::AuthSettings;

/// Header carrying the admin secret.
pub const ADMIN_HEADER: &str = "x-admin-password";

/// Decides whether a request carries the configured admin secret.
///
/// With no secret configured every check fails.
#[derive(Clone, Default)]
pub struct AdminGate {
    secret: Option<Arc<str>>,
}

impl AdminGate {
    pub fn new(secret: Option<&str>) -> Self {
        let secret = secret
            .filter(|value| !value.trim().is_empty())
            .map(Arc::from);
        Self { secret }
    }

    pub fn from_settings(settings: &AuthSettings) -> Self {
        let gate = Self::new(settings.admin_password.as_ref().map(|s| s.expose()));
        if !gate.is_configured() {
            tracing::warn!("no admin password configured; privileged operations are disabled");
        }
        gate
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    pub fn is_authorized(&self, presented: Option<&str>) -> bool {
        match (&self.secret, presented) {
            (Some(secret), Some(presented)) => secret.as_ref() == presented,
            _ => false,
        }
    }

    pub fn check_headers(&self, headers: &HeaderMap) -> bool {
        let presented = headers
            .get(ADMIN_HEADER)
            .and_then(|value| value.to_str().ok());
        self.is_authorized(presented)
    }
}

impl fmt::Debug for AdminGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminGate")
            .field("configured", &self.is_configured())
            .finish()
    }
}

/// Extractor that rejects the request with 401 unless the admin header matches.
#[derive(Debug, Clone, Copy)]
pub struct RequireAdmin;

impl<S> FromRequestParts<S> for RequireAdmin
where
    AdminGate: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let gate = AdminGate::from_ref(state);
        if gate.check_headers(&parts.headers) {
            Ok(RequireAdmin)
        } else {
            Err(AppError::unauthorized("Invalid admin password"))
        }
    }
}

/// Extractor reporting whether the caller is admin, without rejecting.
#[derive(Debug, Clone, Copy)]
pub struct AdminStatus {
    pub is_admin: bool,
}

impl<S> FromRequestParts<S> for AdminStatus
where
    AdminGate: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let gate = AdminGate::from_ref(state);
        Ok(AdminStatus {
            is_admin: gate.check_headers(&parts.headers),
        })
    }
}
