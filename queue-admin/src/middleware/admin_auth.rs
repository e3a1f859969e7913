use std::sync::Arc;

use axum::{
    extract::Request,
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::Response,
    Extension,
};

use crate::types::{AppError, Environment};

/// Admin credentials checked by [`admin_auth_middleware`]
#[derive(Debug, Clone)]
pub struct AdminAuth {
    token: Option<Arc<str>>,
    disabled: bool,
}

impl AdminAuth {
    #[must_use]
    pub fn new(token: Option<&str>, disabled: bool) -> Self {
        Self {
            token: token.map(Arc::from),
            disabled,
        }
    }

    #[must_use]
    pub fn from_environment(environment: &Environment) -> Self {
        Self::new(environment.admin_token().as_deref(), environment.disable_auth())
    }

    /// Whether admin routes can be reached at all
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.disabled || self.token.is_some()
    }
}

/// Admin bearer token middleware
///
/// Rejects requests whose `Authorization: Bearer` token does not match the
/// configured admin token with 401. Skipped when auth is disabled.
///
/// # Errors
///
/// - `AppError` - Invalid/missing token with 401 status code
pub async fn admin_auth_middleware(
    Extension(auth): Extension<AdminAuth>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if auth.disabled {
        return Ok(next.run(request).await);
    }

    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .ok_or_else(|| {
            AppError::new(
                StatusCode::UNAUTHORIZED,
                "missing_token",
                "Authorization header must contain a valid Bearer token",
                false,
            )
        })?;

    if auth.token.as_deref() != Some(token) {
        return Err(AppError::new(
            StatusCode::UNAUTHORIZED,
            "invalid_token",
            "Admin token is not valid",
            false,
        ));
    }

    Ok(next.run(request).await)
}
