/// Authentication Routes
///
/// Registration, login and token refresh. All three answer with JSON; errors
/// are rendered (and logged once) by `AppError`.

use actix_web::{web, HttpResponse};

use crate::error::AppError;
use crate::session::{LoginRequest, RefreshRequest, RegisterRequest, SessionService};

/// POST /users/register
///
/// Create an account. Responds with the new record's id.
///
/// # Errors
/// - 400: Validation failure, or email/phone already registered
/// - 500: Store or signing failure
pub async fn register(
    form: web::Json<RegisterRequest>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let response = sessions.register(form.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// POST /users/login
///
/// Check credentials and return the user record carrying a fresh token pair.
///
/// # Errors
/// - 400: Missing fields, or incorrect email or password (one message for both)
/// - 500: Store or signing failure
pub async fn login(
    form: web::Json<LoginRequest>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let user = sessions.login(form.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// POST /users/refresh
///
/// Exchange the current refresh token for a new access/refresh pair.
///
/// # Errors
/// - 401: Invalid, expired or superseded refresh token
/// - 500: Store or signing failure
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let user = sessions.refresh(form.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}
