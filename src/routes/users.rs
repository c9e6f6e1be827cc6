/// User Routes
///
/// Read and update access to identity records. Mounted behind
/// `JwtMiddleware`, so the caller's access-token claims are always present.

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::auth::Claims;
use crate::error::AppError;
use crate::session::{Pagination, SessionService, UpdateUserRequest};

#[derive(Deserialize)]
pub struct ListUsersQuery {
    #[serde(rename = "recordPerPage")]
    pub record_per_page: Option<i64>,
    pub page: Option<i64>,
}

/// GET /users
///
/// Admin only. `recordPerPage` defaults to 10 and `page` to 1.
pub async fn get_users(
    query: web::Query<ListUsersQuery>,
    claims: web::ReqData<Claims>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let pagination = Pagination::new(query.record_per_page, query.page);
    let page = sessions.list_users(&claims, pagination).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// GET /users/{user_id}
///
/// Admins may read any user, others only themselves.
///
/// # Errors
/// - 403: Caller may not read this user
/// - 404: No such user
pub async fn get_user(
    path: web::Path<String>,
    claims: web::ReqData<Claims>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let user = sessions.get_user(&claims, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// GET /user/{email}
pub async fn get_user_by_email(
    path: web::Path<String>,
    claims: web::ReqData<Claims>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let user = sessions.get_user_by_email(&claims, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// PUT /user/{user_id}
///
/// Partial profile update; the role cannot be changed.
///
/// # Errors
/// - 400: Invalid field, empty update, or email/phone taken by another user
/// - 403: Caller may not update this user
/// - 404: No such user
pub async fn update_user(
    path: web::Path<String>,
    form: web::Json<UpdateUserRequest>,
    claims: web::ReqData<Claims>,
    sessions: web::Data<SessionService>,
) -> Result<HttpResponse, AppError> {
    let user = sessions
        .update_user(&claims, &path.into_inner(), form.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(user))
}
