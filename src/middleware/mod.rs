/// Middleware module
///
/// Bearer-token authentication for protected user routes.

mod jwt_middleware;

pub use jwt_middleware::JwtMiddleware;
