/// HTTP middleware
///
/// Bearer-token authentication for the protected credential endpoints.

mod jwt_middleware;

pub use jwt_middleware::JwtMiddleware;
