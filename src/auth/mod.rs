//! Authentication Module
//! Mission: Secure API access with JWT tokens and firm-level tenancy

pub mod jwt;
pub mod middleware;
pub mod models;

pub use jwt::JwtHandler;
pub use middleware::{auth_middleware, AuthLayer};
pub use models::{AuthContext, UserRole};
