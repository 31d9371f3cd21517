pub mod auth;
pub mod rate_limit;

pub use auth::{require_admin, require_auth, Claims};
pub use rate_limit::rate_limit_middleware;
