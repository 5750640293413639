pub mod auth;
pub mod rate_limit;
pub mod request_meta;

pub use auth::{get_current_user, AdminUser, CurrentUser, Lang};
pub use rate_limit::RateLimiter;
pub use request_meta::RequestMeta;
