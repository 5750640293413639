pub mod auth;
pub mod barcode;
pub mod flash;
pub mod forms;
pub mod pagination;
pub mod totp;

pub use auth::{create_token, hash_password, verify_password, verify_token, Claims, TokenPurpose};
pub use flash::Flash;
pub use pagination::Pagination;
