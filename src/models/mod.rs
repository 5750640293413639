pub mod audit;
pub mod category;
pub mod product;
pub mod role;
pub mod stock_movement;
pub mod user;

pub use audit::AuditLog;
pub use category::{Category, DEFAULT_CATEGORIES};
pub use product::{NewProduct, Product, ProductChanges, ProductListing, ProductSummary};
pub use role::{Role, RoleName};
pub use stock_movement::{MovementListing, StockMovement};
pub use user::{CreateUser, User, UserListing};
