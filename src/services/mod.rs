pub mod audit;
pub mod catalog;
pub mod stock;
pub mod users;

pub use audit::Actor;
pub use stock::{MovementOutcome, MovementRequest, OverdrawPolicy, StockError};
