//! HearthSync application: context wiring and the HTTP front door.

pub mod context;
pub mod routes;
pub mod utils;

pub use context::AppContext;
pub use routes::{router, ApiError};
