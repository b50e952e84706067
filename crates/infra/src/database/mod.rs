//! Database implementations

mod codec;
pub mod connection_repository;
pub mod credential_repository;
pub mod event_repository;
pub mod manager;

pub use connection_repository::SqliteConnectionRepository;
pub use credential_repository::SqliteCredentialStore;
pub use event_repository::SqliteMirroredEventRepository;
pub use manager::{DbManager, SqliteConnection, SqlitePool};
