//! Configuration loading
//!
//! Builds the domain [`Config`](hearthsync_domain::Config) from environment
//! variables and files.

pub mod loader;

pub use loader::{load, load_from_env, load_from_file, find_config_path};
