//! ICS feed validation

pub mod validator;

pub use validator::{inspect_feed, normalize_feed_url, IcsValidator};
