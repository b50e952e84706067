//! Error conversion helpers for infrastructure adapters

pub mod conversions;

pub use conversions::{
    parse_retry_after, provider_error_from_http, provider_error_from_status, InfraError,
};
