//! Provider adapter ports and registry

pub mod ports;
pub mod registry;

pub use ports::{
    AuthorizationRequest, CalendarProviderAdapter, FeedFetcher, ProviderResult,
};
pub use registry::ProviderRegistry;
